//! URL normalization and link relevance scoring.

use reqwest::Url;

/// Words that mark a link as likely to lead to endpoint or auth documentation.
pub const RELEVANCE_KEYWORDS: &[&str] = &[
    "api",
    "endpoint",
    "reference",
    "auth",
    "authentication",
    "example",
    "spec",
    "request",
    "response",
    "parameter",
    "method",
    "rest",
    "guide",
    "usage",
    "quickstart",
    "getting-started",
    "sdk",
];

/// File names that are almost always machine-readable API descriptions.
const SPEC_FILENAMES: &[&str] = &[
    "openapi.json",
    "openapi.yaml",
    "openapi.yml",
    "swagger.json",
    "swagger.yaml",
    "swagger.yml",
    "api-docs.json",
    "api-spec.json",
    "api-spec.yaml",
];

const DOWNLOAD_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".tar", ".gz", ".tgz", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico",
    ".css", ".js", ".woff", ".woff2", ".mp4",
];

/// Canonical string form used for visited/queued bookkeeping.
///
/// Drops the fragment; `Url` already lowercases the host and strips
/// default ports.
pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

/// Returns `true` if the path names a spec document.
pub fn is_spec_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    let file = lower.rsplit('/').next().unwrap_or("");
    if SPEC_FILENAMES.contains(&file) {
        return true;
    }
    let structured = [".json", ".yaml", ".yml"].iter().any(|ext| file.ends_with(ext));
    structured && (file.contains("openapi") || file.contains("swagger"))
}

pub fn is_download(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    DOWNLOAD_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Number of distinct relevance keywords in the anchor text or URL path.
///
/// Zero means the link is not worth following.
pub fn score_link(url: &str, anchor: &str) -> u32 {
    let path = Url::parse(url)
        .map(|u| u.path().to_ascii_lowercase())
        .unwrap_or_default();
    let anchor = anchor.to_lowercase();
    RELEVANCE_KEYWORDS
        .iter()
        .filter(|kw| anchor.contains(*kw) || path.contains(*kw))
        .count() as u32
}

/// Host comparison used to keep the crawl on the documentation site.
pub fn same_host(a: &Url, b: &Url) -> bool {
    a.host_str().map(|h| h.to_ascii_lowercase()) == b.host_str().map(|h| h.to_ascii_lowercase())
        && a.port_or_known_default() == b.port_or_known_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_drops_fragment() {
        assert_eq!(
            normalize_url(&Url::parse("https://Docs.Example.com:443/api#auth").unwrap()),
            "https://docs.example.com/api"
        );
    }

    #[test]
    fn test_spec_paths() {
        assert!(is_spec_path("/openapi.json"));
        assert!(is_spec_path("/v3/api-docs.json"));
        assert!(is_spec_path("/specs/petstore-openapi.yaml"));
        assert!(!is_spec_path("/reference/users.json"));
        assert!(!is_spec_path("/docs/openapi"));
    }

    #[test]
    fn test_score_counts_distinct_keywords() {
        assert_eq!(score_link("https://x.io/blog/2024", "Company news"), 0);
        assert!(score_link("https://x.io/api/reference", "") >= 2);
        assert!(
            score_link("https://x.io/p/1", "Authentication guide")
                > score_link("https://x.io/p/2", "Guide")
        );
    }

    #[test]
    fn test_same_host() {
        let a = Url::parse("https://docs.x.io/a").unwrap();
        let b = Url::parse("https://DOCS.x.io:443/b").unwrap();
        let c = Url::parse("https://blog.x.io/").unwrap();
        assert!(same_host(&a, &b));
        assert!(!same_host(&a, &c));
    }
}
