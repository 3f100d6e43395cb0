//! HTML extraction for documentation pages, built on `scraper`.

use reqwest::Url;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;

use super::links::{is_download, is_spec_path, normalize_url};

/// Elements whose text never reaches the prose context.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "svg", "template", "head",
];

/// Elements that end a line of text.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "pre", "tr", "table",
    "section", "article", "br", "dt", "dd", "blockquote",
];

/// Spec references hidden in viewer markup (Redoc, Swagger UI) or scripts.
static SPEC_REF_PATTERNS: LazyLock<Vec<regex::Regex>> = LazyLock::new(|| {
    [
        r#"spec-url\s*=\s*["']([^"']+)["']"#,
        r#""specUrl"\s*:\s*"([^"]+)""#,
        r#"\burl\s*:\s*["']([^"']+\.(?:json|ya?ml))["']"#,
        r#"["']([^"'\s<>]*(?:openapi|swagger|api-docs|api-spec)[^"'\s<>]*\.(?:json|ya?ml))["']"#,
    ]
    .iter()
    .filter_map(|p| regex::Regex::new(p).ok())
    .collect()
});

/// An outbound link found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Absolute URL with the fragment removed.
    pub url: String,
    pub anchor: String,
}

/// What one fetched HTML document contributed.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub title: Option<String>,
    pub text: String,
    pub links: Vec<Link>,
    /// Absolute URLs that look like machine-readable API descriptions.
    pub spec_refs: Vec<String>,
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Parse an HTML document fetched from `base`.
pub fn parse_page(html: &str, base: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let title = selector("title")
        .and_then(|sel| document.select(&sel).next())
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let mut page = ParsedPage {
        title,
        text: extract_text(&document),
        ..Default::default()
    };

    if let Some(sel) = selector("a[href]") {
        for a in document.select(&sel) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            let Some(url) = resolve_href(base, href) else {
                continue;
            };
            if is_spec_path(url.path()) {
                push_unique(&mut page.spec_refs, normalize_url(&url));
                continue;
            }
            if is_download(url.path()) {
                continue;
            }
            let normalized = normalize_url(&url);
            if page.links.iter().any(|l| l.url == normalized) {
                continue;
            }
            page.links.push(Link {
                url: normalized,
                anchor: collapse_whitespace(&a.text().collect::<String>()),
            });
        }
    }

    for pattern in SPEC_REF_PATTERNS.iter() {
        for cap in pattern.captures_iter(html) {
            if let Some(url) = cap.get(1).and_then(|m| resolve_href(base, m.as_str())) {
                push_unique(&mut page.spec_refs, normalize_url(&url));
            }
        }
    }

    page
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Visible text of the main content, one block per line.
///
/// Prefers `main`, then `article`, then `body`, like a reader view would.
pub fn extract_text(document: &Html) -> String {
    for sel_str in ["main", "article", "body"] {
        let Some(sel) = selector(sel_str) else {
            continue;
        };
        if let Some(root) = document.select(&sel).next() {
            let mut raw = String::new();
            collect_text(root, &mut raw);
            let text = tidy_lines(&raw);
            if !text.is_empty() {
                return text;
            }
        }
    }

    // Fragments without a body still have a root.
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);
    tidy_lines(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIPPED_ELEMENTS.contains(&name) {
                    continue;
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if BLOCK_ELEMENTS.contains(&name) {
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn tidy_lines(raw: &str) -> String {
    raw.lines()
        .map(collapse_whitespace)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://docs.example.com/guide/").unwrap()
    }

    #[test]
    fn test_text_skips_chrome_and_scripts() {
        let html = r#"<html><head><title> Example API </title></head><body>
            <nav><a href="/reference">API Reference</a></nav>
            <header>Site header</header>
            <script>var secret = 1;</script>
            <h1>Posts</h1><p>GET   /posts returns all posts.</p>
            <footer>© Example</footer>
        </body></html>"#;
        let page = parse_page(html, &base());

        assert_eq!(page.title.as_deref(), Some("Example API"));
        assert_eq!(page.text, "Posts\nGET /posts returns all posts.");
        // Nav text is dropped but its links are still followed.
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].url, "https://docs.example.com/reference");
        assert_eq!(page.links[0].anchor, "API Reference");
    }

    #[test]
    fn test_prefers_main_content() {
        let html = "<body><div>sidebar</div><main><p>only this</p></main></body>";
        let document = Html::parse_document(html);
        assert_eq!(extract_text(&document), "only this");
    }

    #[test]
    fn test_links_are_absolute_deduped_and_fragment_free() {
        let html = r##"<body>
            <a href="auth#tokens">Auth</a>
            <a href="auth#scopes">Auth again</a>
            <a href="#top">Top</a>
            <a href="mailto:x@y.z">Mail</a>
            <a href="/files/sdk.zip">SDK</a>
        </body>"##;
        let page = parse_page(html, &base());
        let urls: Vec<_> = page.links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://docs.example.com/guide/auth"]);
    }

    #[test]
    fn test_spec_refs_from_links_and_viewers() {
        let html = r#"<body>
            <a href="/v1/openapi.json">Download spec</a>
            <redoc spec-url="https://cdn.example.com/api.yaml"></redoc>
            <script>SwaggerUIBundle({ url: "/static/swagger.json", dom_id: '#ui' })</script>
        </body>"#;
        let page = parse_page(html, &base());
        assert_eq!(
            page.spec_refs,
            vec![
                "https://docs.example.com/v1/openapi.json",
                "https://cdn.example.com/api.yaml",
                "https://docs.example.com/static/swagger.json",
            ]
        );
        assert!(page.links.is_empty());
    }
}
