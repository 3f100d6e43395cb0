//! Bounded documentation crawler.
//!
//! Starts at the docs URL the user gave and walks same-host links in order
//! of relevance until the page budget or depth limit runs out. Links that
//! point at an OpenAPI/Swagger document jump the queue, and the first spec
//! found is kept verbatim for the extractor.

pub mod html;
pub mod links;

use reqwest::{Client, Url};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CrawlerConfig;
use crate::openapi::looks_like_spec;

use self::links::{normalize_url, same_host, score_link};

const TRUNCATION_NOTICE: &str = "\n\n[Documentation truncated - showing first portion]";

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid documentation URL `{0}`")]
    InvalidSeed(String),
    #[error("could not fetch documentation at {url}: {reason}")]
    SeedUnreachable { url: String, reason: String },
}

/// One page that contributed prose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawledPage {
    pub url: String,
    pub depth: u32,
    pub title: Option<String>,
    pub text: String,
}

/// A machine-readable API description, kept as fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpec {
    pub url: String,
    pub text: String,
}

/// Everything a crawl learned.
#[derive(Debug, Clone, Default)]
pub struct CrawlContext {
    visited: Vec<String>,
    pages: Vec<CrawledPage>,
    raw_spec: Option<RawSpec>,
    max_content_length: usize,
}

impl CrawlContext {
    fn new(max_content_length: usize) -> Self {
        Self {
            max_content_length,
            ..Default::default()
        }
    }

    /// Every URL fetched (or attempted), in visit order.
    pub fn visited(&self) -> &[String] {
        &self.visited
    }

    pub fn pages(&self) -> &[CrawledPage] {
        &self.pages
    }

    pub fn raw_spec(&self) -> Option<&RawSpec> {
        self.raw_spec.as_ref()
    }

    pub fn has_visited(&self, url: &str) -> bool {
        self.visited.iter().any(|v| v == url)
    }

    /// Title of the first page that had one.
    pub fn title(&self) -> Option<&str> {
        self.pages.iter().find_map(|p| p.title.as_deref())
    }

    /// Accumulated page prose, cut at the configured content length.
    pub fn documentation(&self) -> String {
        let mut out = String::new();
        for page in &self.pages {
            let title = page.title.as_deref().unwrap_or("Untitled");
            let sep = "=".repeat(60);
            out.push_str(&format!(
                "\n{sep}\nPage: {title}\nURL: {}\n{sep}\n\n{}\n",
                page.url, page.text
            ));
        }
        truncate_chars(&out, self.max_content_length)
    }
}

/// Cut `text` to at most `max` characters, with a notice.
fn truncate_chars(text: &str, max: usize) -> String {
    let Some((end, _)) = text.char_indices().nth(max) else {
        return text.to_string();
    };
    format!("{}{}", &text[..end], TRUNCATION_NOTICE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateKind {
    Spec,
    Page,
}

#[derive(Debug, Clone)]
struct Candidate {
    url: String,
    depth: u32,
    score: u32,
    seq: u64,
    kind: CandidateKind,
}

/// Pending links, best first.
#[derive(Debug, Default)]
struct Frontier {
    items: Vec<Candidate>,
    queued: HashSet<String>,
    next_seq: u64,
}

impl Frontier {
    fn push(&mut self, url: String, depth: u32, score: u32, kind: CandidateKind) {
        if !self.queued.insert(url.clone()) {
            // A spec reference found later still outranks the page entry.
            if kind == CandidateKind::Spec {
                if let Some(existing) = self.items.iter_mut().find(|c| c.url == url) {
                    existing.kind = CandidateKind::Spec;
                }
            }
            return;
        }
        self.items.push(Candidate {
            url,
            depth,
            score,
            seq: self.next_seq,
            kind,
        });
        self.next_seq += 1;
    }

    /// Spec references first (while `want_spec`), then highest score,
    /// then earliest discovered.
    fn pop(&mut self, want_spec: bool) -> Option<Candidate> {
        if !want_spec {
            self.items.retain(|c| c.kind != CandidateKind::Spec);
        }
        let best = self
            .items
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                (a.kind == CandidateKind::Spec)
                    .cmp(&(b.kind == CandidateKind::Spec))
                    .then(a.score.cmp(&b.score))
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|(i, _)| i)?;
        Some(self.items.swap_remove(best))
    }
}

pub struct DocCrawler {
    client: Client,
    max_content_length: usize,
}

impl DocCrawler {
    pub fn new(client: Client, max_content_length: usize) -> Self {
        Self {
            client,
            max_content_length,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::new(client, config.max_content_length)
    }

    /// Crawl from `seed_url`, fetching at most `max_pages` documents and
    /// following links at most `max_depth` hops from the seed.
    ///
    /// Only a failure on the seed is an error; later pages that fail are
    /// logged and skipped. A budget of zero fetches nothing.
    pub async fn crawl(
        &self,
        seed_url: &str,
        max_pages: usize,
        max_depth: u32,
    ) -> Result<CrawlContext, CrawlError> {
        let seed = Url::parse(seed_url).map_err(|_| CrawlError::InvalidSeed(seed_url.to_string()))?;
        if !matches!(seed.scheme(), "http" | "https") {
            return Err(CrawlError::InvalidSeed(seed_url.to_string()));
        }
        let seed_key = normalize_url(&seed);
        let mut ctx = CrawlContext::new(self.max_content_length);
        if max_pages == 0 {
            warn!(url = %seed_key, "Page budget is zero, not crawling");
            return Ok(ctx);
        }

        info!(url = %seed_key, max_pages, max_depth, "Crawling documentation");

        let mut frontier = Frontier::default();
        frontier.queued.insert(seed_key.clone());

        ctx.visited.push(seed_key.clone());
        let body = self
            .fetch(&seed_key)
            .await
            .map_err(|reason| CrawlError::SeedUnreachable {
                url: seed_key.clone(),
                reason,
            })?;
        self.absorb(&mut ctx, &mut frontier, &seed, &seed_key, 0, max_depth, body);

        while ctx.visited.len() < max_pages {
            let Some(next) = frontier.pop(ctx.raw_spec.is_none()) else {
                break;
            };
            if ctx.has_visited(&next.url) {
                continue;
            }
            ctx.visited.push(next.url.clone());

            let body = match self.fetch(&next.url).await {
                Ok(body) => body,
                Err(reason) => {
                    warn!(url = %next.url, %reason, "Skipping page");
                    continue;
                }
            };
            self.absorb(&mut ctx, &mut frontier, &seed, &next.url, next.depth, max_depth, body);
        }

        info!(
            visited = ctx.visited.len(),
            pages = ctx.pages.len(),
            spec = ctx.raw_spec.is_some(),
            "Crawl finished"
        );
        Ok(ctx)
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        debug!(url, "Fetching");
        let resp = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        resp.text().await.map_err(|e| e.to_string())
    }

    /// Fold one fetched document into the context and queue its links.
    #[allow(clippy::too_many_arguments)]
    fn absorb(
        &self,
        ctx: &mut CrawlContext,
        frontier: &mut Frontier,
        seed: &Url,
        url: &str,
        depth: u32,
        max_depth: u32,
        body: String,
    ) {
        if looks_like_spec(&body) {
            if ctx.raw_spec.is_none() {
                info!(url, "Found API specification");
                ctx.raw_spec = Some(RawSpec {
                    url: url.to_string(),
                    text: body,
                });
            }
            return;
        }

        let Ok(base) = Url::parse(url) else {
            return;
        };
        let page = html::parse_page(&body, &base);

        if !page.text.is_empty() {
            ctx.pages.push(CrawledPage {
                url: url.to_string(),
                depth,
                title: page.title,
                text: page.text,
            });
        }

        if depth >= max_depth {
            return;
        }

        if ctx.raw_spec.is_none() {
            for spec_url in page.spec_refs {
                frontier.push(spec_url, depth + 1, u32::MAX, CandidateKind::Spec);
            }
        }

        for link in page.links {
            let Ok(parsed) = Url::parse(&link.url) else {
                continue;
            };
            if !same_host(seed, &parsed) || ctx.has_visited(&link.url) {
                continue;
            }
            let score = score_link(&link.url, &link.anchor);
            if score == 0 {
                continue;
            }
            frontier.push(link.url, depth + 1, score, CandidateKind::Page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn crawler() -> DocCrawler {
        DocCrawler::new(Client::new(), 8000)
    }

    #[test]
    fn test_frontier_order() {
        let mut f = Frontier::default();
        f.push("a".into(), 1, 1, CandidateKind::Page);
        f.push("b".into(), 1, 3, CandidateKind::Page);
        f.push("c".into(), 1, 3, CandidateKind::Page);
        f.push("s".into(), 1, u32::MAX, CandidateKind::Spec);
        f.push("b".into(), 1, 9, CandidateKind::Page);

        assert_eq!(f.pop(true).unwrap().url, "s");
        assert_eq!(f.pop(true).unwrap().url, "b");
        assert_eq!(f.pop(true).unwrap().url, "c");
        assert_eq!(f.pop(true).unwrap().url, "a");
        assert!(f.pop(true).is_none());
    }

    #[test]
    fn test_frontier_drops_specs_once_found() {
        let mut f = Frontier::default();
        f.push("s".into(), 1, u32::MAX, CandidateKind::Spec);
        f.push("p".into(), 1, 1, CandidateKind::Page);
        assert_eq!(f.pop(false).unwrap().url, "p");
        assert!(f.pop(false).is_none());
    }

    #[test]
    fn test_truncate_counts_chars() {
        let cut = truncate_chars("héllo wörld", 2);
        assert_eq!(cut, format!("hé{}", TRUNCATION_NOTICE));
        assert_eq!(truncate_chars("wörld", 5), "wörld");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[tokio::test]
    async fn test_seed_failure_is_fatal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/docs");
                then.status(404);
            })
            .await;

        let err = crawler().crawl(&server.url("/docs"), 5, 2).await.unwrap_err();
        assert!(matches!(err, CrawlError::SeedUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_invalid_seed() {
        let err = crawler().crawl("not a url", 5, 2).await.unwrap_err();
        assert!(matches!(err, CrawlError::InvalidSeed(_)));
    }

    #[tokio::test]
    async fn test_follows_relevant_links_within_budget() {
        let server = MockServer::start_async().await;
        let seed = server
            .mock_async(|when, then| {
                when.method(GET).path("/docs");
                then.status(200).body(
                    r#"<html><head><title>Docs</title></head><body>
                    <p>Welcome</p>
                    <a href="/docs/auth">Sign in</a>
                    <a href="/docs/api-reference">API Reference</a>
                    <a href="/blog">Blog</a>
                    <a href="/docs#top">Top</a>
                    <a href="https://elsewhere.example.org/api">External API</a>
                    </body></html>"#,
                );
            })
            .await;
        let reference = server
            .mock_async(|when, then| {
                when.method(GET).path("/docs/api-reference");
                then.status(200)
                    .body("<body><p>GET /posts lists posts</p><a href='/docs'>API docs home</a></body>");
            })
            .await;
        let auth = server
            .mock_async(|when, then| {
                when.method(GET).path("/docs/auth");
                then.status(500);
            })
            .await;
        let blog = server
            .mock_async(|when, then| {
                when.method(GET).path("/blog");
                then.status(200).body("<p>news</p>");
            })
            .await;

        let ctx = crawler().crawl(&server.url("/docs"), 3, 2).await.unwrap();

        seed.assert_hits_async(1).await;
        reference.assert_hits_async(1).await;
        auth.assert_hits_async(1).await;
        blog.assert_hits_async(0).await;
        assert_eq!(ctx.visited().len(), 3);
        // api-reference scores higher than auth and is fetched first.
        assert_eq!(ctx.visited()[1], server.url("/docs/api-reference"));
        assert_eq!(ctx.pages().len(), 2);
        assert_eq!(ctx.title(), Some("Docs"));
        assert!(ctx.documentation().contains("GET /posts lists posts"));
        assert!(ctx.raw_spec().is_none());
    }

    #[tokio::test]
    async fn test_zero_budget_fetches_nothing() {
        let server = MockServer::start_async().await;
        let seed = server
            .mock_async(|when, then| {
                when.method(GET).path("/docs");
                then.status(200).body("<p>x</p>");
            })
            .await;

        let ctx = crawler().crawl(&server.url("/docs"), 0, 2).await.unwrap();
        assert!(ctx.visited().is_empty());
        assert!(ctx.pages().is_empty());
        seed.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_depth_zero_fetches_only_seed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/docs");
                then.status(200)
                    .body("<body><p>x</p><a href='/docs/api'>API</a></body>");
            })
            .await;
        let child = server
            .mock_async(|when, then| {
                when.method(GET).path("/docs/api");
                then.status(200).body("<p>child</p>");
            })
            .await;

        let ctx = crawler().crawl(&server.url("/docs"), 10, 0).await.unwrap();
        assert_eq!(ctx.visited().len(), 1);
        child.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_spec_reference_fetched_first() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/docs");
                then.status(200).body(
                    r#"<body><p>Reference</p>
                    <a href="/docs/api-guide">API guide</a>
                    <redoc spec-url="/openapi.json"></redoc></body>"#,
                );
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/openapi.json");
                then.status(200)
                    .body(r#"{"openapi":"3.0.0","info":{"title":"T","version":"1"},"paths":{}}"#);
            })
            .await;
        let guide = server
            .mock_async(|when, then| {
                when.method(GET).path("/docs/api-guide");
                then.status(200).body("<p>guide</p>");
            })
            .await;

        let ctx = crawler().crawl(&server.url("/docs"), 2, 2).await.unwrap();
        let spec = ctx.raw_spec().unwrap();
        assert_eq!(spec.url, server.url("/openapi.json"));
        assert!(spec.text.contains("\"openapi\""));
        guide.assert_hits_async(0).await;
        // The API description is not part of the prose.
        assert!(!ctx.documentation().contains("openapi"));
    }

    #[tokio::test]
    async fn test_seed_that_is_a_spec() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/swagger.yaml");
                then.status(200).body("swagger: '2.0'\ninfo:\n  title: T\npaths: {}\n");
            })
            .await;

        let ctx = crawler().crawl(&server.url("/swagger.yaml"), 5, 2).await.unwrap();
        assert!(ctx.raw_spec().is_some());
        assert!(ctx.pages().is_empty());
    }
}
