//! End-to-end `api_call` handling.
//!
//! directive → crawl → spec extraction → credential resolution →
//! synthesis → execution with correction. Each call runs on the caller's
//! task and awaits every network step in turn; the credential snapshot is
//! the only state shared between calls.

use reqwest::Url;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::corrector::{ExecutionResult, RetryCorrector};
use crate::crawler::{CrawlError, DocCrawler};
use crate::credentials::{CredentialStore, Redactor};
use crate::directive::{Directive, DirectiveError};
use crate::executor::Executor;
use crate::openapi::{self, EndpointSpec};
use crate::provider::LlmProvider;
use crate::report;
use crate::synth::{SynthesisError, SynthesisRequest, Synthesizer};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    #[error(transparent)]
    Crawl(#[from] CrawlError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
}

/// Host labels that say nothing about which service this is.
const GENERIC_HOST_LABELS: &[&str] = &[
    "www", "api", "apis", "docs", "doc", "developer", "developers", "dev", "platform", "reference",
    "localhost",
];

/// Where the credential for a call came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// `key:` in the directive.
    Explicit,
    /// Resolved from the store under this entry name.
    Store { name: String, hint: String },
    None,
}

/// Everything a caller needs after a call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub result: ExecutionResult,
    pub credential_source: CredentialSource,
    pub pages_read: usize,
    pub spec_found: bool,
    /// Scrubs every secret this call could have touched.
    pub redactor: Redactor,
}

impl CallOutcome {
    pub fn render(&self) -> String {
        report::render(&self.result, &self.redactor)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CrawlLimits {
    pub max_pages: usize,
    pub max_depth: u32,
}

pub struct ApiCaller {
    crawler: DocCrawler,
    synthesizer: Synthesizer,
    executor: Executor,
    credentials: Arc<CredentialStore>,
    limits: CrawlLimits,
    max_retries: u32,
}

impl ApiCaller {
    pub fn new(
        crawler: DocCrawler,
        synthesizer: Synthesizer,
        executor: Executor,
        credentials: Arc<CredentialStore>,
        limits: CrawlLimits,
        max_retries: u32,
    ) -> Self {
        Self {
            crawler,
            synthesizer,
            executor,
            credentials,
            limits,
            max_retries,
        }
    }

    /// Wire every stage from config.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn LlmProvider>,
        model: &str,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        let synthesizer = Synthesizer::new(provider)
            .with_model(model)
            .with_sampling(config.agents.defaults.max_tokens, config.agents.defaults.temperature);
        Self::new(
            DocCrawler::from_config(&config.crawler),
            synthesizer,
            Executor::from_config(&config.executor),
            credentials,
            CrawlLimits {
                max_pages: config.crawler.max_pages,
                max_depth: config.crawler.max_depth,
            },
            config.retry.effective_max_retries(),
        )
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Parse and run a raw `api_call:` message.
    pub async fn handle(&self, message: &str) -> Result<CallOutcome, PipelineError> {
        let directive = Directive::parse(message)?;
        self.call(&directive).await
    }

    pub async fn call(&self, directive: &Directive) -> Result<CallOutcome, PipelineError> {
        info!(docs = %directive.docs_url, endpoint = ?directive.endpoint, "Handling api_call");

        let ctx = self
            .crawler
            .crawl(&directive.docs_url, self.limits.max_pages, self.limits.max_depth)
            .await?;

        let spec: Option<EndpointSpec> = ctx.raw_spec().and_then(|raw| {
            let parsed = openapi::extract_from(&raw.text, Some(&raw.url));
            if parsed.is_none() {
                warn!(url = %raw.url, "API description could not be parsed, using prose only");
            }
            parsed
        });

        // One snapshot for the whole call, so a reload mid-call can't mix stores.
        let snapshot = self.credentials.snapshot();
        let mut redactor = snapshot.redactor();

        let (credential, credential_source) = match &directive.credential {
            Some(secret) => (Some(secret.clone()), CredentialSource::Explicit),
            None => {
                let hints = credential_hints(
                    spec.as_ref().and_then(|s| s.title.as_deref()).or(ctx.title()),
                    &directive.docs_url,
                    directive.endpoint.as_deref(),
                );
                let found = hints.iter().find_map(|hint| {
                    snapshot.lookup(hint).map(|entry| (entry.value.clone(), entry.name.clone(), hint.clone()))
                });
                match found {
                    Some((secret, name, hint)) => {
                        info!(%name, %hint, value = %secret, "Using stored credential");
                        (Some(secret), CredentialSource::Store { name, hint })
                    }
                    None => {
                        info!(?hints, "No stored credential matched, calling without one");
                        (None, CredentialSource::None)
                    }
                }
            }
        };
        if let Some(secret) = &credential {
            redactor.add(secret);
        }

        let documentation = ctx.documentation();
        let req = SynthesisRequest {
            documentation: &documentation,
            spec: spec.as_ref(),
            instruction: &directive.instruction,
            endpoint_override: directive.endpoint.as_deref(),
            credential: credential.as_ref(),
            correction: None,
            redactor: &redactor,
        };

        let corrector = RetryCorrector::new(&self.synthesizer, &self.executor, self.max_retries);
        let result = corrector.run(req).await?;

        info!(
            status = result.status_code.unwrap_or(0),
            attempts = result.attempts,
            corrected = result.corrected,
            "api_call finished"
        );

        Ok(CallOutcome {
            result,
            credential_source,
            pages_read: ctx.pages().len(),
            spec_found: spec.is_some(),
            redactor,
        })
    }
}

/// Names to try against the credential store, most specific first:
/// the API title, then the service name from the docs host, then from the
/// endpoint host.
pub fn credential_hints(title: Option<&str>, docs_url: &str, endpoint: Option<&str>) -> Vec<String> {
    let mut hints: Vec<String> = Vec::new();
    let mut push = |h: String| {
        if !h.trim().is_empty() && !hints.iter().any(|e| e.eq_ignore_ascii_case(&h)) {
            hints.push(h);
        }
    };

    if let Some(title) = title {
        push(title.trim().to_string());
    }
    for url in std::iter::once(docs_url).chain(endpoint) {
        if let Some(label) = service_label(url) {
            push(label);
        }
    }
    hints
}

/// `https://api.airtable.com/v0` → `airtable`.
fn service_label(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if host.parse::<IpAddr>().is_ok() || host.starts_with('[') {
        return None;
    }
    let labels: Vec<&str> = host.split('.').collect();
    // Drop the TLD, then take the right-most label that names something.
    let end = labels.len().saturating_sub(1).max(1);
    labels[..end]
        .iter()
        .rev()
        .find(|l| !GENERIC_HOST_LABELS.contains(&l.to_ascii_lowercase().as_str()))
        .map(|l| l.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_label() {
        assert_eq!(service_label("https://api.airtable.com/v0").as_deref(), Some("airtable"));
        assert_eq!(service_label("https://docs.stripe.com/api").as_deref(), Some("stripe"));
        assert_eq!(service_label("https://jsonplaceholder.typicode.com").as_deref(), Some("typicode"));
        assert_eq!(service_label("http://127.0.0.1:8080/docs"), None);
        assert_eq!(service_label("http://localhost:3000/docs"), None);
    }

    #[test]
    fn test_credential_hints_order_and_dedup() {
        let hints = credential_hints(
            Some("Airtable Web API"),
            "https://airtable.com/developers/web/api",
            Some("https://api.airtable.com/v0"),
        );
        assert_eq!(hints, vec!["Airtable Web API", "airtable"]);
    }
}
