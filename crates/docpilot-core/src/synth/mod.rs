//! Request synthesis: documentation + instruction → [`CallPlan`].
//!
//! One model call per synthesis. A failed parse is reported, not retried;
//! the retry loop lives in [`crate::corrector`].

pub mod auth;
pub mod plan;
mod prompt;

use reqwest::Url;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::credentials::{Redactor, Secret};
use crate::openapi::EndpointSpec;
use crate::provider::LlmProvider;

pub use auth::{inject_credential, Injection};
pub use plan::{parse_plan, CallPlan};

pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("language model unavailable: {0}")]
    Provider(String),
    #[error("language model returned an empty answer")]
    EmptyResponse,
    #[error("language model answer is not a JSON object: {snippet}")]
    NotJson { snippet: String },
    #[error("language model answer is missing `{0}`")]
    MissingField(&'static str),
    #[error("language model answer has an invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A rejected attempt fed back into the next synthesis.
#[derive(Debug, Clone)]
pub struct Correction {
    pub plan: CallPlan,
    pub status: u16,
    pub error_body: String,
}

/// Everything one synthesis pass looks at.
#[derive(Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub documentation: &'a str,
    pub spec: Option<&'a EndpointSpec>,
    pub instruction: &'a str,
    pub endpoint_override: Option<&'a str>,
    /// Applied after parsing; never part of the prompt.
    pub credential: Option<&'a Secret>,
    pub correction: Option<&'a Correction>,
    pub redactor: &'a Redactor,
}

pub struct Synthesizer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl Synthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.model = (!model.is_empty()).then_some(model);
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub async fn synthesize(&self, req: &SynthesisRequest<'_>) -> Result<CallPlan, SynthesisError> {
        let messages = prompt::build_messages(req);
        info!(correction = req.correction.is_some(), "Synthesizing call plan");

        let response = self
            .provider
            .chat(&messages, self.model.as_deref(), self.max_tokens, self.temperature)
            .await
            .map_err(|e| SynthesisError::Provider(format!("{:#}", e)))?;

        let content = response
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or(SynthesisError::EmptyResponse)?;
        debug!(chars = content.len(), "Model answered");

        let mut plan = parse_plan(&content)?;
        plan.url = resolve_url(
            &plan.url,
            req.endpoint_override,
            req.spec.and_then(|s| s.base_url.as_deref()),
        )?;

        if let Some(secret) = req.credential {
            let how = inject_credential(&mut plan, secret, req.spec, req.documentation);
            debug!(?how, "Credential applied");
        }

        info!(
            method = %plan.method,
            url = %req.redactor.scrub(&plan.full_url()),
            "Call plan ready"
        );
        Ok(plan)
    }
}

/// Make the plan URL absolute.
///
/// An endpoint override replaces whatever origin the model chose. Relative
/// URLs are joined to the override or else the declared base URL. A base path
/// already present in the URL is not repeated.
pub fn resolve_url(
    url: &str,
    endpoint_override: Option<&str>,
    spec_base: Option<&str>,
) -> Result<String, SynthesisError> {
    let absolute = Url::parse(url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"));

    let (path, query) = match &absolute {
        Some(u) => (u.path().to_string(), u.query().map(str::to_string)),
        None => match url.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (url.to_string(), None),
        },
    };

    if let Some(base) = endpoint_override {
        return join_base(base, &path, query.as_deref());
    }
    if absolute.is_some() {
        return Ok(url.to_string());
    }
    match spec_base {
        Some(base) => join_base(base, &path, query.as_deref()),
        None => Err(SynthesisError::InvalidField {
            field: "url",
            reason: format!("`{}` is relative and no base URL is known", url),
        }),
    }
}

fn join_base(base: &str, path: &str, query: Option<&str>) -> Result<String, SynthesisError> {
    let mut joined = Url::parse(base).map_err(|_| SynthesisError::InvalidField {
        field: "url",
        reason: format!("invalid base URL `{}`", base),
    })?;
    let prefix = joined.path().trim_end_matches('/').to_string();
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let full_path = if prefix.is_empty() || path == prefix || path.starts_with(&format!("{}/", prefix)) {
        path
    } else {
        format!("{}{}", prefix, path)
    };
    joined.set_path(&full_path);
    joined.set_query(query);
    joined.set_fragment(None);
    Ok(joined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::scripted::ScriptedProvider;

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://api.example.com/posts", None, None).unwrap(),
            "https://api.example.com/posts"
        );
        assert_eq!(
            resolve_url("https://docs.example.com/v1/posts?x=1", Some("https://staging.example.com/v1"), None).unwrap(),
            "https://staging.example.com/v1/posts?x=1"
        );
        assert_eq!(
            resolve_url("/posts", Some("http://127.0.0.1:8080"), None).unwrap(),
            "http://127.0.0.1:8080/posts"
        );
        assert_eq!(
            resolve_url("users/1", None, Some("https://api.example.com/v2/")).unwrap(),
            "https://api.example.com/v2/users/1"
        );
        assert!(matches!(
            resolve_url("/posts", None, None),
            Err(SynthesisError::InvalidField { field: "url", .. })
        ));
    }

    fn request<'a>(redactor: &'a Redactor, secret: Option<&'a Secret>) -> SynthesisRequest<'a> {
        SynthesisRequest {
            documentation: "Authenticate with a Bearer token. GET /posts lists posts.",
            spec: None,
            instruction: "list all posts",
            endpoint_override: Some("https://api.example.com"),
            credential: secret,
            correction: None,
            redactor,
        }
    }

    #[tokio::test]
    async fn test_synthesize_injects_credential_outside_prompt() {
        let provider = Arc::new(ScriptedProvider::new([
            r#"```json
{"method":"GET","url":"/posts","headers":{"Authorization":"Bearer YOUR_API_KEY"}}
```"#,
        ]));
        let synth = Synthesizer::new(provider.clone());
        let secret = Secret::new("sk-ab12cd34ef");
        let redactor = Redactor::new().with(&secret);

        let plan = synth.synthesize(&request(&redactor, Some(&secret))).await.unwrap();
        assert_eq!(plan.url, "https://api.example.com/posts");
        assert_eq!(plan.header("Authorization"), Some("Bearer sk-ab12cd34ef"));

        let prompt = &provider.prompts()[0];
        assert_eq!(prompt[0].role, "system");
        assert!(prompt[1].content.contains("User Request: list all posts"));
        assert!(prompt[1].content.contains("Base API URL: https://api.example.com"));
        assert!(!prompt.iter().any(|m| m.content.contains("sk-ab12cd34ef")));
    }

    #[tokio::test]
    async fn test_correction_prompt_is_redacted() {
        let provider = Arc::new(ScriptedProvider::new([r#"{"method":"GET","url":"/posts"}"#]));
        let synth = Synthesizer::new(provider.clone());
        let secret = Secret::new("sk-ab12cd34ef");
        let redactor = Redactor::new().with(&secret);

        let mut prior = CallPlan::new("GET", "https://api.example.com/posts");
        prior.set_header("X-Token", "sk-ab12cd34ef".into());
        let correction = Correction {
            plan: prior,
            status: 401,
            error_body: r#"{"error":"bad token sk-ab12cd34ef"}"#.into(),
        };
        let mut req = request(&redactor, None);
        req.correction = Some(&correction);

        synth.synthesize(&req).await.unwrap();
        let user = &provider.prompts()[0][1].content;
        assert!(user.contains("PREVIOUS ATTEMPT FAILED"));
        assert!(user.contains("Status Code: 401"));
        assert!(user.contains("sk-a***34ef"));
        assert!(!user.contains("sk-ab12cd34ef"));
    }

    #[tokio::test]
    async fn test_synthesis_errors() {
        let redactor = Redactor::new();

        let synth = Synthesizer::new(Arc::new(ScriptedProvider::new(["no json here"])));
        let err = synth.synthesize(&request(&redactor, None)).await.unwrap_err();
        assert!(matches!(err, SynthesisError::NotJson { .. }));

        let synth = Synthesizer::new(Arc::new(ScriptedProvider::new(Vec::<String>::new())));
        let err = synth.synthesize(&request(&redactor, None)).await.unwrap_err();
        assert!(matches!(err, SynthesisError::Provider(_)));

        let synth = Synthesizer::new(Arc::new(ScriptedProvider::new(["   "])));
        let err = synth.synthesize(&request(&redactor, None)).await.unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyResponse));
    }
}
