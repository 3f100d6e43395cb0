//! Issues the HTTP call a [`CallPlan`] describes and classifies the outcome.

use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::synth::CallPlan;

/// How an attempt ended, from the corrector's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    /// 2xx
    Success,
    /// 4xx: the plan was wrong and may be corrected.
    ClientError,
    /// 5xx
    ServerError,
    /// Any other status (1xx, unfollowed 3xx).
    Unexpected,
    /// Timeout, DNS, refused connection, or an unsendable request.
    NetworkError,
}

impl Classification {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Unexpected,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Worth another synthesis pass.
    pub fn is_correctable(self) -> bool {
        self == Self::ClientError
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ClientError => "client error",
            Self::ServerError => "server error",
            Self::Unexpected => "unexpected status",
            Self::NetworkError => "network error",
        }
    }
}

/// Outcome of one HTTP attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// `None` when no response arrived.
    pub status: Option<u16>,
    pub classification: Classification,
    /// Pretty-printed JSON or raw text, cut to the preview length.
    pub body_preview: String,
    pub body_is_json: bool,
    pub truncated: bool,
    pub full_url: String,
    /// Transport failure description, without the request URL.
    pub error: Option<String>,
}

impl Execution {
    fn network_error(full_url: String, error: String) -> Self {
        Self {
            status: None,
            classification: Classification::NetworkError,
            body_preview: String::new(),
            body_is_json: false,
            truncated: false,
            full_url,
            error: Some(error),
        }
    }
}

pub struct Executor {
    client: Client,
    preview_chars: usize,
}

impl Executor {
    pub fn new(client: Client, preview_chars: usize) -> Self {
        Self {
            client,
            preview_chars,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::new(client, config.preview_chars)
    }

    pub async fn execute(&self, plan: &CallPlan) -> Execution {
        let full_url = plan.full_url();
        let method = match Method::from_bytes(plan.method.as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                return Execution::network_error(full_url, format!("invalid method `{}`", plan.method))
            }
        };

        // Query strings may carry credentials; log the path only.
        let target = reqwest::Url::parse(&plan.url)
            .map(|u| format!("{}{}", u.host_str().unwrap_or_default(), u.path()))
            .unwrap_or_default();
        info!(method = %method, %target, "Executing API call");

        let mut request = self.client.request(method, &plan.url);
        for (name, value) in &plan.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !plan.query.is_empty() {
            request = request.query(&plan.query);
        }
        if let Some(body) = &plan.body {
            request = attach_body(request, plan, body);
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let reason = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.without_url().to_string()
                };
                warn!(%reason, "API call failed before a response arrived");
                return Execution::network_error(full_url, reason);
            }
        };

        let status = response.status().as_u16();
        let classification = Classification::from_status(status);
        let text = match response.text().await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e.without_url(), "Could not read response body");
                String::new()
            }
        };

        let (rendered, body_is_json) = match serde_json::from_str::<Value>(&text) {
            Ok(v) if !text.trim().is_empty() => {
                (serde_json::to_string_pretty(&v).unwrap_or(text), true)
            }
            _ => (text, false),
        };
        let (body_preview, truncated) = preview(&rendered, self.preview_chars);

        debug!(status, classification = classification.label(), truncated, "API call returned");
        Execution {
            status: Some(status),
            classification,
            body_preview,
            body_is_json,
            truncated,
            full_url,
            error: None,
        }
    }
}

fn attach_body(
    request: reqwest::RequestBuilder,
    plan: &CallPlan,
    body: &Value,
) -> reqwest::RequestBuilder {
    let form = plan
        .header("content-type")
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("x-www-form-urlencoded"));
    match body {
        Value::String(text) => {
            let request = request.body(text.clone());
            if plan.header("content-type").is_none() {
                request.header("Content-Type", "text/plain; charset=utf-8")
            } else {
                request
            }
        }
        Value::Object(map) if form => {
            let fields: Vec<(String, String)> = map
                .iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k.clone(), s.clone()),
                    other => (k.clone(), other.to_string()),
                })
                .collect();
            request.form(&fields)
        }
        other => request.json(other),
    }
}

/// First `max` chars of `text`; `true` if anything was cut.
pub fn preview(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((idx, _)) => (text[..idx].to_string(), true),
        None => (text.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn executor() -> Executor {
        Executor::new(Client::new(), 1000)
    }

    #[test]
    fn test_classification() {
        assert_eq!(Classification::from_status(204), Classification::Success);
        assert_eq!(Classification::from_status(404), Classification::ClientError);
        assert_eq!(Classification::from_status(503), Classification::ServerError);
        assert_eq!(Classification::from_status(302), Classification::Unexpected);
        assert!(Classification::ClientError.is_correctable());
        assert!(!Classification::ServerError.is_correctable());
        assert!(!Classification::NetworkError.is_correctable());
    }

    #[test]
    fn test_preview_is_char_safe() {
        assert_eq!(preview("héllo", 2), ("hé".to_string(), true));
        assert_eq!(preview("abc", 3), ("abc".to_string(), false));
        assert_eq!(preview("", 0), (String::new(), false));
    }

    #[tokio::test]
    async fn test_get_with_query_and_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/posts")
                    .query_param("limit", "2")
                    .header("Accept", "application/json");
                then.status(200).json_body(json!([{"id": 1}, {"id": 2}]));
            })
            .await;

        let mut plan = CallPlan::new("GET", &server.url("/posts"));
        plan.set_header("Accept", "application/json".into());
        plan.query.insert("limit".into(), "2".into());

        let exec = executor().execute(&plan).await;
        mock.assert_async().await;
        assert_eq!(exec.status, Some(200));
        assert_eq!(exec.classification, Classification::Success);
        assert!(exec.body_is_json);
        assert!(exec.body_preview.contains("\"id\": 2"));
        assert_eq!(exec.full_url, format!("{}?limit=2", server.url("/posts")));
    }

    #[tokio::test]
    async fn test_json_body_and_client_error() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/items")
                    .header("content-type", "application/json")
                    .json_body(json!({"name": "widget"}));
                then.status(422).body("name already taken");
            })
            .await;

        let mut plan = CallPlan::new("POST", &server.url("/items"));
        plan.body = Some(json!({"name": "widget"}));

        let exec = executor().execute(&plan).await;
        mock.assert_async().await;
        assert_eq!(exec.classification, Classification::ClientError);
        assert_eq!(exec.body_preview, "name already taken");
        assert!(!exec.body_is_json);
    }

    #[tokio::test]
    async fn test_text_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT).path("/note").body("hello");
                then.status(500);
            })
            .await;

        let mut plan = CallPlan::new("PUT", &server.url("/note"));
        plan.body = Some(Value::String("hello".into()));

        let exec = executor().execute(&plan).await;
        mock.assert_async().await;
        assert_eq!(exec.classification, Classification::ServerError);
    }

    #[tokio::test]
    async fn test_long_body_truncated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/big");
                then.status(200).body("x".repeat(50));
            })
            .await;

        let exec = Executor::new(Client::new(), 10)
            .execute(&CallPlan::new("GET", &server.url("/big")))
            .await;
        assert_eq!(exec.body_preview.len(), 10);
        assert!(exec.truncated);
    }

    #[tokio::test]
    async fn test_network_error() {
        // Nothing listens on the discard port.
        let exec = executor()
            .execute(&CallPlan::new("GET", "http://127.0.0.1:9/nothing?api_key=sk-ab12cd34ef"))
            .await;
        assert_eq!(exec.status, None);
        assert_eq!(exec.classification, Classification::NetworkError);
        assert!(!exec.error.unwrap().contains("sk-ab12cd34ef"));
    }
}
