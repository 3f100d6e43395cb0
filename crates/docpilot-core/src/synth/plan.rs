//! The call plan and the parser that builds one from model output.

use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::SynthesisError;
use crate::credentials::mask::is_sensitive_header;
use crate::credentials::{mask_secret, Redactor};

pub const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// A fully specified HTTP call.
///
/// Header and query values may hold a raw credential once one has been
/// applied; render through [`CallPlan::redacted`] for anything a human or
/// the model will read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallPlan {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl CallPlan {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: None,
            explanation: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a header, replacing any existing one with the same name in any case.
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        self.headers.insert(name.to_string(), value);
    }

    /// URL with the query map appended, as actually requested.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        match Url::parse(&self.url) {
            Ok(mut url) => {
                {
                    let mut pairs = url.query_pairs_mut();
                    for (k, v) in &self.query {
                        pairs.append_pair(k, v);
                    }
                }
                url.to_string()
            }
            Err(_) => {
                let qs: Vec<String> = self.query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                format!("{}?{}", self.url, qs.join("&"))
            }
        }
    }

    /// Copy safe to show: credential-bearing headers and query values are
    /// masked and every known secret is scrubbed.
    pub fn redacted(&self, redactor: &Redactor) -> CallPlan {
        let headers = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), redactor.header_value(k, v)))
            .collect();
        let query = self
            .query
            .iter()
            .map(|(k, v)| {
                let shown = if is_sensitive_param(k) {
                    mask_secret(v)
                } else {
                    redactor.scrub(v)
                };
                (k.clone(), shown)
            })
            .collect();
        let body = self.body.as_ref().map(|b| {
            let text = redactor.scrub(&b.to_string());
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        });
        CallPlan {
            method: self.method.clone(),
            url: redactor.scrub(&self.url),
            headers,
            query,
            body,
            explanation: self.explanation.as_deref().map(|e| redactor.scrub(e)),
        }
    }
}

/// Query parameter names that usually carry credentials.
pub fn is_sensitive_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    is_sensitive_header(&lower)
        || matches!(lower.as_str(), "key" | "api_key" | "apikey" | "access_token" | "auth")
}

/// Parse model output into a plan.
///
/// Tolerates code fences and prose around the JSON object, `params` in
/// place of `query`, and scalar header/query values. Fails naming the field
/// when `method` or `url` cannot be determined.
pub fn parse_plan(output: &str) -> Result<CallPlan, SynthesisError> {
    let obj = &extract_json_object(output).ok_or_else(|| SynthesisError::NotJson {
        snippet: snippet(output),
    })?;

    let method = match obj.get("method") {
        Some(Value::String(m)) if !m.trim().is_empty() => m.trim().to_ascii_uppercase(),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            return Err(SynthesisError::MissingField("method"))
        }
        Some(other) => {
            return Err(SynthesisError::InvalidField {
                field: "method",
                reason: format!("expected a string, got {}", other),
            })
        }
    };
    if !METHODS.contains(&method.as_str()) {
        return Err(SynthesisError::InvalidField {
            field: "method",
            reason: format!("`{}` is not an HTTP method", method),
        });
    }

    let url = match obj.get("url") {
        Some(Value::String(u)) if !u.trim().is_empty() => u.trim().to_string(),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            return Err(SynthesisError::MissingField("url"))
        }
        Some(other) => {
            return Err(SynthesisError::InvalidField {
                field: "url",
                reason: format!("expected a string, got {}", other),
            })
        }
    };

    let headers = string_map(obj.get("headers"), "headers")?;
    let mut query = string_map(obj.get("params"), "params")?;
    // `query` wins over the `params` alias on conflicts.
    query.extend(string_map(obj.get("query"), "query")?);

    let body = match obj.get("body") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::Object(m)) if m.is_empty() => None,
        Some(v) => Some(v.clone()),
    };

    let explanation = obj
        .get("explanation")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(CallPlan {
        method,
        url,
        headers,
        query,
        body,
        explanation,
    })
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

fn string_map(
    value: Option<&Value>,
    field: &'static str,
) -> Result<BTreeMap<String, String>, SynthesisError> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => Ok(stringify_values(map)),
        Some(other) => Err(SynthesisError::InvalidField {
            field,
            reason: format!("expected an object, got {}", other),
        }),
    }
}

fn stringify_values(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(k, v)| {
            let s = match v {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Array(items) => items
                    .iter()
                    .map(|i| match i {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                other => other.to_string(),
            };
            Some((k.clone(), s))
        })
        .collect()
}

/// The JSON object the model answered with.
///
/// Fenced blocks win over bare text. Outside fences every `{` is tried in
/// turn, so braces in surrounding prose (`/users/{id}`) are skipped.
fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    fenced_blocks(text)
        .find_map(as_object)
        .or_else(|| {
            text.match_indices('{')
                .filter_map(|(start, _)| balanced_at(text, start))
                .find_map(as_object)
        })
}

fn as_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str(candidate.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Contents of each ``` fence, language tag dropped.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        let open = rest.find("```")?;
        let after = &rest[open + 3..];
        let body_start = after.find('\n').map_or(after.len(), |i| i + 1);
        let body = &after[body_start..];
        let close = body.find("```")?;
        rest = &body[close + 3..];
        Some(&body[..close])
    })
}

/// The balanced `{...}` starting at byte `start`, string and escape aware.
fn balanced_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
