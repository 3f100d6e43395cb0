//! Secret masking.
//!
//! Credential values only ever leave this crate in one of two forms: raw,
//! inside an outgoing HTTP request, or masked. `Secret` masks itself in
//! `Debug`/`Display`, and `Redactor` scrubs known secret values out of
//! arbitrary text (log lines, error bodies, rendered reports).

use std::fmt;

/// Fixed marker that replaces the hidden middle of a secret.
pub const REDACTION_MARKER: &str = "***";

/// Characters shown at each end of a long secret.
const VISIBLE_CHARS: usize = 4;

/// Secrets shorter than this are fully replaced by the marker.
const MIN_PARTIAL_LEN: usize = 12;

/// Header names whose values are always masked when rendered.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "x-api-key",
    "api-key",
    "apikey",
    "x-auth-token",
    "x-access-token",
    "cookie",
];

/// Mask a secret for display, e.g. `sk-ab12cd34ef` → `sk-a***34ef`.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len < MIN_PARTIAL_LEN {
        return REDACTION_MARKER.to_string();
    }
    let start: String = secret.chars().take(VISIBLE_CHARS).collect();
    let end: String = secret.chars().skip(len - VISIBLE_CHARS).collect();
    format!("{}{}{}", start, REDACTION_MARKER, end)
}

/// Returns `true` for header names that carry credentials.
pub fn is_sensitive_header(name: &str) -> bool {
    let lower = name.trim().to_ascii_lowercase();
    SENSITIVE_HEADERS.contains(&lower.as_str())
        || lower.contains("token")
        || lower.contains("secret")
}

/// A credential value that refuses to print itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value. Only for building the outgoing request.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn masked(&self) -> String {
        mask_secret(&self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", self.masked())
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Scrubs a fixed set of secret values out of text.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a secret to scrub. Empty values are ignored.
    pub fn add(&mut self, secret: &Secret) {
        let value = secret.expose();
        if value.is_empty() || self.secrets.iter().any(|s| s == value) {
            return;
        }
        self.secrets.push(value.to_string());
        // Longest first so a secret containing another is replaced whole.
        self.secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));
    }

    pub fn with(mut self, secret: &Secret) -> Self {
        self.add(secret);
        self
    }

    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), &mask_secret(secret));
            }
        }
        out
    }

    /// Render a header value for display.
    pub fn header_value(&self, name: &str, value: &str) -> String {
        if is_sensitive_header(name) {
            mask_header_value(value)
        } else {
            self.scrub(value)
        }
    }
}

/// Keep the auth scheme word (`Bearer`, `Basic`) readable, mask the rest.
fn mask_header_value(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer")
            || scheme.eq_ignore_ascii_case("basic") =>
        {
            format!("{} {}", scheme, mask_secret(rest.trim()))
        }
        _ => mask_secret(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_long_secret() {
        assert_eq!(mask_secret("sk-ab12cd34ef"), "sk-a***34ef");
        assert_eq!(mask_secret("pat_verylongtoken123456"), "pat_***3456");
    }

    #[test]
    fn test_mask_short_secret_fully() {
        assert_eq!(mask_secret("pat123"), "***");
        assert_eq!(mask_secret(""), "***");
    }

    #[test]
    fn test_secret_never_formats_raw() {
        let secret = Secret::new("sk-ab12cd34ef");
        assert!(!format!("{}", secret).contains("sk-ab12cd34ef"));
        assert!(!format!("{:?}", secret).contains("sk-ab12cd34ef"));
        assert_eq!(secret.expose(), "sk-ab12cd34ef");
    }

    #[test]
    fn test_redactor_scrubs_all_occurrences() {
        let redactor = Redactor::new().with(&Secret::new("sk-ab12cd34ef"));
        let text = "Authorization: Bearer sk-ab12cd34ef, retry with sk-ab12cd34ef";
        let scrubbed = redactor.scrub(text);
        assert!(!scrubbed.contains("sk-ab12cd34ef"));
        assert_eq!(scrubbed.matches("sk-a***34ef").count(), 2);
    }

    #[test]
    fn test_header_value_masking() {
        let redactor = Redactor::new();
        assert_eq!(
            redactor.header_value("Authorization", "Bearer sk-ab12cd34ef"),
            "Bearer sk-a***34ef"
        );
        assert_eq!(redactor.header_value("X-API-Key", "short"), "***");
        assert_eq!(redactor.header_value("Accept", "application/json"), "application/json");
    }
}
