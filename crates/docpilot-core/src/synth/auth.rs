//! Applying a resolved credential to a synthesized plan.
//!
//! The model never sees the credential. It is told to write a placeholder
//! where auth goes; this module swaps the placeholder for the real value,
//! or adds auth the way the API description (or, failing that, the prose
//! documentation) says to.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use reqwest::Url;
use tracing::debug;

use super::plan::{is_sensitive_param, CallPlan};
use crate::credentials::mask::{is_sensitive_header, REDACTION_MARKER};
use crate::credentials::Secret;
use crate::openapi::{AuthScheme, EndpointSpec};

/// Markers models use in place of a real key.
const PLACEHOLDER_HINTS: &[&str] = &[
    "your_api_key",
    "your-api-key",
    "yourapikey",
    "your_token",
    "your_access_token",
    "your_key",
    "your_secret",
    "api_key_here",
    "token_here",
    "placeholder",
    "insert_",
    "replace_me",
];

/// How the credential ended up in the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    /// Placeholder values were overwritten in place.
    Placeholder,
    /// Added according to a declared security scheme.
    Scheme(AuthScheme),
    /// Added from documentation wording.
    Heuristic(AuthScheme),
    /// The plan already carried credentials of its own.
    Existing,
    /// The matched operation is declared public.
    NotRequired,
}

/// Returns `true` for values that stand in for a credential.
pub fn is_placeholder(value: &str) -> bool {
    let v = strip_scheme(value.trim()).1.trim();
    if v.is_empty() {
        return false;
    }
    let lower = v.to_ascii_lowercase();
    names_credential(&lower)
        || (lower.starts_with('<') && lower.ends_with('>'))
        || (lower.starts_with('{') && lower.ends_with('}'))
        || (lower.starts_with('[') && lower.ends_with(']'))
        || (lower.len() >= 3 && lower.chars().all(|c| c == 'x'))
}

/// Placeholder wording that can only mean a credential. `lower` must be
/// lowercase.
fn names_credential(lower: &str) -> bool {
    lower.contains(REDACTION_MARKER)
        || PLACEHOLDER_HINTS.iter().any(|h| lower.contains(h))
        || (lower.starts_with("your") && ["key", "token", "secret"].iter().any(|w| lower.contains(w)))
}

/// Should the credential go into this slot? Slots named like auth take any
/// placeholder shape; other slots only take credential wording, so
/// `fields=<fields>` or `X-Request-Id: {uuid}` stay untouched.
fn is_credential_slot(name_is_sensitive: bool, value: &str) -> bool {
    if name_is_sensitive {
        return is_placeholder(value);
    }
    let v = strip_scheme(value.trim()).1.trim().to_ascii_lowercase();
    !v.is_empty() && names_credential(&v)
}

/// Split a leading `Bearer `/`Basic ` off a header value.
fn strip_scheme(value: &str) -> (Option<&str>, &str) {
    match value.split_once(' ') {
        Some((scheme, rest))
            if scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("basic") =>
        {
            (Some(scheme), rest)
        }
        _ => (None, value),
    }
}

/// `user:pass` credentials are encoded; anything else is assumed pre-encoded.
fn basic_value(secret: &str) -> String {
    if secret.contains(':') {
        B64.encode(secret)
    } else {
        secret.to_string()
    }
}

fn replace_placeholder(value: &str, secret: &str) -> String {
    match strip_scheme(value.trim()) {
        (Some(scheme), _) if scheme.eq_ignore_ascii_case("basic") => {
            format!("{} {}", scheme, basic_value(secret))
        }
        (Some(scheme), _) => format!("{} {}", scheme, secret),
        (None, _) => secret.to_string(),
    }
}

fn apply_scheme(plan: &mut CallPlan, scheme: &AuthScheme, secret: &str) {
    match scheme {
        AuthScheme::ApiKeyHeader { name } => plan.set_header(name, secret.to_string()),
        AuthScheme::ApiKeyQuery { name } => {
            plan.query.insert(name.clone(), secret.to_string());
        }
        AuthScheme::Bearer => plan.set_header("Authorization", format!("Bearer {}", secret)),
        AuthScheme::Basic => {
            plan.set_header("Authorization", format!("Basic {}", basic_value(secret)))
        }
    }
}

/// Pick a scheme from documentation wording.
fn scheme_from_docs(documentation: &str) -> AuthScheme {
    let lower = documentation.to_ascii_lowercase();
    if lower.contains("bearer") {
        AuthScheme::Bearer
    } else if lower.contains("x-api-key") {
        AuthScheme::ApiKeyHeader {
            name: "X-API-Key".into(),
        }
    } else {
        AuthScheme::Bearer
    }
}

/// Put `secret` into `plan`.
pub fn inject_credential(
    plan: &mut CallPlan,
    secret: &Secret,
    spec: Option<&EndpointSpec>,
    documentation: &str,
) -> Injection {
    let raw = secret.expose();

    let mut replaced = false;
    for (name, value) in plan.headers.iter_mut() {
        if is_credential_slot(is_sensitive_header(name), value) {
            *value = replace_placeholder(value, raw);
            replaced = true;
        }
    }
    for (name, value) in plan.query.iter_mut() {
        if is_credential_slot(is_sensitive_param(name), value) {
            *value = raw.to_string();
            replaced = true;
        }
    }
    if replaced {
        debug!("Replaced credential placeholders");
        return Injection::Placeholder;
    }

    let already_authenticated = plan
        .headers
        .iter()
        .any(|(k, v)| is_sensitive_header(k) && !v.trim().is_empty());
    if already_authenticated {
        return Injection::Existing;
    }

    if let Some(spec) = spec.filter(|s| !s.schemes.is_empty()) {
        let path = Url::parse(&plan.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| plan.url.clone());
        return match spec.auth_for(&plan.method, &path) {
            Some(scheme) => {
                apply_scheme(plan, scheme, raw);
                debug!(%scheme, "Applied declared auth scheme");
                Injection::Scheme(scheme.clone())
            }
            None => Injection::NotRequired,
        };
    }

    let scheme = scheme_from_docs(documentation);
    apply_scheme(plan, &scheme, raw);
    debug!(%scheme, "Applied auth scheme from documentation");
    Injection::Heuristic(scheme)
}

/// Placeholders the credential could not fill, for the report.
pub fn unresolved_placeholders(plan: &CallPlan) -> Vec<String> {
    let headers = plan
        .headers
        .iter()
        .filter(|(k, v)| is_credential_slot(is_sensitive_header(k), v));
    let query = plan
        .query
        .iter()
        .filter(|(k, v)| is_credential_slot(is_sensitive_param(k), v));
    headers
        .chain(query)
        .filter(|(_, v)| !v.contains(REDACTION_MARKER))
        .map(|(k, _)| k.clone())
        .collect()
}
