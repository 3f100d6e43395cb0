//! `api_call:` directive parsing.
//!
//! ```text
//! api_call: docs=<url> [endpoint=<url>] [key:<value>] <instruction text>
//! ```
//!
//! Tokens are recognized by their prefix (case-insensitive). The first
//! occurrence of each prefix wins; later duplicates are dropped from the
//! instruction but otherwise ignored. Whatever is left is the instruction.

use thiserror::Error;

use crate::credentials::Secret;

const TRIGGER: &str = "api_call:";
const DOCS_PREFIX: &str = "docs=";
const ENDPOINT_PREFIX: &str = "endpoint=";
const KEY_PREFIX: &str = "key:";

pub const USAGE: &str = "api_call: docs=https://api.example.com/docs [endpoint=https://api.example.com] [key:YOUR_KEY] Get all users";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("missing documentation URL. Usage: {}", USAGE)]
    MissingDocs,
    #[error("`{0}` is not an http(s) URL")]
    InvalidUrl(String),
    #[error("missing instruction: say what to do with the API (e.g. 'Get all users')")]
    MissingInstruction,
    #[error("`key:` given without a value")]
    EmptyKey,
}

/// A parsed `api_call:` request.
///
/// `Debug` is safe to log: the credential masks itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub docs_url: String,
    pub endpoint: Option<String>,
    pub credential: Option<Secret>,
    pub instruction: String,
}

/// Returns `true` if the message looks like an API-call request.
pub fn is_directive(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains(TRIGGER)
        || lower
            .split_whitespace()
            .any(|t| t.starts_with("docs=http://") || t.starts_with("docs=https://"))
}

fn strip_prefix_ci<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    let head = token.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &token[prefix.len()..])
}

fn validate_url(raw: &str) -> Result<String, DirectiveError> {
    let lower = raw.to_ascii_lowercase();
    if (lower.starts_with("http://") || lower.starts_with("https://")) && reqwest::Url::parse(raw).is_ok() {
        Ok(raw.to_string())
    } else {
        Err(DirectiveError::InvalidUrl(raw.to_string()))
    }
}

impl Directive {
    pub fn parse(message: &str) -> Result<Self, DirectiveError> {
        let mut docs_url = None;
        let mut endpoint = None;
        let mut credential: Option<Secret> = None;
        let mut words = Vec::new();

        let mut tokens = message.split_whitespace();
        while let Some(token) = tokens.next() {
            if token.eq_ignore_ascii_case(TRIGGER) {
                continue;
            }
            if let Some(rest) = strip_prefix_ci(token, TRIGGER) {
                // `api_call:docs=...` glued together
                if rest.is_empty() {
                    continue;
                }
                words.push(rest);
                continue;
            }
            if let Some(url) = strip_prefix_ci(token, DOCS_PREFIX) {
                if docs_url.is_none() {
                    docs_url = Some(validate_url(url)?);
                }
                continue;
            }
            if let Some(url) = strip_prefix_ci(token, ENDPOINT_PREFIX) {
                if endpoint.is_none() {
                    endpoint = Some(validate_url(url)?);
                }
                continue;
            }
            if let Some(value) = strip_prefix_ci(token, KEY_PREFIX) {
                // `key: value` with a space is accepted too.
                let value = if value.is_empty() {
                    tokens.next().ok_or(DirectiveError::EmptyKey)?
                } else {
                    value
                };
                if credential.is_none() {
                    credential = Some(Secret::new(value));
                }
                continue;
            }
            words.push(token);
        }

        // A glued `api_call:docs=...` leaves the docs token in `words`.
        let mut instruction_words = Vec::with_capacity(words.len());
        for word in words {
            if let Some(url) = strip_prefix_ci(word, DOCS_PREFIX) {
                if docs_url.is_none() {
                    docs_url = Some(validate_url(url)?);
                }
            } else {
                instruction_words.push(word);
            }
        }

        let docs_url = docs_url.ok_or(DirectiveError::MissingDocs)?;
        let instruction = instruction_words.join(" ");
        if instruction.is_empty() {
            return Err(DirectiveError::MissingInstruction);
        }

        Ok(Self {
            docs_url,
            endpoint,
            credential,
            instruction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_directive() {
        let d = Directive::parse(
            "api_call: docs=https://api.example.com/docs endpoint=https://api.example.com key:sk-ab12cd34ef Get the list of users",
        )
        .unwrap();
        assert_eq!(d.docs_url, "https://api.example.com/docs");
        assert_eq!(d.endpoint.as_deref(), Some("https://api.example.com"));
        assert_eq!(d.credential.as_ref().unwrap().expose(), "sk-ab12cd34ef");
        assert_eq!(d.instruction, "Get the list of users");
    }

    #[test]
    fn test_tokens_anywhere_and_case_insensitive() {
        let d = Directive::parse("API_CALL: Create a customer DOCS=https://stripe.com/docs/api with email a@b.c").unwrap();
        assert_eq!(d.docs_url, "https://stripe.com/docs/api");
        assert_eq!(d.instruction, "Create a customer with email a@b.c");
        assert!(d.endpoint.is_none());
        assert!(d.credential.is_none());
    }

    #[test]
    fn test_key_with_space() {
        let d = Directive::parse("api_call: docs=https://x.io/docs key: abc123 list things").unwrap();
        assert_eq!(d.credential.unwrap().expose(), "abc123");
        assert_eq!(d.instruction, "list things");
    }

    #[test]
    fn test_first_occurrence_wins() {
        let d = Directive::parse(
            "api_call: docs=https://a.io/docs docs=https://b.io/docs key:first key:second go",
        )
        .unwrap();
        assert_eq!(d.docs_url, "https://a.io/docs");
        assert_eq!(d.credential.unwrap().expose(), "first");
        assert_eq!(d.instruction, "go");
    }

    #[test]
    fn test_glued_trigger() {
        let d = Directive::parse("api_call:docs=https://a.io/docs get posts").unwrap();
        assert_eq!(d.docs_url, "https://a.io/docs");
        assert_eq!(d.instruction, "get posts");
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            Directive::parse("api_call: get all users"),
            Err(DirectiveError::MissingDocs)
        );
        assert_eq!(
            Directive::parse("api_call: docs=https://a.io/docs"),
            Err(DirectiveError::MissingInstruction)
        );
        assert_eq!(
            Directive::parse("api_call: docs=ftp://a.io do it"),
            Err(DirectiveError::InvalidUrl("ftp://a.io".into()))
        );
        assert_eq!(
            Directive::parse("api_call: docs=https://a.io key:"),
            Err(DirectiveError::EmptyKey)
        );
    }

    #[test]
    fn test_debug_masks_credential() {
        let d = Directive::parse("api_call: docs=https://a.io/d key:sk-ab12cd34ef go").unwrap();
        assert!(!format!("{:?}", d).contains("sk-ab12cd34ef"));
    }

    #[test]
    fn test_is_directive() {
        assert!(is_directive("api_call: docs=https://a.io go"));
        assert!(is_directive("please docs=https://a.io/docs get users"));
        assert!(!is_directive("summarize https://a.io"));
    }
}
