//! User-facing rendering of an [`ExecutionResult`].
//!
//! Everything that leaves here goes through a [`Redactor`]; the result
//! itself still carries raw credential values.

use std::fmt::Write;

use crate::corrector::ExecutionResult;
use crate::credentials::Redactor;
use crate::synth::auth::unresolved_placeholders;

const RULE_WIDTH: usize = 60;

pub fn render(result: &ExecutionResult, redactor: &Redactor) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let plan = result.final_plan.redacted(redactor);
    let mut out = format!("API Call Result\n{rule}\n\n");

    let retries = result.retries();
    if retries > 0 {
        let noun = if retries == 1 { "retry" } else { "retries" };
        if result.is_success() {
            let _ = writeln!(out, "✓ **Success after {retries} {noun}!**");
            out.push_str("The error was analyzed and the API call corrected.\n\n");
        } else {
            let _ = writeln!(out, "⚠️ Failed after {retries} {noun}.\n");
        }
    }

    out.push_str("**Request Made:**\n");
    let _ = writeln!(out, "  Method: {}", plan.method);
    let _ = writeln!(out, "  URL: {}", plan.full_url());
    if let Some(purpose) = plan.explanation.as_deref().filter(|e| !e.is_empty()) {
        let _ = writeln!(out, "  Purpose: {purpose}");
    }
    out.push('\n');

    let status = result
        .status_code
        .map(|s| s.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let body = redactor.scrub(&result.body_preview);

    if result.is_success() {
        let _ = writeln!(out, "**Status:** ✓ Success ({status})\n");
        out.push_str("**Response:**\n");
        push_body(&mut out, &body, result.body_is_json, result.truncated);
    } else {
        let _ = writeln!(
            out,
            "**Status:** ✗ Failed ({status}, {})\n",
            result.classification.label()
        );
        let error = result
            .error
            .as_deref()
            .map(|e| redactor.scrub(e))
            .unwrap_or_else(|| format!("HTTP {status}"));
        let _ = writeln!(out, "**Error:**\n{error}");
        if !body.trim().is_empty() {
            out.push_str("\n**Response:**\n");
            push_body(&mut out, &body, result.body_is_json, result.truncated);
        }
    }

    let _ = writeln!(out, "\n{rule}");

    let missing = unresolved_placeholders(&result.final_plan);
    if !missing.is_empty() {
        let _ = writeln!(
            out,
            "\n⚠️  Note: this API requires authentication and no credential was found. \
             A placeholder was sent in: {}. Pass one with `key:` or add it to the credential store.",
            missing.join(", ")
        );
    }
    out
}

fn push_body(out: &mut String, body: &str, is_json: bool, truncated: bool) {
    if body.is_empty() {
        out.push_str("(empty body)\n");
        return;
    }
    if is_json {
        let _ = writeln!(out, "```json\n{body}\n```");
    } else {
        let _ = writeln!(out, "{body}");
    }
    if truncated {
        out.push_str("\n[Response truncated]\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Secret;
    use crate::executor::Classification;
    use crate::synth::CallPlan;

    fn result(status: u16, attempts: u32, plan: CallPlan) -> ExecutionResult {
        ExecutionResult {
            status_code: Some(status),
            body_preview: "{\n  \"id\": 1\n}".into(),
            body_is_json: true,
            truncated: false,
            classification: Classification::from_status(status),
            attempts,
            corrected: attempts > 1,
            full_url: plan.full_url(),
            final_plan: plan,
            error: None,
        }
    }

    #[test]
    fn test_success_after_retry_hides_secret() {
        let secret = Secret::new("sk-ab12cd34ef");
        let redactor = Redactor::new().with(&secret);
        let mut plan = CallPlan::new("GET", "https://api.example.com/posts/1");
        plan.set_header("Authorization", "Bearer sk-ab12cd34ef".into());
        plan.query.insert("api_key".into(), "sk-ab12cd34ef".into());
        plan.explanation = Some("Fetch post 1".into());

        let text = render(&result(200, 2, plan), &redactor);
        assert!(text.contains("✓ **Success after 1 retry!**"));
        assert!(text.contains("Method: GET"));
        assert!(text.contains("Purpose: Fetch post 1"));
        assert!(text.contains("**Status:** ✓ Success (200)"));
        assert!(text.contains("```json"));
        assert!(!text.contains("sk-ab12cd34ef"));
    }

    #[test]
    fn test_failure_with_placeholder_note() {
        let mut plan = CallPlan::new("GET", "https://api.example.com/me");
        plan.set_header("Authorization", "Bearer YOUR_API_KEY".into());
        let mut r = result(401, 1, plan);
        r.body_preview = "unauthorized".into();
        r.body_is_json = false;

        let text = render(&r, &Redactor::new());
        assert!(text.contains("✗ Failed (401, client error)"));
        assert!(text.contains("unauthorized"));
        assert!(text.contains("Note: this API requires authentication"));
        assert!(!text.contains("retry"));
    }

    #[test]
    fn test_network_error() {
        let mut r = result(0, 1, CallPlan::new("GET", "http://127.0.0.1:9/"));
        r.status_code = None;
        r.classification = Classification::NetworkError;
        r.body_preview.clear();
        r.error = Some("request timed out".into());

        let text = render(&r, &Redactor::new());
        assert!(text.contains("✗ Failed (N/A, network error)"));
        assert!(text.contains("request timed out"));
    }
}
