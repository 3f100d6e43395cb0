//! Prompt construction for plan synthesis.

use crate::provider::types::ChatMessage;

use super::{Correction, SynthesisRequest};

const SYSTEM_PROMPT: &str = "You are an API expert that reads documentation and forms valid API requests. Always respond with valid JSON only.";

/// Error bodies quoted back to the model are cut to this many chars.
const MAX_ERROR_CHARS: usize = 2000;

pub fn build_messages(req: &SynthesisRequest<'_>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(&build_user_prompt(req)),
    ]
}

fn build_user_prompt(req: &SynthesisRequest<'_>) -> String {
    let mut p = String::new();
    p.push_str(
        "You are an API expert. Based on the API documentation below, form a valid API request.\n\n",
    );

    if let Some(spec) = req.spec {
        p.push_str(&spec.render());
        p.push_str("\n\n");
    }

    if !req.documentation.trim().is_empty() {
        p.push_str("API Documentation:\n");
        p.push_str(req.documentation);
        p.push_str("\n\n");
    }

    match req
        .endpoint_override
        .or_else(|| req.spec.and_then(|s| s.base_url.as_deref()))
    {
        Some(base) => p.push_str(&format!("Base API URL: {}\n\n", base)),
        None => p.push_str("Extract the base API URL from the documentation.\n\n"),
    }

    p.push_str(&format!("User Request: {}\n\n", req.instruction));

    if let Some(correction) = req.correction {
        p.push_str(&correction_section(req, correction));
    }

    p.push_str(
        r#"Respond with ONLY a JSON object (no other text) of this shape:
{
    "method": "GET/POST/PUT/DELETE/PATCH",
    "url": "complete URL for the API call",
    "headers": {"Header-Name": "value"},
    "query": {"param": "value"} or null,
    "body": {"key": "value"} or null,
    "explanation": "brief explanation of what this API call does"
}

Important:
- Provide the complete, absolute URL
- Include all required headers (like Content-Type)
- Where authentication goes, write the placeholder YOUR_API_KEY; it is filled in later
- Read the documentation carefully to get parameter names exactly right
"#,
    );
    p
}

fn correction_section(req: &SynthesisRequest<'_>, c: &Correction) -> String {
    let prior = c.plan.redacted(req.redactor);
    let prior_json = serde_json::to_string_pretty(&prior).unwrap_or_default();
    let error = req.redactor.scrub(&c.error_body);
    let error: String = error.chars().take(MAX_ERROR_CHARS).collect();

    format!(
        "PREVIOUS ATTEMPT FAILED:\n\
         Status Code: {}\n\n\
         Error Response:\n{}\n\n\
         Failed Request:\n{}\n\n\
         Analyze the error and fix the API call. Pay special attention to:\n\
         - Required vs optional parameters\n\
         - Correct parameter names (check the documentation carefully)\n\
         - Proper data types for each parameter\n\
         - Required headers, including authentication\n\n",
        c.status, error, prior_json
    )
}
