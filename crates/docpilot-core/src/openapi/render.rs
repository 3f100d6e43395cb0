//! Plain-text rendering of an extracted spec for the model prompt.

use super::{EndpointSpec, Operation};

impl EndpointSpec {
    /// Compact listing of base URL, auth and operations.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        out.push("API SPECIFICATION (OpenAPI/Swagger)".to_string());
        if let Some(title) = &self.title {
            match &self.version {
                Some(v) => out.push(format!("API: {} (version {})", title, v)),
                None => out.push(format!("API: {}", title)),
            }
        }
        if let Some(base) = &self.base_url {
            out.push(format!("Base URL: {}", base));
        }
        if !self.schemes.is_empty() {
            out.push("Authentication:".into());
            for (name, scheme) in &self.schemes {
                out.push(format!("  - {}: {}", name, scheme));
            }
        }

        out.push(String::new());
        out.push("ENDPOINTS:".into());
        for (path, methods) in &self.paths {
            for (method, op) in methods {
                out.push(format!("{} {}", method, path));
                render_operation(op, &mut out);
            }
        }
        out.join("\n")
    }
}

fn render_operation(op: &Operation, out: &mut Vec<String>) {
    if let Some(summary) = &op.summary {
        out.push(format!("  Summary: {}", summary));
    }
    if !op.params.is_empty() {
        out.push("  Parameters:".into());
        for p in &op.params {
            let req = if p.required { "[REQUIRED]" } else { "[optional]" };
            let ty = p.schema_type.as_deref().unwrap_or("unknown");
            let mut line = format!("    - {} ({}) {}: {}", p.name, p.location.as_str(), req, ty);
            if !p.enum_values.is_empty() {
                line.push_str(&format!(" (valid values: {})", p.enum_values.join(", ")));
            }
            out.push(line);
        }
    }
    if let Some(body) = &op.request_body {
        let mut line = format!("  Request Body: {}", body.content_type);
        if !body.properties.is_empty() {
            line.push_str(&format!(" fields: {}", body.properties.join(", ")));
        }
        if !body.required.is_empty() {
            line.push_str(&format!(" (required: {})", body.required.join(", ")));
        }
        out.push(line);
    }
    match &op.auth {
        Some(scheme) => out.push(format!("  Auth: {}", scheme)),
        None => out.push("  Auth: none".into()),
    }
}

#[cfg(test)]
mod tests {
    use crate::openapi::extract;

    #[test]
    fn test_render_lists_operations() {
        let doc = r#"{
          "openapi": "3.0.0",
          "info": {"title": "Posts", "version": "1"},
          "servers": [{"url": "https://api.example.com"}],
          "components": {"securitySchemes": {"bearer": {"type": "http", "scheme": "bearer"}}},
          "security": [{"bearer": []}],
          "paths": {"/posts": {"get": {"summary": "List posts",
             "parameters": [{"name": "sort", "in": "query", "schema": {"type": "string", "enum": ["new", "top"]}}]}}}
        }"#;
        let text = extract(doc).unwrap().render();
        assert!(text.contains("API: Posts (version 1)"));
        assert!(text.contains("Base URL: https://api.example.com"));
        assert!(text.contains("GET /posts"));
        assert!(text.contains("- sort (query) [optional]: string (valid values: new, top)"));
        assert!(text.contains("Auth: HTTP bearer token"));
    }
}
