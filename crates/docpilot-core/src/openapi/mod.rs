//! OpenAPI 3.x / Swagger 2.0 extraction.
//!
//! Turns a raw JSON or YAML API description into the small amount of
//! structure the synthesizer and credential injection need: a base URL,
//! operations with their parameters and body fields, and which auth scheme
//! each operation expects. Anything malformed yields `None`; the caller
//! falls back to prose documentation.

mod render;

use reqwest::Url;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

const METHODS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options"];

/// `$ref` chains deeper than this are treated as unresolvable.
const MAX_REF_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    ApiKeyHeader { name: String },
    ApiKeyQuery { name: String },
    Bearer,
    Basic,
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthScheme::ApiKeyHeader { name } => write!(f, "API key in header `{}`", name),
            AuthScheme::ApiKeyQuery { name } => write!(f, "API key in query parameter `{}`", name),
            AuthScheme::Bearer => f.write_str("HTTP bearer token (Authorization: Bearer)"),
            AuthScheme::Basic => f.write_str("HTTP basic auth (Authorization: Basic)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParamLocation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Cookie => "cookie",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub location: ParamLocation,
    pub schema_type: Option<String>,
    pub required: bool,
    pub enum_values: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub content_type: String,
    /// Top-level property names of the body schema.
    pub properties: Vec<String>,
    pub required: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub summary: Option<String>,
    pub params: Vec<Param>,
    pub request_body: Option<RequestBody>,
    /// Effective scheme after applying operation and global `security`.
    /// `None` means no requirement applies.
    pub auth: Option<AuthScheme>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EndpointSpec {
    pub title: Option<String>,
    pub version: Option<String>,
    pub base_url: Option<String>,
    /// path → uppercase method → operation
    pub paths: BTreeMap<String, BTreeMap<String, Operation>>,
    /// Declared security schemes by name.
    pub schemes: BTreeMap<String, AuthScheme>,
    /// Scheme that applies when no operation matches.
    pub default_auth: Option<AuthScheme>,
}

impl EndpointSpec {
    pub fn operation_count(&self) -> usize {
        self.paths.values().map(|m| m.len()).sum()
    }

    /// Find the operation serving `method` on `path`.
    ///
    /// `path` may carry a base-path prefix; templates like `/users/{id}`
    /// match any single segment.
    pub fn operation_for(&self, method: &str, path: &str) -> Option<&Operation> {
        let method = method.to_ascii_uppercase();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.paths
            .iter()
            .filter(|(template, _)| template_matches(template, &segments))
            // Longest template wins so `/users/{id}/posts` beats `/posts`.
            .max_by_key(|(template, _)| template.matches('/').count())
            .and_then(|(_, methods)| methods.get(&method))
    }

    /// Auth scheme for a concrete request.
    pub fn auth_for(&self, method: &str, path: &str) -> Option<&AuthScheme> {
        match self.operation_for(method, path) {
            Some(op) => op.auth.as_ref(),
            None => self.default_auth.as_ref(),
        }
    }
}

/// Suffix match: the template's segments line up with the tail of `path`.
fn template_matches(template: &str, path: &[&str]) -> bool {
    let tmpl: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    if tmpl.len() > path.len() {
        return false;
    }
    let tail = &path[path.len() - tmpl.len()..];
    tmpl.iter().zip(tail).all(|(t, p)| {
        (t.starts_with('{') && t.ends_with('}')) || t.eq_ignore_ascii_case(p)
    })
}

/// Cheap check used by the crawler: does this document look like an
/// OpenAPI or Swagger description?
pub fn looks_like_spec(text: &str) -> bool {
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with('<') {
        return false;
    }
    if trimmed.starts_with('{') {
        return serde_json::from_str::<Value>(trimmed)
            .ok()
            .as_ref()
            .and_then(Value::as_object)
            .is_some_and(has_spec_key);
    }
    let marker = trimmed
        .lines()
        .any(|l| l.starts_with("openapi:") || l.starts_with("swagger:"));
    marker && parse_document(trimmed).as_ref().and_then(Value::as_object).is_some_and(has_spec_key)
}

fn has_spec_key(obj: &Map<String, Value>) -> bool {
    obj.contains_key("openapi") || obj.contains_key("swagger")
}

/// Parse JSON, falling back to YAML.
fn parse_document(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Some(v);
    }
    serde_yaml::from_str::<serde_yaml::Value>(text)
        .ok()
        .map(yaml_to_json)
}

/// YAML allows non-string keys (`200:` under `responses`); stringify them.
fn yaml_to_json(value: serde_yaml::Value) -> Value {
    use serde_yaml::Value as Y;
    match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64().map(Value::from).unwrap_or(Value::Null)
            }
        }
        Y::String(s) => Value::String(s),
        Y::Sequence(seq) => Value::Array(seq.into_iter().map(yaml_to_json).collect()),
        Y::Mapping(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let key = match k {
                    Y::String(s) => s,
                    Y::Number(n) => n.to_string(),
                    Y::Bool(b) => b.to_string(),
                    _ => continue,
                };
                out.insert(key, yaml_to_json(v));
            }
            Value::Object(out)
        }
        Y::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

/// Extract without knowing where the document came from.
pub fn extract(raw: &str) -> Option<EndpointSpec> {
    extract_from(raw, None)
}

/// Extract, resolving relative server URLs against `source_url`.
pub fn extract_from(raw: &str, source_url: Option<&str>) -> Option<EndpointSpec> {
    let root = parse_document(raw.trim_start_matches('\u{feff}'))?;
    let obj = root.as_object()?;
    let is_v3 = obj.get("openapi").and_then(Value::as_str).is_some();
    let is_v2 = obj.get("swagger").is_some();
    if !is_v3 && !is_v2 {
        debug!("Document has no openapi/swagger key");
        return None;
    }

    let source = source_url.and_then(|u| Url::parse(u).ok());
    let info = obj.get("info");

    let schemes_src = if is_v3 {
        root.pointer("/components/securitySchemes")
    } else {
        obj.get("securityDefinitions")
    };
    let schemes: BTreeMap<String, AuthScheme> = schemes_src
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(name, def)| {
                    let def = resolve_ref(&root, def)?;
                    parse_scheme(def).map(|s| (name.clone(), s))
                })
                .collect()
        })
        .unwrap_or_default();

    let global_security = obj.get("security");
    // No top-level requirement means operations are public unless they
    // declare their own.
    let default_auth = global_security.and_then(|req| pick_scheme(req, &schemes));

    let mut spec = EndpointSpec {
        title: info.and_then(|i| i.get("title")).and_then(Value::as_str).map(str::to_string),
        version: info.and_then(|i| i.get("version")).and_then(scalar_string),
        base_url: if is_v3 {
            v3_base_url(obj, source.as_ref())
        } else {
            v2_base_url(obj, source.as_ref())
        },
        paths: BTreeMap::new(),
        schemes: schemes.clone(),
        default_auth: default_auth.clone(),
    };

    let Some(paths) = obj.get("paths").and_then(Value::as_object) else {
        return Some(spec);
    };

    for (path, item) in paths {
        let Some(item) = resolve_ref(&root, item).and_then(Value::as_object) else {
            continue;
        };
        let shared_params = item.get("parameters");
        let mut methods = BTreeMap::new();

        for method in METHODS {
            let Some(op) = item.get(*method).and_then(Value::as_object) else {
                continue;
            };

            let mut params = Vec::new();
            let mut form_fields = Vec::new();
            let mut form_required = Vec::new();
            let mut v2_body: Option<RequestBody> = None;

            // Operation-level parameters override path-level ones by name+location.
            let all = shared_params
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .chain(op.get("parameters").and_then(Value::as_array).into_iter().flatten());
            for raw_param in all {
                let Some(p) = resolve_ref(&root, raw_param) else {
                    continue;
                };
                let location = p.get("in").and_then(Value::as_str).unwrap_or("");
                let name = p.get("name").and_then(Value::as_str).unwrap_or("").to_string();
                match location {
                    "body" => {
                        let schema = p.get("schema").and_then(|s| resolve_ref(&root, s));
                        let (properties, required) = schema_fields(&root, schema);
                        v2_body = Some(RequestBody {
                            content_type: "application/json".into(),
                            properties,
                            required,
                        });
                    }
                    "formData" => {
                        if p.get("required").and_then(Value::as_bool).unwrap_or(false) {
                            form_required.push(name.clone());
                        }
                        form_fields.push(name);
                    }
                    other => {
                        let Some(location) = ParamLocation::parse(other) else {
                            continue;
                        };
                        if name.is_empty() {
                            continue;
                        }
                        let param = parse_param(&root, p, name, location);
                        params.retain(|existing: &Param| {
                            !(existing.name == param.name && existing.location == param.location)
                        });
                        params.push(param);
                    }
                }
            }

            let request_body = if is_v3 {
                op.get("requestBody")
                    .and_then(|b| resolve_ref(&root, b))
                    .and_then(|b| v3_request_body(&root, b))
            } else if !form_fields.is_empty() {
                Some(RequestBody {
                    content_type: "application/x-www-form-urlencoded".into(),
                    properties: form_fields,
                    required: form_required,
                })
            } else {
                v2_body
            };

            let auth = match op.get("security") {
                Some(req) => pick_scheme(req, &schemes),
                None => default_auth.clone(),
            };

            let summary = op
                .get("summary")
                .or_else(|| op.get("description"))
                .and_then(Value::as_str)
                .and_then(|s| s.lines().next())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());

            methods.insert(
                method.to_ascii_uppercase(),
                Operation {
                    summary,
                    params,
                    request_body,
                    auth,
                },
            );
        }

        if !methods.is_empty() {
            spec.paths.insert(path.clone(), methods);
        }
    }

    debug!(
        operations = spec.operation_count(),
        base_url = spec.base_url.as_deref().unwrap_or("-"),
        "Extracted API specification"
    );
    Some(spec)
}

/// Follow local `$ref`s (`#/components/...`, `#/parameters/...`).
fn resolve_ref<'a>(root: &'a Value, value: &'a Value) -> Option<&'a Value> {
    let mut current = value;
    for _ in 0..MAX_REF_DEPTH {
        match current.get("$ref").and_then(Value::as_str) {
            Some(reference) => {
                let pointer = reference.strip_prefix('#')?;
                current = root.pointer(pointer)?;
            }
            None => return Some(current),
        }
    }
    None
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_scheme(def: &Value) -> Option<AuthScheme> {
    let kind = def.get("type").and_then(Value::as_str)?.to_ascii_lowercase();
    match kind.as_str() {
        "apikey" => {
            let name = def.get("name").and_then(Value::as_str)?.to_string();
            match def.get("in").and_then(Value::as_str) {
                Some("header") => Some(AuthScheme::ApiKeyHeader { name }),
                Some("query") => Some(AuthScheme::ApiKeyQuery { name }),
                _ => None,
            }
        }
        "http" => match def
            .get("scheme")
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("basic") => Some(AuthScheme::Basic),
            Some("bearer") => Some(AuthScheme::Bearer),
            _ => None,
        },
        "basic" => Some(AuthScheme::Basic),
        "oauth2" | "openidconnect" => Some(AuthScheme::Bearer),
        _ => None,
    }
}

/// First usable scheme in a security requirement list. `[]` means public.
fn pick_scheme(requirement: &Value, schemes: &BTreeMap<String, AuthScheme>) -> Option<AuthScheme> {
    requirement
        .as_array()?
        .iter()
        .filter_map(Value::as_object)
        .flat_map(|alt| alt.keys())
        .find_map(|name| schemes.get(name).cloned())
}

fn parse_param(root: &Value, p: &Value, name: String, location: ParamLocation) -> Param {
    // OpenAPI 3 nests type info under `schema`; Swagger 2 puts it inline.
    let schema = p
        .get("schema")
        .and_then(|s| resolve_ref(root, s))
        .unwrap_or(p);
    Param {
        name,
        location,
        schema_type: schema.get("type").and_then(Value::as_str).map(str::to_string),
        required: p.get("required").and_then(Value::as_bool).unwrap_or(false)
            || location == ParamLocation::Path,
        enum_values: schema
            .get("enum")
            .and_then(Value::as_array)
            .map(|vals| vals.iter().filter_map(scalar_string).collect())
            .unwrap_or_default(),
        description: p.get("description").and_then(Value::as_str).map(str::to_string),
    }
}

fn schema_fields(root: &Value, schema: Option<&Value>) -> (Vec<String>, Vec<String>) {
    let Some(schema) = schema else {
        return (Vec::new(), Vec::new());
    };
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    if let Some(items) = schema.get("items").and_then(|i| resolve_ref(root, i)) {
        if schema.get("properties").is_none() {
            return schema_fields(root, Some(items));
        }
    }
    (properties, required)
}

fn v3_request_body(root: &Value, body: &Value) -> Option<RequestBody> {
    let content = body.get("content").and_then(Value::as_object)?;
    let (content_type, media) = content
        .iter()
        .find(|(k, _)| k.as_str() == "application/json")
        .or_else(|| content.iter().next())?;
    let schema = media.get("schema").and_then(|s| resolve_ref(root, s));
    let (properties, required) = schema_fields(root, schema);
    Some(RequestBody {
        content_type: content_type.clone(),
        properties,
        required,
    })
}

fn v3_base_url(obj: &Map<String, Value>, source: Option<&Url>) -> Option<String> {
    let server = obj.get("servers")?.as_array()?.first()?;
    let mut url = server.get("url")?.as_str()?.to_string();

    if let Some(vars) = server.get("variables").and_then(Value::as_object) {
        for (name, var) in vars {
            if let Some(default) = var.get("default").and_then(scalar_string) {
                url = url.replace(&format!("{{{}}}", name), &default);
            }
        }
    }

    if Url::parse(&url).is_ok() {
        return Some(url.trim_end_matches('/').to_string());
    }
    let joined = source?.join(&url).ok()?;
    Some(joined.as_str().trim_end_matches('/').to_string())
}

fn v2_base_url(obj: &Map<String, Value>, source: Option<&Url>) -> Option<String> {
    let base_path = obj.get("basePath").and_then(Value::as_str).unwrap_or("");
    let scheme = obj
        .get("schemes")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| source.map(|s| s.scheme().to_string()))
        .unwrap_or_else(|| "https".to_string());

    let host = match obj.get("host").and_then(Value::as_str) {
        Some(h) => h.to_string(),
        None => {
            let src = source?;
            let host = src.host_str()?;
            match src.port() {
                Some(port) => format!("{}:{}", host, port),
                None => host.to_string(),
            }
        }
    };

    let url = format!("{}://{}{}", scheme, host, base_path);
    Some(url.trim_end_matches('/').to_string())
}
