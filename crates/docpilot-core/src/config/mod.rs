//! Configuration module for docpilot.
//!
//! Loads typed configuration from `./config.json` or
//! `~/.docpilot/config.json`, then applies the environment overrides the
//! LM Studio deployment relies on. All fields use `serde` defaults, so an
//! empty file is a valid config.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::corrector::{DEFAULT_MAX_RETRIES, MAX_RETRIES_CAP};
use crate::synth::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub agents: AgentsConfig,
    pub crawler: CrawlerConfig,
    pub executor: ExecutorConfig,
    pub retry: RetryConfig,
    pub credentials: CredentialsConfig,
}

impl Config {
    /// Load from `./config.json`, else `~/.docpilot/config.json`, else
    /// defaults. Environment overrides are applied in every case.
    pub fn load() -> anyhow::Result<Self> {
        let local = PathBuf::from("config.json");
        let mut config = if local.exists() {
            Self::read(&local)?
        } else if Self::default_path().exists() {
            Self::read(&Self::default_path())?
        } else {
            Config::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load from a specific path (environment overrides included).
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// `~/.docpilot/config.json`
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// `~/.docpilot`
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docpilot")
    }

    pub fn vault_key_path() -> PathBuf {
        Self::config_dir().join("vault.key")
    }

    /// Apply `LM_STUDIO_*`, `MAX_CONTENT_LENGTH` and `REQUEST_TIMEOUT`.
    ///
    /// Takes a lookup function so tests don't touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("LM_STUDIO_HOST");
        let port = lookup("LM_STUDIO_PORT");
        let model = lookup("LM_STUDIO_MODEL");
        if host.is_some() || port.is_some() || model.is_some() {
            let entry = self.providers.lmstudio.get_or_insert_with(ProviderEntry::default);
            if host.is_some() || port.is_some() {
                entry.api_base = Some(format!(
                    "http://{}:{}/v1",
                    host.as_deref().unwrap_or("localhost"),
                    port.as_deref().unwrap_or("1234")
                ));
            }
            if let Some(model) = model {
                entry.model = Some(model);
            }
        }

        if let Some(n) = lookup("MAX_CONTENT_LENGTH").and_then(|v| v.trim().parse().ok()) {
            self.crawler.max_content_length = n;
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT").and_then(|v| v.trim().parse().ok()) {
            self.crawler.request_timeout_secs = secs;
            self.executor.timeout_secs = secs;
        }
    }

    /// Human-readable problems; empty means the config is usable as is.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.providers.active().is_empty() {
            problems.push(format!(
                "No LLM provider configured; falling back to LM Studio at {}. \
                 Add a provider under `providers` in {}",
                LM_STUDIO_DEFAULT_BASE,
                Self::default_path().display()
            ));
        }
        if self.crawler.max_pages == 0 {
            problems.push("crawler.maxPages is 0; no documentation will be read".into());
        }
        if self.crawler.max_content_length < 500 {
            problems.push(format!(
                "crawler.maxContentLength is {}; the model will see almost no documentation",
                self.crawler.max_content_length
            ));
        }
        if self.crawler.request_timeout_secs == 0 || self.executor.timeout_secs == 0 {
            problems.push("timeouts must be at least 1 second".into());
        }
        if self.retry.max_retries > MAX_RETRIES_CAP {
            problems.push(format!(
                "retry.maxRetries is {}; it will be capped at {}",
                self.retry.max_retries, MAX_RETRIES_CAP
            ));
        }
        if !(0.0..=2.0).contains(&self.agents.defaults.temperature) {
            problems.push(format!(
                "agents.defaults.temperature {} is outside 0.0..=2.0",
                self.agents.defaults.temperature
            ));
        }
        problems
    }

    /// Write the default config template to `~/.docpilot/config.json`.
    pub fn write_default_template() -> anyhow::Result<PathBuf> {
        let path = Self::default_path();
        Self::write_template_to(&path)?;
        Ok(path)
    }

    pub fn write_template_to(path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = serde_json::json!({
            "providers": {
                "lmstudio": {
                    "apiBase": LM_STUDIO_DEFAULT_BASE,
                    "model": "local-model"
                },
                "openrouter": {
                    "apiKey": "",
                    "model": "openai/gpt-4o-mini"
                }
            },
            "agents": {
                "defaults": {
                    "model": "local-model",
                    "max_tokens": DEFAULT_MAX_TOKENS,
                    "temperature": DEFAULT_TEMPERATURE
                }
            },
            "crawler": {
                "maxPages": 11,
                "maxDepth": 2,
                "maxContentLength": 8000,
                "requestTimeoutSecs": 10
            },
            "executor": {
                "timeoutSecs": 10,
                "previewChars": 1000
            },
            "retry": {
                "maxRetries": DEFAULT_MAX_RETRIES
            },
            "credentials": {
                "path": "~/.docpilot/credentials.env"
            }
        });

        std::fs::write(path, serde_json::to_string_pretty(&template)?)?;
        Ok(())
    }
}

/// Expand a leading `~/`.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw.starts_with("~/") || raw.starts_with("~\\") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(&raw[2..])
    } else {
        PathBuf::from(raw)
    }
}

// ── Provider Configuration ──────────────────────────────────────────

pub const LM_STUDIO_DEFAULT_BASE: &str = "http://localhost:1234/v1";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderEntry {
    pub api_key: String,
    pub api_base: Option<String>,
    /// Overrides `agents.defaults.model` for this provider.
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openrouter: Option<ProviderEntry>,
    pub anthropic: Option<ProviderEntry>,
    pub openai: Option<ProviderEntry>,
    pub deepseek: Option<ProviderEntry>,
    pub groq: Option<ProviderEntry>,
    pub gemini: Option<ProviderEntry>,
    pub vllm: Option<ProviderEntry>,
    pub lmstudio: Option<ProviderEntry>,
}

/// Providers that run locally and need no key.
const LOCAL_PROVIDERS: &[&str] = &["vllm", "lmstudio"];

impl ProvidersConfig {
    /// Configured providers in priority order.
    ///
    /// Hosted providers need a non-empty API key; local ones need `apiBase`.
    pub fn active(&self) -> Vec<(&str, &ProviderEntry)> {
        let candidates: [(&str, &Option<ProviderEntry>); 8] = [
            ("openrouter", &self.openrouter),
            ("anthropic", &self.anthropic),
            ("openai", &self.openai),
            ("deepseek", &self.deepseek),
            ("groq", &self.groq),
            ("gemini", &self.gemini),
            ("vllm", &self.vllm),
            ("lmstudio", &self.lmstudio),
        ];

        candidates
            .into_iter()
            .filter_map(|(name, entry)| {
                let e = entry.as_ref()?;
                let usable = !e.api_key.is_empty()
                    || (LOCAL_PROVIDERS.contains(&name) && e.api_base.is_some());
                usable.then_some((name, e))
            })
            .collect()
    }

    /// First active provider.
    pub fn find_active(&self) -> Option<(&str, &ProviderEntry)> {
        self.active().into_iter().next()
    }
}

// ── Agent Configuration ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: "local-model".into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
}

// ── Pipeline Configuration ──────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CrawlerConfig {
    pub max_pages: usize,
    pub max_depth: u32,
    pub max_content_length: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 11,
            max_depth: 2,
            max_content_length: 8000,
            request_timeout_secs: 10,
            user_agent: format!(
                "Mozilla/5.0 (compatible; docpilot/{}; +https://github.com/docpilot)",
                env!("CARGO_PKG_VERSION")
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutorConfig {
    pub timeout_secs: u64,
    pub preview_chars: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            preview_chars: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryConfig {
    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.min(MAX_RETRIES_CAP)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub path: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: "~/.docpilot/credentials.env".into(),
        }
    }
}

impl CredentialsConfig {
    pub fn resolved_path(&self) -> PathBuf {
        expand_home(&self.path)
    }
}
