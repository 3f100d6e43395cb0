//! docpilot-core: turn an API's documentation and a plain-language
//! instruction into a real, executed HTTP call.
//!
//! - [`directive`] — Parsing of `api_call:` messages
//! - [`crawler`] — Bounded, relevance-ordered documentation crawl
//! - [`openapi`] — OpenAPI / Swagger extraction into an endpoint model
//! - [`credentials`] — Credential store, fuzzy lookup, masking and vault
//! - [`synth`] — Language-model request synthesis and credential injection
//! - [`executor`] — HTTP execution and outcome classification
//! - [`corrector`] — Bounded error-driven correction loop
//! - [`pipeline`] — End-to-end orchestration
//! - [`report`] — Redacted user-facing rendering
//! - [`config`] — Typed configuration loading from JSON
//! - [`provider`] — LLM provider trait and OpenAI-compatible implementation
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use docpilot_core::config::Config;
//! use docpilot_core::credentials::CredentialStore;
//! use docpilot_core::pipeline::ApiCaller;
//! use docpilot_core::provider::openai::OpenAiProvider;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let provider = OpenAiProvider::new(
//!     "lmstudio",
//!     "",
//!     Some("http://localhost:1234/v1"),
//!     &config.agents.defaults.model,
//!     reqwest::Client::new(),
//! );
//! let caller = ApiCaller::from_config(
//!     &config,
//!     Arc::new(provider),
//!     &config.agents.defaults.model,
//!     Arc::new(CredentialStore::empty()),
//! );
//!
//! let outcome = caller
//!     .handle("api_call: docs=https://jsonplaceholder.typicode.com/guide get post 1")
//!     .await?;
//! println!("{}", outcome.render());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod corrector;
pub mod crawler;
pub mod credentials;
pub mod directive;
pub mod executor;
pub mod openapi;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod synth;
