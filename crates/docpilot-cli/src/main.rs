//! docpilot CLI — call an HTTP API from its documentation.
//!
//! Usage:
//!   docpilot call <directive…>         — Run one `api_call` and print the report
//!   docpilot chat                      — REPL that routes `api_call:` lines to the pipeline
//!   docpilot credentials list          — Show stored credentials (masked)
//!   docpilot credentials resolve <h>   — Show which credential a hint resolves to
//!   docpilot vault encrypt <value>     — Print a `vault:` value for the credentials file
//!   docpilot onboard                   — Create a default configuration
//!   docpilot status                    — Show current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::sync::Arc;

use docpilot_core::config::{Config, LM_STUDIO_DEFAULT_BASE};
use docpilot_core::credentials::{CredentialStore, Vault};
use docpilot_core::directive::{self, USAGE};
use docpilot_core::pipeline::{ApiCaller, CallOutcome, CredentialSource};
use docpilot_core::provider::openai::OpenAiProvider;
use docpilot_core::provider::{FallbackProvider, LlmProvider};

#[derive(Parser)]
#[command(
    name = "docpilot",
    version,
    about = "Call any HTTP API from its documentation and a plain-language instruction"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single api_call directive
    Call {
        /// The directive, e.g. `api_call: docs=https://… Get all users`
        #[arg(required = true, trailing_var_arg = true)]
        directive: Vec<String>,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Print the structured result as JSON instead of the report
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive session
    Chat {
        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Inspect the credential store
    Credentials {
        #[command(subcommand)]
        action: CredentialCommands,
    },

    /// Encrypt values for the credentials file
    Vault {
        #[command(subcommand)]
        action: VaultCommands,
    },

    /// Create or reset the default configuration
    Onboard,

    /// Show configuration status
    Status,
}

#[derive(Subcommand)]
enum CredentialCommands {
    /// List stored credential names with masked values
    List,
    /// Show which credential a hint resolves to
    Resolve {
        /// Service name or description, e.g. "airtable"
        hint: Vec<String>,
    },
}

#[derive(Subcommand)]
enum VaultCommands {
    /// Print the `vault:` form of a value
    Encrypt { value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Call {
            directive,
            model,
            json,
        }) => cmd_call(&directive.join(" "), model.as_deref(), json).await?,
        Some(Commands::Chat { model }) => cmd_chat(model.as_deref()).await?,
        Some(Commands::Credentials { action }) => cmd_credentials(action)?,
        Some(Commands::Vault { action }) => cmd_vault(action)?,
        Some(Commands::Onboard) => cmd_onboard()?,
        Some(Commands::Status) => cmd_status()?,
        None => cmd_chat(None).await?,
    }

    Ok(())
}

// ── Shared Setup ────────────────────────────────────────────────────

fn print_config_problems(config: &Config) {
    let problems = config.validate();
    if problems.is_empty() {
        return;
    }
    eprintln!("\n  \x1b[33m⚠️  Configuration notes:\x1b[0m");
    for p in &problems {
        eprintln!("     • {}", p);
    }
    eprintln!();
}

/// Build the language-model provider chain. With nothing configured, a
/// local LM Studio server is assumed.
fn build_provider(config: &Config, model: &str) -> Arc<dyn LlmProvider> {
    let client = reqwest::Client::new();
    let active = config.providers.active();

    if active.is_empty() {
        return Arc::new(OpenAiProvider::new(
            "lmstudio",
            "",
            Some(LM_STUDIO_DEFAULT_BASE),
            model,
            client,
        ));
    }

    let inner: Vec<(String, Box<dyn LlmProvider>)> = active
        .into_iter()
        .map(|(name, entry)| {
            let p_model = entry.model.as_deref().unwrap_or(model);
            let p = OpenAiProvider::new(
                name,
                &entry.api_key,
                entry.api_base.as_deref(),
                p_model,
                client.clone(),
            );
            (name.to_string(), Box::new(p) as Box<dyn LlmProvider>)
        })
        .collect();
    Arc::new(FallbackProvider::new(inner))
}

fn open_store(config: &Config) -> Result<CredentialStore> {
    let path = config.credentials.resolved_path();
    CredentialStore::open(&path, Vault::new(Config::vault_key_path()))
        .with_context(|| format!("loading credentials from {}", path.display()))
}

fn setup_caller(config: &Config, model_override: Option<&str>) -> Result<ApiCaller> {
    let model = model_override.unwrap_or(&config.agents.defaults.model).to_string();
    let provider = build_provider(config, &model);
    let store = Arc::new(open_store(config)?);
    tracing::debug!(%model, credentials = store.snapshot().len(), "Pipeline ready");
    Ok(ApiCaller::from_config(config, provider, &model, store))
}

fn describe_source(outcome: &CallOutcome) -> String {
    match &outcome.credential_source {
        CredentialSource::Explicit => "credential from `key:`".into(),
        CredentialSource::Store { name, hint } => format!("stored credential `{}` (matched `{}`)", name, hint),
        CredentialSource::None => "no credential".into(),
    }
}

fn print_outcome(outcome: &CallOutcome) {
    println!();
    println!(
        "  📄 {} page(s) read | API description: {} | {}",
        outcome.pages_read,
        if outcome.spec_found { "found" } else { "none" },
        describe_source(outcome)
    );
    println!();
    println!("{}", outcome.render());
}

/// Structured result with the plan and body passed through the redactor.
fn outcome_json(outcome: &CallOutcome) -> Result<String> {
    let mut value = serde_json::to_value(&outcome.result)?;
    value["final_plan"] = serde_json::to_value(outcome.result.final_plan.redacted(&outcome.redactor))?;
    let text = serde_json::to_string_pretty(&value)?;
    Ok(outcome.redactor.scrub(&text))
}

// ── Call Command ────────────────────────────────────────────────────

async fn cmd_call(message: &str, model_override: Option<&str>, json: bool) -> Result<()> {
    let config = Config::load()?;
    print_config_problems(&config);
    let caller = setup_caller(&config, model_override)?;

    let message = if directive::is_directive(message) {
        message.to_string()
    } else {
        format!("api_call: {}", message)
    };

    let outcome = caller.handle(&message).await?;
    if json {
        println!("{}", outcome_json(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

// ── Chat Command ────────────────────────────────────────────────────

async fn cmd_chat(model_override: Option<&str>) -> Result<()> {
    let config = Config::load()?;
    print_config_problems(&config);
    let caller = setup_caller(&config, model_override)?;

    let model = model_override.unwrap_or(&config.agents.defaults.model);
    let providers: Vec<&str> = config.providers.active().iter().map(|(n, _)| *n).collect();

    println!();
    println!("  🧭 docpilot v{}", env!("CARGO_PKG_VERSION"));
    println!(
        "  Providers: {} | Model: {}",
        if providers.is_empty() { "lmstudio (default)".to_string() } else { providers.join(", ") },
        model
    );
    println!("  Credentials: {} loaded", caller.credentials().snapshot().len());
    println!();
    println!("  {}", USAGE);
    println!("  /reload re-reads credentials, /quit exits.");
    println!("  ─────────────────────────────────────");
    println!();

    let stdin = io::stdin();
    loop {
        print!("  \x1b[36m>\x1b[0m ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" | "/q" => {
                println!("  Goodbye! 👋");
                break;
            }
            "/reload" => {
                match caller.credentials().reload() {
                    Ok(n) => println!("  🔑 {} credential(s) loaded.", n),
                    Err(e) => eprintln!("  \x1b[31mError: {}\x1b[0m", e),
                }
                continue;
            }
            "/status" => {
                cmd_status()?;
                continue;
            }
            _ => {}
        }

        if !directive::is_directive(input) {
            println!("  Not an api_call. Usage:\n  {}\n", USAGE);
            continue;
        }

        match caller.handle(input).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => eprintln!("  \x1b[31mError: {}\x1b[0m\n", e),
        }
    }

    Ok(())
}

// ── Credential Commands ─────────────────────────────────────────────

fn cmd_credentials(action: CredentialCommands) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config)?;
    let snapshot = store.snapshot();

    match action {
        CredentialCommands::List => {
            if snapshot.is_empty() {
                println!(
                    "  No credentials in {}.",
                    config.credentials.resolved_path().display()
                );
                return Ok(());
            }
            println!();
            for name in snapshot.names() {
                let masked = snapshot
                    .lookup(name)
                    .map(|e| e.value.masked())
                    .unwrap_or_default();
                println!("  🔑 {} = {}", name, masked);
            }
            println!();
        }
        CredentialCommands::Resolve { hint } => {
            let hint = hint.join(" ");
            match snapshot.lookup(&hint) {
                Some(entry) => println!("  ✅ `{}` → {} = {}", hint, entry.name, entry.value.masked()),
                None => println!("  ❌ No credential matches `{}`", hint),
            }
        }
    }
    Ok(())
}

fn cmd_vault(action: VaultCommands) -> Result<()> {
    match action {
        VaultCommands::Encrypt { value } => {
            let vault = Vault::new(Config::vault_key_path());
            let encrypted = vault.encrypt(&value)?;
            println!("{}", encrypted);
            eprintln!("  Key: {}", vault.key_path().display());
        }
    }
    Ok(())
}

// ── Onboard Command ─────────────────────────────────────────────────

fn cmd_onboard() -> Result<()> {
    let path = Config::write_default_template()?;
    println!();
    println!("  ✅ Configuration created at:");
    println!("     {}", path.display());
    println!();
    println!("  Next steps:");
    println!("  1. Point `providers.lmstudio.apiBase` at your model server, or add a hosted provider key");
    println!("  2. Put API keys in {} as `Name: value` lines", Config::default().credentials.path);
    println!("  3. Run `docpilot call api_call: docs=<url> <instruction>`");
    println!();
    Ok(())
}

// ── Status Command ──────────────────────────────────────────────────

fn cmd_status() -> Result<()> {
    let config_path = Config::default_path();
    let config = Config::load()?;

    println!();
    println!("  🧭 docpilot status");
    println!("  ─────────────────────────────────────");

    if config_path.exists() {
        println!("  Config:      {}", config_path.display());
    } else {
        println!("  Config:      ⚠️  Not found, using defaults (run `docpilot onboard`)");
    }

    match config.providers.find_active() {
        Some((name, _)) => println!("  Provider:    ✅ {} configured", name),
        None => println!("  Provider:    ⚠️  none, using LM Studio at {}", LM_STUDIO_DEFAULT_BASE),
    }
    println!("  Model:       {}", config.agents.defaults.model);
    println!(
        "  Crawl:       {} pages, depth {}, {} chars",
        config.crawler.max_pages, config.crawler.max_depth, config.crawler.max_content_length
    );
    println!("  Retries:     {}", config.retry.effective_max_retries());

    let cred_path = config.credentials.resolved_path();
    match open_store(&config) {
        Ok(store) => println!(
            "  Credentials: {} loaded from {}",
            store.snapshot().len(),
            cred_path.display()
        ),
        Err(e) => println!("  Credentials: ❌ {:#}", e),
    }

    let key = Config::vault_key_path();
    println!(
        "  Vault key:   {} {}",
        key.display(),
        if key.exists() { "✅" } else { "(created on first encrypt)" }
    );

    for p in config.validate() {
        println!("  Note:        {}", p);
    }
    println!();
    Ok(())
}
