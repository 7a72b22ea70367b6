//! authkeep - sign in to an identity service from the terminal.
//!
//! Keeps a bearer credential between runs and shows who is signed in.

mod router;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use authkeep_core::config::TokenStoreKind;
use authkeep_core::{Config, FileTokenStore, IdentityClient, SessionManager, SessionState};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Password for non-interactive logins
const PASSWORD_ENV: &str = "AUTHKEEP_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "authkeep", author, version, about = "Client-side session manager")]
struct Cli {
    /// Identity service address (overrides AUTHKEEP_BACKEND_URL and the config file)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show who is signed in
    Status,

    /// Sign in and keep the credential
    Login {
        /// Username (prompted for when omitted)
        username: Option<String>,
    },

    /// Forget the stored credential
    Logout,

    /// Save settings to the config file
    Configure {
        /// Identity service address to remember
        #[arg(long)]
        url: Option<String>,

        /// Where to keep the credential: file or keyring
        #[arg(long)]
        store: Option<String>,
    },

    /// Create an account
    Register {
        /// Raw JSON payload
        #[arg(long, conflicts_with = "field")]
        json: Option<String>,

        /// Payload field as key=value (repeatable)
        #[arg(long = "field", value_name = "KEY=VALUE")]
        field: Vec<String>,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing();
    info!("authkeep starting");

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    if let Command::Configure { url, store } = &cli.command {
        let mut config = config;
        apply_settings(&mut config, url.as_deref(), store.as_deref())?;
        config.save().context("Failed to save config")?;
        println!("Configuration saved");
        return Ok(());
    }

    let backend_url = cli.backend_url.clone().unwrap_or_else(|| config.backend_url());
    let client = IdentityClient::with_timeout(&backend_url, config.request_timeout())?;
    let store = config.token_store()?;
    let manager = Arc::new(SessionManager::new(client, store));

    let router = router::spawn(manager.subscribe());

    // Startup hydration; the commands below all depend on knowing the session
    manager
        .spawn_hydrate()
        .await
        .context("Session hydration task failed")?;

    let result = run(&cli.command, &manager, &config).await;

    // Dropping the last manager handle closes the event channel and stops the router
    drop(manager);
    if let Err(e) = router.await {
        warn!(error = %e, "Router task failed");
    }

    info!("authkeep shutting down");
    result
}

async fn run(command: &Command, manager: &SessionManager, config: &Config) -> Result<()> {
    match command {
        Command::Status => {
            print_status(manager, config);
            Ok(())
        }
        Command::Login { username } => {
            let username = match username {
                Some(u) => u.clone(),
                None => prompt_username()?,
            };
            let password = match std::env::var(PASSWORD_ENV) {
                Ok(p) if !p.is_empty() => p,
                _ => rpassword::prompt_password("Password: ")?,
            };

            manager
                .login(&username, &password)
                .await
                .map_err(|e| anyhow::anyhow!("Login failed: {}", e))?;

            match manager.current_user() {
                Some(user) => println!("Signed in as {}", user.display_name()),
                None => println!("Signed in"),
            }
            Ok(())
        }
        Command::Logout => {
            manager.logout();
            println!("Signed out");
            Ok(())
        }
        // Handled before the session is set up
        Command::Configure { .. } => Ok(()),
        Command::Register { json, field } => {
            let payload = match json {
                Some(raw) => serde_json::from_str(raw).context("Invalid JSON payload")?,
                None => parse_fields(field)?,
            };

            if let Err(e) = manager.register(&payload).await {
                if let Some(message) = e.conflict_message() {
                    anyhow::bail!("Account already exists: {}", message);
                }
                anyhow::bail!("Registration failed: {}", e);
            }
            println!("Registered. Sign in with `authkeep login`.");
            Ok(())
        }
    }
}

fn print_status(manager: &SessionManager, config: &Config) {
    match manager.state() {
        SessionState::Authenticated(user) => {
            println!("Signed in as {}", user.display_name());
            if let Ok(pretty) = serde_json::to_string_pretty(user.as_value()) {
                println!("{}", pretty);
            }
        }
        SessionState::Anonymous => println!("anonymous"),
    }

    if config.token_store == TokenStoreKind::File {
        let stored = config
            .data_dir()
            .and_then(|dir| FileTokenStore::new(dir).load());
        match stored {
            Ok(Some(credential)) => {
                println!("Credential stored {}m ago", credential.age_minutes());
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Failed to inspect stored credential"),
        }
    }
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut username = String::new();
    io::stdin().read_line(&mut username)?;
    Ok(username.trim().to_string())
}

/// Update the settings `configure` was given; at least one is required
fn apply_settings(config: &mut Config, url: Option<&str>, store: Option<&str>) -> Result<()> {
    if url.is_none() && store.is_none() {
        anyhow::bail!("Nothing to configure: pass --url and/or --store");
    }
    if let Some(url) = url {
        config.backend_url = Some(url.trim().to_string());
    }
    if let Some(store) = store {
        config.token_store = store.parse::<TokenStoreKind>()?;
    }
    Ok(())
}

/// Build a registration payload from `key=value` pairs
fn parse_fields(fields: &[String]) -> Result<Value> {
    if fields.is_empty() {
        anyhow::bail!("Registration needs --json or at least one --field");
    }

    let mut payload = Map::new();
    for field in fields {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected KEY=VALUE, got '{}'", field))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Empty field name in '{}'", field);
        }
        payload.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(Value::Object(payload))
}
