//! Hatch application binary - composition root.
//!
//! 1. Parse the command line and load configuration from TOML
//! 2. Open the SQLite database
//! 3. Either manage user profiles, or build the language-model client and
//!    start the axum REST API server

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use hatch_api::auth::issue_token;
use hatch_api::state::AppState;
use hatch_core::config::HatchConfig;
use hatch_llm::{OpenAiClient, TextGenerator, Transcriber};
use hatch_storage::{Database, ProfileRepository, SessionRepository};

use cli::{CliArgs, Command, UserCommand};

const DB_FILE: &str = "hatch.db";

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Create the data directory if needed and open the database inside it.
fn open_database(data_dir: &Path) -> Result<Database, Box<dyn std::error::Error>> {
    if let Err(e) = std::fs::create_dir_all(data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join(DB_FILE);
    let db = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "SQLite database opened");
    Ok(db)
}

fn run_user_command(db: Database, action: UserCommand) -> Result<(), Box<dyn std::error::Error>> {
    let db = Arc::new(db);
    let profiles = ProfileRepository::new(Arc::clone(&db));
    let sessions = SessionRepository::new(db);

    match action {
        UserCommand::Add { email, premium } => {
            let profile = profiles.create(&email, premium)?;
            let token = issue_token(&sessions, profile.id)?;
            println!("Created {} ({})", profile.email, if premium { "premium" } else { "free" });
            println!("{}", token);
        }
        UserCommand::Token { email } => {
            let profile = profiles
                .find_by_email(&email)?
                .ok_or_else(|| format!("No profile for {}", email))?;
            println!("{}", issue_token(&sessions, profile.id)?);
        }
        UserCommand::Premium { email, enabled } => {
            if !profiles.set_premium(&email, enabled)? {
                return Err(format!("No profile for {}", email).into());
            }
            tracing::info!(email = %email, premium = enabled, "Plan updated");
            println!("{}: premium = {}", email, enabled);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Loaded before tracing so the file can set the log level.
    let config_file = args.resolve_config_path();
    let loaded = HatchConfig::load(&config_file);
    let load_error = loaded.as_ref().err().map(|e| e.to_string());
    let mut config = loaded.unwrap_or_default();

    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }
    config.general.port = args.resolve_port(config.general.port);
    config.llm.api_key = args.resolve_api_key(config.llm.api_key.take());

    // Tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Hatch v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config, using defaults"
        ),
    }

    let db = open_database(&resolve_data_dir(&config.general.data_dir))?;

    match args.command {
        Some(Command::User { action }) => run_user_command(db, action),
        Some(Command::Serve) | None => {
            if config.llm.api_key.is_none() {
                tracing::warn!("No language-model API key configured; upstream calls will be rejected");
            }
            let client = Arc::new(OpenAiClient::new(&config.llm)?);
            let generator: Arc<dyn TextGenerator> = client.clone();
            let transcriber: Arc<dyn Transcriber> = client;
            tracing::info!(
                api_base = %config.llm.api_base,
                model = %config.llm.model,
                "Language-model client ready"
            );

            let state = AppState::new(config.clone(), db, generator, transcriber);
            if let Err(e) = hatch_api::start_server(&config, state).await {
                tracing::error!(port = config.general.port, error = %e, "Server stopped");
                return Err(e.into());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_dir_plain_path() {
        assert_eq!(resolve_data_dir("/var/lib/hatch"), PathBuf::from("/var/lib/hatch"));
    }

    #[test]
    fn test_resolve_data_dir_expands_home() {
        let resolved = resolve_data_dir("~/.hatch");
        assert!(resolved.ends_with(".hatch"));
        assert!(!resolved.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_open_database_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("data");
        open_database(&dir).unwrap();
        assert!(dir.join(DB_FILE).exists());
    }

    #[test]
    fn test_user_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let db = open_database(tmp.path()).unwrap();
        run_user_command(
            db,
            UserCommand::Add {
                email: "ada@example.com".to_string(),
                premium: false,
            },
        )
        .unwrap();

        let db = open_database(tmp.path()).unwrap();
        run_user_command(
            db,
            UserCommand::Premium {
                email: "ada@example.com".to_string(),
                enabled: true,
            },
        )
        .unwrap();

        let db = Arc::new(open_database(tmp.path()).unwrap());
        let profile = ProfileRepository::new(db)
            .find_by_email("ada@example.com")
            .unwrap()
            .unwrap();
        assert!(profile.premium);

        let db = open_database(tmp.path()).unwrap();
        let missing = run_user_command(
            db,
            UserCommand::Token {
                email: "nobody@example.com".to_string(),
            },
        );
        assert!(missing.is_err());
    }
}
