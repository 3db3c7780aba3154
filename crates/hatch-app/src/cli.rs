//! CLI argument definitions for the Hatch server binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_PORT: u16 = 3040;

/// Hatch - capture ideas and nurture them into plans.
#[derive(Parser, Debug)]
#[command(name = "hatch", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port", global = true)]
    pub port: Option<u16>,

    /// Data directory for the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the HTTP API server (the default).
    Serve,
    /// Manage user profiles and their access tokens.
    User {
        #[command(subcommand)]
        action: UserCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum UserCommand {
    /// Create a profile and print a bearer token for it.
    Add {
        #[arg(long)]
        email: String,
        /// Grant the premium plan.
        #[arg(long)]
        premium: bool,
    },
    /// Print a fresh bearer token for an existing profile.
    Token {
        #[arg(long)]
        email: String,
    },
    /// Turn the premium plan on or off.
    Premium {
        #[arg(long)]
        email: String,
        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > HATCH_CONFIG env var > ~/.hatch/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("HATCH_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > HATCH_PORT env var > config file value > 3040.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        pick_port(self.port, std::env::var("HATCH_PORT").ok(), config_port)
    }

    /// Resolve the language-model API key.
    ///
    /// Priority: HATCH_LLM_API_KEY > OPENAI_API_KEY > config file value.
    /// There is no flag for it.
    pub fn resolve_api_key(&self, config_key: Option<String>) -> Option<String> {
        pick_api_key(
            std::env::var("HATCH_LLM_API_KEY").ok(),
            std::env::var("OPENAI_API_KEY").ok(),
            config_key,
        )
    }

    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn pick_port(flag: Option<u16>, env: Option<String>, config_port: u16) -> u16 {
    if let Some(p) = flag {
        return p;
    }
    if let Some(p) = env.and_then(|v| v.parse::<u16>().ok()) {
        return p;
    }
    if config_port != 0 {
        return config_port;
    }
    DEFAULT_PORT
}

fn pick_api_key(
    hatch_env: Option<String>,
    openai_env: Option<String>,
    config_key: Option<String>,
) -> Option<String> {
    [hatch_env, openai_env, config_key]
        .into_iter()
        .flatten()
        .find(|k| !k.trim().is_empty())
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".hatch").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".hatch").join("config.toml");
    }
    PathBuf::from("config.toml")
}
