use anyhow::{Context, Result};
use clap::Args;
use dialoguer::{Confirm, Input, Select};
use std::io::Write;
use std::path::PathBuf;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5500/api";

/// Global options shared by every command
#[derive(Args, Debug, Clone)]
pub struct CliArgs {
    /// Base URL of the task API
    #[arg(short = 'u', long, env = "API_BASE_URL", default_value = DEFAULT_API_BASE_URL, global = true)]
    pub api_url: String,

    /// Path to the credential store (SQLite)
    #[arg(short = 's', long, env = "TASKFLOW_STORE", global = true)]
    pub store: Option<String>,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10", global = true)]
    pub connect_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30", global = true)]
    pub http_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // API
    pub api_base_url: String,

    // Credential store
    pub store_path: PathBuf,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Config {
    /// Build configuration from parsed arguments (CLI > ENV > defaults)
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let store_path = match &args.store {
            Some(path) => expand_tilde(path),
            None => default_store_path()
                .context("Could not determine a data directory; pass --store or set TASKFLOW_STORE")?,
        };

        Ok(Config {
            api_base_url: args.api_url.trim_end_matches('/').to_string(),
            store_path,
            http_connect_timeout: args.connect_timeout,
            http_request_timeout: args.http_timeout,
            log_level: args.log_level.clone(),
            log_format: parse_log_format(&args.log_format),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            anyhow::bail!(
                "API_BASE_URL must start with http:// or https://: {}",
                self.api_base_url
            );
        }

        if self.http_connect_timeout == 0 || self.http_request_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        Ok(())
    }
}

/// Default credential store location under the user's data directory
fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("taskflow").join("credentials.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Parse log format from string
fn parse_log_format(s: &str) -> LogFormat {
    match s.to_lowercase().as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

// === Interactive Setup ===

/// Configuration collected from interactive setup
#[derive(Debug, Clone)]
pub struct InteractiveConfig {
    pub api_base_url: String,
    pub log_level: String,
}

/// Prompt for the API location and optionally save it to `.env`
pub fn run_interactive_setup() -> Result<InteractiveConfig> {
    println!();
    println!("TaskFlow client setup");
    println!();

    let api_base_url: String = Input::new()
        .with_prompt("API base URL (API_BASE_URL)")
        .default(DEFAULT_API_BASE_URL.to_string())
        .interact_text()
        .context("Failed to read API_BASE_URL")?;

    let levels = vec!["warn", "info", "debug", "error"];
    let level_idx = Select::new()
        .with_prompt("Log level")
        .items(&levels)
        .default(0)
        .interact()
        .context("Failed to read log level selection")?;

    let config = InteractiveConfig {
        api_base_url,
        log_level: levels[level_idx].to_string(),
    };

    let save_to_env = Confirm::new()
        .with_prompt("Save configuration to .env file?")
        .default(true)
        .interact()
        .context("Failed to read save confirmation")?;

    if save_to_env {
        save_env_file(&config)?;
        println!("Configuration saved to .env file");
    }

    Ok(config)
}

/// Render the `.env` file contents
fn render_env_file(config: &InteractiveConfig) -> String {
    format!(
        r#"# TaskFlow client configuration
# Generated by `taskflow setup`

# Base URL of the task API
API_BASE_URL={}

# Logging (trace, debug, info, warn, error)
LOG_LEVEL={}
"#,
        config.api_base_url, config.log_level,
    )
}

/// Save configuration to .env file
fn save_env_file(config: &InteractiveConfig) -> Result<()> {
    let mut file = std::fs::File::create(".env").context("Failed to create .env file")?;
    file.write_all(render_env_file(config).as_bytes())
        .context("Failed to write .env file")?;

    Ok(())
}
