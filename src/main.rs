use anyhow::Result;
use clap::Parser;

use taskflow_client::commands::{App, Cli, Command};
use taskflow_client::config::{self, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads env fallbacks
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if matches!(cli.command, Command::Setup) {
        config::run_interactive_setup()?;
        return Ok(());
    }

    let config = config::Config::from_args(&cli.args)?;
    config.validate()?;

    init_logging(&config);
    tracing::debug!(api = %config.api_base_url, store = %config.store_path.display(), "Configuration loaded");

    let app = App::from_config(&config)?;

    // Screens must not decide what to show until this completes
    if let Err(e) = app.session.restore_session().await {
        tracing::error!("Failed to restore session: {}", e);
        eprintln!("Error: {}", e.user_message());
        std::process::exit(1);
    }

    if let Err(e) = app.run(cli.command).await {
        tracing::debug!("Command failed: {:?}", e);
        eprintln!("Error: {}", e.user_message());
        if e.requires_login() {
            eprintln!("Run `taskflow login` to sign in again.");
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize logging with the configured level and format
fn init_logging(config: &config::Config) {
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
