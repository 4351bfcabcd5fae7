use std::process::ExitCode;

use parley::app::run;
use parley::settings::Settings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("parley: {error}");
            return ExitCode::FAILURE;
        }
    };

    // RUST_LOG wins over the configured filter.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_filter.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = Settings::default_config_path();
    if !config_path.exists() {
        tracing::info!(path = ?config_path, "settings file not found, using defaults and environment");
    }
    if !settings.has_api_key() {
        tracing::warn!("no API key configured; set PARLEY_API_KEY or GEMINI_API_KEY");
    }

    match run(&settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("parley: {error}");
            ExitCode::FAILURE
        }
    }
}
