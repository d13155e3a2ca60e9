use anyhow::Context;
use env_logger::Env;
use marketpost::agent::GeminiBackend;
use marketpost::config::AppConfig;
use marketpost::run::{local_now, Job};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse the specified (or default) .env file
    let dotenv_path = env::var("MARKETPOST_DOTENV_PATH").unwrap_or_else(|_| ".env".to_string());
    let dotenv_result = dotenvy::from_path(&dotenv_path);

    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match dotenv_result {
        Ok(()) => log::info!("Loaded env from {}", dotenv_path),
        Err(err) => log::debug!("No .env loaded from {}: {}", dotenv_path, err),
    }

    let config = AppConfig::from_env().context("Reading configuration")?;
    let now = local_now(config.utc_offset_hours())?;
    let job = Job::from_config(&config)?;
    let backend = GeminiBackend::new(&config)?;

    let report = job.run(&backend, now).await?;

    println!("{}", report.path.display());
    Ok(())
}
