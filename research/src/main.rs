mod config;
mod error;
mod pipeline;
mod research;
mod response;
mod sanitize;
mod save;

use error::Result;
use std::io::Write;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("research={level},agent={level}"))
        }))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn read_query() -> Result<String> {
    print!("What can I help you research? ");
    std::io::stdout().flush()?;

    let mut query = String::new();
    std::io::stdin().read_line(&mut query)?;
    Ok(query.trim_end_matches(['\r', '\n']).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::load()?;
    init_logging(config.verbose);
    info!(provider = ?config.provider, model = %config.model, "configuration loaded");

    let query = read_query()?;
    info!("user query: {}", query);

    let saver = save::SaveToFile::new(config.output_dir.clone());
    let orchestrator = research::Orchestrator::new(config.llm()?, &config, saver.clone())?;

    let raw = orchestrator.run(&query).await.inspect_err(|e| {
        if e.is_model_service() {
            error!("model service failed, nothing was saved: {}", e);
        }
    })?;

    let status = pipeline::handle(&query, &raw, &saver);
    println!("{}", status);

    Ok(())
}
