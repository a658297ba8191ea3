use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mealied::Config;
use mealied::Engine;
use mealied::api;
use mealied::config::LoggingConfig;
use mealied::format_diagnostics;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Parser)]
#[command(
    version,
    about = "Bridges a Mealie server into todo lists, a calendar, sensors and images"
)]
struct Cli {
    /// Config file to load; repeat to merge several (e.g. base + secrets)
    #[arg(short, long = "config", value_name = "FILE", default_value = "mealied.toml")]
    config: Vec<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

/// Build the log filter from the config; `RUST_LOG` wins when set
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let mut filter = EnvFilter::default()
                .add_directive(LevelFilter::from(logging.level).into());
            for (target, level) in &logging.overrides {
                let directive = format!("{}={}", target, LevelFilter::from(*level));
                filter = filter.add_directive(
                    directive
                        .parse()
                        .with_context(|| format!("invalid log override '{}'", target))?,
                );
            }
            filter
        }
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config, warnings) = match Config::from_files(&cli.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if !warnings.is_empty() {
        eprint!("{}", format_diagnostics(&warnings));
    }

    if cli.check {
        println!("Configuration OK");
        return Ok(());
    }

    init_tracing(&config.logging)?;

    tracing::info!("mealied starting");
    for path in &cli.config {
        tracing::info!("Loaded config from: {}", path.display());
    }

    let mut engine = Engine::new();
    engine.register_integrations_from_config(&config);
    let engine = Arc::new(engine);

    let runner = engine.clone();
    let engine_task = tokio::spawn(async move { runner.run().await });

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    let served = api::serve(engine.clone(), config.api.listen, config.api.port, shutdown_rx)
        .await
        .map_err(|e| anyhow::anyhow!("HTTP API server failed: {}", e));

    tracing::info!("Shutting down integrations...");
    engine.shutdown().await;
    engine_task.abort();

    tracing::info!("mealied shutdown complete");
    served
}
