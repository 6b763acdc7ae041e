//! iiifgen - Main entry point

use clap::Parser;
use iiifgen_cli::{Cli, Pipeline, PipelineConfig};
use iiifgen_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(()) => {},
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("Error: {}", e);
            process::exit(1);
        },
    }
}

async fn run(cli: &Cli) -> iiifgen_cli::Result<()> {
    let config = PipelineConfig::load(&cli.config)?;

    let mut config = config;
    if let Some(concurrency) = cli.concurrency {
        if concurrency == 0 {
            return Err(iiifgen_cli::GenError::config(
                "concurrency must be at least 1",
            ));
        }
        config.concurrency = concurrency;
    }

    // Console for the operator, file for the rejection/failure log
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Both)
        .log_file(config.error_log_file.clone())
        .build()
        .with_env_overrides()?;

    // Logging failures should not prevent the run itself
    let _ = init_logging(&log_config);

    info!(config = %cli.config.display(), mode = %cli.mode, "configuration loaded");

    let pipeline = Pipeline::new(config, cli.mode)?;

    // Graceful Ctrl-C: stop starting records, let in-flight probes
    // finish, still report the summary
    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    let report = pipeline.run().await?;

    println!("{}", report);
    Ok(())
}
