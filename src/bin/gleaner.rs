//! Gleaner CLI Binary
//!
//! Command-line entry point for the Gleaner analysis pipeline.

use anyhow::Context;
use clap::Parser;
use gleaner::batch::StopFlag;
use gleaner::cli::{build_logging_config, error_chain, map_error, Cli, RunContext};
use gleaner::logging::init_logging;
use std::process;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let working_dir = match std::env::current_dir().context("Failed to resolve working directory") {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(1);
        }
    };

    let context = match RunContext::new(&cli, &working_dir) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    };

    let logging_result = build_logging_config(&cli, context.config())
        .and_then(|logging| init_logging(&logging));
    if let Err(e) = logging_result {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Gleaner starting");

    let stop = StopFlag::new();
    spawn_interrupt_handler(stop.clone());

    match context.execute(&cli.command, stop).await {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!(kind = e.kind(), error = ?e, "Command failed: {}", error_chain(&e));
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    }
}

/// First interrupt asks the loop to finish the current unit and stop; later
/// ones are only acknowledged.
fn spawn_interrupt_handler(stop: StopFlag) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Unable to listen for interrupts");
                return;
            }
            if stop.raise() {
                warn!("Interrupt received, stopping after the current unit");
            } else {
                info!("Already stopping, waiting for the current unit to finish");
            }
        }
    });
}
