use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;

use oxytrace::config::app_config::{AppConfig, load_config};
use oxytrace::config::cli::Cli;
use oxytrace::debug;
use oxytrace::emitter::Emitter;
use oxytrace::scheduler::{Scheduler, TargetProbe};

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let client = config
        .build_client()
        .context("Failed to create trace client")?;

    let mut scheduler = Scheduler::new(
        config.schedule,
        TargetProbe::new(client, config.raw_target.as_str()),
        Emitter::stdout(),
    );

    if let Some(addr) = config.debug_addr {
        let listener = debug::bind(addr).await?;
        debug::spawn(listener, scheduler.stats());
    }

    log::info!(
        "Polling {} every {:?} ({})",
        config.raw_target,
        config.schedule.interval,
        config
            .schedule
            .max_count
            .map(|n| format!("{n} polls"))
            .unwrap_or_else(|| "until killed".to_string())
    );

    scheduler.run().await;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::DisplayVersion => {
            print!("{}", e.render());
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{}", e.render());
            return ExitCode::from(2);
        }
    };

    init_logging(&cli.log_level);

    match run(load_config(cli)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
