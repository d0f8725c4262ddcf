mod config;
mod engine;
mod logging;
mod operator;
mod poll;
mod prompt;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Args, Settings};
use engine::MatchEngine;
use handover_device::{CommandProbe, IdentityResolver, ThreadSleeper};
use handover_storage::AgreementStore;
use operator::{restore_terminal, TerminalOperator};
use poll::PollLoop;
use std::fs;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let file_config = config::load_file_config(args.config.as_deref())?;
    let settings = Settings::resolve(&args, file_config)?;
    let log_guard = logging::init_logging(&settings);

    fs::create_dir_all(&settings.agreements_dir).with_context(|| {
        format!(
            "Failed to create agreements directory {}",
            settings.agreements_dir.display()
        )
    })?;
    let store = AgreementStore::load(&settings.agreements_dir)
        .context("Failed to load agreements")?;

    let summary = store.summary();
    println!("Loaded agreements for {} devices.", summary.total);
    println!("Total confirmed devices: {}", summary.confirmed);
    if summary.duplicates > 0 {
        println!(
            "Warning: {} serial numbers appear more than once; the last file read wins.",
            summary.duplicates
        );
    }

    info!(
        event = "handover_start",
        dir = %settings.agreements_dir.display(),
        agreements = store.len()
    );

    let gate = store.persist_gate();
    let resolver = IdentityResolver::new(
        CommandProbe::new(settings.list_program.clone(), settings.info_program.clone()),
        ThreadSleeper,
        settings.retry,
    );
    let engine = MatchEngine::new(settings.menus.clone());
    let poll_settings = settings.poll;
    let worker = tokio::task::spawn_blocking(move || {
        let mut poll_loop = PollLoop::new(
            resolver,
            TerminalOperator::default(),
            engine,
            store,
            poll_settings,
        );
        poll_loop.run();
    });

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(event = "signal_handler_unavailable", error = %err);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = shutdown => {
            info!(event = "interrupt");
        }
        joined = worker => {
            if let Err(err) = joined {
                error!(event = "poll_loop_failed", error = %err);
            }
        }
    }

    // A rewrite in flight finishes before the process goes away.
    let _held = gate.hold();
    restore_terminal();
    println!("\nExiting...");
    drop(log_guard);
    std::process::exit(0);
}
