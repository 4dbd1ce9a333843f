//! tasker-host: reference host for the tick scheduler.
//!
//! Feeds ticks from a Tokio interval, runs async tasks on Tokio's blocking
//! pool, and drains the scheduler on Ctrl-C or after `max_ticks`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use tasker_core::TaskerConfig;
use tasker_scheduler::{Scheduler, TaskSpec, TickPump};

// ── CLI ─────────────────────────────────────────────────────────────

/// Run the tick scheduler with a few demo tasks.
#[derive(Parser, Debug)]
#[command(name = "tasker-host", version, about)]
struct Cli {
    /// Path to tasker.toml. Defaults to ~/.tasker/tasker.toml.
    #[arg(long, env = "TASKER_CONFIG")]
    config: Option<String>,

    /// Stop after this many ticks (overrides host.max_ticks).
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Print the live task table as JSON before draining.
    #[arg(long)]
    dump_tasks: bool,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let loaded = TaskerConfig::load(cli.config.as_deref());
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    if cli.max_ticks.is_some() {
        config.host.max_ticks = cli.max_ticks;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.host.log_filter.as_str().into()),
        )
        .init();

    if let Err(e) = &loaded {
        warn!("Config load failed ({}), using defaults", e);
    }
    info!(
        tick_ms = config.scheduler.tick_millis,
        concurrency = config.scheduler.async_concurrency,
        max_ticks = ?config.host.max_ticks,
        "starting tasker host"
    );

    let scheduler = Scheduler::with_tokio(&config.scheduler);
    register_demo_tasks(&scheduler)?;

    // Ctrl-C flips the shutdown flag; the pump stops on the next select
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });

    let summary = TickPump::from_config(scheduler.clone(), &config.host)
        .run(shutdown_rx)
        .await;
    info!(
        ticks = summary.ticks,
        executed = summary.executed,
        failed = summary.failed,
        "tick pump finished"
    );

    if cli.dump_tasks {
        println!("{}", serde_json::to_string_pretty(&scheduler.tasks())?);
    }

    // drain blocks on a condvar, keep it off the async workers
    let timeout = config.scheduler.drain_timeout();
    let draining = scheduler.clone();
    let drained = tokio::task::spawn_blocking(move || draining.drain_timeout(timeout)).await?;
    if drained {
        info!("scheduler drained");
    } else {
        warn!(
            timeout_secs = timeout.as_secs(),
            "async tasks still running after drain timeout"
        );
    }
    Ok(())
}

/// A small mixed workload: tick-thread regen, a background autosave, and a
/// countdown that cancels its owner's tasks when it hits zero.
fn register_demo_tasks(scheduler: &Scheduler) -> anyhow::Result<()> {
    let regen = Arc::new(AtomicU64::new(0));
    let regen_count = Arc::clone(&regen);
    let regen_task = scheduler.schedule(
        TaskSpec::sync().delay(1).every(20).owned_by("regen"),
        move |_| {
            regen_count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        },
    )?;

    let autosaves = Arc::new(AtomicU64::new(0));
    scheduler.schedule(
        TaskSpec::background().delay(10).every(100).owned_by("autosave"),
        move |_| {
            let n = autosaves.fetch_add(1, Ordering::Relaxed) + 1;
            info!(autosave = n, "autosave written");
            Ok(())
        },
    )?;

    // handles only hold a weak reference, so the action does not keep the
    // scheduler alive
    let mut remaining = 10u32;
    scheduler.schedule(TaskSpec::sync().delay(100).every(100), move |me| {
        remaining -= 1;
        info!(remaining, regen = regen.load(Ordering::Relaxed), "countdown");
        if remaining == 0 {
            let cancelled = regen_task.cancel();
            info!(cancelled, "regen stopped");
            me.cancel();
        }
        Ok(())
    })?;
    Ok(())
}
