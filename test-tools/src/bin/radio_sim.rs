/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use test_tools::{file_captures, sim_layers, SimRadio, SimSettings, LCID_DRB1};
use ue_stack::executor::tick::TTI_WRAP;
use ue_stack::{StackConfig, SyncEvent, UeStack};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Drives a UE stack with simulated layers and a simulated radio clock.
///
/// Example:
///   radio-sim --config stack.yaml --duration-secs 10 --burst-every 500 --burst-len 4
#[derive(Debug, Parser)]
#[command(name = "radio-sim", about = "UE stack radio/IP simulator", long_about = None)]
struct Cli {
    /// Path to the YAML stack configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to the YAML simulator settings (IMSI, cell, delays).
    #[arg(short = 's', long = "sim")]
    sim: Option<PathBuf>,

    /// How long to run before detaching, in seconds.
    #[arg(short = 'd', long = "duration-secs", default_value_t = 5)]
    duration_secs: u64,

    /// Duration of one tick of the simulated radio clock, in microseconds.
    #[arg(long = "tti-us", default_value_t = 1000)]
    tti_us: u64,

    /// Every N ticks, stall the clock and deliver a catch-up batch (0 = never).
    #[arg(long = "burst-every", default_value_t = 0)]
    burst_every: u32,

    /// Ticks covered by one catch-up batch.
    #[arg(long = "burst-len", default_value_t = 4)]
    burst_len: u32,

    /// Uplink packets per second offered on the data bearer.
    #[arg(long = "uplink-pps", default_value_t = 200)]
    uplink_pps: u64,

    /// Seconds between metric reports.
    #[arg(long = "metrics-period-secs", default_value_t = 1)]
    metrics_period_secs: u64,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StackConfig::load_from_file(path)?,
        None => StackConfig::default(),
    };
    let settings = match &cli.sim {
        Some(path) => SimSettings::load_from_file(path)?,
        None => SimSettings::default(),
    };

    // RUST_LOG wins; otherwise the per-layer levels of the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log.filter_directives())),
        )
        .with_thread_names(true)
        .init();

    info!(
        config        = ?cli.config,
        duration_secs = cli.duration_secs,
        tti_us        = cli.tti_us,
        burst_every   = cli.burst_every,
        burst_len     = cli.burst_len,
        uplink_pps    = cli.uplink_pps,
        "radio-sim starting"
    );

    // ── Bring the stack up ────────────────────────────────────────────────────
    let stack = Arc::new(UeStack::new(config).context("Failed to create stack")?);
    let (layers, _bearers) = sim_layers(&settings);
    stack
        .init(layers, Arc::new(SimRadio::new(&settings)), file_captures())
        .context("Failed to initialise stack")?;
    stack.enable_data();

    let radio_stop = Arc::new(AtomicBool::new(false));
    let uplink_stop = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicU64::new(0));
    let radio = spawn_radio_sync(Arc::clone(&stack), Arc::clone(&radio_stop), &cli)?;
    let uplink = spawn_ip_uplink(
        Arc::clone(&stack),
        Arc::clone(&uplink_stop),
        Arc::clone(&dropped),
        cli.uplink_pps,
    )?;

    // ── Run until Ctrl-C or the deadline ──────────────────────────────────────
    let run_for = tokio::time::sleep(Duration::from_secs(cli.duration_secs));
    tokio::pin!(run_for);
    let mut report = tokio::time::interval(Duration::from_secs(cli.metrics_period_secs.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
            _ = &mut run_for => break,
            _ = report.tick() => {
                let s = Arc::clone(&stack);
                match tokio::task::spawn_blocking(move || s.query_metrics()).await? {
                    Ok(m) => info!(
                        tti = ?m.executor.current_tti,
                        ticks = m.executor.ticks_processed,
                        attached = m.is_attached(),
                        ul_bytes = m.rlc.ul_bytes,
                        uplink_dropped = dropped.load(Ordering::Relaxed),
                        "metrics"
                    ),
                    Err(e) => warn!("metrics unavailable: {e}"),
                }
            }
        }
    }

    // ── Detach and tear down ──────────────────────────────────────────────────
    // The clock keeps running during the detach so MAC can drain SRB1.
    stop_thread(&uplink_stop, uplink, "ip-uplink").await?;

    let s = Arc::clone(&stack);
    let metrics = tokio::task::spawn_blocking(move || s.query_metrics()).await??;
    let s = Arc::clone(&stack);
    let detached = tokio::task::spawn_blocking(move || s.stop_radio_attach(true)).await?;
    if !detached {
        warn!("graceful detach did not complete");
    }

    stop_thread(&radio_stop, radio, "radio-sync").await?;
    let s = Arc::clone(&stack);
    tokio::task::spawn_blocking(move || s.shutdown()).await?;

    println!("{}", serde_yaml::to_string(&metrics).context("Failed to render metrics")?);
    info!(
        detached,
        uplink_dropped = dropped.load(Ordering::Relaxed),
        "radio-sim finished"
    );
    Ok(())
}

// ── Producer threads ──────────────────────────────────────────────────────────

/// Reports ticks like a radio front-end: one per `tti_us`, with an optional
/// stall followed by a catch-up batch every `burst_every` ticks.
fn spawn_radio_sync(stack: Arc<UeStack>, stop: Arc<AtomicBool>, cli: &Cli) -> Result<thread::JoinHandle<()>> {
    let period = Duration::from_micros(cli.tti_us.max(1));
    let burst_every = cli.burst_every;
    let burst_len = cli.burst_len.max(1);

    thread::Builder::new()
        .name("radio-sync".to_string())
        .spawn(move || {
            stack.notify_sync(SyncEvent::InSync);
            let mut tti: u32 = 0;
            let mut since_burst: u32 = 0;
            while !stop.load(Ordering::Relaxed) {
                let jump = if burst_every > 0 && since_burst >= burst_every {
                    since_burst = 0;
                    burst_len
                } else {
                    since_burst += 1;
                    1
                };
                thread::sleep(period * jump);
                tti = (tti + jump) % TTI_WRAP;
                stack.advance_tick(tti, jump);
            }
        })
        .context("Failed to spawn radio-sync thread")
}

/// Offers uplink SDUs at a fixed rate through the non-blocking path.
fn spawn_ip_uplink(
    stack: Arc<UeStack>,
    stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    pps: u64,
) -> Result<thread::JoinHandle<()>> {
    let period = Duration::from_micros(1_000_000 / pps.max(1));

    thread::Builder::new()
        .name("ip-uplink".to_string())
        .spawn(move || {
            let mut seq: u64 = 0;
            while !stop.load(Ordering::Relaxed) {
                let sdu = seq.to_be_bytes().repeat(8);
                if !stack.submit_uplink(LCID_DRB1, sdu, false) {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
                seq += 1;
                thread::sleep(period);
            }
        })
        .context("Failed to spawn ip-uplink thread")
}

async fn stop_thread(stop: &AtomicBool, handle: thread::JoinHandle<()>, name: &'static str) -> Result<()> {
    stop.store(true, Ordering::Relaxed);
    let joined = tokio::task::spawn_blocking(move || handle.join()).await?;
    if joined.is_err() {
        error!(thread = name, "producer thread panicked");
    }
    Ok(())
}
