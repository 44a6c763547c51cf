mod config;
mod logging;
mod tone;

use config::RunnerConfig;
use rtblock_engine::{Driver, DriverState, PosixDomain, Promoter, Scheduler, SimHardware, SubmitError, TimeBase};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal::unix::{SignalKind, signal};
use tone::{Tone, ToneEvent};
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "rtblock.toml";
const STEPS_HZ: [f32; 4] = [220.0, 330.0, 440.0, 660.0];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = RunnerConfig::load(&path)?;
    info!("Loaded configuration from {}", path.display());

    let promoter = Promoter::new(PosixDomain::new(config.driver.lock_memory));
    let mut driver = Driver::<ToneEvent>::new(config.driver.clone(), promoter)?;
    let hw = SimHardware::new(config.demo.sim_options());
    let params = driver.start(hw, Tone::new(config.demo.frequency_hz, config.demo.gain))?;
    info!(
        "Driver running at {} Hz, {} frames per block",
        params.sample_rate, params.block_frames
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let events = tokio::spawn(submit_events(
        driver.scheduler(),
        driver.time_base(),
        config.clone(),
        shutdown.clone(),
    ));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let run_for = config.demo.run_for();

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
        _ = sleep_or_forever(run_for) => info!("Run time elapsed, shutting down..."),
        _ = wait_for_exit(&driver) => warn!("Driver stopped on its own"),
    }

    shutdown.store(true, Ordering::Relaxed);
    let _ = tokio::time::timeout(tokio::time::Duration::from_secs(1), events).await;

    let driver = tokio::task::spawn_blocking(move || {
        if let Err(e) = driver.stop() {
            error!("Driver did not stop cleanly: {}", e);
        }
        driver
    })
    .await?;

    println!("{}", serde_json::to_string_pretty(&driver.stats())?);
    println!("{}", serde_json::to_string_pretty(&driver.clock())?);
    info!("rtblock stopped");
    Ok(())
}

async fn sleep_or_forever(run_for: Option<std::time::Duration>) {
    match run_for {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

async fn wait_for_exit(driver: &Driver<ToneEvent>) {
    let mut tick = tokio::time::interval(tokio::time::Duration::from_millis(100));
    loop {
        tick.tick().await;
        if driver.state() == DriverState::Stopped {
            return;
        }
    }
}

/// Schedules a frequency step every interval, slightly ahead of now, and a
/// gain dip halfway between steps.
async fn submit_events(scheduler: Scheduler<ToneEvent>, base: TimeBase, config: RunnerConfig, shutdown: Arc<AtomicBool>) {
    let interval = config.demo.event_interval();
    let lead = config.demo.lead();
    let mut tick = tokio::time::interval(interval);
    let mut step = 0_usize;
    while !shutdown.load(Ordering::Relaxed) {
        tick.tick().await;
        let deadline = base.after(lead);
        let hz = STEPS_HZ[step % STEPS_HZ.len()];
        let dip = deadline.saturating_add(base.duration(interval / 2));
        for (at, event) in [
            (deadline, ToneEvent::Frequency(hz)),
            (deadline, ToneEvent::Gain(config.demo.gain)),
            (dip, ToneEvent::Gain(config.demo.gain * 0.5)),
        ] {
            match scheduler.submit(at, event) {
                Ok(()) => {}
                Err(SubmitError::Closed(_)) => return,
                Err(e) => warn!("Dropped tone event: {}", e),
            }
        }
        step += 1;
    }
}
