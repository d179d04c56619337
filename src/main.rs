use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use particle_detect::arbiter::Arbiter;
use particle_detect::config::{Cli, Config};
use particle_detect::link::{spawn_reader, Actuator, LogActuator, SensorLink, SerialActuator};
use particle_detect::pipeline::PacketPipeline;
use particle_detect::recorder::Recorder;

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // Set RUST_LOG=debug for per-packet output, e.g.:
    //   RUST_LOG=particle_detect=debug cargo run -- 500 750 1000 1250
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config = Config::try_from(Cli::parse()).context("invalid configuration")?;
    info!(
        "{} electrode(s) at {:?}, threshold {}",
        config.locations.len(),
        config.locations,
        config.threshold
    );

    // ── Actuator ──────────────────────────────────────────────────────────────
    match &config.actuator {
        Some(path) => {
            let actuator = SerialActuator::open(path)
                .await
                .with_context(|| format!("opening actuator {}", path.display()))?;
            run(&config, actuator).await
        }
        None => {
            warn!("no actuator configured, detections are only logged");
            run(&config, LogActuator).await
        }
    }
}

async fn run<A: Actuator>(config: &Config, actuator: A) -> Result<()> {
    let recorder = Recorder::open(&config.recorder, config.locations.len())
        .context("opening output files")?;
    let mut pipeline = PacketPipeline::new(
        &config.locations,
        Arbiter::new(config.threshold),
        actuator,
        recorder,
    )?;

    // ── Connect ───────────────────────────────────────────────────────────────
    let link = SensorLink::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;
    let stream = link.accept().await.context("accepting sensor connection")?;
    let (packets, reader) = spawn_reader(stream, config.queue);

    // ── Main loop ─────────────────────────────────────────────────────────────
    // Runs until the sensor closes the connection or Ctrl-C is pressed.
    tokio::select! {
        _ = pipeline.run(packets) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }
    let stats = pipeline.finish();

    if !reader.is_finished() {
        reader.abort();
    }
    match reader.await {
        Ok(Err(e)) => error!("sensor link error: {e}"),
        Ok(Ok(_)) => {}
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!("reader task failed: {e}"),
    }

    info!(
        "{} packet(s), {} rejected, {} failed, {} detection(s)",
        stats.packets, stats.malformed, stats.failed, stats.detections
    );
    Ok(())
}
