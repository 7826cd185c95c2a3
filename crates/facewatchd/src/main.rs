use anyhow::{Context, Result};
use facewatch_core::FaceIdentifier;
use facewatch_hw::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod mqtt;
mod sink;

use config::Config;
use sink::{ChannelSink, CsvLog, SinkWorker};

const SINK_QUEUE_CAPACITY: usize = 64;
const SINK_DRAIN_GRACE: Duration = Duration::from_secs(10);
const MQTT_SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facewatchd starting");

    let config = Config::load().context("failed to load configuration")?;

    // Open camera and load models synchronously (fail-fast)
    let camera = Camera::open(&config.camera_device)
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        format = ?camera.pixel_format(),
        "camera opened"
    );

    let mut identifier = FaceIdentifier::load(
        &config.scrfd_model_path(),
        &config.arcface_model_path(),
        config.recognition.distance_tolerance,
    )
    .context("failed to load face models")?;
    let known = identifier
        .enroll_dir(&config.known_faces_dir)
        .context("failed to load known faces")?;
    tracing::info!(count = known, "known faces enrolled");

    let (client, eventloop) = mqtt::connect(&config.mqtt);
    let mqtt_task = tokio::spawn(mqtt::run_event_loop(
        eventloop,
        client.clone(),
        config.mqtt.clone(),
    ));

    let (tx, rx) = mpsc::channel(SINK_QUEUE_CAPACITY);
    let worker = SinkWorker::new(
        client.clone(),
        config.mqtt.clone(),
        CsvLog::new(&config.log_file),
        config.unknown_faces_dir.clone(),
    );
    let worker_task = tokio::spawn(worker.run(rx));

    let stop = Arc::new(AtomicBool::new(false));
    let engine_thread = engine::spawn_engine(
        camera,
        identifier,
        ChannelSink::new(tx),
        &config,
        Arc::clone(&stop),
    )
    .context("failed to spawn engine thread")?;
    let mut engine_done = tokio::task::spawn_blocking(move || engine_thread.join());

    tracing::info!("facewatchd ready");

    let finished_early = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            stop_on_err(&stop, signal).context("failed to listen for shutdown signal")?;
            tracing::info!("facewatchd shutting down");
            None
        }
        joined = &mut engine_done => {
            tracing::warn!("engine stopped on its own");
            Some(joined)
        }
    };
    stop.store(true, Ordering::Relaxed);

    let joined = match finished_early {
        Some(joined) => joined,
        None => engine_done.await,
    };
    let engine_result = joined.context("engine join task failed")?;

    // The engine dropped its sender; let the worker drain what is queued.
    match tokio::time::timeout(SINK_DRAIN_GRACE, worker_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "sink worker failed"),
        Err(_) => tracing::warn!("sink worker did not drain in time; dropping queued events"),
    }

    mqtt::shutdown(&client, &config.mqtt);
    if tokio::time::timeout(MQTT_SHUTDOWN_GRACE, mqtt_task).await.is_err() {
        tracing::warn!("MQTT event loop did not finish in time");
    }

    match engine_result {
        Ok(Ok(())) => {
            tracing::info!("facewatchd stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(e).context("recognition loop failed"),
        Err(_) => anyhow::bail!("engine thread panicked"),
    }
}

/// Raise `stop` before an error is propagated, so the engine thread does
/// not outlive `main`.
fn stop_on_err<T, E>(stop: &AtomicBool, result: Result<T, E>) -> Result<T, E> {
    if result.is_err() {
        stop.store(true, Ordering::Relaxed);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_error_raises_stop() {
        let stop = AtomicBool::new(false);
        let failed: std::io::Result<()> = Err(std::io::Error::other("no signal handler"));
        assert!(stop_on_err(&stop, failed).is_err());
        assert!(stop.load(Ordering::Relaxed));
    }

    #[test]
    fn test_signal_ok_leaves_stop_clear() {
        let stop = AtomicBool::new(false);
        assert!(stop_on_err(&stop, Ok::<(), std::io::Error>(())).is_ok());
        assert!(!stop.load(Ordering::Relaxed));
    }
}
