//! Delivery side of the recognition loop.
//!
//! The engine thread hands events to a [`ChannelSink`]; the async
//! [`SinkWorker`] drains the channel in order and does the slow work:
//! CSV history, unknown-face snapshots and MQTT publishes.

use crate::config::MqttConfig;
use chrono::{DateTime, Local, Utc};
use facewatch_core::{AlertEvent, DoorCommand, EventSink, IdentityEvent};
use image::RgbImage;
use serde::Serialize;
use std::fs::OpenOptions;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// One unit of work for the sink worker.
#[derive(Debug)]
pub enum SinkCommand {
    Identity(IdentityEvent),
    DoorOpen(DoorCommand),
    Alert {
        event: AlertEvent,
        evidence: RgbImage,
    },
}

/// Non-blocking [`EventSink`] that forwards everything to the sink worker.
///
/// A full queue drops the command with a warning; the engine never waits.
pub struct ChannelSink {
    tx: mpsc::Sender<SinkCommand>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SinkCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, command: SinkCommand) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(command = dropped_kind(&dropped), "sink queue full; dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                tracing::warn!(command = dropped_kind(&dropped), "sink worker gone; dropping event");
            }
        }
    }
}

fn dropped_kind(command: &SinkCommand) -> &'static str {
    match command {
        SinkCommand::Identity(_) => "identity",
        SinkCommand::DoorOpen(_) => "door_open",
        SinkCommand::Alert { .. } => "alert",
    }
}

impl EventSink for ChannelSink {
    fn on_identity(&mut self, event: &IdentityEvent) {
        self.send(SinkCommand::Identity(event.clone()));
    }

    fn on_door_open(&mut self, command: &DoorCommand) {
        self.send(SinkCommand::DoorOpen(command.clone()));
    }

    fn on_alert(&mut self, event: &AlertEvent, evidence: &RgbImage) {
        self.send(SinkCommand::Alert {
            event: event.clone(),
            evidence: evidence.clone(),
        });
    }
}

/// Append-only CSV history of confirmed identities (`timestamp,name`).
#[derive(Debug, Clone)]
pub struct CsvLog {
    path: PathBuf,
}

impl CsvLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new or empty.
    pub fn append(&self, timestamp: DateTime<Utc>, name: &str) -> Result<(), csv::Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(["timestamp", "name"])?;
        }
        let stamp = timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string();
        writer.write_record([stamp.as_str(), name])?;
        writer.flush()?;
        Ok(())
    }
}

/// Snapshot file for an alert raised at `timestamp`.
pub fn snapshot_path(dir: &Path, timestamp: DateTime<Utc>) -> PathBuf {
    dir.join(format!("unknown_{}.jpg", alert_stamp(timestamp)))
}

fn alert_stamp(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%Y%m%d_%H%M%S").to_string()
}

/// Write `evidence` as JPEG under `dir`, creating the directory on demand.
pub fn save_snapshot(
    dir: &Path,
    timestamp: DateTime<Utc>,
    evidence: &RgbImage,
) -> Result<PathBuf, image::ImageError> {
    std::fs::create_dir_all(dir)?;
    let path = snapshot_path(dir, timestamp);
    evidence.save_with_format(&path, image::ImageFormat::Jpeg)?;
    Ok(path)
}

/// JSON body published on the alert topic.
#[derive(Debug, Serialize)]
pub struct AlertPayload<'a> {
    pub message: &'a str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl<'a> AlertPayload<'a> {
    pub fn new(event: &'a AlertEvent, image_path: Option<&Path>) -> Self {
        Self {
            message: &event.message,
            timestamp: alert_stamp(event.timestamp),
            image_path: image_path.map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

/// Minimal publish capability the worker needs from an MQTT client.
pub trait Publisher {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> impl Future<Output = Result<(), rumqttc::ClientError>> + Send;
}

/// Drains [`SinkCommand`]s in order and performs their side effects.
pub struct SinkWorker<P> {
    publisher: P,
    topics: MqttConfig,
    log: CsvLog,
    unknown_faces_dir: PathBuf,
    publish_timeout: Duration,
}

impl<P: Publisher> SinkWorker<P> {
    pub fn new(publisher: P, topics: MqttConfig, log: CsvLog, unknown_faces_dir: PathBuf) -> Self {
        Self {
            publisher,
            topics,
            log,
            unknown_faces_dir,
            publish_timeout: PUBLISH_TIMEOUT,
        }
    }

    /// Longest wait for a single publish before it is abandoned.
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Process commands until every sender is dropped.
    pub async fn run(mut self, mut rx: mpsc::Receiver<SinkCommand>) {
        tracing::info!("sink worker started");
        while let Some(command) = rx.recv().await {
            self.handle(command).await;
        }
        tracing::info!("sink worker drained; exiting");
    }

    pub async fn handle(&mut self, command: SinkCommand) {
        match command {
            SinkCommand::Identity(event) => self.identity(event).await,
            SinkCommand::DoorOpen(command) => self.door_open(command).await,
            SinkCommand::Alert { event, evidence } => self.alert(event, evidence).await,
        }
    }

    async fn identity(&mut self, event: IdentityEvent) {
        let status = event.label.status_str().to_string();

        // History first; it must not depend on the broker.
        let log = self.log.clone();
        let row_status = status.clone();
        let row =
            tokio::task::spawn_blocking(move || log.append(event.timestamp, &row_status)).await;
        match row {
            Ok(Ok(())) => tracing::debug!(file = %self.log.path().display(), "history row written"),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to write history row"),
            Err(e) => tracing::warn!(error = %e, "history writer panicked"),
        }

        self.publish(&self.topics.state_topic, status.into_bytes(), true)
            .await;
    }

    async fn door_open(&mut self, command: DoorCommand) {
        match serde_json::to_vec(&command) {
            Ok(payload) => {
                tracing::info!(user = %command.user, "door open requested");
                self.publish(&self.topics.door_topic, payload, false).await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode door command"),
        }
    }

    async fn alert(&mut self, event: AlertEvent, evidence: RgbImage) {
        let dir = self.unknown_faces_dir.clone();
        let timestamp = event.timestamp;
        let saved = tokio::task::spawn_blocking(move || save_snapshot(&dir, timestamp, &evidence))
            .await;

        let image_path = match saved {
            Ok(Ok(path)) => {
                tracing::info!(path = %path.display(), "unknown face snapshot saved");
                Some(path)
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "failed to save unknown face snapshot");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "snapshot writer panicked");
                None
            }
        };

        match serde_json::to_vec(&AlertPayload::new(&event, image_path.as_deref())) {
            Ok(payload) => self.publish(&self.topics.alert_topic, payload, false).await,
            Err(e) => tracing::warn!(error = %e, "failed to encode alert"),
        }
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) {
        let publish = self.publisher.publish(topic, payload, retain);
        match tokio::time::timeout(self.publish_timeout, publish).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(topic, error = %e, "mqtt publish failed"),
            Err(_) => tracing::warn!(topic, "mqtt publish timed out; dropping message"),
        }
    }
}
