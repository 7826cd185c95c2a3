//! facewatch-core: identity debouncing and face identification.
//!
//! Turns a noisy per-frame label stream into confirmed identity changes,
//! throttles unknown-face alerts, and provides the SCRFD + ArcFace identity
//! source that produces those labels from camera frames.

pub mod alignment;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod detector;
pub mod events;
pub mod gallery;
pub mod identify;
pub mod label;
pub mod pipeline;
pub mod recognizer;
pub mod sink;
pub mod throttle;
pub mod types;

use std::path::PathBuf;

pub use clock::{Clock, SystemClock};
pub use config::RecognitionConfig;
pub use debounce::DebounceEngine;
pub use events::{AlertEvent, DoorCommand, IdentityEvent};
pub use identify::{FaceIdentifier, IdentitySource};
pub use label::{Label, Name};
pub use pipeline::{Pipeline, TickOutcome};
pub use sink::EventSink;
pub use throttle::AlertThrottle;
pub use types::{BoundingBox, Embedding, KnownFace, ARCFACE_DISTANCE_SCALE};

/// SCRFD detection model file name.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// ArcFace recognition model file name.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default model directory: `$XDG_DATA_HOME/facewatch/models`, falling back
/// to `~/.local/share/facewatch/models`.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var_os("XDG_DATA_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("/usr/share"));
    data_home.join("facewatch").join("models")
}
