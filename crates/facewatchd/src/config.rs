use facewatch_core::RecognitionConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for {key}")]
    Env { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// MQTT broker connection and topic layout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    /// Retained status string of the confirmed identity.
    pub state_topic: String,
    pub door_topic: String,
    pub alert_topic: String,
    /// `online` / `offline`, retained; `offline` is also the last will.
    pub availability_topic: String,
    pub discovery_prefix: String,
    pub node_id: String,
    /// Publish Home Assistant discovery configs on connect.
    pub discovery: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "facewatch".to_string(),
            state_topic: "face_recognition/status".to_string(),
            door_topic: "face_recognition/door_control".to_string(),
            alert_topic: "face_recognition/alert".to_string(),
            availability_topic: "face_recognition/availability".to_string(),
            discovery_prefix: "homeassistant".to_string(),
            node_id: "facial_recognition_cam".to_string(),
            discovery: true,
        }
    }
}

/// Daemon configuration: defaults, then a TOML file, then `FACEWATCH_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recognition: RecognitionConfig,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Frames discarded at startup while the camera's auto-exposure settles.
    pub warmup_frames: usize,
    /// Consecutive capture failures after which the daemon gives up.
    pub max_capture_failures: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub known_faces_dir: PathBuf,
    /// Where unknown-face snapshots are written.
    pub unknown_faces_dir: PathBuf,
    /// CSV history of confirmed identities.
    pub log_file: PathBuf,
    pub mqtt: MqttConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recognition: RecognitionConfig::default(),
            camera_device: "/dev/video0".to_string(),
            warmup_frames: 4,
            max_capture_failures: 50,
            model_dir: facewatch_core::default_model_dir(),
            known_faces_dir: PathBuf::from("known_faces"),
            unknown_faces_dir: PathBuf::from("unknown_faces"),
            log_file: PathBuf::from("recognition_history.csv"),
            mqtt: MqttConfig::default(),
        }
    }
}

impl Config {
    /// Load from the file named by `FACEWATCH_CONFIG` (if any) and the
    /// process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` in place of the process environment.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("FACEWATCH_CONFIG").filter(|p| !p.is_empty()) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: &F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rec = &mut self.recognition;
        env_parse(lookup, "FACEWATCH_CONFIRMATION_THRESHOLD", &mut rec.confirmation_threshold)?;
        env_parse(lookup, "FACEWATCH_INACTIVITY_TIMEOUT_SECS", &mut rec.inactivity_timeout_secs)?;
        env_parse(lookup, "FACEWATCH_ALERT_INTERVAL_SECS", &mut rec.alert_interval_secs)?;
        env_parse(lookup, "FACEWATCH_DISTANCE_TOLERANCE", &mut rec.distance_tolerance)?;

        env_parse(lookup, "FACEWATCH_CAMERA_DEVICE", &mut self.camera_device)?;
        env_parse(lookup, "FACEWATCH_WARMUP_FRAMES", &mut self.warmup_frames)?;
        env_parse(lookup, "FACEWATCH_MAX_CAPTURE_FAILURES", &mut self.max_capture_failures)?;
        env_parse(lookup, "FACEWATCH_MODEL_DIR", &mut self.model_dir)?;
        env_parse(lookup, "FACEWATCH_KNOWN_FACES_DIR", &mut self.known_faces_dir)?;
        env_parse(lookup, "FACEWATCH_UNKNOWN_FACES_DIR", &mut self.unknown_faces_dir)?;
        env_parse(lookup, "FACEWATCH_LOG_FILE", &mut self.log_file)?;

        let mqtt = &mut self.mqtt;
        env_parse(lookup, "FACEWATCH_MQTT_HOST", &mut mqtt.host)?;
        env_parse(lookup, "FACEWATCH_MQTT_PORT", &mut mqtt.port)?;
        env_parse(lookup, "FACEWATCH_MQTT_CLIENT_ID", &mut mqtt.client_id)?;
        env_parse(lookup, "FACEWATCH_DISCOVERY_PREFIX", &mut mqtt.discovery_prefix)?;
        if let Some(user) = lookup("FACEWATCH_MQTT_USERNAME") {
            mqtt.username = Some(user);
        }
        if let Some(pass) = lookup("FACEWATCH_MQTT_PASSWORD") {
            mqtt.password = Some(pass);
        }
        if let Some(flag) = lookup("FACEWATCH_DISCOVERY") {
            mqtt.discovery = flag != "0";
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tolerance = self.recognition.distance_tolerance;
        if self.recognition.confirmation_threshold == 0 {
            return Err(ConfigError::Invalid(
                "recognition.confirmation_threshold must be at least 1".to_string(),
            ));
        }
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "recognition.distance_tolerance must be a positive number, got {tolerance}"
            )));
        }
        if self.max_capture_failures == 0 {
            return Err(ConfigError::Invalid(
                "max_capture_failures must be at least 1".to_string(),
            ));
        }
        if self.mqtt.host.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.host must not be empty".to_string()));
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join(facewatch_core::SCRFD_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join(facewatch_core::ARCFACE_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

/// Overwrite `slot` with the parsed value of `key` when it is set.
fn env_parse<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(value) = lookup(key) else {
        return Ok(());
    };
    *slot = value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value,
    })?;
    Ok(())
}
