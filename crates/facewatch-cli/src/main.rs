use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use facewatch_core::{
    AlertEvent, DoorCommand, EventSink, FaceIdentifier, IdentityEvent, Label, Name, Pipeline,
    RecognitionConfig,
};
use facewatch_hw::{Camera, FrameSource};
use image::RgbImage;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facewatch", about = "facewatch face recognition tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ModelArgs {
    /// Directory containing det_10g.onnx and w600k_r50.onnx
    #[arg(long, env = "FACEWATCH_MODEL_DIR")]
    model_dir: Option<PathBuf>,
    /// Directory of known-face portraits (one person per file)
    #[arg(long, env = "FACEWATCH_KNOWN_FACES_DIR", default_value = "known_faces")]
    known_faces: PathBuf,
    /// Maximum embedding distance for a match
    #[arg(long, env = "FACEWATCH_DISTANCE_TOLERANCE", default_value_t = 0.6)]
    tolerance: f32,
}

impl ModelArgs {
    fn load(&self) -> Result<FaceIdentifier> {
        let dir = self
            .model_dir
            .clone()
            .unwrap_or_else(facewatch_core::default_model_dir);
        let scrfd = dir.join(facewatch_core::SCRFD_MODEL_FILE);
        let arcface = dir.join(facewatch_core::ARCFACE_MODEL_FILE);
        let mut identifier = FaceIdentifier::load(
            &scrfd.to_string_lossy(),
            &arcface.to_string_lossy(),
            self.tolerance,
        )
        .with_context(|| format!("failed to load models from {}", dir.display()))?;
        identifier
            .enroll_dir(&self.known_faces)
            .context("failed to load known faces")?;
        Ok(identifier)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List V4L2 capture devices
    Devices,
    /// Capture one frame to a JPEG file
    Snapshot {
        #[arg(short, long, env = "FACEWATCH_CAMERA_DEVICE", default_value = "/dev/video0")]
        device: String,
        #[arg(short, long, default_value = "snapshot.jpg")]
        output: PathBuf,
        /// Frames to discard before capturing
        #[arg(long, default_value_t = 4)]
        warmup: usize,
    },
    /// Load the known-face gallery and list who is in it
    Gallery {
        #[command(flatten)]
        models: ModelArgs,
    },
    /// Identify the most prominent face in an image file
    Identify {
        image: PathBuf,
        #[command(flatten)]
        models: ModelArgs,
    },
    /// Replay a label timeline through the debounce pipeline
    ///
    /// Each line is `<seconds> <label>`, where label is a name, `?` for an
    /// unknown face or `-` for no face. Blank lines and `#` comments are ignored.
    Simulate {
        timeline: PathBuf,
        #[arg(long, env = "FACEWATCH_CONFIRMATION_THRESHOLD", default_value_t = 5)]
        threshold: u32,
        #[arg(long, env = "FACEWATCH_INACTIVITY_TIMEOUT_SECS", default_value_t = 30)]
        inactivity_timeout: u64,
        #[arg(long, env = "FACEWATCH_ALERT_INTERVAL_SECS", default_value_t = 10)]
        alert_interval: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Snapshot {
            device,
            output,
            warmup,
        } => snapshot(&device, &output, warmup)?,
        Commands::Gallery { models } => {
            let identifier = models.load()?;
            for face in identifier.gallery() {
                println!("{}  <- {}", face.name, face.source.display());
            }
            println!("{} known face(s)", identifier.gallery().len());
        }
        Commands::Identify { image, models } => {
            let mut identifier = models.load()?;
            let frame = image::open(&image)
                .with_context(|| format!("failed to open {}", image.display()))?
                .to_rgb8();
            let id = identifier.try_identify(&frame)?;
            println!("{}", id.label);
            if let Some(face) = id.face {
                println!(
                    "  face: x={:.0} y={:.0} w={:.0} h={:.0} confidence={:.3}",
                    face.x, face.y, face.width, face.height, face.confidence
                );
            }
            if let Some(distance) = id.distance {
                println!("  nearest distance: {distance:.4} (tolerance {})", models.tolerance);
            }
        }
        Commands::Simulate {
            timeline,
            threshold,
            inactivity_timeout,
            alert_interval,
        } => {
            let text = std::fs::read_to_string(&timeline)
                .with_context(|| format!("failed to read {}", timeline.display()))?;
            let steps = parse_timeline(&text)?;
            let config = RecognitionConfig {
                confirmation_threshold: threshold,
                inactivity_timeout_secs: inactivity_timeout,
                alert_interval_secs: alert_interval,
                ..Default::default()
            };
            for line in simulate(&steps, &config) {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn snapshot(device: &str, output: &Path, warmup: usize) -> Result<()> {
    let camera = Camera::open(device)?;
    let mut stream = camera.stream()?;
    for _ in 0..warmup {
        let _ = stream.next_frame();
    }
    let frame = stream.next_frame()?;
    if frame.is_dark() {
        tracing::warn!(brightness = frame.avg_brightness(), "captured frame is very dark");
    }
    frame
        .image
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Saved {}x{} frame to {}",
        frame.width(),
        frame.height(),
        output.display()
    );
    Ok(())
}

/// Largest timeline offset accepted (about 100 years).
const MAX_TIMELINE_SECS: f64 = 3.2e9;

/// Parse `<seconds> <label>` lines into time offsets and labels.
fn parse_timeline(text: &str) -> Result<Vec<(TimeDelta, Label)>> {
    let mut steps = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let lineno = idx + 1;
        let Some((secs, label)) = line.split_once(char::is_whitespace) else {
            bail!("line {lineno}: expected `<seconds> <label>`");
        };
        let secs: f64 = secs
            .parse()
            .with_context(|| format!("line {lineno}: invalid seconds {secs:?}"))?;
        if !secs.is_finite() || secs < 0.0 {
            bail!("line {lineno}: seconds must be a non-negative number");
        }
        if secs > MAX_TIMELINE_SECS {
            bail!("line {lineno}: offset {secs} exceeds {MAX_TIMELINE_SECS} seconds");
        }
        let label = match label.trim() {
            "?" => Label::Unknown,
            "-" => Label::NoFaceDetected,
            name => Label::Known(
                Name::new(name).with_context(|| format!("line {lineno}: invalid name"))?,
            ),
        };
        steps.push((TimeDelta::milliseconds((secs * 1000.0).round() as i64), label));
    }
    Ok(steps)
}

/// Collects sink calls as printable lines.
#[derive(Default)]
struct PrintSink {
    started_at: Option<DateTime<Utc>>,
    lines: Vec<String>,
}

impl PrintSink {
    fn offset(&self, ts: DateTime<Utc>) -> String {
        let start = self.started_at.unwrap_or(ts);
        let ms = (ts - start).num_milliseconds();
        format!("{:>8.1}s", ms as f64 / 1000.0)
    }
}

impl EventSink for PrintSink {
    fn on_identity(&mut self, event: &IdentityEvent) {
        let line = format!("{}  status  {}", self.offset(event.timestamp), event.label);
        self.lines.push(line);
    }

    fn on_door_open(&mut self, command: &DoorCommand) {
        self.lines.push(format!("{:>9}  door    open for {}", "", command.user));
    }

    fn on_alert(&mut self, event: &AlertEvent, _evidence: &RgbImage) {
        let line = format!("{}  alert   {}", self.offset(event.timestamp), event.message);
        self.lines.push(line);
    }
}

fn simulate(steps: &[(TimeDelta, Label)], config: &RecognitionConfig) -> Vec<String> {
    let start = DateTime::<Utc>::UNIX_EPOCH;
    let mut pipeline = Pipeline::new(config, start);
    let mut sink = PrintSink {
        started_at: Some(start),
        lines: Vec::new(),
    };
    let frame = RgbImage::new(1, 1);

    for (offset, label) in steps {
        pipeline.observe(label.clone(), &frame, &mut sink, start + *offset);
    }
    sink.lines
}
