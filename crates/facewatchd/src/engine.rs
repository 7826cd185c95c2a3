use crate::config::Config;
use crate::sink::ChannelSink;
use facewatch_core::{Clock, EventSink, FaceIdentifier, IdentitySource, Pipeline, RecognitionConfig, SystemClock};
use facewatch_hw::{Camera, CameraError, FrameSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("giving up after {count} consecutive capture failures (last: {last})")]
    CaptureFailures { count: u32, last: CameraError },
}

/// The capture → identify → debounce loop for one stream.
pub struct TickLoop<F, I, S, C> {
    frames: F,
    identity: I,
    sink: S,
    clock: C,
    pipeline: Pipeline,
    max_capture_failures: u32,
    retry_delay: Duration,
}

impl<F, I, S, C> TickLoop<F, I, S, C>
where
    F: FrameSource,
    I: IdentitySource,
    S: EventSink,
    C: Clock,
{
    pub fn new(
        frames: F,
        identity: I,
        sink: S,
        clock: C,
        recognition: &RecognitionConfig,
        max_capture_failures: u32,
    ) -> Self {
        let pipeline = Pipeline::new(recognition, clock.now());
        Self {
            frames,
            identity,
            sink,
            clock,
            pipeline,
            max_capture_failures: max_capture_failures.max(1),
            retry_delay: Duration::from_millis(100),
        }
    }

    /// Pause between a failed capture and the next attempt.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run ticks until `stop` is set or the camera is lost.
    ///
    /// A failed capture skips the tick; the pipeline never sees it.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<(), EngineError> {
        let mut failures = 0u32;

        while !stop.load(Ordering::Relaxed) {
            let frame = match self.frames.next_frame() {
                Ok(frame) => frame,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "frame capture failed; skipping tick");
                    if failures >= self.max_capture_failures {
                        return Err(EngineError::CaptureFailures {
                            count: failures,
                            last: e,
                        });
                    }
                    std::thread::sleep(self.retry_delay);
                    continue;
                }
            };
            failures = 0;

            let now = self.clock.now();
            let outcome = self
                .pipeline
                .tick(&frame.image, &mut self.identity, &mut self.sink, now);
            tracing::trace!(
                seq = frame.sequence,
                observed = %outcome.observed,
                streak = self.pipeline.debounce().streak(),
                "tick"
            );
        }

        tracing::info!("stop requested; leaving tick loop");
        Ok(())
    }
}

/// Spawn the recognition loop on a dedicated OS thread.
///
/// The thread owns the camera, the models and the pipeline. It discards
/// warmup frames, then ticks until `stop` is set or capture is lost.
pub fn spawn_engine(
    camera: Camera,
    identifier: FaceIdentifier,
    sink: ChannelSink,
    config: &Config,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<Result<(), EngineError>>> {
    let recognition = config.recognition.clone();
    let warmup_frames = config.warmup_frames;
    let max_capture_failures = config.max_capture_failures;

    std::thread::Builder::new()
        .name("facewatch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut stream = camera.stream()?;

            // Discard warmup frames for camera AGC/AE stabilization
            if warmup_frames > 0 {
                tracing::info!(count = warmup_frames, "discarding warmup frames");
                for _ in 0..warmup_frames {
                    let _ = stream.next_frame();
                }
            }

            let result = TickLoop::new(
                stream,
                identifier,
                sink,
                SystemClock,
                &recognition,
                max_capture_failures,
            )
            .run(&stop);

            tracing::info!("engine thread exiting");
            result
        })
}
