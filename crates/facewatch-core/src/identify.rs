//! Frame → label identification.

use crate::detector::{DetectorError, FaceDetector};
use crate::gallery::{self, GalleryError};
use crate::label::Label;
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, DistanceMatcher, Embedding, KnownFace, Matcher};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

/// Produces the best-guess label for the most prominent face in a frame.
///
/// Implementations must not fail: internal errors are reported as
/// `Label::NoFaceDetected`.
pub trait IdentitySource {
    fn identify(&mut self, frame: &RgbImage) -> Label;
}

#[derive(Error, Debug)]
pub enum IdentifyError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Detailed result of identifying one frame.
#[derive(Debug, Clone)]
pub struct Identification {
    pub label: Label,
    /// The face the label refers to, if any.
    pub face: Option<BoundingBox>,
    /// Distance to the nearest gallery entry, if a face was embedded.
    pub distance: Option<f32>,
}

/// Pick the most prominent face: largest box, then highest confidence.
pub fn most_prominent(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    faces.iter().max_by(|a, b| {
        a.area()
            .total_cmp(&b.area())
            .then(a.confidence.total_cmp(&b.confidence))
    })
}

/// SCRFD + ArcFace identity source matching against a known-face gallery.
pub struct FaceIdentifier {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    matcher: DistanceMatcher,
    gallery: Vec<KnownFace>,
}

impl FaceIdentifier {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer, tolerance: f32) -> Self {
        Self {
            detector,
            recognizer,
            matcher: DistanceMatcher { tolerance },
            gallery: Vec::new(),
        }
    }

    /// Load both models from disk.
    pub fn load(scrfd_path: &str, arcface_path: &str, tolerance: f32) -> Result<Self, IdentifyError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self::new(detector, recognizer, tolerance))
    }

    /// Replace the gallery with the portraits found in `dir`.
    pub fn enroll_dir(&mut self, dir: &Path) -> Result<usize, GalleryError> {
        let gallery = gallery::load_dir(dir, |image| {
            self.embed_prominent(image).map(|found| found.map(|(_, emb)| emb))
        })?;
        self.gallery = gallery;
        Ok(self.gallery.len())
    }

    pub fn gallery(&self) -> &[KnownFace] {
        &self.gallery
    }

    /// Detect faces and embed the most prominent one.
    pub fn embed_prominent(
        &mut self,
        frame: &RgbImage,
    ) -> Result<Option<(BoundingBox, Embedding)>, IdentifyError> {
        let faces = self.detector.detect(frame)?;
        let Some(face) = most_prominent(&faces) else {
            return Ok(None);
        };
        let embedding = self.recognizer.extract(frame, face)?;
        Ok(Some((face.clone(), embedding)))
    }

    /// Identify a frame, keeping the face box and match distance.
    pub fn try_identify(&mut self, frame: &RgbImage) -> Result<Identification, IdentifyError> {
        let Some((face, embedding)) = self.embed_prominent(frame)? else {
            return Ok(Identification {
                label: Label::NoFaceDetected,
                face: None,
                distance: None,
            });
        };

        let result = self.matcher.compare(&embedding, &self.gallery);
        let label = result.name.map(Label::Known).unwrap_or(Label::Unknown);
        tracing::trace!(
            label = %label,
            distance = result.distance,
            confidence = face.confidence,
            "frame identified"
        );

        Ok(Identification {
            label,
            face: Some(face),
            distance: Some(result.distance).filter(|d| d.is_finite()),
        })
    }
}

impl IdentitySource for FaceIdentifier {
    fn identify(&mut self, frame: &RgbImage) -> Label {
        match self.try_identify(frame) {
            Ok(id) => id.label,
            Err(e) => {
                tracing::warn!(error = %e, "identification failed; treating frame as empty");
                Label::NoFaceDetected
            }
        }
    }
}
