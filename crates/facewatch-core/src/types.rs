use crate::label::Name;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = ((self.x + self.width).min(other.x + other.width) - self.x.max(other.x)).max(0.0);
        let iy =
            ((self.y + self.height).min(other.y + other.height) - self.y.max(other.y)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Factor applied to the Euclidean distance between two unit ArcFace
/// embeddings before it is compared with a tolerance.
///
/// Two unit vectors with cosine similarity 0.40 are `sqrt(2 - 2 * 0.40)`
/// apart (about 1.095). Scaling by `0.6 / 1.095` puts the default tolerance of
/// 0.6 at that operating point; cosine `c` maps to `0.548 * sqrt(2 - 2c)`.
pub const ARCFACE_DISTANCE_SCALE: f32 = 0.6 / 1.095_445;

/// Face embedding vector (512-dimensional for ArcFace, L2-normalised).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Euclidean distance between two embeddings. Lower = more similar.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Distance on the tolerance scale: Euclidean distance times
    /// [`ARCFACE_DISTANCE_SCALE`].
    pub fn match_distance(&self, other: &Embedding) -> f32 {
        self.distance(other) * ARCFACE_DISTANCE_SCALE
    }
}

/// A person enrolled from the known-faces directory.
#[derive(Debug, Clone)]
pub struct KnownFace {
    pub name: Name,
    pub embedding: Embedding,
    /// Image the embedding was extracted from.
    pub source: PathBuf,
}

/// Result of matching a probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Best-matching name, present only when within tolerance.
    pub name: Option<Name>,
    /// Scaled distance to the nearest gallery entry (`f32::INFINITY` for an
    /// empty gallery).
    pub distance: f32,
}

/// Strategy for comparing a probe embedding against enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[KnownFace]) -> MatchResult;
}

/// Nearest-neighbour matcher: the closest enrolled face wins if its
/// [`Embedding::match_distance`] is strictly below `tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct DistanceMatcher {
    pub tolerance: f32,
}

impl Matcher for DistanceMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[KnownFace]) -> MatchResult {
        let nearest = gallery
            .iter()
            .map(|face| (face, probe.match_distance(&face.embedding)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((face, distance)) if distance < self.tolerance => MatchResult {
                name: Some(face.name.clone()),
                distance,
            },
            Some((_, distance)) => MatchResult {
                name: None,
                distance,
            },
            None => MatchResult {
                name: None,
                distance: f32::INFINITY,
            },
        }
    }
}
