//! Per-frame identity labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status string published for a face that matched nobody in the gallery.
pub const UNKNOWN_STATUS: &str = "Desconhecido";

/// Status string published when nobody is in front of the camera.
pub const NO_FACE_STATUS: &str = "Nenhum Rosto Detectado";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LabelError {
    #[error("known-face name must not be empty")]
    EmptyName,
}

/// Display name of a person enrolled in the gallery.
///
/// Always non-empty and trimmed, so a `Label::Known` can never carry a
/// blank identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, LabelError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(LabelError::EmptyName);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Name {
    type Error = LabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Name::new(value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Best-guess identity for the most prominent face in one frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Known(Name),
    Unknown,
    NoFaceDetected,
}

impl Label {
    /// Shorthand for `Label::Known(Name::new(name)?)`.
    pub fn known(name: impl AsRef<str>) -> Result<Self, LabelError> {
        Name::new(name).map(Label::Known)
    }

    /// True for `Known` and `Unknown`, i.e. some face was in the frame.
    pub fn is_face(&self) -> bool {
        !matches!(self, Label::NoFaceDetected)
    }

    /// The string published on the status topic and written to the event log.
    pub fn status_str(&self) -> &str {
        match self {
            Label::Known(name) => name.as_str(),
            Label::Unknown => UNKNOWN_STATUS,
            Label::NoFaceDetected => NO_FACE_STATUS,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_rejects_blank() {
        assert_eq!(Name::new(""), Err(LabelError::EmptyName));
        assert_eq!(Name::new("   \t"), Err(LabelError::EmptyName));
    }

    #[test]
    fn test_name_is_trimmed() {
        let name = Name::new("  Ana Souza ").unwrap();
        assert_eq!(name.as_str(), "Ana Souza");
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(Label::known("Ana").unwrap().status_str(), "Ana");
        assert_eq!(Label::Unknown.status_str(), UNKNOWN_STATUS);
        assert_eq!(Label::NoFaceDetected.status_str(), NO_FACE_STATUS);
    }

    #[test]
    fn test_is_face() {
        assert!(Label::known("Ana").unwrap().is_face());
        assert!(Label::Unknown.is_face());
        assert!(!Label::NoFaceDetected.is_face());
    }

    #[test]
    fn test_name_deserialize_validates() {
        let ok: Result<Name, _> = serde_json::from_str("\"Bruno\"");
        assert_eq!(ok.unwrap().as_str(), "Bruno");
        let bad: Result<Name, _> = serde_json::from_str("\"  \"");
        assert!(bad.is_err());
    }
}
