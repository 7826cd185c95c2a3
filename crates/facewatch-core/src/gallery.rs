//! Known-face gallery loaded from a directory of portraits.
//!
//! Each `.jpg`, `.jpeg` or `.png` file contributes one person; the display
//! name comes from the file stem (`joao_silva.jpg` → `Joao Silva`).

use crate::label::Name;
use crate::types::{Embedding, KnownFace};
use image::RgbImage;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("known-faces directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("no usable face found in {}", .0.display())]
    Empty(PathBuf),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Derive a display name from an image file name.
///
/// Underscores become spaces and every word is title-cased: a letter is
/// upper-cased when it follows a non-letter, lower-cased otherwise.
pub fn display_name(path: &Path) -> Option<Name> {
    let stem = path.file_stem()?.to_str()?.replace('_', " ");
    let mut titled = String::with_capacity(stem.len());
    let mut prev_is_letter = false;
    for ch in stem.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                titled.extend(ch.to_lowercase());
            } else {
                titled.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            titled.push(ch);
            prev_is_letter = false;
        }
    }
    Name::new(titled).ok()
}

/// Image files in `dir` with a supported extension, sorted by file name.
pub fn image_files(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    if !dir.is_dir() {
        return Err(GalleryError::DirectoryNotFound(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let supported = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|ok| ok.eq_ignore_ascii_case(e)));
        if supported && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Build the gallery from `dir`, using `embed` to turn each portrait into an
/// embedding of its most prominent face.
///
/// `embed` returns `Ok(None)` when the image contains no face. Images that
/// fail to decode, contain no face, or fail to embed are skipped with a
/// warning; a gallery with no entries at all is an error.
pub fn load_dir<F, E>(dir: &Path, mut embed: F) -> Result<Vec<KnownFace>, GalleryError>
where
    F: FnMut(&RgbImage) -> Result<Option<Embedding>, E>,
    E: Display,
{
    tracing::info!(dir = %dir.display(), "loading known faces");

    let mut gallery = Vec::new();
    for path in image_files(dir)? {
        let Some(name) = display_name(&path) else {
            tracing::warn!(file = %path.display(), "cannot derive a name from file; skipping");
            continue;
        };

        let image = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to decode image; skipping");
                continue;
            }
        };

        match embed(&image) {
            Ok(Some(embedding)) => {
                tracing::info!(name = %name, file = %path.display(), "known face loaded");
                gallery.push(KnownFace {
                    name,
                    embedding,
                    source: path,
                });
            }
            Ok(None) => {
                tracing::warn!(file = %path.display(), "no face found in image; skipping");
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to embed face; skipping");
            }
        }
    }

    if gallery.is_empty() {
        return Err(GalleryError::Empty(dir.to_path_buf()));
    }

    tracing::info!(count = gallery.len(), "gallery loaded");
    Ok(gallery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn name_of(file: &str) -> Option<String> {
        display_name(Path::new(file)).map(|n| n.as_str().to_string())
    }

    fn write_png(dir: &Path, file: &str, shade: u8) {
        RgbImage::from_pixel(4, 4, Rgb([shade, shade, shade]))
            .save(dir.join(file))
            .unwrap();
    }

    /// Embeds uniform images by their shade; pure black means "no face".
    fn shade_embedder(img: &RgbImage) -> Result<Option<Embedding>, String> {
        let shade = img.get_pixel(0, 0)[0];
        match shade {
            0 => Ok(None),
            1 => Err("model exploded".to_string()),
            s => Ok(Some(Embedding {
                values: vec![s as f32],
            })),
        }
    }

    #[test]
    fn test_display_name_title_cases() {
        assert_eq!(name_of("known_faces/joao_silva.jpg").as_deref(), Some("Joao Silva"));
        assert_eq!(name_of("ANA.png").as_deref(), Some("Ana"));
        assert_eq!(name_of("maria_da_PENHA.jpeg").as_deref(), Some("Maria Da Penha"));
    }

    #[test]
    fn test_display_name_letter_after_symbol() {
        assert_eq!(name_of("o'neil.jpg").as_deref(), Some("O'Neil"));
        assert_eq!(name_of("ana2bia.jpg").as_deref(), Some("Ana2Bia"));
    }

    #[test]
    fn test_display_name_rejects_blank_stem() {
        assert_eq!(name_of("___.jpg"), None);
    }

    #[test]
    fn test_image_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "zeca.png", 10);
        write_png(dir.path(), "ana.png", 10);
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::write(dir.path().join("bia.JPG"), "x").unwrap();

        let files = image_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["ana.png", "bia.JPG", "zeca.png"]);
    }

    #[test]
    fn test_missing_directory() {
        let err = load_dir(Path::new("/definitely/not/here"), shade_embedder).unwrap_err();
        assert!(matches!(err, GalleryError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_load_skips_unusable_images() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "ana_souza.png", 200);
        write_png(dir.path(), "empty_room.png", 0);
        write_png(dir.path(), "broken_model.png", 1);
        std::fs::write(dir.path().join("corrupt.jpg"), b"not a jpeg").unwrap();

        let gallery = load_dir(dir.path(), shade_embedder).unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].name.as_str(), "Ana Souza");
        assert_eq!(gallery[0].embedding.values, vec![200.0]);
        assert!(gallery[0].source.ends_with("ana_souza.png"));
    }

    #[test]
    fn test_load_empty_gallery_is_error() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "nobody.png", 0);
        let err = load_dir(dir.path(), shade_embedder).unwrap_err();
        assert!(matches!(err, GalleryError::Empty(_)));
    }
}
