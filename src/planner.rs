// ============================================================================
// IMAGE PLANNER — groups a folder of photos by the person in them
// ============================================================================

use std::path::{Path, PathBuf};

use image::RgbaImage;
use thiserror::Error;

use crate::settings::EditorSettings;
use crate::{log_info, log_warn};

/// Embedding distance at or under which two faces count as the same person.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// File extensions picked up by [`collect_images`] (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

pub type FaceEncoding = Vec<f32>;

/// Produces one embedding per face found in an image.  Implemented outside
/// this crate by a face-recognition model.
pub trait FaceEncoder {
    fn encode(&self, image: &RgbaImage) -> Vec<FaceEncoding>;
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid folder pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("no group named '{0}'")]
    UnknownGroup(String),
    #[error("a group named '{0}' already exists")]
    GroupExists(String),
    #[error("group name cannot be empty")]
    EmptyName,
}

/// Every supported image under `folder`, recursively, in path order.
pub fn collect_images(folder: &Path) -> Result<Vec<PathBuf>, PlannerError> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&folder.to_string_lossy()));
    let mut images: Vec<PathBuf> = glob::glob(&pattern)?
        .flatten()
        .filter(|p| p.is_file() && has_image_extension(p))
        .collect();
    images.sort();
    Ok(images)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn face_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

#[derive(Clone, Debug, PartialEq)]
pub struct FaceGroup {
    pub name: String,
    pub images: Vec<PathBuf>,
    /// Encoding of the first face seen for this person.
    representative: FaceEncoding,
}

/// Named groups of image paths, in the order each person was first seen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceGroups {
    groups: Vec<FaceGroup>,
}

impl FaceGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.groups.iter().map(|g| g.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FaceGroup> {
        self.groups.iter()
    }

    pub fn get(&self, name: &str) -> Option<&[PathBuf]> {
        self.groups.iter().find(|g| g.name == name).map(|g| g.images.as_slice())
    }

    /// Add `path` to the first group whose representative is within
    /// `tolerance`, or start a new group for it.
    fn assign(&mut self, path: PathBuf, encoding: FaceEncoding, tolerance: f32) {
        if let Some(group) = self
            .groups
            .iter_mut()
            .find(|g| face_distance(&g.representative, &encoding) <= tolerance)
        {
            group.images.push(path);
            return;
        }
        let name = format!("Person_{}", self.groups.len() + 1);
        self.groups.push(FaceGroup {
            name,
            images: vec![path],
            representative: encoding,
        });
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), PlannerError> {
        let new = new.trim();
        if new.is_empty() {
            return Err(PlannerError::EmptyName);
        }
        if new != old && self.groups.iter().any(|g| g.name == new) {
            return Err(PlannerError::GroupExists(new.to_string()));
        }
        let group = self
            .groups
            .iter_mut()
            .find(|g| g.name == old)
            .ok_or_else(|| PlannerError::UnknownGroup(old.to_string()))?;
        group.name = new.to_string();
        Ok(())
    }

    /// Copy each group's images into `dest/<group name>/`.  Returns the
    /// number of files copied.
    pub fn export(&self, dest: &Path) -> Result<usize, PlannerError> {
        let mut copied = 0;
        for group in &self.groups {
            let dir = dest.join(&group.name);
            std::fs::create_dir_all(&dir)?;
            for image in &group.images {
                let Some(file_name) = image.file_name() else { continue };
                std::fs::copy(image, dir.join(file_name))?;
                copied += 1;
            }
        }
        log_info!("Exported {} groups ({} files) to {}", self.groups.len(), copied, dest.display());
        Ok(copied)
    }
}

/// Group `images` by the first face found in each.  Images that cannot be
/// read or contain no face are left out.
pub fn sort_by_faces(images: &[PathBuf], encoder: &dyn FaceEncoder, tolerance: f32) -> FaceGroups {
    let mut groups = FaceGroups::default();
    for path in images {
        let image = match crate::io::load_image(path) {
            Ok(img) => img,
            Err(e) => {
                log_warn!("Planner: skipping {}: {}", path.display(), e);
                continue;
            }
        };
        let Some(encoding) = encoder.encode(&image).into_iter().next() else {
            continue;
        };
        groups.assign(path.clone(), encoding, tolerance);
    }
    log_info!("Planner: {} images sorted into {} groups", images.len(), groups.len());
    groups
}

/// [`collect_images`] followed by [`sort_by_faces`].
pub fn sort_folder(folder: &Path, encoder: &dyn FaceEncoder, tolerance: f32) -> Result<FaceGroups, PlannerError> {
    let images = collect_images(folder)?;
    Ok(sort_by_faces(&images, encoder, tolerance))
}

/// [`sort_folder`] at the tolerance configured in `settings`.
pub fn sort_folder_with_settings(
    folder: &Path,
    encoder: &dyn FaceEncoder,
    settings: &EditorSettings,
) -> Result<FaceGroups, PlannerError> {
    sort_folder(folder, encoder, settings.face_tolerance)
}
