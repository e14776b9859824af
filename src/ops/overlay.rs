// ============================================================================
// FACE OVERLAY — places an asset over detected faces on a transparent layer
// ============================================================================

use image::{DynamicImage, RgbaImage, imageops};
use thiserror::Error;

use crate::canvas::Point;
use crate::log_warn;

/// Landmark indices of the 68-point face model.
const LEFT_TEMPLE: usize = 0;
const RIGHT_TEMPLE: usize = 16;
const LEFT_EYE_OUTER: usize = 36;
const RIGHT_EYE_OUTER: usize = 45;
const LANDMARK_COUNT: usize = 68;

/// The few landmarks overlay placement needs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceGeometry {
    pub left_temple: Point,
    pub right_temple: Point,
    pub left_eye: Point,
    pub right_eye: Point,
}

impl FaceGeometry {
    /// Pick the placement landmarks out of a full 68-point set.
    pub fn from_landmarks(landmarks: &[Point]) -> Option<Self> {
        if landmarks.len() < LANDMARK_COUNT {
            return None;
        }
        Some(Self {
            left_temple: landmarks[LEFT_TEMPLE],
            right_temple: landmarks[RIGHT_TEMPLE],
            left_eye: landmarks[LEFT_EYE_OUTER],
            right_eye: landmarks[RIGHT_EYE_OUTER],
        })
    }
}

/// Finds faces in a raster.  Implemented outside this crate by a landmark
/// model; tests use fixed geometry.
pub trait FaceDetector {
    fn detect(&self, image: &RgbaImage) -> Vec<FaceGeometry>;
}

/// Why one face received no overlay.  The remaining faces are still drawn.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OverlaySkip {
    #[error("face {face}: overlay at ({x}, {y}) size {width}x{height} leaves the image")]
    OutOfBounds {
        face: usize,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    },
    #[error("face {face}: overlay asset has no alpha channel")]
    MissingAlpha { face: usize },
    #[error("face {face}: temples too close to size an overlay")]
    Degenerate { face: usize },
}

/// A transparent raster the size of the input with overlays drawn in, plus
/// the faces that were skipped.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayOutcome {
    pub image: RgbaImage,
    pub skipped: Vec<OverlaySkip>,
}

pub trait FaceOverlay {
    /// Name given to the layer the session inserts for this overlay.
    fn layer_name(&self) -> &str;

    fn render(&self, image: &RgbaImage) -> OverlayOutcome;
}

pub struct SunglassesOverlay<D: FaceDetector> {
    detector: D,
    asset: RgbaImage,
    asset_has_alpha: bool,
}

impl<D: FaceDetector> SunglassesOverlay<D> {
    pub fn new(detector: D, asset: DynamicImage) -> Self {
        let asset_has_alpha = asset.color().has_alpha();
        Self {
            detector,
            asset: asset.to_rgba8(),
            asset_has_alpha,
        }
    }

    fn place(&self, face_index: usize, face: &FaceGeometry, layer: &mut RgbaImage) -> Result<(), OverlaySkip> {
        let (aw, ah) = self.asset.dimensions();
        let width = face.right_temple.x as i64 - face.left_temple.x as i64;
        if width <= 0 || aw == 0 || ah == 0 {
            return Err(OverlaySkip::Degenerate { face: face_index });
        }
        let height = width * ah as i64 / aw as i64;
        if height <= 0 {
            return Err(OverlaySkip::Degenerate { face: face_index });
        }
        if !self.asset_has_alpha {
            return Err(OverlaySkip::MissingAlpha { face: face_index });
        }

        let eye_mid_y = ((face.left_eye.y as i64 + face.right_eye.y as i64) as f64 / 2.0) as i64;
        let x = face.left_temple.x as i64;
        let y = eye_mid_y - height / 2;
        let (lw, lh) = layer.dimensions();
        if x < 0 || y < 0 || x + width > lw as i64 || y + height > lh as i64 {
            return Err(OverlaySkip::OutOfBounds {
                face: face_index,
                x,
                y,
                width,
                height,
            });
        }

        let resized = imageops::resize(&self.asset, width as u32, height as u32, imageops::FilterType::Triangle);
        // Overwrite, not blend: the overlay layer starts transparent.
        imageops::replace(layer, &resized, x, y);
        Ok(())
    }
}

impl<D: FaceDetector> FaceOverlay for SunglassesOverlay<D> {
    fn layer_name(&self) -> &str {
        "Sunglasses Layer"
    }

    fn render(&self, image: &RgbaImage) -> OverlayOutcome {
        let (w, h) = image.dimensions();
        let mut layer = RgbaImage::new(w, h);
        let mut skipped = Vec::new();

        for (i, face) in self.detector.detect(image).iter().enumerate() {
            if let Err(skip) = self.place(i, face, &mut layer) {
                log_warn!("Sunglasses overlay: {}", skip);
                skipped.push(skip);
            }
        }

        OverlayOutcome { image: layer, skipped }
    }
}
