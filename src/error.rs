use thiserror::Error;

use crate::io::IoError;

/// Failures reported by editor session operations.
///
/// Every variant leaves the session exactly as it was before the call:
/// preconditions are checked before anything is mutated.
#[derive(Debug, Error)]
pub enum EditError {
    #[error("no active layer selected")]
    InvalidSelection,
    #[error("layer index {index} out of range ({len} layers)")]
    LayerOutOfRange { index: usize, len: usize },
    #[error("invalid canvas size {width}x{height}")]
    InvalidCanvasSize { width: u32, height: u32 },
    #[error("active layer has no pixel content")]
    NoContent,
    #[error("no filter preview in progress")]
    NoFilterPreview,
    #[error(transparent)]
    Io(#[from] IoError),
}
