//! Error types for vision operations.

use roomsense_models::CameraId;
use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors raised while building overlap geometry.
///
/// All of these are configuration-time failures; matching never produces one.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),

    #[error("Overlap zone pairs camera {0} with itself")]
    SelfOverlap(CameraId),

    #[error("Overlap zone for cameras {a} and {b} is configured more than once")]
    DuplicateOverlap { a: CameraId, b: CameraId },
}

impl VisionError {
    /// Create an invalid polygon error.
    pub fn invalid_polygon(message: impl Into<String>) -> Self {
        Self::InvalidPolygon(message.into())
    }
}
