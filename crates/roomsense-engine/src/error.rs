//! Engine error types.

use chrono::{DateTime, Utc};
use roomsense_models::{CameraId, RoomId};
use roomsense_vision::VisionError;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown room: {0}")]
    UnknownRoom(RoomId),

    #[error("Camera {camera_id} is not assigned to room {room_id}")]
    CameraNotInRoom { room_id: RoomId, camera_id: CameraId },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Vision error: {0}")]
    Vision(#[from] VisionError),
}

impl EngineError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn camera_not_in_room(room_id: &RoomId, camera_id: &CameraId) -> Self {
        Self::CameraNotInRoom {
            room_id: room_id.clone(),
            camera_id: camera_id.clone(),
        }
    }

    /// Routing errors the caller must discard or re-route, never retry.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EngineError::UnknownRoom(_) | EngineError::CameraNotInRoom { .. }
        )
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::UnknownRoom(_) => "unknown_room",
            EngineError::CameraNotInRoom { .. } => "camera_not_in_room",
            EngineError::InvalidConfig(_) | EngineError::Validation(_) => "invalid_config",
            EngineError::Vision(_) => "vision",
        }
    }
}

/// Per-camera queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue for camera {0} is closed")]
    Closed(CameraId),

    #[error("Queue for camera {0} is full")]
    Full(CameraId),

    #[error("Observation for camera {camera_id} at {received} is older than {previous}")]
    OutOfOrder {
        camera_id: CameraId,
        previous: DateTime<Utc>,
        received: DateTime<Utc>,
    },

    #[error("Queue for camera {expected} received a detection from camera {actual}")]
    CameraMismatch { expected: CameraId, actual: CameraId },
}

impl QueueError {
    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            QueueError::Closed(_) => "closed",
            QueueError::Full(_) => "full",
            QueueError::OutOfOrder { .. } => "out_of_order",
            QueueError::CameraMismatch { .. } => "camera_mismatch",
        }
    }
}
