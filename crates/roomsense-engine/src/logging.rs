//! Structured room logging utilities.
//!
//! Provides consistent, structured logging for identity lifecycle events
//! with tracing spans and room/camera context.

use roomsense_models::{CameraId, GlobalId, LocalTrackId, RoomId};
use tracing::{debug, info, warn, Span};

/// Room logger for structured logging with consistent fields.
#[derive(Debug, Clone)]
pub struct RoomLogger {
    room_id: String,
    camera_id: Option<String>,
}

impl RoomLogger {
    /// Create a logger for a room.
    pub fn new(room_id: &RoomId) -> Self {
        Self {
            room_id: room_id.to_string(),
            camera_id: None,
        }
    }

    /// Create a logger scoped to one camera of a room.
    pub fn for_camera(room_id: &RoomId, camera_id: &CameraId) -> Self {
        Self {
            room_id: room_id.to_string(),
            camera_id: Some(camera_id.to_string()),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    pub fn identity_created(&self, global_id: GlobalId, camera_id: &CameraId, track: LocalTrackId) {
        info!(
            room_id = %self.room_id,
            global_id = %global_id,
            camera_id = %camera_id,
            local_track_id = %track,
            "Identity created"
        );
    }

    pub fn identity_matched(
        &self,
        global_id: GlobalId,
        camera_id: &CameraId,
        track: LocalTrackId,
        score: f32,
    ) {
        debug!(
            room_id = %self.room_id,
            global_id = %global_id,
            camera_id = %camera_id,
            local_track_id = %track,
            score,
            "Identity matched"
        );
    }

    pub fn identity_expired(&self, global_id: GlobalId, idle_ms: i64) {
        info!(
            room_id = %self.room_id,
            global_id = %global_id,
            idle_ms,
            "Identity expired"
        );
    }

    pub fn unmatchable(&self, global_id: GlobalId, camera_id: &CameraId) {
        warn!(
            room_id = %self.room_id,
            global_id = %global_id,
            camera_id = %camera_id,
            "Unmatchable observation, created isolated identity"
        );
    }

    pub fn rejected(&self, reason: &str, message: &str) {
        warn!(
            room_id = %self.room_id,
            camera_id = self.camera_id.as_deref().unwrap_or("-"),
            reason,
            "Observation rejected: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            room_id = %self.room_id,
            camera_id = self.camera_id.as_deref().unwrap_or("-"),
            "{}", message
        );
    }

    /// Create a tracing span for this room (and camera, if scoped).
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "room",
            room_id = %self.room_id,
            camera_id = self.camera_id.as_deref().unwrap_or("-")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_logger_creation() {
        let logger = RoomLogger::new(&RoomId::from("lobby"));
        assert_eq!(logger.room_id(), "lobby");
        assert_eq!(logger.camera_id(), None);
    }

    #[test]
    fn test_room_logger_for_camera() {
        let logger = RoomLogger::for_camera(&RoomId::from("lobby"), &CameraId::from("cam1"));
        assert_eq!(logger.camera_id(), Some("cam1"));
    }
}
