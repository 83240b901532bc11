//! Tracked-person observations produced by per-camera trackers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{AppearanceFeature, BoundingBox, CameraId, LocalTrackId, Point};

/// One tracked person seen by one camera at one instant.
///
/// Observations are immutable once built and consumed exactly once by the
/// identity registry of the camera's room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Observation {
    /// Source camera
    pub camera_id: CameraId,
    /// Track id assigned by the camera's own tracker
    pub local_track_id: LocalTrackId,
    /// Position in camera pixel coordinates
    pub bbox: BoundingBox,
    /// Capture time, comparable across the cameras of a room
    pub timestamp: DateTime<Utc>,
    /// Appearance descriptor of the crop
    pub appearance: AppearanceFeature,
}

impl Observation {
    /// Create a new observation.
    pub fn new(
        camera_id: CameraId,
        local_track_id: LocalTrackId,
        bbox: BoundingBox,
        timestamp: DateTime<Utc>,
        appearance: AppearanceFeature,
    ) -> Self {
        Self {
            camera_id,
            local_track_id,
            bbox,
            timestamp,
            appearance,
        }
    }

    /// Whether this observation may be merged into an existing identity.
    ///
    /// Degenerate boxes and zero-vector features are never matched.
    pub fn is_matchable(&self) -> bool {
        !self.bbox.is_degenerate() && !self.appearance.is_unmatchable()
    }

    /// Point tested against overlap polygons.
    pub fn anchor(&self) -> Point {
        self.bbox.foot_point()
    }
}
