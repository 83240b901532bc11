//! Newline-delimited detection records.
//!
//! One JSON object per line. A record carries either a precomputed
//! `feature` or a `crop_path` to an image of the person; relative crop
//! paths resolve against the input file's directory.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use roomsense_engine::Detection;
use roomsense_models::{AppearanceFeature, BoundingBox, CameraId, LocalTrackId, RoomId};
use serde::{Deserialize, Serialize};

use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub room_id: RoomId,
    pub camera_id: CameraId,
    pub local_track_id: LocalTrackId,
    pub bbox: BoundingBox,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<AppearanceFeature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_path: Option<PathBuf>,
}

impl DetectionRecord {
    /// Parse one input line.
    pub fn parse(line: &str, line_number: usize) -> WorkerResult<Self> {
        serde_json::from_str(line).map_err(|source| WorkerError::MalformedLine {
            line: line_number,
            source,
        })
    }

    /// Build the queue item, loading the crop image if needed.
    pub fn into_detection(self, base_dir: &Path) -> WorkerResult<Detection> {
        match (self.feature, self.crop_path) {
            (Some(feature), _) => Ok(Detection::with_feature(
                self.camera_id,
                self.local_track_id,
                self.bbox,
                self.timestamp,
                feature,
            )),
            (None, Some(crop_path)) => {
                let path = if crop_path.is_absolute() {
                    crop_path
                } else {
                    base_dir.join(crop_path)
                };
                let crop = image::open(&path)?.to_rgb8();
                Ok(Detection::with_crop(
                    self.camera_id,
                    self.local_track_id,
                    self.bbox,
                    self.timestamp,
                    crop,
                ))
            }
            (None, None) => Err(WorkerError::invalid_detection(format!(
                "detection from camera {} track {} has neither feature nor crop_path",
                self.camera_id, self.local_track_id
            ))),
        }
    }
}
