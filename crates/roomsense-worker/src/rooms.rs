//! Rooms file loading.
//!
//! ```json
//! {
//!   "defaults": { "similarity_threshold": 0.65 },
//!   "rooms": [
//!     { "room_id": "lobby", "cameras": ["cam1", "cam2"], "overlaps": [] }
//!   ]
//! }
//! ```

use std::path::Path;

use roomsense_engine::{AggregatorConfig, RegistryConfig, RoomAggregator, RoomConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{WorkerError, WorkerResult};

/// Room definitions plus optional registry defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsFile {
    /// Replaces the environment's registry configuration for every room
    /// without its own override
    #[serde(default)]
    pub defaults: Option<RegistryConfig>,
    pub rooms: Vec<RoomConfig>,
}

impl RoomsFile {
    /// Read and parse a rooms file.
    pub fn load(path: &Path) -> WorkerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|source| WorkerError::RoomsFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Aggregator configuration with this file's defaults applied.
    pub fn aggregator_config(&self, base: &AggregatorConfig) -> AggregatorConfig {
        let mut config = base.clone();
        if let Some(defaults) = &self.defaults {
            config.registry = defaults.clone();
        }
        config
    }

    /// Configure every room. Stops at the first invalid room.
    pub fn apply(&self, aggregator: &RoomAggregator) -> WorkerResult<usize> {
        if self.rooms.is_empty() {
            return Err(WorkerError::config_error("rooms file defines no rooms"));
        }
        for room in &self.rooms {
            aggregator.configure_room(room.clone())?;
        }
        info!(rooms = self.rooms.len(), "Rooms configured");
        Ok(self.rooms.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsense_models::RoomId;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const ROOMS: &str = r#"{
        "defaults": { "similarity_threshold": 0.7, "expiry_window_ms": 20000 },
        "rooms": [
            {
                "room_id": "lobby",
                "cameras": ["cam1", "cam2"],
                "overlaps": [{
                    "camera_a": "cam1",
                    "camera_b": "cam2",
                    "polygon_a": [{"x": 0, "y": 0}, {"x": 100, "y": 0}, {"x": 100, "y": 100}],
                    "polygon_b": [{"x": 0, "y": 0}, {"x": 50, "y": 0}, {"x": 50, "y": 50}]
                }]
            },
            { "room_id": "office", "cameras": ["cam3"], "registry": { "overlap_boost": 0.1 } }
        ]
    }"#;

    #[test]
    fn test_load_and_apply() {
        let file = write_temp(ROOMS);
        let rooms = tokio_test::assert_ok!(RoomsFile::load(file.path()));
        assert_eq!(rooms.rooms.len(), 2);

        let config = rooms.aggregator_config(&AggregatorConfig::default());
        assert_eq!(config.registry.similarity_threshold, 0.7);

        let aggregator = RoomAggregator::new(config);
        assert_eq!(rooms.apply(&aggregator).unwrap(), 2);
        assert_eq!(
            aggregator.room_ids(),
            vec![RoomId::from("lobby"), RoomId::from("office")]
        );
    }

    #[test]
    fn test_invalid_json_reports_path() {
        let file = write_temp("{ \"rooms\": [ ");
        let err = RoomsFile::load(file.path()).unwrap_err();
        assert!(matches!(err, WorkerError::RoomsFile { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = RoomsFile::load(Path::new("/nonexistent/rooms.json")).unwrap_err();
        assert!(matches!(err, WorkerError::Io(_)));
    }

    #[test]
    fn test_bad_polygon_fails_apply() {
        let file = write_temp(
            r#"{"rooms": [{
                "room_id": "lobby",
                "cameras": ["cam1", "cam2"],
                "overlaps": [{
                    "camera_a": "cam1", "camera_b": "cam2",
                    "polygon_a": [{"x": 0, "y": 0}, {"x": 1, "y": 1}],
                    "polygon_b": [{"x": 0, "y": 0}, {"x": 1, "y": 0}, {"x": 1, "y": 1}]
                }]
            }]}"#,
        );
        let rooms = RoomsFile::load(file.path()).unwrap();
        let aggregator = RoomAggregator::new(AggregatorConfig::default());
        assert!(matches!(rooms.apply(&aggregator), Err(WorkerError::Engine(_))));
    }

    #[test]
    fn test_empty_rooms_rejected() {
        let rooms = RoomsFile {
            defaults: None,
            rooms: Vec::new(),
        };
        let aggregator = RoomAggregator::new(AggregatorConfig::default());
        tokio_test::assert_err!(rooms.apply(&aggregator));
    }
}
