//! Engine configuration.
//!
//! All matching thresholds and windows live here as named fields. They are
//! settable globally through [`AggregatorConfig`] and overridable per room
//! through [`RoomConfig::registry`].

use std::borrow::Cow;
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use roomsense_models::{AppearanceFeature, CameraId, RoomId};
use roomsense_vision::{OverlapMap, OverlapZoneConfig};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::{EngineError, EngineResult};

/// How an identity's representative feature changes on each match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FeatureUpdatePolicy {
    /// Replace with the newest observation's feature
    MostRecent,
    /// Exponential moving average; `alpha` is the weight of the newest feature
    RunningAverage { alpha: f32 },
}

impl Default for FeatureUpdatePolicy {
    fn default() -> Self {
        Self::RunningAverage { alpha: 0.2 }
    }
}

impl FeatureUpdatePolicy {
    /// Fold `newer` into `current`.
    pub fn apply(&self, current: &AppearanceFeature, newer: &AppearanceFeature) -> AppearanceFeature {
        match self {
            FeatureUpdatePolicy::MostRecent => newer.clone(),
            FeatureUpdatePolicy::RunningAverage { alpha } => current.blend(newer, *alpha),
        }
    }
}

/// Matching and expiry configuration of one room's identity registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_registry_config"))]
#[serde(default)]
pub struct RegistryConfig {
    /// Minimum score to accept a match (default: 0.6)
    #[validate(range(min = 0.0, max = 1.0))]
    pub similarity_threshold: f32,

    /// Score added when both positions fall inside a configured overlap zone (default: 0.2)
    #[validate(range(min = 0.0, max = 1.0))]
    pub overlap_boost: f32,

    /// Maximum age of an identity's last update for it to be a match candidate (default: 3s)
    #[serde(rename = "matching_window_ms", with = "duration_ms")]
    pub matching_window: Duration,

    /// Age after which an identity leaves the active set (default: 15s)
    #[serde(rename = "expiry_window_ms", with = "duration_ms")]
    pub expiry_window: Duration,

    /// How long a camera's local track counts as present after its last observation (default: 1s)
    #[serde(rename = "local_track_window_ms", with = "duration_ms")]
    pub local_track_window: Duration,

    /// Representative feature update policy (default: running average, alpha 0.2)
    pub feature_update: FeatureUpdatePolicy,

    /// Resolve a bound (camera, local track) straight to its identity (default: true)
    pub trust_local_tracks: bool,

    /// How long expired identities stay listed as recently departed (default: 10s)
    #[serde(rename = "departed_retention_ms", with = "duration_ms")]
    pub departed_retention: Duration,

    /// Maximum recently departed identities kept (default: 64)
    pub max_departed: usize,

    /// Identities examined per expiry pass (default: 256)
    #[validate(range(min = 1))]
    pub expiry_sweep_budget: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.6,
            overlap_boost: 0.2,
            matching_window: Duration::from_secs(3),
            expiry_window: Duration::from_secs(15), // 5x matching window
            local_track_window: Duration::from_secs(1),
            feature_update: FeatureUpdatePolicy::default(),
            trust_local_tracks: true,
            departed_retention: Duration::from_secs(10),
            max_departed: 64,
            expiry_sweep_budget: 256,
        }
    }
}

impl RegistryConfig {
    /// Fewer false merges: higher threshold, smaller boost, shorter window.
    pub fn strict() -> Self {
        Self {
            similarity_threshold: 0.75,
            overlap_boost: 0.1,
            matching_window: Duration::from_secs(2),
            expiry_window: Duration::from_secs(10),
            ..Default::default()
        }
    }

    /// Fewer false splits: lower threshold, larger boost, longer windows.
    pub fn lenient() -> Self {
        Self {
            similarity_threshold: 0.5,
            overlap_boost: 0.3,
            matching_window: Duration::from_secs(5),
            expiry_window: Duration::from_secs(30),
            ..Default::default()
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let feature_update = match std::env::var("ROOMSENSE_FEATURE_UPDATE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "most_recent" => FeatureUpdatePolicy::MostRecent,
            _ => FeatureUpdatePolicy::RunningAverage {
                alpha: env_parse("ROOMSENSE_FEATURE_ALPHA", 0.2),
            },
        };

        Self {
            similarity_threshold: env_parse(
                "ROOMSENSE_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            ),
            overlap_boost: env_parse("ROOMSENSE_OVERLAP_BOOST", defaults.overlap_boost),
            matching_window: Duration::from_millis(env_parse(
                "ROOMSENSE_MATCHING_WINDOW_MS",
                3_000,
            )),
            expiry_window: Duration::from_millis(env_parse("ROOMSENSE_EXPIRY_WINDOW_MS", 15_000)),
            local_track_window: Duration::from_millis(env_parse(
                "ROOMSENSE_LOCAL_TRACK_WINDOW_MS",
                1_000,
            )),
            feature_update,
            trust_local_tracks: env_parse(
                "ROOMSENSE_TRUST_LOCAL_TRACKS",
                defaults.trust_local_tracks,
            ),
            departed_retention: Duration::from_millis(env_parse(
                "ROOMSENSE_DEPARTED_RETENTION_MS",
                10_000,
            )),
            max_departed: env_parse("ROOMSENSE_MAX_DEPARTED", defaults.max_departed),
            expiry_sweep_budget: env_parse(
                "ROOMSENSE_EXPIRY_SWEEP_BUDGET",
                defaults.expiry_sweep_budget,
            ),
        }
    }
}

fn validate_registry_config(config: &RegistryConfig) -> Result<(), ValidationError> {
    // Range checks accept NaN, which would turn every comparison against the threshold false
    if !config.similarity_threshold.is_finite() {
        return Err(validation_error(
            "similarity_threshold",
            "similarity threshold must be a finite number",
        ));
    }
    if !config.overlap_boost.is_finite() {
        return Err(validation_error(
            "overlap_boost",
            "overlap boost must be a finite number",
        ));
    }
    if config.matching_window.is_zero() {
        return Err(validation_error(
            "matching_window",
            "matching window must be positive",
        ));
    }
    if config.expiry_window < config.matching_window {
        return Err(validation_error(
            "expiry_window",
            "expiry window must be at least the matching window",
        ));
    }
    if let FeatureUpdatePolicy::RunningAverage { alpha } = config.feature_update {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(validation_error(
                "feature_update",
                "running average alpha must be in (0, 1]",
            ));
        }
    }
    Ok(())
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Global aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Registry configuration for rooms without an override
    pub registry: RegistryConfig,
    /// Maximum cameras assigned to one room (default: 16)
    pub max_cameras_per_room: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            max_cameras_per_room: 16,
        }
    }
}

impl AggregatorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            registry: RegistryConfig::from_env(),
            max_cameras_per_room: env_parse("ROOMSENSE_MAX_CAMERAS_PER_ROOM", 16),
        }
    }
}

/// Room membership and overlap configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RoomConfig {
    pub room_id: RoomId,
    #[validate(length(min = 1))]
    pub cameras: Vec<CameraId>,
    #[serde(default)]
    pub overlaps: Vec<OverlapZoneConfig>,
    /// Per-room override of the global registry configuration
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

impl RoomConfig {
    /// Create a room configuration with no overlap zones.
    pub fn new(room_id: impl Into<String>, cameras: &[&str]) -> Self {
        Self {
            room_id: RoomId::from_string(room_id),
            cameras: cameras.iter().map(|c| CameraId::from(*c)).collect(),
            overlaps: Vec::new(),
            registry: None,
        }
    }

    pub fn with_overlap(mut self, zone: OverlapZoneConfig) -> Self {
        self.overlaps.push(zone);
        self
    }

    pub fn with_registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Validate the configuration and build its overlap map.
    ///
    /// Fails on an empty room id, no cameras, duplicate cameras, more than
    /// `max_cameras` cameras, invalid registry settings, overlap zones that
    /// reference non-member cameras and malformed polygons.
    pub fn check(&self, max_cameras: usize) -> EngineResult<OverlapMap> {
        if self.room_id.as_str().trim().is_empty() {
            return Err(EngineError::invalid_config("room id must not be empty"));
        }
        self.validate()?;

        let mut members = HashSet::with_capacity(self.cameras.len());
        for camera in &self.cameras {
            if !members.insert(camera) {
                return Err(EngineError::invalid_config(format!(
                    "camera {} is listed twice in room {}",
                    camera, self.room_id
                )));
            }
        }
        if self.cameras.len() > max_cameras {
            return Err(EngineError::invalid_config(format!(
                "room {} has {} cameras, limit is {}",
                self.room_id,
                self.cameras.len(),
                max_cameras
            )));
        }
        if let Some(registry) = &self.registry {
            registry.validate()?;
        }
        for zone in &self.overlaps {
            for camera in [&zone.camera_a, &zone.camera_b] {
                if !members.contains(camera) {
                    return Err(EngineError::invalid_config(format!(
                        "overlap zone references camera {} which is not in room {}",
                        camera, self.room_id
                    )));
                }
            }
        }

        Ok(OverlapMap::from_zones(&self.overlaps)?)
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Serde helper storing durations as integer milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsense_models::Point;

    fn triangle() -> Vec<Point> {
        vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(0.0, 10.0)]
    }

    fn zone(a: &str, b: &str, polygon_a: Vec<Point>) -> OverlapZoneConfig {
        OverlapZoneConfig {
            camera_a: CameraId::from(a),
            camera_b: CameraId::from(b),
            polygon_a,
            polygon_b: triangle(),
        }
    }

    #[test]
    fn test_default_registry_config_is_valid() {
        let config = RegistryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.similarity_threshold, 0.6);
        assert_eq!(config.overlap_boost, 0.2);
        assert_eq!(config.matching_window, Duration::from_secs(3));
        assert!(config.expiry_window > config.matching_window);
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(RegistryConfig::strict().validate().is_ok());
        assert!(RegistryConfig::lenient().validate().is_ok());
        assert!(
            RegistryConfig::strict().similarity_threshold
                > RegistryConfig::lenient().similarity_threshold
        );
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = RegistryConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_threshold_rejected() {
        let config = RegistryConfig {
            similarity_threshold: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RegistryConfig {
            overlap_boost: f32::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_parsed_from_text_rejected() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"similarity_threshold": 0.6}"#).unwrap();
        assert!(config.validate().is_ok());

        let threshold: f32 = "NaN".parse().unwrap();
        let config = RegistryConfig {
            similarity_threshold: threshold,
            ..config
        };
        let room = RoomConfig::new("lobby", &["cam1"]).with_registry(config);
        assert!(matches!(room.check(16), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_expiry_shorter_than_matching_rejected() {
        let config = RegistryConfig {
            expiry_window: Duration::from_secs(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_alpha_rejected() {
        let config = RegistryConfig {
            feature_update: FeatureUpdatePolicy::RunningAverage { alpha: 0.0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_registry_config_json_uses_milliseconds() {
        let json = r#"{"similarity_threshold": 0.7, "matching_window_ms": 2500}"#;
        let config: RegistryConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.similarity_threshold, 0.7);
        assert_eq!(config.matching_window, Duration::from_millis(2500));
        assert_eq!(config.overlap_boost, 0.2);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["expiry_window_ms"], 15_000);
    }

    #[test]
    fn test_feature_policy_json() {
        let policy: FeatureUpdatePolicy =
            serde_json::from_str(r#"{"policy": "running_average", "alpha": 0.5}"#).unwrap();
        assert_eq!(policy, FeatureUpdatePolicy::RunningAverage { alpha: 0.5 });
        let policy: FeatureUpdatePolicy =
            serde_json::from_str(r#"{"policy": "most_recent"}"#).unwrap();
        assert_eq!(policy, FeatureUpdatePolicy::MostRecent);
    }

    #[test]
    fn test_room_config_check_ok() {
        let room = RoomConfig::new("lobby", &["cam1", "cam2"])
            .with_overlap(zone("cam1", "cam2", triangle()));
        let overlaps = room.check(16).unwrap();
        assert_eq!(overlaps.pair_count(), 1);
    }

    #[test]
    fn test_room_without_cameras_rejected() {
        let room = RoomConfig::new("lobby", &[]);
        assert!(matches!(room.check(16), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_duplicate_camera_rejected() {
        let room = RoomConfig::new("lobby", &["cam1", "cam1"]);
        assert!(matches!(room.check(16), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_camera_limit_enforced() {
        let room = RoomConfig::new("lobby", &["a", "b", "c"]);
        assert!(room.check(2).is_err());
        assert!(room.check(3).is_ok());
    }

    #[test]
    fn test_overlap_with_foreign_camera_rejected() {
        let room = RoomConfig::new("lobby", &["cam1", "cam2"])
            .with_overlap(zone("cam1", "cam3", triangle()));
        assert!(matches!(room.check(16), Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_short_polygon_fails_at_config_time() {
        let room = RoomConfig::new("lobby", &["cam1", "cam2"]).with_overlap(zone(
            "cam1",
            "cam2",
            vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)],
        ));
        assert!(matches!(room.check(16), Err(EngineError::Vision(_))));
    }

    #[test]
    fn test_invalid_room_registry_override_rejected() {
        let room = RoomConfig::new("lobby", &["cam1"]).with_registry(RegistryConfig {
            overlap_boost: -0.5,
            ..Default::default()
        });
        assert!(matches!(room.check(16), Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_policy_apply() {
        let mut values = vec![0.0; roomsense_models::FEATURE_DIM];
        values[0] = 1.0;
        let a = AppearanceFeature::new(values.clone()).unwrap();
        values[0] = 0.0;
        values[1] = 1.0;
        let b = AppearanceFeature::new(values).unwrap();

        assert_eq!(FeatureUpdatePolicy::MostRecent.apply(&a, &b), b);
        let averaged = FeatureUpdatePolicy::RunningAverage { alpha: 0.2 }.apply(&a, &b);
        assert!(averaged.cosine_similarity(&a) > averaged.cosine_similarity(&b));
    }
}
