//! Shared data models for the RoomSense occupancy engine.
//!
//! This crate provides Serde-serializable types for:
//! - Room, camera, track and identity identifiers
//! - Pixel-space geometry (points, bounding boxes)
//! - Appearance feature vectors
//! - Tracked-person observations
//! - Resolution results and occupancy reports

pub mod feature;
pub mod geometry;
pub mod ids;
pub mod observation;
pub mod occupancy;

// Re-export common types
pub use feature::{
    AppearanceFeature, FeatureError, FEATURE_DIM, HUE_BINS, SATURATION_BINS, VALUE_BINS,
};
pub use geometry::{BoundingBox, Point};
pub use ids::{CameraId, GlobalId, LocalTrackId, RoomId, SessionId};
pub use observation::Observation;
pub use occupancy::{
    DepartedIdentity, IdentitySummary, OccupancyReport, Resolution, ResolutionOutcome,
};
