//! Pure vision helpers for cross-camera identity resolution.
//!
//! This crate provides:
//! - HSV histogram appearance descriptors, single and batched
//! - Overlap polygons between camera pairs with boundary-inclusive containment
//!
//! Everything here is stateless and may run on any number of threads.

pub mod descriptor;
pub mod error;
pub mod overlap;

pub use descriptor::{rgb_to_hsv, AppearanceDescriptor, DescriptorConfig};
pub use error::{VisionError, VisionResult};
pub use overlap::{OverlapMap, OverlapZoneConfig, Polygon};
