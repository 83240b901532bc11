//! Cross-camera identity resolution and room occupancy.
//!
//! Observations from the cameras of a room are deduplicated into global
//! identities by appearance similarity, camera-local track continuity and
//! configured overlap zones. The crate provides:
//! - [`IdentityRegistry`]: per-room matching, expiry and occupancy
//! - [`RoomAggregator`]: thread-safe routing across rooms
//! - [`IngestPipeline`]: per-camera queues and consumer tasks
//! - Configuration, metrics and structured logging helpers

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod registry;

pub use aggregator::RoomAggregator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AggregatorConfig, FeatureUpdatePolicy, RegistryConfig, RoomConfig};
pub use error::{EngineError, EngineResult, QueueError, QueueResult};
pub use logging::RoomLogger;
pub use pipeline::{CameraStats, IngestPipeline, ResolutionEvent};
pub use queue::{camera_channel, Appearance, CameraReceiver, CameraSender, Detection};
pub use registry::{GlobalIdentity, IdentityRegistry, Sighting};
