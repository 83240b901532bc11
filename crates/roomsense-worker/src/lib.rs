//! Occupancy worker.
//!
//! This crate provides:
//! - Environment and rooms file configuration
//! - Newline-delimited detection parsing
//! - Replay of recorded or piped tracker output through the ingest pipeline

pub mod config;
pub mod error;
pub mod record;
pub mod replay;
pub mod rooms;

pub use config::{ClockMode, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use record::DetectionRecord;
pub use replay::{build_aggregator, ReplaySummary, Replayer};
pub use rooms::RoomsFile;
