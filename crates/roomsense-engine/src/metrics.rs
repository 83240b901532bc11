//! Engine metrics collection.
//!
//! Provides standardized metrics for monitoring identity resolution:
//! - Observation counters by outcome and rejection reason
//! - Active identity gauges per room
//! - Resolve latency histograms
//! - Per-camera queue depth

use metrics::{counter, gauge, histogram};
use roomsense_models::ResolutionOutcome;

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Observations resolved by room and outcome.
    pub const OBSERVATIONS_TOTAL: &str = "roomsense_observations_total";

    /// Observations rejected by room and reason.
    pub const OBSERVATIONS_REJECTED_TOTAL: &str = "roomsense_observations_rejected_total";

    /// Identities removed by expiry, by room.
    pub const IDENTITIES_EXPIRED_TOTAL: &str = "roomsense_identities_expired_total";

    /// Currently active identities by room.
    pub const ACTIVE_IDENTITIES: &str = "roomsense_active_identities";

    /// Time spent inside the room lock per resolve, in seconds.
    pub const RESOLVE_LATENCY_SECONDS: &str = "roomsense_resolve_latency_seconds";

    /// Detections waiting in a camera queue.
    pub const QUEUE_DEPTH: &str = "roomsense_queue_depth";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a resolved observation.
pub fn record_resolution(room: &str, outcome: ResolutionOutcome, latency_secs: f64) {
    counter!(
        names::OBSERVATIONS_TOTAL,
        "room" => room.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    histogram!(
        names::RESOLVE_LATENCY_SECONDS,
        "room" => room.to_string()
    )
    .record(latency_secs);
}

/// Record a rejected observation.
pub fn record_rejection(room: &str, reason: &'static str) {
    counter!(
        names::OBSERVATIONS_REJECTED_TOTAL,
        "room" => room.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// Record identities removed by an expiry pass.
pub fn record_expired(room: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        names::IDENTITIES_EXPIRED_TOTAL,
        "room" => room.to_string()
    )
    .increment(count as u64);
}

/// Set the active identity gauge for a room.
pub fn set_active_identities(room: &str, count: usize) {
    gauge!(
        names::ACTIVE_IDENTITIES,
        "room" => room.to_string()
    )
    .set(count as f64);
}

/// Set the queue depth gauge for a camera.
pub fn set_queue_depth(room: &str, camera: &str, depth: usize) {
    gauge!(
        names::QUEUE_DEPTH,
        "room" => room.to_string(),
        "camera" => camera.to_string()
    )
    .set(depth as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::OBSERVATIONS_TOTAL.starts_with("roomsense_"));
        assert!(names::OBSERVATIONS_REJECTED_TOTAL.contains("rejected"));
        assert!(names::IDENTITIES_EXPIRED_TOTAL.contains("expired"));
        assert!(names::RESOLVE_LATENCY_SECONDS.ends_with("_seconds"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_resolution("lobby", ResolutionOutcome::Created, 0.0001);
        record_rejection("lobby", "camera_not_in_room");
        record_expired("lobby", 0);
        set_active_identities("lobby", 3);
        set_queue_depth("lobby", "cam1", 0);
    }
}
