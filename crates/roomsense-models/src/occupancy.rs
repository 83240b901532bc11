//! Resolution results and occupancy reports.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{CameraId, GlobalId, RoomId, SessionId};

/// How an observation was resolved to a global identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// The camera's local track was already bound to the identity
    Continued,
    /// Appearance (and overlap) matching selected an existing identity
    Matched,
    /// No candidate qualified; a new identity was created
    Created,
    /// The observation was unmatchable; a new identity was created
    CreatedUnmatchable,
}

impl ResolutionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionOutcome::Continued => "continued",
            ResolutionOutcome::Matched => "matched",
            ResolutionOutcome::Created => "created",
            ResolutionOutcome::CreatedUnmatchable => "created_unmatchable",
        }
    }

    /// True when a new identity was allocated.
    pub fn is_new_identity(&self) -> bool {
        matches!(
            self,
            ResolutionOutcome::Created | ResolutionOutcome::CreatedUnmatchable
        )
    }
}

/// Result of resolving one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Resolution {
    /// Identity the observation was attributed to
    pub global_id: GlobalId,
    /// How the identity was chosen
    pub outcome: ResolutionOutcome,
    /// Winning match score, when appearance matching decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// One active identity in an occupancy report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IdentitySummary {
    pub global_id: GlobalId,
    /// Cameras currently contributing to this identity, sorted
    pub cameras: Vec<CameraId>,
    pub last_update_time: DateTime<Utc>,
}

/// Occupancy of one room at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OccupancyReport {
    pub room_id: RoomId,
    pub session_id: SessionId,
    /// Number of active identities
    pub count: usize,
    /// Active identities ordered by global id
    pub identities: Vec<IdentitySummary>,
}

impl OccupancyReport {
    /// Look up one identity by id.
    pub fn identity(&self, global_id: GlobalId) -> Option<&IdentitySummary> {
        self.identities.iter().find(|i| i.global_id == global_id)
    }
}

/// An identity removed by expiry, kept briefly for diagnostics.
///
/// Departed identities are never matched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DepartedIdentity {
    pub global_id: GlobalId,
    /// Cameras that saw the identity last, sorted
    pub cameras: Vec<CameraId>,
    pub last_update_time: DateTime<Utc>,
    /// Time of the expiry pass that removed it
    pub departed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_strings() {
        assert_eq!(ResolutionOutcome::Matched.as_str(), "matched");
        assert_eq!(
            serde_json::to_string(&ResolutionOutcome::CreatedUnmatchable).unwrap(),
            "\"created_unmatchable\""
        );
    }

    #[test]
    fn test_new_identity_outcomes() {
        assert!(ResolutionOutcome::Created.is_new_identity());
        assert!(ResolutionOutcome::CreatedUnmatchable.is_new_identity());
        assert!(!ResolutionOutcome::Matched.is_new_identity());
        assert!(!ResolutionOutcome::Continued.is_new_identity());
    }

    #[test]
    fn test_report_identity_lookup() {
        let report = OccupancyReport {
            room_id: RoomId::from("lobby"),
            session_id: SessionId::new(),
            count: 1,
            identities: vec![IdentitySummary {
                global_id: GlobalId(3),
                cameras: vec![CameraId::from("cam1")],
                last_update_time: Utc::now(),
            }],
        };
        assert!(report.identity(GlobalId(3)).is_some());
        assert!(report.identity(GlobalId(4)).is_none());
    }
}
