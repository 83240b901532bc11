//! Per-room global identity registry.
//!
//! Resolves each observation to a room-scoped global identity using
//! greedy best-match-above-threshold over the active identities:
//!
//! 1. Identities whose last observation from the same camera carries a
//!    different, still active local track are excluded. Camera-local
//!    distinctness is ground truth.
//! 2. The score is the cosine similarity between the observation's feature
//!    and the identity's representative feature, plus the overlap boost when
//!    both positions lie inside a configured overlap zone.
//! 3. Identities last updated longer than the matching window ago are not
//!    candidates.
//! 4. The highest score at or above the threshold wins; ties go to the most
//!    recently updated identity. Otherwise a new identity is created.
//!
//! Identities older than the expiry window are removed by a bounded sweep,
//! run lazily on every resolve and periodically by the maintenance task.
//! Removed ids are never reused.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use roomsense_models::{
    AppearanceFeature, CameraId, DepartedIdentity, GlobalId, IdentitySummary, LocalTrackId,
    Observation, OccupancyReport, Point, Resolution, ResolutionOutcome, RoomId, SessionId,
};
use roomsense_vision::OverlapMap;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::logging::RoomLogger;

/// Last observation of an identity from one camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sighting {
    pub local_track_id: LocalTrackId,
    /// Overlap anchor in that camera's pixels
    pub anchor: Point,
    pub timestamp: DateTime<Utc>,
}

impl From<&Observation> for Sighting {
    fn from(observation: &Observation) -> Self {
        Self {
            local_track_id: observation.local_track_id,
            anchor: observation.anchor(),
            timestamp: observation.timestamp,
        }
    }
}

/// One deduplicated person in a room.
#[derive(Debug, Clone)]
pub struct GlobalIdentity {
    global_id: GlobalId,
    last_seen: HashMap<CameraId, Sighting>,
    last_update_time: DateTime<Utc>,
    representative: AppearanceFeature,
    unmatchable: bool,
    created_at: DateTime<Utc>,
    observation_count: u64,
}

impl GlobalIdentity {
    pub fn global_id(&self) -> GlobalId {
        self.global_id
    }

    pub fn last_update_time(&self) -> DateTime<Utc> {
        self.last_update_time
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn representative(&self) -> &AppearanceFeature {
        &self.representative
    }

    /// Created from an unmatchable observation; never a match candidate.
    pub fn is_unmatchable(&self) -> bool {
        self.unmatchable
    }

    pub fn observation_count(&self) -> u64 {
        self.observation_count
    }

    pub fn last_seen(&self, camera_id: &CameraId) -> Option<&Sighting> {
        self.last_seen.get(camera_id)
    }

    /// Cameras whose last sighting is within `window` of the last update, sorted.
    fn contributing_cameras(&self, window: ChronoDuration) -> Vec<CameraId> {
        let mut cameras: Vec<CameraId> = self
            .last_seen
            .iter()
            .filter(|(_, sighting)| elapsed(self.last_update_time, sighting.timestamp) <= window)
            .map(|(camera, _)| camera.clone())
            .collect();
        cameras.sort();
        cameras
    }

    fn all_cameras(&self) -> Vec<CameraId> {
        let mut cameras: Vec<CameraId> = self.last_seen.keys().cloned().collect();
        cameras.sort();
        cameras
    }
}

/// Config windows converted once for timestamp arithmetic.
#[derive(Debug, Clone, Copy)]
struct Windows {
    matching: ChronoDuration,
    expiry: ChronoDuration,
    local_track: ChronoDuration,
    departed_retention: ChronoDuration,
}

impl Windows {
    fn from_config(config: &RegistryConfig) -> Self {
        Self {
            matching: to_chrono(config.matching_window),
            expiry: to_chrono(config.expiry_window),
            local_track: to_chrono(config.local_track_window),
            departed_retention: to_chrono(config.departed_retention),
        }
    }
}

/// Identity state of one room.
///
/// Not internally synchronized: the owning room serializes every call.
#[derive(Debug)]
pub struct IdentityRegistry {
    room_id: RoomId,
    session_id: SessionId,
    config: RegistryConfig,
    windows: Windows,
    overlaps: OverlapMap,
    active: BTreeMap<GlobalId, GlobalIdentity>,
    track_bindings: HashMap<(CameraId, LocalTrackId), GlobalId>,
    departed: VecDeque<DepartedIdentity>,
    next_id: GlobalId,
    sweep_cursor: Option<GlobalId>,
    logger: RoomLogger,
}

impl IdentityRegistry {
    /// Create an empty registry with a fresh session.
    pub fn new(room_id: RoomId, config: RegistryConfig, overlaps: OverlapMap) -> Self {
        let logger = RoomLogger::new(&room_id);
        Self {
            room_id,
            session_id: SessionId::new(),
            windows: Windows::from_config(&config),
            config,
            overlaps,
            active: BTreeMap::new(),
            track_bindings: HashMap::new(),
            departed: VecDeque::new(),
            next_id: GlobalId(1),
            sweep_cursor: None,
            logger,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Identities not yet removed by expiry.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn identity(&self, global_id: GlobalId) -> Option<&GlobalIdentity> {
        self.active.get(&global_id)
    }

    /// Resolve one observation to a global identity.
    pub fn resolve(&mut self, observation: &Observation) -> Resolution {
        self.expire(observation.timestamp);

        if !observation.is_matchable() {
            let global_id = self.create(observation, true);
            self.logger.unmatchable(global_id, &observation.camera_id);
            return Resolution {
                global_id,
                outcome: ResolutionOutcome::CreatedUnmatchable,
                score: None,
            };
        }

        if self.config.trust_local_tracks {
            if let Some(global_id) = self.bound_identity(observation) {
                self.update(global_id, observation);
                return Resolution {
                    global_id,
                    outcome: ResolutionOutcome::Continued,
                    score: None,
                };
            }
        }

        match self.best_candidate(observation) {
            Some((global_id, score)) => {
                self.update(global_id, observation);
                self.logger.identity_matched(
                    global_id,
                    &observation.camera_id,
                    observation.local_track_id,
                    score,
                );
                Resolution {
                    global_id,
                    outcome: ResolutionOutcome::Matched,
                    score: Some(score),
                }
            }
            None => {
                let global_id = self.create(observation, false);
                self.logger.identity_created(
                    global_id,
                    &observation.camera_id,
                    observation.local_track_id,
                );
                Resolution {
                    global_id,
                    outcome: ResolutionOutcome::Created,
                    score: None,
                }
            }
        }
    }

    /// Identity bound to the observation's (camera, local track), if the
    /// binding is still live. Stale bindings are dropped.
    fn bound_identity(&mut self, observation: &Observation) -> Option<GlobalId> {
        let key = (observation.camera_id.clone(), observation.local_track_id);
        let global_id = *self.track_bindings.get(&key)?;

        let live = self
            .active
            .get(&global_id)
            .and_then(|identity| identity.last_seen.get(&observation.camera_id))
            .map(|sighting| {
                sighting.local_track_id == observation.local_track_id
                    && elapsed(observation.timestamp, sighting.timestamp) <= self.windows.matching
            })
            .unwrap_or(false);

        if live {
            Some(global_id)
        } else {
            self.track_bindings.remove(&key);
            None
        }
    }

    fn best_candidate(&self, observation: &Observation) -> Option<(GlobalId, f32)> {
        let mut best: Option<(GlobalId, f32, DateTime<Utc>)> = None;

        for (global_id, identity) in &self.active {
            if identity.unmatchable {
                continue;
            }
            if elapsed(observation.timestamp, identity.last_update_time) > self.windows.matching {
                continue;
            }
            if self.conflicts_locally(identity, observation) {
                continue;
            }

            let score = self.score(identity, observation);
            if score < self.config.similarity_threshold {
                continue;
            }

            let better = match best {
                None => true,
                Some((_, best_score, best_update)) => {
                    score > best_score
                        || (score == best_score && identity.last_update_time > best_update)
                }
            };
            if better {
                best = Some((*global_id, score, identity.last_update_time));
            }
        }

        debug!(
            room_id = %self.room_id,
            camera_id = %observation.camera_id,
            local_track_id = %observation.local_track_id,
            candidate = ?best.map(|(id, score, _)| (id.0, score)),
            "Best candidate"
        );

        best.map(|(global_id, score, _)| (global_id, score))
    }

    /// The identity is currently held by a different track of the same camera.
    fn conflicts_locally(&self, identity: &GlobalIdentity, observation: &Observation) -> bool {
        identity
            .last_seen
            .get(&observation.camera_id)
            .map(|sighting| {
                sighting.local_track_id != observation.local_track_id
                    && gap(observation.timestamp, sighting.timestamp) <= self.windows.local_track
            })
            .unwrap_or(false)
    }

    fn score(&self, identity: &GlobalIdentity, observation: &Observation) -> f32 {
        let similarity = observation
            .appearance
            .cosine_similarity(&identity.representative);
        if self.in_shared_overlap(identity, observation) {
            (similarity + self.config.overlap_boost).min(1.0)
        } else {
            similarity
        }
    }

    /// The observation and a recent sighting of the identity on another
    /// camera both lie inside that camera pair's overlap zone.
    fn in_shared_overlap(&self, identity: &GlobalIdentity, observation: &Observation) -> bool {
        let anchor = observation.anchor();
        identity.last_seen.iter().any(|(camera, sighting)| {
            camera != &observation.camera_id
                && gap(observation.timestamp, sighting.timestamp) <= self.windows.matching
                && self.overlaps.mutually_inside(
                    &observation.camera_id,
                    anchor,
                    camera,
                    sighting.anchor,
                )
        })
    }

    fn update(&mut self, global_id: GlobalId, observation: &Observation) {
        let Some(identity) = self.active.get_mut(&global_id) else {
            return;
        };
        let camera = observation.camera_id.clone();

        // Another track of this camera takes over the identity
        if let Some(previous) = identity.last_seen.get(&camera) {
            if previous.local_track_id != observation.local_track_id {
                let key = (camera.clone(), previous.local_track_id);
                if self.track_bindings.get(&key) == Some(&global_id) {
                    self.track_bindings.remove(&key);
                }
            }
        }

        identity.representative = self
            .config
            .feature_update
            .apply(&identity.representative, &observation.appearance);
        identity.last_update_time = identity.last_update_time.max(observation.timestamp);
        identity
            .last_seen
            .insert(camera.clone(), Sighting::from(observation));
        identity.observation_count += 1;

        self.track_bindings
            .insert((camera, observation.local_track_id), global_id);
    }

    fn create(&mut self, observation: &Observation, unmatchable: bool) -> GlobalId {
        let global_id = self.next_id;
        self.next_id = global_id.next();

        let mut last_seen = HashMap::new();
        last_seen.insert(observation.camera_id.clone(), Sighting::from(observation));

        self.active.insert(
            global_id,
            GlobalIdentity {
                global_id,
                last_seen,
                last_update_time: observation.timestamp,
                representative: observation.appearance.clone(),
                unmatchable,
                created_at: observation.timestamp,
                observation_count: 1,
            },
        );

        if !unmatchable {
            self.track_bindings.insert(
                (observation.camera_id.clone(), observation.local_track_id),
                global_id,
            );
        }
        global_id
    }

    /// Remove identities idle longer than the expiry window at `now`.
    ///
    /// Examines at most `expiry_sweep_budget` identities, continuing where
    /// the previous pass stopped. Returns the number removed.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        self.prune_departed(now);
        if self.active.is_empty() {
            self.sweep_cursor = None;
            return 0;
        }

        let budget = self.config.expiry_sweep_budget.max(1);
        let start = self.sweep_cursor.unwrap_or(GlobalId(0));
        let window: Vec<(GlobalId, DateTime<Utc>)> = self
            .active
            .range(start..)
            .chain(self.active.range(..start))
            .take(budget + 1)
            .map(|(id, identity)| (*id, identity.last_update_time))
            .collect();

        self.sweep_cursor = window.get(budget).map(|(id, _)| *id);

        let expired: Vec<GlobalId> = window
            .iter()
            .take(budget)
            .filter(|(_, last_update)| elapsed(now, *last_update) > self.windows.expiry)
            .map(|(id, _)| *id)
            .collect();

        for global_id in &expired {
            self.retire(*global_id, now);
        }
        expired.len()
    }

    fn retire(&mut self, global_id: GlobalId, now: DateTime<Utc>) {
        let Some(identity) = self.active.remove(&global_id) else {
            return;
        };

        for (camera, sighting) in &identity.last_seen {
            let key = (camera.clone(), sighting.local_track_id);
            if self.track_bindings.get(&key) == Some(&global_id) {
                self.track_bindings.remove(&key);
            }
        }

        self.logger.identity_expired(
            global_id,
            elapsed(now, identity.last_update_time).num_milliseconds(),
        );

        if self.config.max_departed == 0 {
            return;
        }
        while self.departed.len() >= self.config.max_departed {
            self.departed.pop_front();
        }
        self.departed.push_back(DepartedIdentity {
            global_id,
            cameras: identity.all_cameras(),
            last_update_time: identity.last_update_time,
            departed_at: now,
        });
    }

    fn prune_departed(&mut self, now: DateTime<Utc>) {
        let retention = self.windows.departed_retention;
        self.departed
            .retain(|departed| elapsed(now, departed.departed_at) <= retention);
    }

    /// Consistent snapshot of the identities active at `now`.
    ///
    /// Read-only: identities past the expiry window are left out but stay in
    /// the registry until an expiry pass removes them.
    pub fn occupancy(&self, now: DateTime<Utc>) -> OccupancyReport {
        let identities: Vec<IdentitySummary> = self
            .active
            .values()
            .filter(|identity| elapsed(now, identity.last_update_time) <= self.windows.expiry)
            .map(|identity| IdentitySummary {
                global_id: identity.global_id,
                cameras: identity.contributing_cameras(self.windows.matching),
                last_update_time: identity.last_update_time,
            })
            .collect();

        OccupancyReport {
            room_id: self.room_id.clone(),
            session_id: self.session_id.clone(),
            count: identities.len(),
            identities,
        }
    }

    /// Identities expired within the retention window before `now`, oldest first.
    pub fn recent_departures(&self, now: DateTime<Utc>) -> Vec<DepartedIdentity> {
        self.departed
            .iter()
            .filter(|departed| elapsed(now, departed.departed_at) <= self.windows.departed_retention)
            .cloned()
            .collect()
    }

    /// Swap matching configuration and overlap zones, keeping identity state.
    pub fn reconfigure(&mut self, config: RegistryConfig, overlaps: OverlapMap) {
        self.windows = Windows::from_config(&config);
        self.config = config;
        self.overlaps = overlaps;
        self.logger.log_progress("Registry reconfigured");
    }

    /// Forget everything a camera contributed. Returns released bindings.
    pub fn release_camera(&mut self, camera_id: &CameraId) -> usize {
        let before = self.track_bindings.len();
        self.track_bindings.retain(|(camera, _), _| camera != camera_id);
        for identity in self.active.values_mut() {
            identity.last_seen.remove(camera_id);
        }
        before - self.track_bindings.len()
    }
}

fn to_chrono(duration: std::time::Duration) -> ChronoDuration {
    ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::MAX)
}

/// Time from `earlier` to `later`, zero when `later` is not after `earlier`.
fn elapsed(later: DateTime<Utc>, earlier: DateTime<Utc>) -> ChronoDuration {
    (later - earlier).max(ChronoDuration::zero())
}

fn gap(a: DateTime<Utc>, b: DateTime<Utc>) -> ChronoDuration {
    (a - b).abs()
}
