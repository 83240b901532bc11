//! Room aggregator: routes observations to per-room registries.
//!
//! Every room owns one [`IdentityRegistry`] behind its own mutex, so rooms
//! resolve in parallel while resolves within a room are serialized. The room
//! table itself is only write-locked for configuration changes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Instant;

use roomsense_models::{
    CameraId, DepartedIdentity, Observation, OccupancyReport, Resolution, RoomId,
};
use tracing::{debug, info};
use validator::Validate;

use crate::clock::{Clock, SystemClock};
use crate::config::{AggregatorConfig, RoomConfig};
use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::registry::IdentityRegistry;

struct RoomState {
    cameras: HashSet<CameraId>,
    registry: IdentityRegistry,
}

impl RoomState {
    fn ensure_member(&self, camera_id: &CameraId) -> EngineResult<()> {
        if self.cameras.contains(camera_id) {
            Ok(())
        } else {
            Err(EngineError::camera_not_in_room(
                self.registry.room_id(),
                camera_id,
            ))
        }
    }
}

type SharedRoom = Arc<Mutex<RoomState>>;

/// Entry point for ingestion and occupancy queries across rooms.
pub struct RoomAggregator {
    config: AggregatorConfig,
    clock: Arc<dyn Clock>,
    rooms: RwLock<HashMap<RoomId, SharedRoom>>,
}

impl RoomAggregator {
    /// Create an aggregator using the wall clock.
    pub fn new(config: AggregatorConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an aggregator with a custom time source.
    pub fn with_clock(config: AggregatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Add a room, or update an existing one in place.
    ///
    /// Identity state of an existing room survives. Bindings and sightings of
    /// cameras no longer in the room are released. Fails without side
    /// effects when the configuration is invalid.
    pub fn configure_room(&self, room: RoomConfig) -> EngineResult<()> {
        let overlaps = room.check(self.config.max_cameras_per_room)?;
        let registry_config = room
            .registry
            .clone()
            .unwrap_or_else(|| self.config.registry.clone());
        registry_config.validate()?;
        let cameras: HashSet<CameraId> = room.cameras.iter().cloned().collect();

        let existing = {
            let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
            match rooms.get(&room.room_id).cloned() {
                Some(existing) => existing,
                None => {
                    let registry =
                        IdentityRegistry::new(room.room_id.clone(), registry_config, overlaps);
                    rooms.insert(
                        room.room_id.clone(),
                        Arc::new(Mutex::new(RoomState { cameras, registry })),
                    );
                    info!(
                        room_id = %room.room_id,
                        cameras = room.cameras.len(),
                        overlaps = room.overlaps.len(),
                        "Room configured"
                    );
                    return Ok(());
                }
            }
        };

        let mut state = lock_room(&existing);
        let removed: Vec<CameraId> = state.cameras.difference(&cameras).cloned().collect();
        for camera_id in &removed {
            let released = state.registry.release_camera(camera_id);
            debug!(
                room_id = %room.room_id,
                camera_id = %camera_id,
                released,
                "Camera removed from room"
            );
        }
        state.cameras = cameras;
        state.registry.reconfigure(registry_config, overlaps);
        info!(room_id = %room.room_id, "Room reconfigured");
        Ok(())
    }

    /// Remove a room and its identity state.
    pub fn remove_room(&self, room_id: &RoomId) -> bool {
        let removed = self
            .rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(room_id)
            .is_some();
        if removed {
            info!(room_id = %room_id, "Room removed");
        }
        removed
    }

    /// Configured rooms, sorted.
    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.read_rooms().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Cameras assigned to a room, sorted.
    pub fn cameras(&self, room_id: &RoomId) -> EngineResult<Vec<CameraId>> {
        let room = self.room(room_id)?;
        let state = lock_room(&room);
        let mut cameras: Vec<CameraId> = state.cameras.iter().cloned().collect();
        cameras.sort();
        Ok(cameras)
    }

    /// Fail unless `camera_id` is currently assigned to `room_id`.
    pub fn ensure_camera(&self, room_id: &RoomId, camera_id: &CameraId) -> EngineResult<()> {
        let room = self.room(room_id)?;
        let state = lock_room(&room);
        state.ensure_member(camera_id)
    }

    /// Resolve one observation in its room.
    pub fn ingest(&self, room_id: &RoomId, observation: &Observation) -> EngineResult<Resolution> {
        let room = match self.room(room_id) {
            Ok(room) => room,
            Err(e) => {
                metrics::record_rejection(room_id.as_str(), e.reason());
                return Err(e);
            }
        };

        let started = Instant::now();
        let (resolution, active) = {
            let mut state = lock_room(&room);
            if let Err(e) = state.ensure_member(&observation.camera_id) {
                drop(state);
                metrics::record_rejection(room_id.as_str(), e.reason());
                return Err(e);
            }
            let resolution = state.registry.resolve(observation);
            (resolution, state.registry.active_count())
        };

        metrics::record_resolution(
            room_id.as_str(),
            resolution.outcome,
            started.elapsed().as_secs_f64(),
        );
        metrics::set_active_identities(room_id.as_str(), active);
        Ok(resolution)
    }

    /// Snapshot of a room's active identities at the clock's current time.
    pub fn occupancy(&self, room_id: &RoomId) -> EngineResult<OccupancyReport> {
        let room = self.room(room_id)?;
        let now = self.clock.now();
        let report = lock_room(&room).registry.occupancy(now);
        Ok(report)
    }

    /// Occupancy of every room, ordered by room id.
    pub fn snapshot(&self) -> Vec<OccupancyReport> {
        let now = self.clock.now();
        let mut reports: Vec<OccupancyReport> = self
            .all_rooms()
            .iter()
            .map(|room| lock_room(room).registry.occupancy(now))
            .collect();
        reports.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        reports
    }

    /// Identities that expired recently in a room.
    pub fn recent_departures(&self, room_id: &RoomId) -> EngineResult<Vec<DepartedIdentity>> {
        let room = self.room(room_id)?;
        let now = self.clock.now();
        let departures = lock_room(&room).registry.recent_departures(now);
        Ok(departures)
    }

    /// Run one bounded expiry pass over every room. Returns identities removed.
    pub fn maintain(&self) -> usize {
        let now = self.clock.now();
        let mut total = 0;
        for room in self.all_rooms() {
            let (room_id, expired, active) = {
                let mut state = lock_room(&room);
                let expired = state.registry.expire(now);
                (
                    state.registry.room_id().clone(),
                    expired,
                    state.registry.active_count(),
                )
            };
            metrics::record_expired(room_id.as_str(), expired);
            metrics::set_active_identities(room_id.as_str(), active);
            total += expired;
        }
        total
    }

    fn room(&self, room_id: &RoomId) -> EngineResult<SharedRoom> {
        self.find_room(room_id)
            .ok_or_else(|| EngineError::UnknownRoom(room_id.clone()))
    }

    fn find_room(&self, room_id: &RoomId) -> Option<SharedRoom> {
        self.read_rooms().get(room_id).cloned()
    }

    fn all_rooms(&self) -> Vec<SharedRoom> {
        self.read_rooms().values().cloned().collect()
    }

    fn read_rooms(&self) -> RwLockReadGuard<'_, HashMap<RoomId, SharedRoom>> {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn lock_room(room: &SharedRoom) -> MutexGuard<'_, RoomState> {
    room.lock().unwrap_or_else(PoisonError::into_inner)
}
