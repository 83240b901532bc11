//! Ingest pipeline: one consumer task per camera queue.
//!
//! Consumers compute appearance features outside the room lock, then hand
//! the observation to the aggregator. A `watch` channel stops consumers and
//! the maintenance task; consumers drain what is already queued first.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use roomsense_models::{
    CameraId, LocalTrackId, Observation, Resolution, ResolutionOutcome, RoomId,
};
use roomsense_vision::AppearanceDescriptor;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, Instrument};

use crate::aggregator::RoomAggregator;
use crate::error::EngineResult;
use crate::logging::RoomLogger;
use crate::metrics;
use crate::queue::{camera_channel, Appearance, CameraReceiver, CameraSender, Detection};

/// A resolved detection, published to an optional event sink.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionEvent {
    pub room_id: RoomId,
    pub camera_id: CameraId,
    pub local_track_id: LocalTrackId,
    pub timestamp: DateTime<Utc>,
    pub resolution: Resolution,
}

/// Counters of one camera consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraStats {
    pub room_id: RoomId,
    pub camera_id: CameraId,
    /// Detections resolved to an identity
    pub processed: u64,
    /// Detections refused by the aggregator
    pub rejected: u64,
    /// Resolved detections that were unmatchable
    pub unmatchable: u64,
}

/// Per-camera queues feeding a shared aggregator.
pub struct IngestPipeline {
    aggregator: Arc<RoomAggregator>,
    descriptor: Arc<AppearanceDescriptor>,
    queue_capacity: usize,
    events: Option<mpsc::Sender<ResolutionEvent>>,
    shutdown: watch::Sender<bool>,
    consumers: Vec<JoinHandle<CameraStats>>,
    maintenance: Option<JoinHandle<()>>,
}

impl IngestPipeline {
    pub fn new(
        aggregator: Arc<RoomAggregator>,
        descriptor: AppearanceDescriptor,
        queue_capacity: usize,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            aggregator,
            descriptor: Arc::new(descriptor),
            queue_capacity,
            events: None,
            shutdown,
            consumers: Vec::new(),
            maintenance: None,
        }
    }

    /// Publish every resolution to `events`. Events are dropped when the sink is full.
    pub fn with_events(mut self, events: mpsc::Sender<ResolutionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn aggregator(&self) -> &Arc<RoomAggregator> {
        &self.aggregator
    }

    /// Open a queue for a camera and spawn its consumer.
    ///
    /// Fails when the room is unknown or the camera is not assigned to it.
    pub fn attach_camera(
        &mut self,
        room_id: RoomId,
        camera_id: CameraId,
    ) -> EngineResult<CameraSender> {
        self.aggregator.ensure_camera(&room_id, &camera_id)?;

        let logger = RoomLogger::for_camera(&room_id, &camera_id);
        let span = logger.create_span();
        let (sender, receiver) = camera_channel(room_id, camera_id, self.queue_capacity);
        let consumer = CameraConsumer {
            stats: CameraStats {
                room_id: receiver.room_id().clone(),
                camera_id: receiver.camera_id().clone(),
                processed: 0,
                rejected: 0,
                unmatchable: 0,
            },
            receiver,
            aggregator: Arc::clone(&self.aggregator),
            descriptor: Arc::clone(&self.descriptor),
            events: self.events.clone(),
            shutdown: self.shutdown.subscribe(),
            logger,
        };

        self.consumers
            .push(tokio::spawn(consumer.run().instrument(span)));
        Ok(sender)
    }

    /// Run a bounded expiry pass over all rooms every `period`.
    pub fn start_maintenance(&mut self, period: Duration) {
        if self.maintenance.is_some() {
            return;
        }
        let aggregator = Arc::clone(&self.aggregator);
        let mut shutdown_rx = self.shutdown.subscribe();

        self.maintenance = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period.max(Duration::from_millis(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let expired = aggregator.maintain();
                        if expired > 0 {
                            debug!(expired, "Maintenance pass removed identities");
                        }
                    }
                }
            }
            debug!("Maintenance task stopped");
        }));
    }

    /// Ask consumers to drain their queues and stop.
    pub fn shutdown(&self) {
        info!("Shutdown requested, draining camera queues");
        self.shutdown.send_replace(true);
    }

    /// Wait for every consumer to finish, then stop maintenance.
    ///
    /// Consumers finish when their sender is dropped or on [`shutdown`](Self::shutdown).
    pub async fn join(mut self) -> Vec<CameraStats> {
        let mut stats = Vec::with_capacity(self.consumers.len());
        for handle in self.consumers.drain(..) {
            match handle.await {
                Ok(camera) => stats.push(camera),
                Err(e) => error!("Camera consumer failed: {}", e),
            }
        }

        self.shutdown.send_replace(true);
        if let Some(maintenance) = self.maintenance.take() {
            if let Err(e) = maintenance.await {
                error!("Maintenance task failed: {}", e);
            }
        }
        stats
    }
}

struct CameraConsumer {
    receiver: CameraReceiver,
    aggregator: Arc<RoomAggregator>,
    descriptor: Arc<AppearanceDescriptor>,
    events: Option<mpsc::Sender<ResolutionEvent>>,
    shutdown: watch::Receiver<bool>,
    logger: RoomLogger,
    stats: CameraStats,
}

impl CameraConsumer {
    async fn run(mut self) -> CameraStats {
        self.logger.log_progress("Camera consumer started");
        loop {
            tokio::select! {
                biased;
                detection = self.receiver.recv() => match detection {
                    Some(detection) => self.process(detection).await,
                    None => break,
                },
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        while let Some(detection) = self.receiver.try_recv() {
                            self.process(detection).await;
                        }
                        break;
                    }
                }
            }
        }
        self.logger.log_progress(&format!(
            "Camera consumer stopped: {} processed, {} rejected",
            self.stats.processed, self.stats.rejected
        ));
        self.stats
    }

    async fn process(&mut self, detection: Detection) {
        let room_id = self.receiver.room_id().clone();
        let camera_id = self.receiver.camera_id().clone();
        let observation = match describe(&self.descriptor, detection).await {
            Ok(observation) => observation,
            Err(e) => {
                self.stats.rejected += 1;
                error!(
                    room_id = %room_id,
                    camera_id = %camera_id,
                    "Descriptor task failed: {}",
                    e
                );
                return;
            }
        };

        match self.aggregator.ingest(&room_id, &observation) {
            Ok(resolution) => {
                self.stats.processed += 1;
                if resolution.outcome == ResolutionOutcome::CreatedUnmatchable {
                    self.stats.unmatchable += 1;
                }
                if let Some(events) = &self.events {
                    // Drop events if the sink is full
                    let _ = events.try_send(ResolutionEvent {
                        room_id: room_id.clone(),
                        camera_id: camera_id.clone(),
                        local_track_id: observation.local_track_id,
                        timestamp: observation.timestamp,
                        resolution,
                    });
                }
            }
            Err(e) => {
                self.stats.rejected += 1;
                self.logger.rejected(e.reason(), &e.to_string());
            }
        }

        metrics::set_queue_depth(room_id.as_str(), camera_id.as_str(), self.receiver.len());
    }
}

/// Build the observation of a detection. Raw crops are described on the
/// blocking pool so histogram work never stalls the runtime.
async fn describe(
    descriptor: &Arc<AppearanceDescriptor>,
    detection: Detection,
) -> Result<Observation, JoinError> {
    if !matches!(detection.appearance, Appearance::Crop(_)) {
        return Ok(detection.into_observation(descriptor));
    }
    let descriptor = Arc::clone(descriptor);
    tokio::task::spawn_blocking(move || detection.into_observation(&descriptor)).await
}
