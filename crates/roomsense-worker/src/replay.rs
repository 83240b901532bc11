//! Replays newline-delimited detections through the ingest pipeline.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use roomsense_engine::{
    CameraSender, CameraStats, Clock, IngestPipeline, ManualClock, ResolutionEvent, RoomAggregator,
};
use roomsense_models::{CameraId, OccupancyReport, RoomId};
use roomsense_vision::AppearanceDescriptor;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{ClockMode, WorkerConfig};
use crate::error::WorkerResult;
use crate::record::DetectionRecord;
use crate::rooms::RoomsFile;

/// Outcome of a replay run.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub lines_read: usize,
    pub detections_queued: usize,
    pub lines_skipped: usize,
    pub cameras: Vec<CameraStats>,
    pub occupancy: Vec<OccupancyReport>,
}

/// Build the aggregator for a run. In stream mode the returned clock follows
/// the timestamps of resolved detections.
pub fn build_aggregator(
    config: &WorkerConfig,
    rooms: &RoomsFile,
) -> WorkerResult<(Arc<RoomAggregator>, Option<Arc<ManualClock>>)> {
    let aggregator_config = rooms.aggregator_config(&config.aggregator);
    let (aggregator, stream_clock) = match config.clock_mode {
        ClockMode::System => (RoomAggregator::new(aggregator_config), None),
        ClockMode::Stream => {
            let clock = Arc::new(ManualClock::new(DateTime::<Utc>::MIN_UTC));
            let shared: Arc<dyn Clock> = clock.clone();
            (
                RoomAggregator::with_clock(aggregator_config, shared),
                Some(clock),
            )
        }
    };
    rooms.apply(&aggregator)?;
    Ok((Arc::new(aggregator), stream_clock))
}

/// Capacity of the resolution event channel that drives the stream clock.
const CLOCK_EVENTS_CAPACITY: usize = 1024;

/// Feeds detection lines to per-camera queues.
pub struct Replayer {
    aggregator: Arc<RoomAggregator>,
    stream_clock: Option<(Arc<ManualClock>, mpsc::Receiver<ResolutionEvent>)>,
    pipeline: IngestPipeline,
    senders: HashMap<(RoomId, CameraId), CameraSender>,
    base_dir: PathBuf,
    maintenance_interval: Duration,
    report_interval: Duration,
}

impl Replayer {
    pub fn new(
        config: &WorkerConfig,
        aggregator: Arc<RoomAggregator>,
        stream_clock: Option<Arc<ManualClock>>,
    ) -> Self {
        let pipeline = IngestPipeline::new(
            Arc::clone(&aggregator),
            AppearanceDescriptor::default(),
            config.queue_capacity,
        );
        // The stream clock only moves once a detection has been resolved, so
        // expiry never runs ahead of detections still waiting in a queue
        let (pipeline, stream_clock) = match stream_clock {
            Some(clock) => {
                let (events_tx, events_rx) = mpsc::channel(CLOCK_EVENTS_CAPACITY);
                (pipeline.with_events(events_tx), Some((clock, events_rx)))
            }
            None => (pipeline, None),
        };
        let base_dir = config
            .input
            .as_ref()
            .and_then(|input| input.parent())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            aggregator,
            stream_clock,
            pipeline,
            senders: HashMap::new(),
            base_dir,
            maintenance_interval: config.maintenance_interval,
            report_interval: config.report_interval,
        }
    }

    /// Read `reader` to the end (or until `stop` completes), then drain the
    /// queues and return the final occupancy.
    pub async fn run<R, S>(mut self, reader: R, stop: S) -> WorkerResult<ReplaySummary>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        let clock_task = self.stream_clock.take().map(|(clock, mut events)| {
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    clock.advance_to(event.timestamp);
                }
            })
        });
        self.pipeline.start_maintenance(self.maintenance_interval);

        let mut lines = reader.lines();
        let mut report = tokio::time::interval(self.report_interval.max(Duration::from_millis(10)));
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);
        report.tick().await;
        tokio::pin!(stop);

        let mut lines_read = 0;
        let mut detections_queued = 0;
        let mut lines_skipped = 0;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        break;
                    };
                    lines_read += 1;
                    match self.handle_line(&line, lines_read).await {
                        Ok(true) => detections_queued += 1,
                        Ok(false) => {}
                        Err(e) if e.is_line_error() => {
                            warn!(line = lines_read, "Skipping detection: {}", e);
                            lines_skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
                _ = report.tick() => self.log_occupancy(),
                _ = &mut stop => {
                    info!("Stop requested, draining queued detections");
                    break;
                }
            }
        }

        info!(
            lines_read,
            detections_queued, lines_skipped, "Input finished, waiting for camera queues"
        );
        self.senders.clear();
        let cameras = self.pipeline.join().await;
        // Ends once the pipeline and its consumers dropped their event senders
        if let Some(task) = clock_task {
            if let Err(e) = task.await {
                error!("Stream clock task failed: {}", e);
            }
        }
        let occupancy = self.aggregator.snapshot();

        Ok(ReplaySummary {
            lines_read,
            detections_queued,
            lines_skipped,
            cameras,
            occupancy,
        })
    }

    /// Queue one line. Returns false for blank and comment lines.
    async fn handle_line(&mut self, line: &str, line_number: usize) -> WorkerResult<bool> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(false);
        }

        let record = DetectionRecord::parse(trimmed, line_number)?;

        let key = (record.room_id.clone(), record.camera_id.clone());
        let detection = record.into_detection(&self.base_dir)?;

        let sender = match self.senders.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (room_id, camera_id) = entry.key().clone();
                let sender = self.pipeline.attach_camera(room_id, camera_id)?;
                debug!(
                    room_id = %entry.key().0,
                    camera_id = %entry.key().1,
                    "Camera attached"
                );
                entry.insert(sender)
            }
        };
        sender.send(detection).await?;
        Ok(true)
    }

    fn log_occupancy(&self) {
        for report in self.aggregator.snapshot() {
            let identities: Vec<u64> = report.identities.iter().map(|i| i.global_id.0).collect();
            info!(
                room_id = %report.room_id,
                count = report.count,
                identities = ?identities,
                "Occupancy"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use roomsense_engine::RoomConfig;
    use roomsense_models::{AppearanceFeature, BoundingBox, LocalTrackId, FEATURE_DIM};

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + ChronoDuration::milliseconds(ms)
    }

    fn line(room: &str, camera: &str, track: u64, ms: i64, axis: usize) -> String {
        let mut values = vec![0.0; FEATURE_DIM];
        values[axis] = 1.0;
        let record = DetectionRecord {
            room_id: RoomId::from(room),
            camera_id: CameraId::from(camera),
            local_track_id: LocalTrackId(track),
            bbox: BoundingBox::new(10.0, 10.0, 40.0, 100.0),
            timestamp: t(ms),
            feature: Some(AppearanceFeature::new(values).unwrap()),
            crop_path: None,
        };
        serde_json::to_string(&record).unwrap()
    }

    fn rooms() -> RoomsFile {
        RoomsFile {
            defaults: None,
            rooms: vec![RoomConfig::new("lobby", &["cam1", "cam2"])],
        }
    }

    #[tokio::test]
    async fn test_replay_counts_and_final_occupancy() {
        let config = WorkerConfig::default();
        let (aggregator, clock) = build_aggregator(&config, &rooms()).unwrap();
        let replayer = Replayer::new(&config, aggregator, clock.clone());

        let input = [
            line("lobby", "cam1", 1, 0, 0),
            "# recorded at the front desk".to_string(),
            line("lobby", "cam2", 1, 100, 0),
            "not json".to_string(),
            line("lobby", "cam3", 1, 150, 0),
            line("lobby", "cam1", 2, 200, 5),
            line("lobby", "cam1", 1, 50, 0),
            line("attic", "cam1", 1, 250, 0),
        ]
        .join("\n");

        let summary = replayer
            .run(
                tokio::io::BufReader::new(input.as_bytes()),
                std::future::pending(),
            )
            .await
            .unwrap();

        assert_eq!(summary.lines_read, 8);
        assert_eq!(summary.detections_queued, 3);
        assert_eq!(summary.lines_skipped, 4);
        assert_eq!(summary.cameras.iter().map(|c| c.processed).sum::<u64>(), 3);

        assert_eq!(summary.occupancy.len(), 1);
        assert_eq!(summary.occupancy[0].count, 2);
        // Lines that never resolved (unknown room or camera) leave the clock alone
        assert_eq!(clock.unwrap().now(), t(200));
    }

    #[tokio::test]
    async fn test_stream_clock_waits_for_resolution() {
        let config = WorkerConfig::default();
        let (aggregator, clock) = build_aggregator(&config, &rooms()).unwrap();
        let clock = clock.unwrap();
        let replayer = Replayer::new(&config, aggregator, Some(clock.clone()));

        // Nothing read yet, nothing resolved
        assert_eq!(clock.now(), DateTime::<Utc>::MIN_UTC);

        let input = [
            line("lobby", "cam1", 1, 0, 0),
            line("lobby", "cam2", 1, 40_000, 0),
            line("lobby", "cam9", 1, 90_000, 0),
        ]
        .join("\n");
        let summary = replayer
            .run(
                tokio::io::BufReader::new(input.as_bytes()),
                std::future::pending(),
            )
            .await
            .unwrap();

        assert_eq!(summary.lines_skipped, 1);
        assert_eq!(clock.now(), t(40_000));
        // cam1's identity went idle 40s ago, past the 15s expiry window
        assert_eq!(summary.occupancy[0].count, 1);
    }

    #[tokio::test]
    async fn test_stop_signal_ends_replay() {
        let config = WorkerConfig::default();
        let (aggregator, clock) = build_aggregator(&config, &rooms()).unwrap();
        let replayer = Replayer::new(&config, aggregator, clock);

        let (_tx, rx) = tokio::io::duplex(64);
        let summary = replayer
            .run(tokio::io::BufReader::new(rx), async {})
            .await
            .unwrap();
        assert_eq!(summary.lines_read, 0);
        assert_eq!(summary.occupancy[0].count, 0);
    }

    #[test]
    fn test_system_clock_mode_has_no_stream_clock() {
        let config = WorkerConfig {
            clock_mode: ClockMode::System,
            ..Default::default()
        };
        let (aggregator, clock) = build_aggregator(&config, &rooms()).unwrap();
        assert!(clock.is_none());
        assert_eq!(aggregator.room_ids(), vec![RoomId::from("lobby")]);
    }
}
