//! Per-camera detection queues.
//!
//! Each camera feeds its room through a bounded channel with a single
//! producer. The producer side enforces camera identity and non-decreasing
//! timestamps so the consumer can resolve detections in arrival order.

use chrono::{DateTime, Utc};
use image::RgbImage;
use roomsense_models::{AppearanceFeature, BoundingBox, CameraId, LocalTrackId, Observation, RoomId};
use roomsense_vision::AppearanceDescriptor;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::{QueueError, QueueResult};

/// Appearance carried by a detection.
#[derive(Debug, Clone)]
pub enum Appearance {
    /// Precomputed by the producer
    Feature(AppearanceFeature),
    /// Raw person crop; described by the consumer before resolving
    Crop(RgbImage),
}

/// One tracker output waiting to be resolved.
#[derive(Debug, Clone)]
pub struct Detection {
    pub camera_id: CameraId,
    pub local_track_id: LocalTrackId,
    pub bbox: BoundingBox,
    pub timestamp: DateTime<Utc>,
    pub appearance: Appearance,
}

impl Detection {
    pub fn with_feature(
        camera_id: CameraId,
        local_track_id: LocalTrackId,
        bbox: BoundingBox,
        timestamp: DateTime<Utc>,
        feature: AppearanceFeature,
    ) -> Self {
        Self {
            camera_id,
            local_track_id,
            bbox,
            timestamp,
            appearance: Appearance::Feature(feature),
        }
    }

    pub fn with_crop(
        camera_id: CameraId,
        local_track_id: LocalTrackId,
        bbox: BoundingBox,
        timestamp: DateTime<Utc>,
        crop: RgbImage,
    ) -> Self {
        Self {
            camera_id,
            local_track_id,
            bbox,
            timestamp,
            appearance: Appearance::Crop(crop),
        }
    }

    /// Build the observation, describing the crop if needed.
    pub fn into_observation(self, descriptor: &AppearanceDescriptor) -> Observation {
        let appearance = match self.appearance {
            Appearance::Feature(feature) => feature,
            Appearance::Crop(crop) => descriptor.describe_crop(&crop),
        };
        Observation::new(
            self.camera_id,
            self.local_track_id,
            self.bbox,
            self.timestamp,
            appearance,
        )
    }
}

/// Create the queue of one camera.
pub fn camera_channel(
    room_id: RoomId,
    camera_id: CameraId,
    capacity: usize,
) -> (CameraSender, CameraReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        CameraSender {
            room_id: room_id.clone(),
            camera_id: camera_id.clone(),
            tx,
            last_timestamp: None,
        },
        CameraReceiver {
            room_id,
            camera_id,
            rx,
        },
    )
}

/// Producer half of a camera queue. Not cloneable: one producer per camera.
#[derive(Debug)]
pub struct CameraSender {
    room_id: RoomId,
    camera_id: CameraId,
    tx: mpsc::Sender<Detection>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl CameraSender {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    /// Enqueue, waiting for space when the queue is full.
    pub async fn send(&mut self, detection: Detection) -> QueueResult<()> {
        self.check(&detection)?;
        let timestamp = detection.timestamp;
        self.tx
            .send(detection)
            .await
            .map_err(|_| QueueError::Closed(self.camera_id.clone()))?;
        self.last_timestamp = Some(timestamp);
        Ok(())
    }

    /// Enqueue without waiting.
    pub fn try_send(&mut self, detection: Detection) -> QueueResult<()> {
        self.check(&detection)?;
        let timestamp = detection.timestamp;
        match self.tx.try_send(detection) {
            Ok(()) => {
                self.last_timestamp = Some(timestamp);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(QueueError::Full(self.camera_id.clone())),
            Err(TrySendError::Closed(_)) => Err(QueueError::Closed(self.camera_id.clone())),
        }
    }

    /// Detections waiting to be consumed.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn check(&self, detection: &Detection) -> QueueResult<()> {
        if detection.camera_id != self.camera_id {
            return Err(QueueError::CameraMismatch {
                expected: self.camera_id.clone(),
                actual: detection.camera_id.clone(),
            });
        }
        if let Some(previous) = self.last_timestamp {
            if detection.timestamp < previous {
                return Err(QueueError::OutOfOrder {
                    camera_id: self.camera_id.clone(),
                    previous,
                    received: detection.timestamp,
                });
            }
        }
        Ok(())
    }
}

/// Consumer half of a camera queue.
#[derive(Debug)]
pub struct CameraReceiver {
    room_id: RoomId,
    camera_id: CameraId,
    rx: mpsc::Receiver<Detection>,
}

impl CameraReceiver {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    /// Next detection; `None` once the sender is dropped and the queue drained.
    pub async fn recv(&mut self) -> Option<Detection> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Detection> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
