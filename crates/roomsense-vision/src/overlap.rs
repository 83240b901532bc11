//! Overlap zones between camera pairs.
//!
//! An overlap zone describes the floor region two cameras both see. Each side
//! of a pair has its own polygon, expressed in that camera's pixel
//! coordinates. Points on a polygon's boundary count as inside.

use std::collections::{BTreeSet, HashMap};

use roomsense_models::{CameraId, Point};
use serde::{Deserialize, Serialize};

use crate::error::{VisionError, VisionResult};

/// Tolerance for boundary tests, in pixels.
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Simple (non-self-intersecting) polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    vertices: Vec<Point>,
}

impl Polygon {
    /// Build a polygon, rejecting fewer than 3 vertices, non-finite
    /// coordinates, zero area and self-intersections.
    pub fn new(vertices: Vec<Point>) -> VisionResult<Self> {
        if vertices.len() < 3 {
            return Err(VisionError::invalid_polygon(format!(
                "need at least 3 points, got {}",
                vertices.len()
            )));
        }
        if let Some(index) = vertices.iter().position(|p| !p.is_finite()) {
            return Err(VisionError::invalid_polygon(format!(
                "point {} has non-finite coordinates",
                index
            )));
        }

        let polygon = Self { vertices };
        if polygon.area() <= BOUNDARY_EPSILON {
            return Err(VisionError::invalid_polygon("polygon has zero area"));
        }
        if polygon.is_self_intersecting() {
            return Err(VisionError::invalid_polygon("polygon edges intersect"));
        }
        Ok(polygon)
    }

    /// Polygon vertices in order.
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    /// Absolute area (shoelace formula).
    pub fn area(&self) -> f64 {
        let n = self.vertices.len();
        let twice: f64 = (0..n)
            .map(|i| {
                let a = self.vertices[i];
                let b = self.vertices[(i + 1) % n];
                a.x * b.y - b.x * a.y
            })
            .sum();
        twice.abs() / 2.0
    }

    /// Point-in-polygon by ray casting; boundary points are inside.
    pub fn contains(&self, point: Point) -> bool {
        if !point.is_finite() {
            return false;
        }
        if self.edges().any(|(a, b)| on_segment(point, a, b)) {
            return true;
        }

        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > point.y) != (b.y > point.y) {
                let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    fn is_self_intersecting(&self) -> bool {
        let n = self.vertices.len();
        for i in 0..n {
            let (a1, a2) = (self.vertices[i], self.vertices[(i + 1) % n]);
            for j in (i + 1)..n {
                // Adjacent edges share a vertex by construction.
                if j == i + 1 || (i == 0 && j == n - 1) {
                    continue;
                }
                let (b1, b2) = (self.vertices[j], self.vertices[(j + 1) % n]);
                if segments_intersect(a1, a2, b1, b2) {
                    return true;
                }
            }
        }
        false
    }
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn on_segment(p: Point, a: Point, b: Point) -> bool {
    let length = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
    if cross(a, b, p).abs() > BOUNDARY_EPSILON * length.max(1.0) {
        return false;
    }
    p.x >= a.x.min(b.x) - BOUNDARY_EPSILON
        && p.x <= a.x.max(b.x) + BOUNDARY_EPSILON
        && p.y >= a.y.min(b.y) - BOUNDARY_EPSILON
        && p.y <= a.y.max(b.y) + BOUNDARY_EPSILON
}

fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = cross(b1, b2, a1);
    let d2 = cross(b1, b2, a2);
    let d3 = cross(a1, a2, b1);
    let d4 = cross(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    on_segment(a1, b1, b2) || on_segment(a2, b1, b2) || on_segment(b1, a1, a2) || on_segment(b2, a1, a2)
}

/// Configured overlap between two cameras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapZoneConfig {
    pub camera_a: CameraId,
    pub camera_b: CameraId,
    /// Shared region in camera A's pixel coordinates
    pub polygon_a: Vec<Point>,
    /// Shared region in camera B's pixel coordinates
    pub polygon_b: Vec<Point>,
}

/// Validated overlap polygons keyed by (camera, other camera).
#[derive(Debug, Clone, Default)]
pub struct OverlapMap {
    zones: HashMap<(CameraId, CameraId), Polygon>,
}

impl OverlapMap {
    /// An empty map: no pair overlaps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and index overlap zone configuration.
    pub fn from_zones(configs: &[OverlapZoneConfig]) -> VisionResult<Self> {
        let mut zones = HashMap::new();
        for config in configs {
            if config.camera_a == config.camera_b {
                return Err(VisionError::SelfOverlap(config.camera_a.clone()));
            }
            let key_a = (config.camera_a.clone(), config.camera_b.clone());
            let key_b = (config.camera_b.clone(), config.camera_a.clone());
            if zones.contains_key(&key_a) || zones.contains_key(&key_b) {
                return Err(VisionError::DuplicateOverlap {
                    a: config.camera_a.clone(),
                    b: config.camera_b.clone(),
                });
            }
            let polygon_a = Polygon::new(config.polygon_a.clone())?;
            let polygon_b = Polygon::new(config.polygon_b.clone())?;
            zones.insert(key_a, polygon_a);
            zones.insert(key_b, polygon_b);
        }
        Ok(Self { zones })
    }

    /// Whether `point` (in `camera` pixels) lies in the zone `camera` shares
    /// with `other`. Unconfigured pairs never contain anything.
    pub fn contains(&self, camera: &CameraId, other: &CameraId, point: Point) -> bool {
        self.zones
            .get(&(camera.clone(), other.clone()))
            .map(|polygon| polygon.contains(point))
            .unwrap_or(false)
    }

    /// Both points lie inside their side of the (camera_a, camera_b) zone.
    pub fn mutually_inside(
        &self,
        camera_a: &CameraId,
        point_a: Point,
        camera_b: &CameraId,
        point_b: Point,
    ) -> bool {
        self.contains(camera_a, camera_b, point_a) && self.contains(camera_b, camera_a, point_b)
    }

    /// Whether a zone is configured for the pair, in either order.
    pub fn has_pair(&self, a: &CameraId, b: &CameraId) -> bool {
        self.zones.contains_key(&(a.clone(), b.clone()))
    }

    /// Number of configured camera pairs.
    pub fn pair_count(&self) -> usize {
        self.zones.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Every camera referenced by some zone.
    pub fn cameras(&self) -> BTreeSet<&CameraId> {
        self.zones.keys().map(|(camera, _)| camera).collect()
    }
}
