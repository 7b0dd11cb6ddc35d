//! Geofence model and membership evaluation.
//!
//! Membership is recomputed from scratch whenever the current position or the
//! geofence list changes; `is_inside` is a runtime annotation and never part of
//! the backend record.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::distance::{distance_km, Coordinate};
use crate::types::{ClientId, GeofenceId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceKind {
    #[default]
    Circle,
    Polygon,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geofence {
    pub id: GeofenceId,
    pub name: String,
    pub description: Option<String>,
    pub client_id: ClientId,
    /// `None` when the backend record has no usable center.
    pub center: Option<Coordinate>,
    pub radius_meters: f64,
    pub kind: GeofenceKind,
    /// Vertices of a polygon geofence; empty for circles.
    pub polygon: Vec<Coordinate>,
    pub is_active: bool,
}

impl Geofence {
    fn valid_center(&self) -> Option<Coordinate> {
        self.center.filter(Coordinate::is_valid)
    }

    fn has_valid_radius(&self) -> bool {
        self.radius_meters.is_finite() && self.radius_meters > 0.0
    }

    /// Distance from `point` to the geofence center in meters.
    pub fn distance_to_center_m(&self, point: Coordinate) -> Option<f64> {
        self.valid_center().map(|center| distance_km(point, center) * 1000.0)
    }

    /// Whether `point` lies inside this geofence.
    ///
    /// A geofence without a valid center is never satisfiable. Polygon geofences
    /// with at least three vertices use polygon containment; every other record
    /// falls back to the center/radius rule.
    pub fn contains(&self, point: Coordinate) -> bool {
        if !point.is_valid() {
            return false;
        }
        let Some(center) = self.valid_center() else {
            return false;
        };
        if self.kind == GeofenceKind::Polygon && self.polygon.len() >= 3 {
            return point_in_polygon(point, &self.polygon);
        }
        self.has_valid_radius() && distance_km(point, center) * 1000.0 <= self.radius_meters
    }
}

/// Even-odd ray casting with longitude as x and latitude as y.
fn point_in_polygon(point: Coordinate, vertices: &[Coordinate]) -> bool {
    let (x, y) = (point.longitude, point.latitude);
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (xi, yi) = (vertices[i].longitude, vertices[i].latitude);
        let (xj, yj) = (vertices[j].longitude, vertices[j].latitude);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// A geofence annotated for the current position.
#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceStatus {
    pub geofence: Geofence,
    pub is_inside: bool,
    pub distance_m: Option<f64>,
    /// Display name of the owning client, when the client list is loaded.
    pub client_name: Option<String>,
}

impl GeofenceStatus {
    /// Status before any position is known: everything reads as outside.
    pub fn unknown(geofence: Geofence) -> Self {
        Self {
            geofence,
            is_inside: false,
            distance_m: None,
            client_name: None,
        }
    }
}

/// Annotates every geofence (active or not) with inside/outside for `current`.
/// Order is preserved so read views can render the list as fetched.
pub fn evaluate(current: Coordinate, geofences: &[Geofence]) -> Vec<GeofenceStatus> {
    geofences
        .iter()
        .map(|geofence| GeofenceStatus {
            is_inside: geofence.contains(current),
            distance_m: geofence.distance_to_center_m(current),
            geofence: geofence.clone(),
            client_name: None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeofenceMatch {
    pub geofence: Geofence,
    pub distance_m: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Eligibility {
    Inside(GeofenceMatch),
    Outside {
        /// Distance to the closest eligible geofence center, if any has one.
        nearest_distance_m: Option<f64>,
    },
}

/// Picks the geofence a clock-in at `current` would be recorded against.
///
/// Only active geofences count, optionally restricted to one client. When the
/// position satisfies several, the nearest center wins and ties go to the
/// lowest geofence id.
pub fn eligible_geofence(
    current: Coordinate,
    geofences: &[Geofence],
    client: Option<ClientId>,
) -> Eligibility {
    let candidates: Vec<&Geofence> = geofences
        .iter()
        .filter(|g| g.is_active)
        .filter(|g| client.map_or(true, |id| g.client_id == id))
        .collect();

    let best = candidates
        .iter()
        .filter(|g| g.contains(current))
        .map(|g| GeofenceMatch {
            distance_m: g.distance_to_center_m(current).unwrap_or(f64::INFINITY),
            geofence: (*g).clone(),
        })
        .min_by(|a, b| {
            a.distance_m
                .partial_cmp(&b.distance_m)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.geofence.id.cmp(&b.geofence.id))
        });

    match best {
        Some(found) => Eligibility::Inside(found),
        None => Eligibility::Outside {
            nearest_distance_m: candidates
                .iter()
                .filter_map(|g| g.distance_to_center_m(current))
                .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal)),
        },
    }
}
