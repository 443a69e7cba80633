// src/collision.rs
//
// Turns a per-frame set of vehicle boxes plus the static ego zone into
// candidate collision events. Evaluation order is deterministic: every
// vehicle against the zone first, then all unordered vehicle pairs in
// detection order. All candidates from a frame are returned, rate
// limiting is the throttle's job, not the classifier's.

use crate::geometry::{overlap_ratio, BoundingBox};

#[derive(Debug, Clone, PartialEq)]
pub enum CollisionEvent {
    /// A vehicle overlapping the ego vehicle's own zone
    EgoCollision { vehicle: BoundingBox, overlap: f32 },
    /// Two detected vehicles overlapping each other
    InterVehicleCollision {
        first: BoundingBox,
        second: BoundingBox,
        overlap: f32,
    },
}

impl CollisionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EgoCollision { .. } => "EGO_COLLISION",
            Self::InterVehicleCollision { .. } => "INTER_VEHICLE_COLLISION",
        }
    }

    pub fn overlap(&self) -> f32 {
        match self {
            Self::EgoCollision { overlap, .. } => *overlap,
            Self::InterVehicleCollision { overlap, .. } => *overlap,
        }
    }

    /// Phrase handed to the speech synthesizer
    pub fn speech_text(&self) -> &'static str {
        match self {
            Self::EgoCollision { .. } => "Accident detected with our car.",
            Self::InterVehicleCollision { .. } => "Accident detected between other vehicles.",
        }
    }

    /// Subject line for the SMS body; the dispatcher appends the location
    pub fn sms_subject(&self) -> &'static str {
        match self {
            Self::EgoCollision { .. } => "Accident detected with OUR CAR!",
            Self::InterVehicleCollision { .. } => "Accident detected between vehicles!",
        }
    }
}

pub fn classify(
    vehicles: &[BoundingBox],
    zone: &BoundingBox,
    threshold: f32,
) -> Vec<CollisionEvent> {
    let mut events = Vec::new();

    for vehicle in vehicles {
        let overlap = overlap_ratio(vehicle, zone);
        if overlap > threshold {
            events.push(CollisionEvent::EgoCollision {
                vehicle: *vehicle,
                overlap,
            });
        }
    }

    for i in 0..vehicles.len() {
        for j in (i + 1)..vehicles.len() {
            let overlap = overlap_ratio(&vehicles[i], &vehicles[j]);
            if overlap > threshold {
                events.push(CollisionEvent::InterVehicleCollision {
                    first: vehicles[i],
                    second: vehicles[j],
                    overlap,
                });
            }
        }
    }

    events
}
