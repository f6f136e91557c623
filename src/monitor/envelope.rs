//! envelope.rs
//! Flight and mission safety envelopes, evaluated once per tick.
//!
//! Both checks are pure functions of the current frame and the elapsed run
//! time. What a violation means for the run is decided by the sweep.

use serde::Deserialize;
use std::f64::consts::PI;

use crate::telemetry::codec::TelemetryFrame;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters (spherical law of cosines).
pub fn great_circle_dist(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlon = (lon2 - lon1).to_radians();
    // sin1·sin2 + cos1·cos2·cos(dlon), written so identical points give exactly 1
    let cos_angle = (lat1 - lat2).cos() - lat1.cos() * lat2.cos() * (1.0 - dlon.cos());
    cos_angle.clamp(-1.0, 1.0).acos() * EARTH_RADIUS_M
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Violation {
    /// A body rate exceeded the limit; carries the offending magnitude.
    AngularRate(f64),
    /// Altitude at or below zero.
    Altitude(f64),
    /// Outside the theater radius; carries the distance from its center.
    Theater(f64),
    /// Outside the target window while it is active; carries the distance.
    TargetWindow(f64),
}

impl Violation {
    pub fn label(&self) -> &'static str {
        match self {
            Violation::AngularRate(_) => "angular_rate",
            Violation::Altitude(_) => "altitude",
            Violation::Theater(_) => "theater",
            Violation::TargetWindow(_) => "target_window",
        }
    }

    pub fn value(&self) -> f64 {
        match *self {
            Violation::AngularRate(x)
            | Violation::Altitude(x)
            | Violation::Theater(x)
            | Violation::TargetWindow(x) => x,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FlightEnvelope {
    /// rad/s
    pub max_rate: f64,
    /// meters
    pub min_altitude: f64,
}

impl Default for FlightEnvelope {
    fn default() -> Self {
        Self {
            max_rate: PI,
            min_altitude: 0.0,
        }
    }
}

impl FlightEnvelope {
    pub fn check(&self, f: &TelemetryFrame) -> Option<Violation> {
        let worst = f.p.abs().max(f.q.abs()).max(f.r.abs());
        if worst > self.max_rate {
            return Some(Violation::AngularRate(worst));
        }
        if f.alt <= self.min_altitude {
            return Some(Violation::Altitude(f.alt));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MissionEnvelope {
    pub theater_lat: f64,
    pub theater_lon: f64,
    /// meters
    pub theater_radius: f64,
    pub target_lat: f64,
    pub target_lon: f64,
    /// meters
    pub target_radius: f64,
    /// seconds from run start; the window is open strictly between the bounds
    pub target_start: f64,
    pub target_end: f64,
}

impl Default for MissionEnvelope {
    fn default() -> Self {
        Self {
            theater_lat: 37.616611,
            theater_lon: -122.416105,
            theater_radius: 2000.0,
            target_lat: 37.6082701666,
            target_lon: -122.400064179,
            target_radius: 150.0,
            target_start: 70.0,
            target_end: 80.0,
        }
    }
}

impl MissionEnvelope {
    pub fn target_window_open(&self, elapsed: f64) -> bool {
        elapsed > self.target_start && elapsed < self.target_end
    }

    pub fn check(&self, f: &TelemetryFrame, elapsed: f64) -> Option<Violation> {
        if self.target_window_open(elapsed) {
            let target_dist = great_circle_dist(self.target_lat, self.target_lon, f.lat, f.lon);
            if target_dist > self.target_radius {
                return Some(Violation::TargetWindow(target_dist));
            }
        }

        let theater_dist = great_circle_dist(self.theater_lat, self.theater_lon, f.lat, f.lon);
        if theater_dist > self.theater_radius {
            return Some(Violation::Theater(theater_dist));
        }
        None
    }
}

/// Outcome of both checks for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvelopeVerdict {
    pub flight: Option<Violation>,
    pub mission: Option<Violation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct EnvelopeMonitor {
    pub flight: FlightEnvelope,
    pub mission: MissionEnvelope,
}

impl EnvelopeMonitor {
    pub fn evaluate(&self, f: &TelemetryFrame, elapsed: f64) -> EnvelopeVerdict {
        EnvelopeVerdict {
            flight: self.flight.check(f),
            mission: self.mission.check(f, elapsed),
        }
    }
}
