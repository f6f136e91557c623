//! codec.rs
//! Telemetry codec between the physics engine and the flight controller.
//! - decode: engine frame -> `DecodedFrame` (SI units, body-frame rates); the
//!   engine's own state stays untouched, only the controller's copy is perturbed
//! - encode_processed: 17-field tab-separated record for the controller
//! - encode_display: engine-native frame patched for a display sink

use crate::telemetry::fdm::{FdmPacket, Field, Unit};
use crate::telemetry::perturbation::Perturbation;
use crate::utils::error::Result;

/// Decoded engine state for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryFrame {
    /// degrees
    pub lat: f64,
    /// degrees
    pub lon: f64,
    /// meters above sea level
    pub alt: f64,
    /// meters above ground level
    pub agl: f64,
    pub phi: f64,
    pub theta: f64,
    pub psi: f64,
    /// body-frame angular rates, rad/s
    pub p: f64,
    pub q: f64,
    pub r: f64,
    /// pilot-frame accelerations, m/s²
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    pub v_north: f64,
    pub v_east: f64,
    pub v_down: f64,
    pub v_cas: f64,
}

/// Convert Euler angle rates to body-frame angular velocity.
///
/// Angles and rates must come from the same frame.
pub fn body_rates(phi: f64, theta: f64, phi_dot: f64, theta_dot: f64, psi_dot: f64) -> (f64, f64, f64) {
    let (s_phi, c_phi) = phi.sin_cos();
    let (s_theta, c_theta) = theta.sin_cos();
    let p = phi_dot - psi_dot * s_theta;
    let q = c_phi * theta_dot + s_phi * c_theta * psi_dot;
    let r = -s_phi * theta_dot + c_phi * c_theta * psi_dot;
    (p, q, r)
}

impl TelemetryFrame {
    /// Engine state as reported, no faults applied.
    pub fn from_packet(pkt: &FdmPacket) -> Self {
        let get = |field: Field, unit: Unit| pkt.get(field, unit).unwrap_or_default();

        let phi = get(Field::Phi, Unit::Radians);
        let theta = get(Field::Theta, Unit::Radians);
        let (p, q, r) = body_rates(
            phi,
            theta,
            get(Field::PhiDot, Unit::Rps),
            get(Field::ThetaDot, Unit::Rps),
            get(Field::PsiDot, Unit::Rps),
        );

        TelemetryFrame {
            lat: get(Field::Latitude, Unit::Degrees),
            lon: get(Field::Longitude, Unit::Degrees),
            alt: get(Field::Altitude, Unit::Meters),
            agl: get(Field::Agl, Unit::Meters),
            phi,
            theta,
            psi: get(Field::Psi, Unit::Radians),
            p,
            q,
            r,
            ax: get(Field::AccelX, Unit::Mpss),
            ay: get(Field::AccelY, Unit::Mpss),
            az: get(Field::AccelZ, Unit::Mpss),
            v_north: get(Field::VNorth, Unit::Mps),
            v_east: get(Field::VEast, Unit::Mps),
            v_down: get(Field::VDown, Unit::Mps),
            v_cas: get(Field::Vcas, Unit::Mps),
        }
    }
}

/// One engine frame seen two ways.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedFrame {
    /// What the engine reports; envelopes are judged on this.
    pub truth: TelemetryFrame,
    /// What the flight controller is sent, with the active faults applied.
    pub sensed: TelemetryFrame,
}

impl DecodedFrame {
    /// `t` is seconds since the current run started.
    pub fn new(pkt: &FdmPacket, perturbation: &mut Perturbation, t: f64) -> Self {
        let truth = TelemetryFrame::from_packet(pkt);
        let mut sensed = truth;
        perturbation.apply(&mut sensed, t);
        Self { truth, sensed }
    }
}

/// Decode one engine datagram. Fails with `MalformedFrame` on a size mismatch.
pub fn decode(buf: &[u8], perturbation: &mut Perturbation, t: f64) -> Result<DecodedFrame> {
    let pkt = FdmPacket::parse(buf)?;
    Ok(DecodedFrame::new(&pkt, perturbation, t))
}

/// Processed-telemetry record for the flight controller.
///
/// `time` always carries a fractional part; other fields use the shortest
/// representation that round-trips.
pub fn encode_processed(time: f64, f: &TelemetryFrame) -> String {
    let fields = [
        f.lat, f.lon, f.alt, f.phi, f.theta, f.psi, f.p, f.q, f.r, f.ax, f.ay, f.az, f.v_north,
        f.v_east, f.v_down, f.v_cas,
    ];
    let mut out = format!("{:?}", time);
    for v in fields {
        out.push('\t');
        out.push_str(&v.to_string());
    }
    out.push('\n');
    out
}

/// Engine-native frame for the display sink: altitude re-based on the
/// ground height and a throttle-derived engine RPM.
pub fn encode_display(pkt: &FdmPacket, ground_height: f64, throttle: f64) -> Vec<u8> {
    let mut out = pkt.clone();
    let agl = pkt.get(Field::Agl, Unit::Meters).unwrap_or_default();
    out.set(Field::Altitude, agl + ground_height, Unit::Meters);
    out.set(Field::Rpm, throttle * 1000.0, Unit::Rpm);
    out.as_bytes().to_vec()
}
