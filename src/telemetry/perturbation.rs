//! Fault perturbation applied to decoded telemetry.
//!
//! A `Perturbation` is rebuilt by the sweep before every run from the two
//! active attack values and passed explicitly into `decode`.

use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::f64::consts::TAU;

use crate::telemetry::codec::TelemetryFrame;

/// Amplitude of the injected yaw-rate oscillation, rad/s.
const OSCILLATION_AMPLITUDE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Simulated variable an attack acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "axis")]
pub enum FaultTarget {
    /// Variance of zero-mean gaussian noise added to p, q, r.
    GyroNoise,
    /// Constant bias (rad/s) added to p, q, r.
    GyroBias,
    /// Frequency (Hz) of a sinusoid added to r.
    GyroOscillation,
    /// Gain applied to one accelerometer axis.
    AccelGain(Axis),
    /// Gain applied to calibrated airspeed.
    AirspeedGain,
}

impl FaultTarget {
    pub fn name(&self) -> &'static str {
        match self {
            FaultTarget::GyroNoise => "gyro_noise",
            FaultTarget::GyroBias => "gyro_bias",
            FaultTarget::GyroOscillation => "gyro_oscillation",
            FaultTarget::AccelGain(Axis::X) => "accel_gain_x",
            FaultTarget::AccelGain(Axis::Y) => "accel_gain_y",
            FaultTarget::AccelGain(Axis::Z) => "accel_gain_z",
            FaultTarget::AirspeedGain => "airspeed_gain",
        }
    }
}

pub struct Perturbation {
    faults: Vec<(FaultTarget, f64)>,
    rng: StdRng,
}

impl std::fmt::Debug for Perturbation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Perturbation").field("faults", &self.faults).finish()
    }
}

impl Default for Perturbation {
    fn default() -> Self {
        Self::nominal()
    }
}

impl Perturbation {
    /// Identity perturbation: decode output is the raw derivation.
    pub fn nominal() -> Self {
        Self::with_seed(Vec::new(), 0)
    }

    pub fn new(faults: Vec<(FaultTarget, f64)>) -> Self {
        Self {
            faults,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_seed(faults: Vec<(FaultTarget, f64)>, seed: u64) -> Self {
        Self {
            faults,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn faults(&self) -> &[(FaultTarget, f64)] {
        &self.faults
    }

    /// Apply every configured fault to `frame`. `t` is seconds since the run started.
    pub fn apply(&mut self, frame: &mut TelemetryFrame, t: f64) {
        for &(target, value) in &self.faults {
            match target {
                FaultTarget::GyroNoise => {
                    if value <= 0.0 {
                        continue;
                    }
                    // variance -> std-dev; Normal::new only fails on a non-finite sigma
                    if let Ok(noise) = Normal::new(0.0, value.sqrt()) {
                        frame.p += noise.sample(&mut self.rng);
                        frame.q += noise.sample(&mut self.rng);
                        frame.r += noise.sample(&mut self.rng);
                    }
                }
                FaultTarget::GyroBias => {
                    frame.p += value;
                    frame.q += value;
                    frame.r += value;
                }
                FaultTarget::GyroOscillation => {
                    if value > 0.0 {
                        frame.r += OSCILLATION_AMPLITUDE * (TAU * value * t).sin();
                    }
                }
                FaultTarget::AccelGain(Axis::X) => frame.ax *= value,
                FaultTarget::AccelGain(Axis::Y) => frame.ay *= value,
                FaultTarget::AccelGain(Axis::Z) => frame.az *= value,
                FaultTarget::AirspeedGain => frame.v_cas *= value,
            }
        }
    }
}
