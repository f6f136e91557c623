//! wind.rs
//! Wind generator fed to the physics engine every 0.1 s.
//!
//! Speed follows a turbulence random walk around the configured base speed;
//! direction is fixed. With zero turbulence the output is constant.

use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use std::str::FromStr;

use crate::bridge::console::{ConsoleCommand, paths};
use crate::utils::error::BridgeError;

/// Average period of turbulence changes, seconds.
const TURBULENCE_TIME_CONSTANT: f64 = 5.0;
const FEET_PER_METER: f64 = 1.0 / 0.3048;

/// Base wind parameters: `speed,direction,turbulence`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(try_from = "String")]
pub struct WindParams {
    /// m/s
    pub speed: f64,
    /// degrees, direction the wind is going in
    pub direction: f64,
    /// standard deviation of the turbulence walk
    pub turbulence: f64,
}

impl FromStr for WindParams {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(BridgeError::Config(format!(
                "expected wind as speed,direction,turbulence, not '{}'",
                s
            )));
        }
        let num = |v: &str| {
            v.parse::<f64>()
                .map_err(|e| BridgeError::Config(format!("bad wind value '{}': {}", v, e)))
        };
        Ok(Self {
            speed: num(parts[0])?,
            direction: num(parts[1])?,
            turbulence: num(parts[2])?,
        })
    }
}

impl TryFrom<String> for WindParams {
    type Error = BridgeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindSample {
    /// m/s
    pub speed: f64,
    /// degrees
    pub direction: f64,
    /// current turbulence multiplier applied to the base speed
    pub turbulence: f64,
}

impl WindSample {
    /// Two console writes: heading in radians, magnitude in feet per second.
    pub fn console_commands(&self) -> [ConsoleCommand; 2] {
        [
            ConsoleCommand::set(paths::WIND_HEADING, self.direction.to_radians()),
            ConsoleCommand::set(paths::WIND_MAGNITUDE, self.speed * FEET_PER_METER),
        ]
    }
}

pub struct WindModel {
    params: WindParams,
    turbulence_mul: f64,
    t_last: Option<f64>,
    rng: StdRng,
}

impl WindModel {
    pub fn new(params: WindParams) -> Self {
        Self::with_rng(params, StdRng::from_os_rng())
    }

    pub fn with_seed(params: WindParams, seed: u64) -> Self {
        Self::with_rng(params, StdRng::seed_from_u64(seed))
    }

    fn with_rng(params: WindParams, rng: StdRng) -> Self {
        Self {
            params,
            turbulence_mul: 1.0,
            t_last: None,
            rng,
        }
    }

    pub fn params(&self) -> WindParams {
        self.params
    }

    /// Advance the model to `t` (seconds, monotonic) and return the current wind.
    pub fn sample(&mut self, t: f64) -> WindSample {
        let dt = self.t_last.map_or(0.0, |last| (t - last).max(0.0));
        self.t_last = Some(t);

        if dt > 0.0 && self.params.turbulence > 0.0 {
            if let Ok(gauss) = Normal::new(1.0, self.params.turbulence) {
                let mut delta = dt.sqrt() * (1.0 - gauss.sample(&mut self.rng));
                delta -= (self.turbulence_mul - 1.0) * (dt / TURBULENCE_TIME_CONSTANT);
                self.turbulence_mul += delta;
            }
        }

        WindSample {
            speed: self.params.speed * self.turbulence_mul.abs(),
            direction: self.params.direction,
            turbulence: self.turbulence_mul,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wind_string() {
        let p: WindParams = "5,180,0.2".parse().unwrap();
        assert_eq!(p, WindParams { speed: 5.0, direction: 180.0, turbulence: 0.2 });
        assert!("5,180".parse::<WindParams>().is_err());
        assert!("a,b,c".parse::<WindParams>().is_err());
    }

    #[test]
    fn calm_turbulence_is_constant() {
        let mut wind = WindModel::with_seed(WindParams { speed: 4.0, direction: 90.0, turbulence: 0.0 }, 1);
        for i in 0..50 {
            let s = wind.sample(i as f64 * 0.1);
            assert_eq!(s.speed, 4.0);
            assert_eq!(s.direction, 90.0);
        }
    }

    #[test]
    fn turbulence_varies_speed() {
        let mut wind = WindModel::with_seed(WindParams { speed: 4.0, direction: 0.0, turbulence: 0.5 }, 3);
        let speeds: Vec<f64> = (0..20).map(|i| wind.sample(i as f64 * 0.1).speed).collect();
        assert!(speeds.iter().any(|&s| s != 4.0));
        assert!(speeds.iter().all(|&s| s >= 0.0));
    }

    #[test]
    fn console_units() {
        let s = WindSample { speed: 0.3048, direction: 180.0, turbulence: 1.0 };
        let [heading, mag] = s.console_commands();
        match heading {
            ConsoleCommand::Set { path, value } => {
                assert_eq!(path, paths::WIND_HEADING);
                assert!((value - std::f64::consts::PI).abs() < 1e-12);
            }
            other => panic!("unexpected {:?}", other),
        }
        match mag {
            ConsoleCommand::Set { value, .. } => assert!((value - 1.0).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
    }
}
