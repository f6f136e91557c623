//! Session configuration.
//!
//! Defaults reproduce the stock HIL setup: controller on 5501/5502, display
//! on 5503, calm air, 80 s runs. Any field can be overridden from a TOML file
//! and then from the command line.

use serde::Deserialize;
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::bridge::process::ProcessSpec;
use crate::control::wind::WindParams;
use crate::monitor::envelope::EnvelopeMonitor;
use crate::sweep::controller::{RUN_HORIZON_S, TimeoutPolicy};
use crate::utils::error::{BridgeError, Result};

/// Vehicle home: `lat,lng,alt,hdg`. Only the altitude feeds the bridge
/// (as ground height for the display frame).
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(try_from = "String")]
pub struct Home {
    pub lat: f64,
    pub lng: f64,
    /// meters above sea level
    pub alt: f64,
    /// degrees
    pub hdg: f64,
}

impl FromStr for Home {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let v: Vec<&str> = s.split(',').map(str::trim).collect();
        if v.len() != 4 {
            return Err(BridgeError::Config(format!("home should be lat,lng,alt,hdg - '{s}'")));
        }
        let num = |x: &str| {
            x.parse::<f64>()
                .map_err(|e| BridgeError::Config(format!("bad home value '{x}': {e}")))
        };
        Ok(Self {
            lat: num(v[0])?,
            lng: num(v[1])?,
            alt: num(v[2])?,
            hdg: num(v[3])?,
        })
    }
}

impl TryFrom<String> for Home {
    type Error = BridgeError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// `IP:port` into a socket address.
pub fn interpret_address(s: &str) -> Result<SocketAddr> {
    s.trim()
        .parse()
        .map_err(|e| BridgeError::Config(format!("expected IP:port, got '{s}': {e}")))
}

fn default_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Where the controller sends actuator records.
    pub controller_in: SocketAddr,
    /// Where processed telemetry goes.
    pub controller_out: SocketAddr,
    /// Optional visualizer; `None` disables the display stream.
    pub display_out: Option<SocketAddr>,
    pub home: Home,
    pub wind: WindParams,

    pub engine: String,
    pub script: String,
    pub engine_options: Option<String>,
    pub workdir: Option<PathBuf>,

    pub outer_attack: String,
    pub inner_attack: String,
    pub attack_file: Option<PathBuf>,

    pub horizon_s: f64,
    pub reset_settle_s: f64,
    pub timeout_policy: TimeoutPolicy,
    pub envelope: EnvelopeMonitor,

    pub output_dir: PathBuf,
    pub run_log: Option<PathBuf>,
    pub plot: bool,
    /// Fixed seed for wind turbulence and per-run sensor noise.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            controller_in: default_addr(5502),
            controller_out: default_addr(5501),
            display_out: Some(default_addr(5503)),
            home: Home::default(),
            wind: WindParams::default(),
            engine: "JSBSim".to_string(),
            script: "jsbsim/rascal_test.xml".to_string(),
            engine_options: None,
            workdir: None,
            outer_attack: "imuGyroNoise".to_string(),
            inner_attack: "gainAccelX".to_string(),
            attack_file: None,
            horizon_s: RUN_HORIZON_S,
            reset_settle_s: 2.0,
            timeout_policy: TimeoutPolicy::default(),
            envelope: EnvelopeMonitor::default(),
            output_dir: PathBuf::from("."),
            run_log: Some(PathBuf::from("sweep_events.csv")),
            plot: true,
            seed: None,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.horizon_s.is_finite() && self.horizon_s > 0.0) {
            return Err(BridgeError::Config(format!("horizon must be positive, got {}", self.horizon_s)));
        }
        if !(self.reset_settle_s.is_finite() && self.reset_settle_s >= 0.0) {
            return Err(BridgeError::Config(format!(
                "reset settle must be non-negative, got {}",
                self.reset_settle_s
            )));
        }
        if self.outer_attack == self.inner_attack {
            return Err(BridgeError::Config(format!(
                "outer and inner attack are both '{}'",
                self.outer_attack
            )));
        }
        Ok(())
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_secs_f64(self.reset_settle_s)
    }

    pub fn process_spec(&self) -> ProcessSpec {
        let mut spec = ProcessSpec::jsbsim(&self.script);
        spec.program = self.engine.clone();
        spec.current_dir = self.workdir.clone();
        match &self.engine_options {
            Some(opts) => spec.with_options(opts),
            None => spec,
        }
    }

    /// Resolve a relative output file against `output_dir`.
    pub fn output_path(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.output_dir.join(file)
        }
    }
}
