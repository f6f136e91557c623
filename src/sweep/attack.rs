//! attack.rs
//! Attack definitions: which simulated variable to perturb, its nominal value
//! and the ordered values a sweep walks through.
//!
//! The built-in catalogue can be extended from a TOML file:
//!
//! ```toml
//! [[attack]]
//! name = "gainAccelY"
//! nominal = 1.0
//! values = [1.0, 0.5, 0.0]
//! target = { kind = "accel_gain", axis = "y" }
//! units = "-"
//! label = "Accel Y gain"
//! comment = "scale lateral accelerometer"
//! ```

use serde::Deserialize;
use std::{fs, path::Path};

use crate::telemetry::perturbation::{Axis, FaultTarget};
use crate::utils::error::{BridgeError, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttackDefinition {
    pub name: String,
    pub nominal: f64,
    pub values: Vec<f64>,
    pub target: FaultTarget,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub comment: String,
}

impl AttackDefinition {
    fn builtin(
        name: &str,
        nominal: f64,
        values: &[f64],
        target: FaultTarget,
        units: &str,
        label: &str,
        comment: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            nominal,
            values: values.to_vec(),
            target,
            units: units.to_string(),
            label: label.to_string(),
            comment: comment.to_string(),
        }
    }

    /// Same attack with its sweep values replaced (CLI override).
    pub fn with_values(mut self, values: Vec<f64>) -> Self {
        self.values = values;
        self
    }

    /// Same attack with its nominal value replaced (CLI override).
    pub fn with_nominal(mut self, nominal: f64) -> Self {
        self.nominal = nominal;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.values.is_empty() {
            return Err(BridgeError::Config(format!("attack '{}' has no sweep values", self.name)));
        }
        if let Some(v) = self.values.iter().find(|v| !v.is_finite()) {
            return Err(BridgeError::Config(format!("attack '{}' has non-finite value {}", self.name, v)));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AttackFile {
    #[serde(default)]
    attack: Vec<AttackDefinition>,
}

/// Named attack catalogue.
#[derive(Debug, Clone)]
pub struct AttackTable {
    attacks: Vec<AttackDefinition>,
}

impl Default for AttackTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AttackTable {
    pub fn builtin() -> Self {
        let attacks = vec![
            AttackDefinition::builtin(
                "imuGyroNoise",
                0.0,
                &[0.0, 0.001, 0.005, 0.01, 0.05, 0.1],
                FaultTarget::GyroNoise,
                "rad²/s²",
                "Gyro noise variance",
                "zero-mean gaussian noise on body rates",
            ),
            AttackDefinition::builtin(
                "imuGyroBias",
                0.0,
                &[0.0, 0.01, 0.02, 0.05, 0.1],
                FaultTarget::GyroBias,
                "rad/s",
                "Gyro bias",
                "constant offset on body rates",
            ),
            AttackDefinition::builtin(
                "imuGyroOscillation",
                0.0,
                &[0.0, 0.5, 1.0, 2.0, 5.0],
                FaultTarget::GyroOscillation,
                "Hz",
                "Yaw-rate oscillation frequency",
                "sinusoid injected on r",
            ),
            AttackDefinition::builtin(
                "gainAccelX",
                1.0,
                &[1.0, 0.9, 0.75, 0.5, 0.25, 0.0],
                FaultTarget::AccelGain(Axis::X),
                "-",
                "Accel X gain",
                "scale longitudinal accelerometer",
            ),
            AttackDefinition::builtin(
                "gainAccelY",
                1.0,
                &[1.0, 0.9, 0.75, 0.5, 0.25, 0.0],
                FaultTarget::AccelGain(Axis::Y),
                "-",
                "Accel Y gain",
                "scale lateral accelerometer",
            ),
            AttackDefinition::builtin(
                "gainAccelZ",
                1.0,
                &[1.0, 0.9, 0.75, 0.5, 0.25, 0.0],
                FaultTarget::AccelGain(Axis::Z),
                "-",
                "Accel Z gain",
                "scale vertical accelerometer",
            ),
            AttackDefinition::builtin(
                "gainAirspeed",
                1.0,
                &[1.0, 0.9, 0.8, 0.6],
                FaultTarget::AirspeedGain,
                "-",
                "Airspeed gain",
                "scale calibrated airspeed",
            ),
        ];
        Self { attacks }
    }

    /// Parse `[[attack]]` entries from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: AttackFile = toml::from_str(text)?;
        for a in &file.attack {
            a.validate()?;
        }
        Ok(Self { attacks: file.attack })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Add or replace definitions by name.
    pub fn merge(&mut self, other: AttackTable) {
        for a in other.attacks {
            match self.attacks.iter_mut().find(|x| x.name == a.name) {
                Some(slot) => *slot = a,
                None => self.attacks.push(a),
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<AttackDefinition> {
        self.attacks
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownAttack(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attacks.iter().map(|a| a.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup() {
        let table = AttackTable::builtin();
        let a = table.get("gainAccelX").unwrap();
        assert_eq!(a.target, FaultTarget::AccelGain(Axis::X));
        assert_eq!(a.nominal, 1.0);
        assert!(matches!(table.get("nope"), Err(BridgeError::UnknownAttack(_))));
    }

    #[test]
    fn toml_overrides_builtin() {
        let text = r#"
            [[attack]]
            name = "gainAccelX"
            nominal = 1.0
            values = [1.0, 0.0]
            target = { kind = "accel_gain", axis = "x" }

            [[attack]]
            name = "biasOnly"
            nominal = 0.0
            values = [0.5]
            target = { kind = "gyro_bias" }
            label = "bias"
        "#;
        let mut table = AttackTable::builtin();
        table.merge(AttackTable::from_toml_str(text).unwrap());
        assert_eq!(table.get("gainAccelX").unwrap().values, vec![1.0, 0.0]);
        let bias = table.get("biasOnly").unwrap();
        assert_eq!(bias.target, FaultTarget::GyroBias);
        assert_eq!(bias.label, "bias");
        assert_eq!(bias.units, "");
    }

    #[test]
    fn empty_values_rejected() {
        let text = r#"
            [[attack]]
            name = "empty"
            nominal = 0.0
            values = []
            target = { kind = "gyro_noise" }
        "#;
        assert!(matches!(AttackTable::from_toml_str(text), Err(BridgeError::Config(_))));
    }
}
