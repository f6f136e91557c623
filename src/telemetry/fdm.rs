//! fdm.rs
//! FlightGear `net_fdm` v24 frame as emitted by JSBSim's FlightGear output.
//! - big-endian, 408 bytes, fixed layout
//! - fields are addressed by name; units are converted on get/set
//! - bytes for fields we don't name pass through untouched on re-encode

use crate::utils::error::{BridgeError, Result};

pub const FDM_VERSION: u32 = 24;
pub const FDM_PACKET_SIZE: usize = 408;

/// Physical units understood by the frame accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Radians,
    Degrees,
    Rps,
    Dps,
    Feet,
    Meters,
    Fps,
    Mps,
    Knots,
    Fpss,
    Mpss,
    Seconds,
    Rpm,
    Normalized,
}

impl Unit {
    /// Multiplier taking a value from `self` to `to`, if the pair is convertible.
    pub fn factor(self, to: Unit) -> Option<f64> {
        if self == to {
            return Some(1.0);
        }
        direct_factor(self, to).or_else(|| direct_factor(to, self).map(|inv| 1.0 / inv))
    }
}

fn direct_factor(from: Unit, to: Unit) -> Option<f64> {
    use Unit::*;
    match (from, to) {
        (Radians, Degrees) | (Rps, Dps) => Some(1.0_f64.to_degrees()),
        (Feet, Meters) | (Fps, Mps) | (Fpss, Mpss) => Some(0.3048),
        (Knots, Mps) => Some(0.514444444),
        (Knots, Fps) => Some(0.514444444 / 0.3048),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wire {
    F64,
    F32,
    U32,
}

/// Named fields of the frame, each with its wire offset, encoding and native unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Longitude,
    Latitude,
    Altitude,
    Agl,
    Phi,
    Theta,
    Psi,
    Alpha,
    Beta,
    PhiDot,
    ThetaDot,
    PsiDot,
    Vcas,
    ClimbRate,
    VNorth,
    VEast,
    VDown,
    AccelX,
    AccelY,
    AccelZ,
    Rpm,
    CurTime,
    Elevator,
    LeftAileron,
    RightAileron,
    Rudder,
}

impl Field {
    fn layout(self) -> (usize, Wire, Unit) {
        use Field::*;
        match self {
            Longitude => (8, Wire::F64, Unit::Radians),
            Latitude => (16, Wire::F64, Unit::Radians),
            Altitude => (24, Wire::F64, Unit::Meters),
            Agl => (32, Wire::F32, Unit::Meters),
            Phi => (36, Wire::F32, Unit::Radians),
            Theta => (40, Wire::F32, Unit::Radians),
            Psi => (44, Wire::F32, Unit::Radians),
            Alpha => (48, Wire::F32, Unit::Radians),
            Beta => (52, Wire::F32, Unit::Radians),
            PhiDot => (56, Wire::F32, Unit::Rps),
            ThetaDot => (60, Wire::F32, Unit::Rps),
            PsiDot => (64, Wire::F32, Unit::Rps),
            Vcas => (68, Wire::F32, Unit::Fps),
            ClimbRate => (72, Wire::F32, Unit::Fps),
            VNorth => (76, Wire::F32, Unit::Fps),
            VEast => (80, Wire::F32, Unit::Fps),
            VDown => (84, Wire::F32, Unit::Fps),
            AccelX => (100, Wire::F32, Unit::Fpss),
            AccelY => (104, Wire::F32, Unit::Fpss),
            AccelZ => (108, Wire::F32, Unit::Fpss),
            // first engine slot
            Rpm => (140, Wire::F32, Unit::Rpm),
            CurTime => (356, Wire::U32, Unit::Seconds),
            Elevator => (368, Wire::F32, Unit::Normalized),
            LeftAileron => (384, Wire::F32, Unit::Normalized),
            RightAileron => (388, Wire::F32, Unit::Normalized),
            Rudder => (392, Wire::F32, Unit::Normalized),
        }
    }

    pub fn native_unit(self) -> Unit {
        self.layout().2
    }
}

/// One raw frame. Owns its bytes so it can be patched and re-sent verbatim.
#[derive(Clone)]
pub struct FdmPacket {
    raw: [u8; FDM_PACKET_SIZE],
}

impl Default for FdmPacket {
    fn default() -> Self {
        let mut raw = [0u8; FDM_PACKET_SIZE];
        raw[0..4].copy_from_slice(&FDM_VERSION.to_be_bytes());
        Self { raw }
    }
}

impl std::fmt::Debug for FdmPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FdmPacket")
            .field("version", &self.version())
            .field("latitude", &self.get(Field::Latitude, Unit::Degrees))
            .field("longitude", &self.get(Field::Longitude, Unit::Degrees))
            .field("altitude", &self.raw_value(Field::Altitude))
            .finish()
    }
}

impl FdmPacket {
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let raw: [u8; FDM_PACKET_SIZE] =
            buf.try_into().map_err(|_| BridgeError::MalformedFrame {
                expected: FDM_PACKET_SIZE,
                actual: buf.len(),
            })?;
        Ok(Self { raw })
    }

    pub fn version(&self) -> u32 {
        u32::from_be_bytes(word(&self.raw, 0))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    fn raw_value(&self, field: Field) -> f64 {
        let (off, wire, _) = field.layout();
        match wire {
            Wire::F64 => f64::from_be_bytes(dword(&self.raw, off)),
            Wire::F32 => f32::from_be_bytes(word(&self.raw, off)) as f64,
            Wire::U32 => u32::from_be_bytes(word(&self.raw, off)) as f64,
        }
    }

    fn set_raw_value(&mut self, field: Field, value: f64) {
        let (off, wire, _) = field.layout();
        match wire {
            Wire::F64 => self.raw[off..off + 8].copy_from_slice(&value.to_be_bytes()),
            Wire::F32 => self.raw[off..off + 4].copy_from_slice(&(value as f32).to_be_bytes()),
            Wire::U32 => self.raw[off..off + 4].copy_from_slice(&(value as u32).to_be_bytes()),
        }
    }

    /// Read `field` converted to `unit`. `None` when the units are incompatible.
    pub fn get(&self, field: Field, unit: Unit) -> Option<f64> {
        field
            .native_unit()
            .factor(unit)
            .map(|f| self.raw_value(field) * f)
    }

    /// Write `value` (expressed in `unit`) into `field`.
    pub fn set(&mut self, field: Field, value: f64, unit: Unit) -> Option<()> {
        let f = unit.factor(field.native_unit())?;
        self.set_raw_value(field, value * f);
        Some(())
    }
}

fn word(raw: &[u8; FDM_PACKET_SIZE], off: usize) -> [u8; 4] {
    [raw[off], raw[off + 1], raw[off + 2], raw[off + 3]]
}

fn dword(raw: &[u8; FDM_PACKET_SIZE], off: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&raw[off..off + 8]);
    out
}
