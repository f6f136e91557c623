// Telemetry: physics-engine frame decoding, unit handling, fault perturbation
// and the outgoing records for the flight controller and display sink.

pub mod fdm;
pub mod codec;
pub mod perturbation;
