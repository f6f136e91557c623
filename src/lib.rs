//! # HIL fault-sweep bridge
//!
//! Sits between a physics engine and a flight controller under test:
//! decodes engine frames, perturbs them with an injected fault, forwards
//! them to the controller and relays its actuator commands back as console
//! writes. Around that loop a sweep controller walks a grid of two attack
//! parameters, judges every run against flight and mission envelopes and
//! hands the resulting failure-time tables to CSV and SVG exporters.
//!
//! ## Layout
//! - `telemetry`: engine frame layout, codec, perturbation context.
//! - `control`: actuator command tracking, wind model.
//! - `bridge`: engine console, engine process, datagram endpoints, poll.
//! - `monitor`: flight and mission envelopes.
//! - `sweep`: attack catalogue, run state machine, result tables.
//! - `runtime`: session context, event loop, signals.
//! - `utils`: configuration, errors, run log, exports, loop metrics.

pub mod bridge;
pub mod control;
pub mod monitor;
pub mod runtime;
pub mod sweep;
pub mod telemetry;
pub mod utils;
