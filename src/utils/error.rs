//! Error taxonomy for the bridge and sweep.
//!
//! Transient send failures never reach this type: the bridge swallows
//! `ConnectionRefused` at the send site. Malformed actuator lines are dropped
//! before they become errors. Everything here is fatal for the session.

use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("malformed telemetry frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    #[error("physics engine failed to start: {0}")]
    StartupFailed(String),

    #[error("timeout waiting for {0}")]
    Timeout(&'static str),

    #[error("physics engine exited unexpectedly ({0})")]
    ProcessExited(String),

    #[error("interrupted by signal {0}")]
    Interrupted(i32),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown attack definition '{0}'")]
    UnknownAttack(String),

    #[error("sweep incomplete: {metric} cell ({outer}, {inner}) never written")]
    IncompleteSweep {
        metric: &'static str,
        outer: usize,
        inner: usize,
    },

    #[error("endpoint {role} ({addr}) failed: {source}")]
    Endpoint {
        role: &'static str,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("plot rendering failed: {0}")]
    Plot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("attack table parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
