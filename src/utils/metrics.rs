//! Loop rate counters and the periodic status report.
//!
//! - **LoopMetrics:** counts telemetry frames and controller inputs between reports.
//! - **StatusReport:** rates plus a snapshot of the newest frame, logged every few seconds.

use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::telemetry::codec::TelemetryFrame;

pub const STATUS_PERIOD: Duration = Duration::from_secs(3);

/// Frame/input counters since the last report.
#[derive(Debug, Clone)]
pub struct LoopMetrics {
    frames: u64,
    inputs: u64,
    total_frames: u64,
    total_inputs: u64,
    last_report: Instant,
    period: Duration,
}

impl LoopMetrics {
    pub fn new(now: Instant) -> Self {
        Self::with_period(now, STATUS_PERIOD)
    }

    pub fn with_period(now: Instant, period: Duration) -> Self {
        Self {
            frames: 0,
            inputs: 0,
            total_frames: 0,
            total_inputs: 0,
            last_report: now,
            period,
        }
    }

    #[inline]
    pub fn record_frame(&mut self) {
        self.frames += 1;
        self.total_frames += 1;
    }

    #[inline]
    pub fn record_input(&mut self) {
        self.inputs += 1;
        self.total_inputs += 1;
    }

    pub fn totals(&self) -> (u64, u64) {
        (self.total_frames, self.total_inputs)
    }

    /// Produce a report if the period has elapsed, resetting the window.
    pub fn report(&mut self, now: Instant, frame: Option<(&TelemetryFrame, f64)>) -> Option<StatusReport> {
        let window = now.saturating_duration_since(self.last_report);
        if window <= self.period {
            return None;
        }
        let secs = window.as_secs_f64();
        let report = StatusReport {
            ips: self.inputs as f64 / secs,
            fps: self.frames as f64 / secs,
            snapshot: frame.map(|(f, agl)| Snapshot {
                asl: f.alt,
                agl,
                roll_deg: f.phi.to_degrees(),
                pitch_deg: f.theta.to_degrees(),
                accel: (f.ax, f.ay, f.az),
                lat: f.lat,
                lon: f.lon,
            }),
        };
        self.frames = 0;
        self.inputs = 0;
        self.last_report = now;
        Some(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    pub asl: f64,
    pub agl: f64,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub accel: (f64, f64, f64),
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub ips: f64,
    pub fps: f64,
    /// `None` until the first frame of the run arrives.
    pub snapshot: Option<Snapshot>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPS {:.0} FPS {:.0}", self.ips, self.fps)?;
        match &self.snapshot {
            Some(s) => write!(
                f,
                " asl={:.1} agl={:.1} roll={:.1} pitch={:.1} a=({:.2} {:.2} {:.2}) lat={:.6} lon={:.6}",
                s.asl, s.agl, s.roll_deg, s.pitch_deg, s.accel.0, s.accel.1, s.accel.2, s.lat, s.lon
            ),
            None => f.write_str(" (no telemetry yet)"),
        }
    }
}
