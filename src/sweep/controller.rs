//! controller.rs
//! Per-run state machine and the outer × inner sweep plan.
//!
//! Run lifecycle: Reset -> Running -> (FlightFailed | TimedOut) -> Recorded.
//! A mission violation is latched while the run keeps going; a flight
//! violation or the horizon ends it. Timestamps are seconds since run start.

use serde::Deserialize;

use crate::monitor::envelope::{EnvelopeMonitor, Violation};
use crate::sweep::attack::AttackDefinition;
use crate::telemetry::codec::TelemetryFrame;
use crate::telemetry::perturbation::{FaultTarget, Perturbation};

/// Fixed run horizon, seconds.
pub const RUN_HORIZON_S: f64 = 80.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Reset,
    Running,
    FlightFailed,
    TimedOut,
    Recorded,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::FlightFailed | RunState::TimedOut)
    }
}

/// What reaching the horizon without a flight violation means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeoutPolicy {
    /// Record both metrics at the horizon (a full-length run counts as failed).
    #[default]
    RecordAsFailure,
    /// Leave metrics untouched; a clean timeout is a success.
    RecordAsSuccess,
}

/// Something that happened during a run, in tick order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunEvent {
    MissionFailed { t: f64, violation: Violation },
    FlightFailed { t: f64, violation: Violation },
    TimedOut { t: f64 },
}

/// Failure timestamps of one finished run. Empty = success for that metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    pub flight_fail: Vec<f64>,
    pub mission_fail: Vec<f64>,
}

pub struct RunTracker {
    monitor: EnvelopeMonitor,
    horizon: f64,
    policy: TimeoutPolicy,
    state: RunState,
    outcome: RunOutcome,
    mission_latched: bool,
}

impl RunTracker {
    pub fn new(monitor: EnvelopeMonitor, horizon: f64, policy: TimeoutPolicy) -> Self {
        Self {
            monitor,
            horizon,
            policy,
            state: RunState::Reset,
            outcome: RunOutcome::default(),
            mission_latched: false,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    /// Begin a run once the simulator has settled.
    pub fn start(&mut self) {
        self.state = RunState::Running;
        self.outcome = RunOutcome::default();
        self.mission_latched = false;
    }

    /// One tick. `frame` is the newest telemetry of this run, if any arrived yet.
    pub fn observe(&mut self, frame: Option<&TelemetryFrame>, elapsed: f64) -> Vec<RunEvent> {
        let mut events = Vec::new();
        if self.state != RunState::Running {
            return events;
        }

        if let Some(f) = frame {
            let verdict = self.monitor.evaluate(f, elapsed);
            if let (false, Some(v)) = (self.mission_latched, verdict.mission) {
                self.latch_mission(elapsed);
                events.push(RunEvent::MissionFailed { t: elapsed, violation: v });
            }
            if let Some(v) = verdict.flight {
                self.outcome.flight_fail.push(elapsed);
                if !self.mission_latched {
                    self.latch_mission(elapsed);
                }
                self.state = RunState::FlightFailed;
                events.push(RunEvent::FlightFailed { t: elapsed, violation: v });
                return events;
            }
        }

        if elapsed > self.horizon {
            if self.policy == TimeoutPolicy::RecordAsFailure {
                if !self.mission_latched {
                    self.latch_mission(self.horizon);
                }
                self.outcome.flight_fail.push(self.horizon);
            }
            self.state = RunState::TimedOut;
            events.push(RunEvent::TimedOut { t: self.horizon });
        }
        events
    }

    fn latch_mission(&mut self, t: f64) {
        self.mission_latched = true;
        self.outcome.mission_fail.push(t);
    }

    /// Hand over the outcome of a terminal run.
    pub fn record(&mut self) -> Option<RunOutcome> {
        if !self.state.is_terminal() {
            return None;
        }
        self.state = RunState::Recorded;
        Some(std::mem::take(&mut self.outcome))
    }

    /// Simulator reset issued; waiting for it to settle.
    pub fn reset(&mut self) {
        self.state = RunState::Reset;
    }
}

/// One cell of the sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunPoint {
    pub outer_index: usize,
    pub inner_index: usize,
    pub outer_value: f64,
    pub inner_value: f64,
}

/// Cartesian plan over two attacks; inner varies fastest.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub outer: AttackDefinition,
    pub inner: AttackDefinition,
}

impl SweepPlan {
    pub fn new(outer: AttackDefinition, inner: AttackDefinition) -> Self {
        Self { outer, inner }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.outer.values.len(), self.inner.values.len())
    }

    pub fn points(&self) -> impl Iterator<Item = RunPoint> + '_ {
        self.outer.values.iter().enumerate().flat_map(move |(oi, &ov)| {
            self.inner.values.iter().enumerate().map(move |(ii, &iv)| RunPoint {
                outer_index: oi,
                inner_index: ii,
                outer_value: ov,
                inner_value: iv,
            })
        })
    }

    /// Both attacks at their nominal values.
    pub fn nominal_perturbation(&self) -> Perturbation {
        Perturbation::new(vec![
            (self.outer.target, self.outer.nominal),
            (self.inner.target, self.inner.nominal),
        ])
    }

    fn faults_for(&self, point: &RunPoint) -> Vec<(FaultTarget, f64)> {
        vec![
            (self.outer.target, point.outer_value),
            (self.inner.target, point.inner_value),
        ]
    }

    pub fn perturbation_for(&self, point: &RunPoint) -> Perturbation {
        Perturbation::new(self.faults_for(point))
    }

    /// Reproducible noise: the same seed gives the same perturbation sequence.
    pub fn seeded_perturbation_for(&self, point: &RunPoint, seed: u64) -> Perturbation {
        Perturbation::with_seed(self.faults_for(point), seed)
    }
}
