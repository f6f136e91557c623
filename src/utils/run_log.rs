//! Per-run event log written as CSV.
//!
//! One row per lifecycle event: run start, mission and flight violations,
//! timeout and run end. Rows are flushed at the end of every run so a crash
//! mid-sweep keeps everything recorded so far.

use csv::Writer;
use log::debug;
use serde::Serialize;
use std::{fs::File, io::Write, path::Path};

use crate::sweep::controller::{RunEvent, RunOutcome, RunPoint};
use crate::utils::error::{BridgeError, Result};

#[derive(Debug, Serialize)]
struct LogRow<'a> {
    run: usize,
    outer_index: usize,
    inner_index: usize,
    outer_value: f64,
    inner_value: f64,
    event: &'a str,
    t: Option<f64>,
    detail: String,
}

pub struct RunLog<W: Write> {
    wtr: Writer<W>,
    run: usize,
    point: Option<RunPoint>,
}

impl RunLog<File> {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self::from_writer(File::create(path)?))
    }
}

impl<W: Write> RunLog<W> {
    pub fn from_writer(w: W) -> Self {
        Self {
            wtr: Writer::from_writer(w),
            run: 0,
            point: None,
        }
    }

    fn row(&mut self, event: &str, t: Option<f64>, detail: String) -> Result<()> {
        let Some(p) = self.point else {
            return Ok(());
        };
        self.wtr.serialize(LogRow {
            run: self.run,
            outer_index: p.outer_index,
            inner_index: p.inner_index,
            outer_value: p.outer_value,
            inner_value: p.inner_value,
            event,
            t,
            detail,
        })?;
        Ok(())
    }

    pub fn run_started(&mut self, run: usize, point: RunPoint) -> Result<()> {
        self.run = run;
        self.point = Some(point);
        self.row("run_start", Some(0.0), String::new())
    }

    pub fn event(&mut self, event: &RunEvent) -> Result<()> {
        match *event {
            RunEvent::MissionFailed { t, violation } => {
                self.row("mission_fail", Some(t), format!("{}={:.3}", violation.label(), violation.value()))
            }
            RunEvent::FlightFailed { t, violation } => {
                self.row("flight_fail", Some(t), format!("{}={:.3}", violation.label(), violation.value()))
            }
            RunEvent::TimedOut { t } => self.row("timeout", Some(t), String::new()),
        }
    }

    pub fn run_finished(&mut self, outcome: &RunOutcome) -> Result<()> {
        let detail = format!(
            "flightFail={:?} missionFail={:?}",
            outcome.flight_fail, outcome.mission_fail
        );
        self.row("run_end", None, detail)?;
        self.wtr.flush()?;
        debug!("[RunLog] run {} flushed", self.run);
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.wtr
            .into_inner()
            .map_err(|e| BridgeError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::envelope::Violation;

    #[test]
    fn writes_header_and_rows() {
        let mut log = RunLog::from_writer(Vec::new());
        let point = RunPoint { outer_index: 1, inner_index: 2, outer_value: 0.1, inner_value: 0.5 };
        log.run_started(5, point).unwrap();
        log.event(&RunEvent::MissionFailed { t: 4.5, violation: Violation::Theater(2100.0) })
            .unwrap();
        log.event(&RunEvent::TimedOut { t: 80.0 }).unwrap();
        log.run_finished(&RunOutcome { flight_fail: vec![80.0], mission_fail: vec![4.5] })
            .unwrap();

        let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "run,outer_index,inner_index,outer_value,inner_value,event,t,detail");
        assert_eq!(lines[1], "5,1,2,0.1,0.5,run_start,0.0,");
        assert_eq!(lines[2], "5,1,2,0.1,0.5,mission_fail,4.5,theater=2100.000");
        assert_eq!(lines[3], "5,1,2,0.1,0.5,timeout,80.0,");
        assert!(lines[4].starts_with("5,1,2,0.1,0.5,run_end,,"));
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn nothing_logged_before_first_run() {
        let mut log = RunLog::from_writer(Vec::new());
        log.event(&RunEvent::TimedOut { t: 80.0 }).unwrap();
        assert!(log.into_inner().unwrap().is_empty());
    }
}
