//! results.rs
//! Sweep result tables: one `outer × inner` grid per metric, each cell the
//! failure timestamps recorded during that run.

use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::sweep::attack::AttackDefinition;
use crate::sweep::controller::{RunOutcome, RunPoint, SweepPlan};
use crate::utils::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Metric {
    FlightFail,
    MissionFail,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::FlightFail, Metric::MissionFail];

    pub fn key(self) -> &'static str {
        match self {
            Metric::FlightFail => "flightFail",
            Metric::MissionFail => "missionFail",
        }
    }
}

/// Summary of one cell for plotting and reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSummary {
    pub count: usize,
    pub first: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    rows: usize,
    cols: usize,
    cells: Vec<Option<Vec<f64>>>,
}

impl ResultTable {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![None; rows * cols],
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn set(&mut self, row: usize, col: usize, times: Vec<f64>) {
        assert!(row < self.rows && col < self.cols, "cell ({row}, {col}) out of range");
        self.cells[row * self.cols + col] = Some(times);
    }

    /// `None` until the run for that cell has been recorded.
    pub fn get(&self, row: usize, col: usize) -> Option<&[f64]> {
        self.cells.get(row * self.cols + col)?.as_deref()
    }

    fn first_missing(&self) -> Option<(usize, usize)> {
        self.cells
            .iter()
            .position(Option::is_none)
            .map(|i| (i / self.cols, i % self.cols))
    }

    pub fn summary(&self, row: usize, col: usize) -> Option<CellSummary> {
        let times = self.get(row, col)?;
        if times.is_empty() {
            return None;
        }
        Some(CellSummary {
            count: times.len(),
            first: times.min(),
            mean: times.mean(),
        })
    }
}

/// Accumulates run outcomes for a whole sweep.
#[derive(Debug, Clone)]
pub struct SweepResult {
    pub outer: AttackDefinition,
    pub inner: AttackDefinition,
    tables: BTreeMap<Metric, ResultTable>,
}

impl SweepResult {
    pub fn new(plan: &SweepPlan) -> Self {
        let (rows, cols) = plan.shape();
        let tables = Metric::ALL
            .iter()
            .map(|&m| (m, ResultTable::new(rows, cols)))
            .collect();
        Self {
            outer: plan.outer.clone(),
            inner: plan.inner.clone(),
            tables,
        }
    }

    pub fn record(&mut self, point: &RunPoint, outcome: RunOutcome) {
        let RunOutcome { flight_fail, mission_fail } = outcome;
        for (metric, times) in [(Metric::FlightFail, flight_fail), (Metric::MissionFail, mission_fail)] {
            if let Some(table) = self.tables.get_mut(&metric) {
                table.set(point.outer_index, point.inner_index, times);
            }
        }
    }

    pub fn table(&self, metric: Metric) -> Option<&ResultTable> {
        self.tables.get(&metric)
    }

    pub fn tables(&self) -> impl Iterator<Item = (Metric, &ResultTable)> {
        self.tables.iter().map(|(&m, t)| (m, t))
    }

    /// Ok once every cell of every metric has been written.
    pub fn finish(self) -> Result<Self> {
        for (metric, table) in &self.tables {
            if let Some((outer, inner)) = table.first_missing() {
                return Err(BridgeError::IncompleteSweep {
                    metric: metric.key(),
                    outer,
                    inner,
                });
            }
        }
        Ok(self)
    }
}

/// Downstream consumer of a finished sweep (persistence, plotting).
pub trait ResultSink {
    fn name(&self) -> &'static str;
    fn consume(&mut self, result: &SweepResult) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::attack::AttackTable;

    fn plan(outer: Vec<f64>, inner: Vec<f64>) -> SweepPlan {
        let table = AttackTable::builtin();
        SweepPlan::new(
            table.get("imuGyroNoise").unwrap().with_values(outer),
            table.get("gainAccelX").unwrap().with_values(inner),
        )
    }

    #[test]
    fn incomplete_sweep_is_rejected() {
        let plan = plan(vec![0.0, 1.0], vec![1.0, 0.5, 0.0]);
        let mut result = SweepResult::new(&plan);
        for point in plan.points().take(5) {
            result.record(&point, RunOutcome::default());
        }
        assert!(matches!(
            result.finish(),
            Err(BridgeError::IncompleteSweep { outer: 1, inner: 2, .. })
        ));
    }

    #[test]
    fn every_cell_filled_after_full_sweep() {
        let plan = plan(vec![0.0, 1.0], vec![1.0, 0.5, 0.0]);
        let mut result = SweepResult::new(&plan);
        for point in plan.points() {
            let outcome = if point.inner_index == 1 {
                RunOutcome { flight_fail: vec![10.0], mission_fail: vec![4.0, 10.0] }
            } else {
                RunOutcome::default()
            };
            result.record(&point, outcome);
        }
        let result = result.finish().unwrap();
        for metric in Metric::ALL {
            let table = result.table(metric).unwrap();
            assert_eq!(table.shape(), (2, 3));
            for r in 0..2 {
                for c in 0..3 {
                    assert!(table.get(r, c).is_some());
                }
            }
        }
        let mission = result.table(Metric::MissionFail).unwrap();
        assert_eq!(mission.get(0, 0), Some(&[][..]));
        let s = mission.summary(1, 1).unwrap();
        assert_eq!(s.count, 2);
        assert_eq!(s.first, 4.0);
        assert_eq!(s.mean, 7.0);
        assert!(mission.summary(0, 0).is_none());
    }
}
