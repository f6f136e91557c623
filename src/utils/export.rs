//! Sweep result export: persisted tables first, plots second.
//!
//! Two sinks:
//! - `sweep_results.csv`: one row per (metric, outer, inner) cell with the raw failure times.
//! - `<metric>.svg`: heat map of first-failure time per cell, outer attack on Y, inner on X.

use csv::Writer;
use log::info;
use plotters::{coord::ranged1d::SegmentValue, prelude::*};
use serde::Serialize;
use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
};

use crate::sweep::results::{Metric, ResultSink, ResultTable, SweepResult};
use crate::utils::error::{BridgeError, Result};

pub const RESULTS_FILE: &str = "sweep_results.csv";

#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    metric: &'static str,
    outer_attack: &'a str,
    outer_index: usize,
    outer_value: f64,
    inner_attack: &'a str,
    inner_index: usize,
    inner_value: f64,
    failures: usize,
    first_fail: Option<f64>,
    mean_fail: Option<f64>,
    /// space separated, empty on success
    times: String,
}

/// Writes every cell of every metric to `<dir>/sweep_results.csv`.
pub struct CsvResultStore {
    dir: PathBuf,
}

impl CsvResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }
}

impl ResultSink for CsvResultStore {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn consume(&mut self, result: &SweepResult) -> Result<()> {
        create_dir_all(&self.dir)?;
        let path = self.path();
        let mut wtr = Writer::from_path(&path)?;
        for (metric, table) in result.tables() {
            let (rows, cols) = table.shape();
            for oi in 0..rows {
                for ii in 0..cols {
                    let times = table.get(oi, ii).unwrap_or_default();
                    let summary = table.summary(oi, ii);
                    wtr.serialize(ResultRow {
                        metric: metric.key(),
                        outer_attack: &result.outer.name,
                        outer_index: oi,
                        outer_value: result.outer.values[oi],
                        inner_attack: &result.inner.name,
                        inner_index: ii,
                        inner_value: result.inner.values[ii],
                        failures: times.len(),
                        first_fail: summary.map(|s| s.first),
                        mean_fail: summary.map(|s| s.mean),
                        times: times.iter().map(f64::to_string).collect::<Vec<_>>().join(" "),
                    })?;
                }
            }
        }
        wtr.flush()?;
        info!("sweep results written to {}", path.display());
        Ok(())
    }
}

fn plot_err<E: std::fmt::Display>(e: E) -> BridgeError {
    BridgeError::Plot(e.to_string())
}

/// Early failures are dark red, failures at the horizon pale; success is grey.
fn cell_color(first_fail: Option<f64>, horizon: f64) -> RGBColor {
    match first_fail {
        None => RGBColor(220, 220, 220),
        Some(t) => {
            let frac = (t / horizon).clamp(0.0, 1.0);
            let fade = |lo: f64, hi: f64| (lo + (hi - lo) * frac).round() as u8;
            RGBColor(fade(140.0, 255.0), fade(0.0, 220.0), fade(0.0, 180.0))
        }
    }
}

fn segment_label(v: &SegmentValue<i32>, values: &[f64]) -> String {
    match v {
        SegmentValue::CenterOf(i) => values
            .get(*i as usize)
            .map(|x| format!("{x}"))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

/// One SVG heat map per metric.
pub struct SvgPlotSink {
    dir: PathBuf,
    horizon: f64,
}

impl SvgPlotSink {
    pub fn new(dir: impl Into<PathBuf>, horizon: f64) -> Self {
        Self { dir: dir.into(), horizon }
    }

    pub fn path_for(&self, metric: Metric) -> PathBuf {
        self.dir.join(format!("{}.svg", metric.key()))
    }

    fn draw(&self, path: &Path, metric: Metric, table: &ResultTable, result: &SweepResult) -> Result<()> {
        let (rows, cols) = table.shape();
        let root = SVGBackend::new(path, (960, 720)).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;

        let title = format!(
            "{}: {} vs {}",
            metric.key(),
            display_name(&result.outer.label, &result.outer.name),
            display_name(&result.inner.label, &result.inner.name)
        );
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 22))
            .margin(15)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d((0..cols as i32).into_segmented(), (0..rows as i32).into_segmented())
            .map_err(plot_err)?;

        let x_desc = axis_desc(&result.inner.label, &result.inner.name, &result.inner.units);
        let y_desc = axis_desc(&result.outer.label, &result.outer.name, &result.outer.units);
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc(x_desc)
            .y_desc(y_desc)
            .x_label_formatter(&|v| segment_label(v, &result.inner.values))
            .y_label_formatter(&|v| segment_label(v, &result.outer.values))
            .draw()
            .map_err(plot_err)?;

        let horizon = self.horizon;
        let cells = (0..rows).flat_map(|r| (0..cols).map(move |c| (r, c)));
        chart
            .draw_series(cells.map(|(r, c)| {
                let first = table.summary(r, c).map(|s| s.first);
                let (x, y) = (c as i32, r as i32);
                Rectangle::new(
                    [
                        (SegmentValue::Exact(x), SegmentValue::Exact(y)),
                        (SegmentValue::Exact(x + 1), SegmentValue::Exact(y + 1)),
                    ],
                    cell_color(first, horizon).filled(),
                )
            }))
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
        Ok(())
    }
}

fn display_name<'a>(label: &'a str, name: &'a str) -> &'a str {
    if label.is_empty() { name } else { label }
}

fn axis_desc(label: &str, name: &str, units: &str) -> String {
    match units {
        "" | "-" => display_name(label, name).to_string(),
        u => format!("{} [{}]", display_name(label, name), u),
    }
}

impl ResultSink for SvgPlotSink {
    fn name(&self) -> &'static str {
        "svg"
    }

    fn consume(&mut self, result: &SweepResult) -> Result<()> {
        create_dir_all(&self.dir)?;
        for (metric, table) in result.tables() {
            let path = self.path_for(metric);
            self.draw(&path, metric, table, result)?;
            info!("{} plot written to {}", metric.key(), path.display());
        }
        Ok(())
    }
}
