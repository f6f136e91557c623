//! # HIL Attack Sweep Entry Point
//!
//! Launches the physics engine, bridges it to the flight controller and walks
//! a two-attack fault grid, one simulator reset per grid cell.
//!
//! ## Flow
//! - **Config:** defaults, then an optional TOML file, then command-line flags.
//! - **Session:** engine handshake, endpoints, trim; torn down on every exit path.
//! - **Sweep:** outer attack × inner attack, each run judged against the envelopes.
//!
//! ## Outputs
//! - `sweep_results.csv`: failure times per cell and metric.
//! - `flightFail.svg`, `missionFail.svg`: first-failure heat maps.
//! - `sweep_events.csv`: per-run lifecycle events.

use clap::Parser;
use log::{error, info};
use std::{fs::create_dir_all, net::SocketAddr, path::PathBuf, process::ExitCode};

use hil_attack_sweep::{
    control::wind::WindParams,
    runtime::session::Session,
    sweep::{
        attack::AttackTable,
        controller::{SweepPlan, TimeoutPolicy},
        results::ResultSink,
    },
    utils::{
        config::{Home, SessionConfig, interpret_address},
        error::{BridgeError, Result},
        export::{CsvResultStore, SvgPlotSink},
        run_log::RunLog,
    },
};

#[derive(Parser, Debug)]
#[command(name = "hil_attack_sweep")]
#[command(about = "Fault-injection sweep over a hardware-in-the-loop flight simulation")]
#[command(version)]
struct Args {
    /// TOML session configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Home position lat,lng,alt,hdg
    #[arg(long)]
    home: Option<Home>,

    /// Engine model script
    #[arg(long)]
    script: Option<String>,

    /// Extra engine startup options
    #[arg(long)]
    options: Option<String>,

    /// Directory the engine runs in
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Controller input (IP:port)
    #[arg(long, value_parser = interpret_address)]
    simin: Option<SocketAddr>,

    /// Controller output (IP:port)
    #[arg(long, value_parser = interpret_address)]
    simout: Option<SocketAddr>,

    /// Display output (IP:port)
    #[arg(long, value_parser = interpret_address, conflicts_with = "no_fgout")]
    fgout: Option<SocketAddr>,

    /// Disable the display stream
    #[arg(long)]
    no_fgout: bool,

    /// Wind as speed,direction,turbulence
    #[arg(long)]
    wind: Option<WindParams>,

    // ── Sweep ─────────────────────────────────────────────────
    /// Outer attack name
    #[arg(long)]
    outer: Option<String>,

    /// Inner attack name
    #[arg(long)]
    inner: Option<String>,

    /// Override outer attack values (comma separated)
    #[arg(long, value_delimiter = ',')]
    outer_values: Option<Vec<f64>>,

    /// Override inner attack values (comma separated)
    #[arg(long, value_delimiter = ',')]
    inner_values: Option<Vec<f64>>,

    /// Extra attack definitions (TOML, [[attack]] tables)
    #[arg(long)]
    attacks: Option<PathBuf>,

    /// Count a run that reaches the horizon as a success
    #[arg(long)]
    timeout_as_success: bool,

    /// Seed for wind turbulence and per-run sensor noise
    #[arg(long)]
    seed: Option<u64>,

    // ── Output ────────────────────────────────────────────────
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Skip the SVG plots
    #[arg(long)]
    no_plot: bool,

    /// Print the attack catalogue and exit
    #[arg(long)]
    list_attacks: bool,
}

impl Args {
    fn apply(&self, c: &mut SessionConfig) {
        if let Some(v) = self.home {
            c.home = v;
        }
        if let Some(v) = &self.script {
            c.script = v.clone();
        }
        if let Some(v) = &self.options {
            c.engine_options = Some(v.clone());
        }
        if let Some(v) = &self.workdir {
            c.workdir = Some(v.clone());
        }
        if let Some(v) = self.simin {
            c.controller_in = v;
        }
        if let Some(v) = self.simout {
            c.controller_out = v;
        }
        if let Some(v) = self.fgout {
            c.display_out = Some(v);
        }
        if self.no_fgout {
            c.display_out = None;
        }
        if let Some(v) = self.wind {
            c.wind = v;
        }
        if let Some(v) = &self.outer {
            c.outer_attack = v.clone();
        }
        if let Some(v) = &self.inner {
            c.inner_attack = v.clone();
        }
        if let Some(v) = &self.attacks {
            c.attack_file = Some(v.clone());
        }
        if self.timeout_as_success {
            c.timeout_policy = TimeoutPolicy::RecordAsSuccess;
        }
        if self.seed.is_some() {
            c.seed = self.seed;
        }
        if let Some(v) = &self.output_dir {
            c.output_dir = v.clone();
        }
        if self.no_plot {
            c.plot = false;
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(BridgeError::Interrupted(sig)) => {
            error!("interrupted by signal {sig}, simulation aborted");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let mut attacks = AttackTable::builtin();
    if let Some(path) = &config.attack_file {
        attacks.merge(AttackTable::load(path)?);
    }
    if args.list_attacks {
        for name in attacks.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let mut outer = attacks.get(&config.outer_attack)?;
    if let Some(values) = args.outer_values {
        outer = outer.with_values(values);
    }
    let mut inner = attacks.get(&config.inner_attack)?;
    if let Some(values) = args.inner_values {
        inner = inner.with_values(values);
    }
    outer.validate()?;
    inner.validate()?;
    let plan = SweepPlan::new(outer, inner);

    create_dir_all(&config.output_dir)?;
    let mut run_log = config
        .run_log
        .as_ref()
        .map(|p| RunLog::create(&config.output_path(p)))
        .transpose()?;

    info!("=== HIL ATTACK SWEEP START ===");
    let result = {
        let mut session = Session::start(config.clone())?;
        let result = session.run_sweep(&plan, run_log.as_mut());
        session.teardown();
        result?
    };

    // results are persisted before any plot is drawn
    let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(CsvResultStore::new(&config.output_dir))];
    if config.plot {
        sinks.push(Box::new(SvgPlotSink::new(&config.output_dir, config.horizon_s)));
    }
    for sink in sinks.iter_mut() {
        sink.consume(&result)?;
        info!("{} sink done", sink.name());
    }
    info!("=== HIL ATTACK SWEEP FINISHED ===");
    Ok(())
}
