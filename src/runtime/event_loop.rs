//! event_loop.rs
//! Single-threaded readiness loop driving the HIL bridge and the sweep.
//!
//! One `tick`:
//! - waits up to 1 s for any of engine telemetry, controller input, engine
//!   console or engine terminal to become readable
//! - runs every ready handler once
//! - on a silent second, checks the engine is still alive
//! - pushes wind every 0.1 s and logs a status line every 3 s

use log::{debug, info, warn};
use std::{
    os::fd::{AsRawFd, RawFd},
    thread,
    time::{Duration, Instant},
};

use crate::bridge::{
    console::{ConsoleCommand, paths},
    readiness::{Readiness, wait_readable},
};
use crate::runtime::{session::Session, signals};
use crate::sweep::{
    controller::{RunEvent, RunOutcome, RunPoint, SweepPlan},
    results::SweepResult,
};
use crate::utils::{
    error::{BridgeError, Result},
    run_log::RunLog,
};

pub const POLL_TIMEOUT: Duration = Duration::from_secs(1);
pub const WIND_PERIOD: Duration = Duration::from_millis(100);
/// Larger than any valid frame so oversized datagrams are detected, not truncated.
const RECV_BUF: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Telemetry,
    Controller,
    Console,
    Terminal,
}

impl Session {
    fn sources(&self) -> Vec<(Source, RawFd)> {
        let mut out = Vec::with_capacity(4);
        if let Some(bridge) = &self.bridge {
            out.push((Source::Telemetry, bridge.telemetry_in.as_raw_fd()));
            out.push((Source::Controller, bridge.controller_in.as_raw_fd()));
        }
        if let Some(console) = &self.console {
            out.push((Source::Console, console.as_raw_fd()));
        }
        if let Some(fd) = self.process.as_ref().and_then(|p| p.terminal_fd()) {
            out.push((Source::Terminal, fd));
        }
        out
    }

    /// One loop iteration.
    pub fn tick(&mut self) -> Result<()> {
        if let Some(sig) = signals::pending() {
            return Err(BridgeError::Interrupted(sig));
        }

        let sources = self.sources();
        let fds: Vec<RawFd> = sources.iter().map(|&(_, fd)| fd).collect();
        match wait_readable(&fds, POLL_TIMEOUT)? {
            Readiness::Interrupted => return Ok(()),
            Readiness::TimedOut => self.check_alive()?,
            Readiness::Ready(ready) => {
                for (&(source, _), _) in sources.iter().zip(ready).filter(|(_, r)| *r) {
                    self.handle(source)?;
                }
            }
        }

        let now = Instant::now();
        if now.saturating_duration_since(self.last_wind) > WIND_PERIOD {
            self.update_wind(now)?;
        }
        let snapshot = self.state.latest().map(|l| (l.frame.truth, l.agl()));
        if let Some(report) = self.metrics.report(now, snapshot.as_ref().map(|(f, agl)| (f, *agl))) {
            info!("{report}");
        }
        Ok(())
    }

    fn handle(&mut self, source: Source) -> Result<()> {
        match source {
            Source::Telemetry => self.on_telemetry_ready(),
            Source::Controller => self.on_controller_ready(),
            Source::Console => self.on_console_ready(),
            Source::Terminal => self.on_terminal_ready(),
        }
    }

    fn on_telemetry_ready(&mut self) -> Result<()> {
        let mut buf = [0u8; RECV_BUF];
        let Some(bridge) = self.bridge.as_mut() else {
            return Ok(());
        };
        let Some(n) = bridge.telemetry_in.recv(&mut buf)? else {
            return Ok(());
        };
        let out = self.state.on_telemetry(&buf[..n], Instant::now())?;
        bridge.send_display(&out.display)?;
        bridge.send_controller(&out.processed)?;
        self.metrics.record_frame();
        Ok(())
    }

    fn on_controller_ready(&mut self) -> Result<()> {
        let mut buf = [0u8; RECV_BUF];
        let n = match self.bridge.as_ref() {
            Some(bridge) => bridge.controller_in.recv(&mut buf)?,
            None => None,
        };
        let Some(n) = n else {
            return Ok(());
        };
        for cmd in self.state.on_controller_datagram(&buf[..n]) {
            self.send(&cmd)?;
        }
        self.metrics.record_input();
        Ok(())
    }

    fn on_console_ready(&mut self) -> Result<()> {
        let Some(console) = self.console.as_mut() else {
            return Ok(());
        };
        let text = console.drain()?;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            debug!("[console] {}", line.trim_end());
        }
        if !console.is_open() {
            return Err(BridgeError::ProcessExited("physics console closed".into()));
        }
        Ok(())
    }

    fn on_terminal_ready(&mut self) -> Result<()> {
        let process = self.process_mut()?;
        process.read_terminal()?;
        if process.terminal_fd().is_none() {
            // output closed: the engine is gone or about to be
            self.check_alive()?;
        }
        Ok(())
    }

    fn check_alive(&mut self) -> Result<()> {
        let process = self.process_mut()?;
        if !process.is_alive()? {
            return Err(BridgeError::ProcessExited(process.exit_description()));
        }
        Ok(())
    }

    fn update_wind(&mut self, now: Instant) -> Result<()> {
        let t = self.state.session_time(now);
        let sample = self.state.wind.sample(t);
        for cmd in sample.console_commands() {
            self.send(&cmd)?;
        }
        self.last_wind = now;
        Ok(())
    }

    /// Keep servicing the loop for `duration` without judging any run.
    pub fn pump_for(&mut self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.tick()?;
        }
        Ok(())
    }

    /// `set simulation/reset 1`, then let the engine settle.
    pub fn reset_simulation(&mut self) -> Result<()> {
        self.state.tracker.reset();
        self.send(&ConsoleCommand::set(paths::RESET, 1.0))?;
        let settle = self.config.reset_settle();
        if self.bridge.is_some() {
            self.pump_for(settle)
        } else {
            thread::sleep(settle);
            Ok(())
        }
    }

    /// Reset, fly one sweep point until it ends, and hand back its outcome.
    pub fn run_point<W: std::io::Write>(
        &mut self,
        plan: &SweepPlan,
        point: &RunPoint,
        run: usize,
        mut log: Option<&mut RunLog<W>>,
    ) -> Result<RunOutcome> {
        self.reset_simulation()?;
        let perturbation = match self.config.seed {
            Some(seed) => plan.seeded_perturbation_for(point, seed.wrapping_add(run as u64)),
            None => plan.perturbation_for(point),
        };
        self.state.begin_run(perturbation, Instant::now());
        info!(
            "run {}: {}={} {}={}",
            run, plan.outer.name, point.outer_value, plan.inner.name, point.inner_value
        );
        if let Some(log) = log.as_deref_mut() {
            log.run_started(run, *point)?;
        }

        loop {
            self.tick()?;
            let elapsed = self.state.run_time(Instant::now());
            let frame = self.state.latest_frame().copied();
            for event in self.state.tracker.observe(frame.as_ref(), elapsed) {
                report_event(run, &event);
                if let Some(log) = log.as_deref_mut() {
                    log.event(&event)?;
                }
            }
            if let Some(outcome) = self.state.tracker.record() {
                if let Some(log) = log.as_deref_mut() {
                    log.run_finished(&outcome)?;
                }
                return Ok(outcome);
            }
        }
    }

    /// Walk the whole outer × inner plan.
    pub fn run_sweep<W: std::io::Write>(
        &mut self,
        plan: &SweepPlan,
        mut log: Option<&mut RunLog<W>>,
    ) -> Result<SweepResult> {
        let (rows, cols) = plan.shape();
        info!(
            "sweeping {} ({} values) x {} ({} values)",
            plan.outer.name, rows, plan.inner.name, cols
        );
        let mut result = SweepResult::new(plan);
        for (run, point) in plan.points().enumerate() {
            let outcome = self.run_point(plan, &point, run, log.as_deref_mut())?;
            result.record(&point, outcome);
        }
        result.finish()
    }
}

fn report_event(run: usize, event: &RunEvent) {
    match event {
        RunEvent::MissionFailed { t, violation } => {
            warn!("run {run}: mission envelope failure at {t:.2}s ({}={:.2})", violation.label(), violation.value())
        }
        RunEvent::FlightFailed { t, violation } => {
            warn!("run {run}: flight envelope failure at {t:.2}s ({}={:.2})", violation.label(), violation.value())
        }
        RunEvent::TimedOut { t } => info!("run {run}: time has ended at {t:.1}s"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::process::{BannerVersion, ProcessSpec};
    use crate::monitor::envelope::MissionEnvelope;
    use crate::sweep::{attack::AttackTable, controller::RunState};
    use crate::telemetry::fdm::{FdmPacket, Field, Unit};
    use crate::utils::config::SessionConfig;
    use std::{
        io::{BufRead, BufReader},
        net::{SocketAddr, TcpListener, UdpSocket},
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread::JoinHandle,
    };

    fn free_udp_port() -> u16 {
        UdpSocket::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    /// Stand-in engine console: accepts the bridge and collects every line until it hangs up.
    fn console_listener() -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            BufReader::new(stream)
                .lines()
                .map_while(|l| l.ok())
                .map(|l| l.trim_end().to_string())
                .collect()
        });
        (port, handle)
    }

    /// Shell script printing the engine banner and trim, then running `tail`.
    fn fake_engine(console: u16, telemetry: u16, tail: &str) -> ProcessSpec {
        let script = format!(
            "echo 'Successfully bound to socket for input on port {console}'; \
             echo 'Creating UDP socket on port {telemetry}'; \
             echo 'Successfully connected to socket for output'; \
             echo 'JSBSim Execution beginning ...'; \
             sleep 0.2; echo 'Initial trim computation time: 2 ms'; {tail}"
        );
        ProcessSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script],
            current_dir: None,
            banner: BannerVersion::JsbSim1,
            handshake_timeout: Duration::from_secs(5),
            trim_timeout: Duration::from_secs(5),
            trim_settle: Duration::ZERO,
        }
    }

    struct Rig {
        session: Session,
        console: JoinHandle<Vec<String>>,
        telemetry: SocketAddr,
        controller: UdpSocket,
    }

    impl Rig {
        fn start(horizon_s: f64, tail: &str) -> Self {
            let (console_port, console) = console_listener();
            let telemetry_port = free_udp_port();
            let controller = UdpSocket::bind("127.0.0.1:0").unwrap();

            let config = SessionConfig {
                controller_in: "127.0.0.1:0".parse().unwrap(),
                controller_out: controller.local_addr().unwrap(),
                display_out: None,
                horizon_s,
                reset_settle_s: 0.2,
                seed: Some(1),
                ..SessionConfig::default()
            };
            let spec = fake_engine(console_port, telemetry_port, tail);
            let session = Session::start_with(config, spec).unwrap();
            Self {
                session,
                console,
                telemetry: SocketAddr::from(([127, 0, 0, 1], telemetry_port)),
                controller,
            }
        }

        /// Tear the session down and return what the console received.
        fn finish(self) -> Vec<String> {
            let Rig { mut session, console, .. } = self;
            session.teardown();
            drop(session);
            console.join().unwrap()
        }
    }

    /// Still, level vehicle over the theater center.
    fn level_frame() -> FdmPacket {
        let mission = MissionEnvelope::default();
        let mut pkt = FdmPacket::default();
        pkt.set(Field::Latitude, mission.theater_lat, Unit::Degrees);
        pkt.set(Field::Longitude, mission.theater_lon, Unit::Degrees);
        pkt.set(Field::Altitude, 300.0, Unit::Meters);
        pkt.set(Field::Agl, 290.0, Unit::Meters);
        pkt
    }

    fn stream_frames(to: SocketAddr, stop: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::spawn(move || {
            let engine = UdpSocket::bind("127.0.0.1:0").unwrap();
            let pkt = level_frame();
            while !stop.load(Ordering::Relaxed) {
                engine.send_to(pkt.as_bytes(), to).ok();
                thread::sleep(Duration::from_millis(20));
            }
        })
    }

    #[test]
    fn run_point_resets_settles_and_records_one_outcome() {
        let began = Instant::now();
        let mut rig = Rig::start(1.0, "sleep 30");
        let stop = Arc::new(AtomicBool::new(false));
        let engine = stream_frames(rig.telemetry, stop.clone());

        let table = AttackTable::builtin();
        let plan = SweepPlan::new(
            table.get("imuGyroBias").unwrap().with_values(vec![4.0]),
            table.get("gainAccelX").unwrap().with_values(vec![1.0]),
        );
        let point = plan.points().next().unwrap();
        let outcome = rig.session.run_point::<Vec<u8>>(&plan, &point, 0, None).unwrap();
        let elapsed = began.elapsed().as_secs_f64();
        stop.store(true, Ordering::Relaxed);
        engine.join().unwrap();

        // the biased gyro only reaches the controller: the run times out at the horizon
        assert_eq!(outcome, RunOutcome { flight_fail: vec![1.0], mission_fail: vec![1.0] });
        assert_eq!(rig.session.state().tracker.state(), RunState::Recorded);
        assert!(rig.session.metrics.totals().0 > 10);

        rig.controller.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        let mut buf = [0u8; 512];
        let mut biased = false;
        while let Ok(n) = rig.controller.recv(&mut buf) {
            let record = String::from_utf8_lossy(&buf[..n]).into_owned();
            let fields: Vec<&str> = record.trim_end().split('\t').collect();
            assert_eq!(fields.len(), 17);
            if fields[7] == "4" {
                biased = true;
                break;
            }
        }
        assert!(biased, "no biased record reached the controller");

        let lines = rig.finish();
        assert_eq!(&lines[..2], ["info", "resume"]);
        assert_eq!(lines.last().map(String::as_str), Some("quit"));
        let reset = lines.iter().position(|l| l == "set simulation/reset 1").unwrap();

        let heading: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with("set atmosphere/psiw-rad "))
            .map(|(i, _)| i)
            .collect();
        for &i in &heading {
            assert!(lines[i + 1].starts_with("set atmosphere/wind-mag-fps "), "{:?}", &lines[i..]);
        }
        assert!(heading.iter().any(|&i| i > reset));
        // one pair per 0.1 s at most, and the loop kept pushing during the run
        assert!(heading.len() >= 5, "{} wind updates", heading.len());
        assert!(heading.len() as f64 <= elapsed / 0.1 + 1.0, "{} wind updates in {elapsed:.2}s", heading.len());
    }

    #[test]
    fn controller_input_is_relayed_and_bad_frame_is_fatal() {
        let mut rig = Rig::start(1.0, "sleep 30");
        let bridge_in = rig.session.bridge.as_ref().unwrap().controller_in.local_addr().unwrap();
        rig.controller.send_to(b"0.3\t0\t0\t1\t0.5\n", bridge_in).unwrap();

        for _ in 0..20 {
            rig.session.tick().unwrap();
            if rig.session.state().control.aileron == 0.3 {
                break;
            }
        }
        assert_eq!(rig.session.state().control.throttle, 0.5);

        let engine = UdpSocket::bind("127.0.0.1:0").unwrap();
        engine.send_to(&[0u8; 100], rig.telemetry).unwrap();
        let err = (0..20).find_map(|_| rig.session.tick().err()).unwrap();
        assert!(matches!(err, BridgeError::MalformedFrame { actual: 100, .. }), "{err}");

        let lines = rig.finish();
        assert!(lines.iter().any(|l| l == "set fcs/aileron-cmd-norm 0.3"));
        assert!(lines.iter().any(|l| l == "set fcs/throttle-cmd-norm 0.5"));
    }

    #[test]
    fn engine_exit_ends_the_loop() {
        let mut rig = Rig::start(1.0, "sleep 0.3");
        let err = (0..10).find_map(|_| rig.session.tick().err()).unwrap();
        assert!(matches!(err, BridgeError::ProcessExited(_)), "{err}");
        let lines = rig.finish();
        assert_eq!(lines.last().map(String::as_str), Some("quit"));
    }
}
