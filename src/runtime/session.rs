//! session.rs
//! Session context: everything the event loop mutates, owned in one place.
//! - `BridgeState` holds the I/O-free part (control tracker, wind, perturbation,
//!   run tracker, newest frame) so handlers can be exercised without sockets
//! - `Session` adds the engine process, its console and the datagram endpoints,
//!   and owns the single teardown path

use log::{debug, info, warn};
use std::time::Instant;

use crate::bridge::{
    console::ConsoleCommand,
    endpoints::{ConsoleLink, ConsoleSink, NetworkBridge},
    process::{PhysicsProcess, ProcessSpec},
};
use crate::control::{
    control_state::{ActuatorCommand, ControlState},
    wind::WindModel,
};
use crate::runtime::signals;
use crate::sweep::controller::RunTracker;
use crate::telemetry::{
    codec::{DecodedFrame, TelemetryFrame, encode_display, encode_processed},
    fdm::{FdmPacket, Field, Unit},
    perturbation::Perturbation,
};
use crate::utils::{
    config::SessionConfig,
    error::{BridgeError, Result},
    metrics::LoopMetrics,
};

/// Records produced from one engine frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub processed: String,
    pub display: Vec<u8>,
}

/// Newest frame of the current run.
#[derive(Debug, Clone)]
pub struct Latest {
    pub packet: FdmPacket,
    pub frame: DecodedFrame,
}

impl Latest {
    pub fn agl(&self) -> f64 {
        self.packet.get(Field::Agl, Unit::Meters).unwrap_or_default()
    }
}

pub struct BridgeState {
    pub control: ControlState,
    pub wind: WindModel,
    pub perturbation: Perturbation,
    pub tracker: RunTracker,
    latest: Option<Latest>,
    session_start: Instant,
    run_start: Instant,
    malformed_commands: u64,
}

impl BridgeState {
    pub fn new(config: &SessionConfig, now: Instant) -> Self {
        let wind = match config.seed {
            Some(seed) => WindModel::with_seed(config.wind, seed),
            None => WindModel::new(config.wind),
        };
        Self {
            control: ControlState::new(config.home.alt),
            wind,
            perturbation: Perturbation::nominal(),
            tracker: RunTracker::new(config.envelope, config.horizon_s, config.timeout_policy),
            latest: None,
            session_start: now,
            run_start: now,
            malformed_commands: 0,
        }
    }

    pub fn latest(&self) -> Option<&Latest> {
        self.latest.as_ref()
    }

    /// Engine state of the newest frame; what the envelopes judge.
    pub fn latest_frame(&self) -> Option<&TelemetryFrame> {
        self.latest.as_ref().map(|l| &l.frame.truth)
    }

    pub fn malformed_commands(&self) -> u64 {
        self.malformed_commands
    }

    pub fn session_time(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.session_start).as_secs_f64()
    }

    pub fn run_time(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.run_start).as_secs_f64()
    }

    /// Fresh run: zeroed controls, no stale frame, the run's perturbation.
    pub fn begin_run(&mut self, perturbation: Perturbation, now: Instant) {
        self.control.reset();
        self.latest = None;
        self.perturbation = perturbation;
        self.run_start = now;
        self.tracker.start();
    }

    /// Decode one engine datagram and build the outgoing records.
    pub fn on_telemetry(&mut self, buf: &[u8], now: Instant) -> Result<Outbound> {
        let packet = FdmPacket::parse(buf)?;
        let t = self.run_time(now);
        let frame = DecodedFrame::new(&packet, &mut self.perturbation, t);
        let out = Outbound {
            processed: encode_processed(self.session_time(now), &frame.sensed),
            display: encode_display(&packet, self.control.ground_height, self.control.throttle),
        };
        self.latest = Some(Latest { packet, frame });
        Ok(out)
    }

    /// Console writes for one controller datagram. Malformed lines are dropped.
    pub fn on_controller_datagram(&mut self, datagram: &[u8]) -> Vec<ConsoleCommand> {
        let text = String::from_utf8_lossy(datagram);
        let mut out = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match ActuatorCommand::parse(line) {
                Some(cmd) => out.extend(self.control.apply(&cmd)),
                None => {
                    self.malformed_commands += 1;
                    debug!("dropping malformed actuator line {:?}", line);
                }
            }
        }
        out
    }
}

pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) spec: ProcessSpec,
    pub(crate) process: Option<PhysicsProcess>,
    pub(crate) console: Option<ConsoleLink>,
    pub(crate) bridge: Option<NetworkBridge>,
    pub(crate) state: BridgeState,
    pub(crate) metrics: LoopMetrics,
    pub(crate) last_wind: Instant,
    torn_down: bool,
}

impl Session {
    /// Launch the engine, connect every endpoint and wait for the trim.
    /// Any failure here tears down whatever was already started.
    pub fn start(config: SessionConfig) -> Result<Self> {
        let spec = config.process_spec();
        Self::start_with(config, spec)
    }

    /// `start` with an explicit engine launch description.
    pub fn start_with(config: SessionConfig, spec: ProcessSpec) -> Result<Self> {
        signals::install()?;
        let (process, handles) = PhysicsProcess::spawn(&spec)?;

        let now = Instant::now();
        let mut session = Session {
            state: BridgeState::new(&config, now),
            metrics: LoopMetrics::new(now),
            last_wind: now,
            config,
            spec,
            process: Some(process),
            console: None,
            bridge: None,
            torn_down: false,
        };

        session.console = Some(ConsoleLink::connect(handles.console)?);
        session.bridge = Some(NetworkBridge::open(
            handles.telemetry,
            session.config.controller_in,
            session.config.controller_out,
            session.config.display_out,
        )?);
        info!(
            "controller in {} out {}, display {:?}",
            session.config.controller_in, session.config.controller_out, session.config.display_out
        );

        session.send(&ConsoleCommand::Info)?;
        session.send(&ConsoleCommand::Resume)?;
        let spec = session.spec.clone();
        session.process_mut()?.await_trim(&spec)?;
        info!("Simulator ready to fly");
        Ok(session)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    pub(crate) fn process_mut(&mut self) -> Result<&mut PhysicsProcess> {
        self.process
            .as_mut()
            .ok_or_else(|| BridgeError::ProcessExited("session already torn down".into()))
    }

    pub(crate) fn send(&mut self, cmd: &ConsoleCommand) -> Result<()> {
        match self.console.as_mut() {
            Some(console) => console.send_command(cmd),
            None => Err(BridgeError::ProcessExited("console not connected".into())),
        }
    }

    /// Ignore further interrupts, ask the engine to quit, kill it, close every
    /// endpoint. Runs at most once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        signals::ignore();

        if let Some(console) = self.console.as_mut() {
            if let Err(e) = console.send_command(&ConsoleCommand::Quit) {
                warn!("could not send quit to physics console: {e}");
            }
        }
        if let Some(mut process) = self.process.take() {
            process.kill();
        }
        self.console = None;
        if let Some(bridge) = self.bridge.take() {
            let stats = bridge.stats();
            debug!("bridge closed: {} datagrams sent, {} refused", stats.sent, stats.refused);
        }
        let (frames, inputs) = self.metrics.totals();
        info!("session closed after {frames} frames and {inputs} controller inputs");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::console::paths;
    use crate::monitor::envelope::MissionEnvelope;
    use crate::sweep::controller::RunState;
    use crate::telemetry::{fdm::FDM_PACKET_SIZE, perturbation::FaultTarget};
    use crate::utils::error::BridgeError;
    use std::time::Duration;

    fn state() -> (BridgeState, Instant) {
        let mut config = SessionConfig::default();
        config.home.alt = 10.0;
        config.seed = Some(7);
        let now = Instant::now();
        (BridgeState::new(&config, now), now)
    }

    #[test]
    fn telemetry_produces_both_records() {
        let (mut s, t0) = state();
        let mut pkt = FdmPacket::default();
        pkt.set(Field::Agl, 25.0, Unit::Meters);
        s.on_controller_datagram(b"0\t0\t0\t1\t0.5\n");

        let out = s.on_telemetry(pkt.as_bytes(), t0 + Duration::from_millis(1500)).unwrap();
        assert!(out.processed.starts_with("1.5\t"));
        assert_eq!(out.processed.split('\t').count(), 17);

        let display = FdmPacket::parse(&out.display).unwrap();
        assert_eq!(display.get(Field::Altitude, Unit::Meters), Some(35.0));
        assert_eq!(display.get(Field::Rpm, Unit::Rpm), Some(500.0));
        assert_eq!(s.latest().unwrap().agl(), 25.0);
    }

    #[test]
    fn short_frame_is_rejected_and_state_kept() {
        let (mut s, t0) = state();
        let err = s.on_telemetry(&[0u8; 100], t0).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedFrame { expected: FDM_PACKET_SIZE, actual: 100 }));
        assert!(s.latest().is_none());
    }

    #[test]
    fn controller_lines_map_to_console_writes() {
        let (mut s, _) = state();
        let cmds = s.on_controller_datagram(b"0.1\t0\t0\t1\t0\ngarbage\n0.1\t0.2\t0\t1\t0\n");
        assert_eq!(
            cmds,
            vec![
                ConsoleCommand::set(paths::AILERON, 0.1),
                ConsoleCommand::set(paths::ELEVATOR, 0.2),
            ]
        );
        assert_eq!(s.malformed_commands(), 1);
    }

    #[test]
    fn biased_gyro_is_sent_but_not_judged() {
        let (mut s, t0) = state();
        s.begin_run(Perturbation::new(vec![(FaultTarget::GyroBias, 4.0)]), t0);

        // still and level over the theater center
        let mission = MissionEnvelope::default();
        let mut pkt = FdmPacket::default();
        pkt.set(Field::Latitude, mission.theater_lat, Unit::Degrees);
        pkt.set(Field::Longitude, mission.theater_lon, Unit::Degrees);
        pkt.set(Field::Altitude, 300.0, Unit::Meters);
        let out = s.on_telemetry(pkt.as_bytes(), t0 + Duration::from_millis(500)).unwrap();

        let fields: Vec<&str> = out.processed.trim_end().split('\t').collect();
        assert_eq!(&fields[7..10], ["4", "4", "4"]);
        assert_eq!(s.latest_frame().unwrap().p, 0.0);

        let frame = s.latest_frame().copied();
        assert!(s.tracker.observe(frame.as_ref(), 0.5).is_empty());
        assert_eq!(s.tracker.state(), RunState::Running);
    }

    #[test]
    fn begin_run_clears_previous_run() {
        let (mut s, t0) = state();
        s.on_controller_datagram(b"0.3\t0\t0\t1\t0.9\n");
        s.on_telemetry(FdmPacket::default().as_bytes(), t0).unwrap();

        s.begin_run(Perturbation::nominal(), t0 + Duration::from_secs(5));
        assert!(s.latest_frame().is_none());
        assert_eq!(s.control.aileron, 0.0);
        assert_eq!(s.control.ground_height, 10.0);
        assert_eq!(s.run_time(t0 + Duration::from_secs(6)), 1.0);
        // the next identical command is a change again
        assert_eq!(s.on_controller_datagram(b"0.3\t0\t0\t1\t0.9\n").len(), 2);
    }
}
