//! process.rs
//! Physics engine child process: launch on a pseudo-terminal, parse the
//! startup banner into endpoint addresses, watch liveness, kill on teardown.
//!
//! The banner format belongs to the engine version, so parsing goes through
//! `BannerVersion`. A banner that never completes within the handshake
//! deadline is a startup failure.

use log::{debug, info, warn};
use std::{
    collections::VecDeque,
    fs::File,
    io::{self, Read},
    net::{Ipv4Addr, SocketAddr},
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
    path::PathBuf,
    process::{Child, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::bridge::readiness::{Readiness, wait_readable};
use crate::runtime::signals;
use crate::utils::error::{BridgeError, Result};

pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const TRIM_MARKER: &str = "trim computation time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BannerVersion {
    /// JSBSim 1.x with a socket input directive and an fgout output directive.
    #[default]
    JsbSim1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerEvent {
    ConsolePort(u16),
    ConsoleBindFailed,
    TelemetryPort(u16),
    OutputConnected,
    ExecutionBeginning,
}

/// Port number following `prefix` somewhere in `line`.
fn port_after(line: &str, prefix: &str) -> Option<u16> {
    let start = line.find(prefix)? + prefix.len();
    let rest = line[start..].trim_start();
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    rest[..end].parse().ok()
}

impl BannerVersion {
    pub fn parse_line(self, line: &str) -> Option<BannerEvent> {
        match self {
            BannerVersion::JsbSim1 => {
                if let Some(port) = port_after(line, "Successfully bound to socket for input on port") {
                    Some(BannerEvent::ConsolePort(port))
                } else if line.contains("Could not bind to socket for input") {
                    Some(BannerEvent::ConsoleBindFailed)
                } else if let Some(port) = port_after(line, "Creating UDP socket on port") {
                    Some(BannerEvent::TelemetryPort(port))
                } else if line.contains("Successfully connected to socket for output") {
                    Some(BannerEvent::OutputConnected)
                } else if line.contains("JSBSim Execution beginning") {
                    Some(BannerEvent::ExecutionBeginning)
                } else {
                    None
                }
            }
        }
    }
}

/// Addresses discovered from the banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandles {
    /// TCP console the bridge connects to.
    pub console: SocketAddr,
    /// UDP port the engine streams frames to; the bridge binds it.
    pub telemetry: SocketAddr,
}

/// Banner state accumulated line by line.
#[derive(Debug, Default)]
pub struct Handshake {
    version: BannerVersion,
    console_port: Option<u16>,
    telemetry_port: Option<u16>,
    output_connected: bool,
}

impl Handshake {
    pub fn new(version: BannerVersion) -> Self {
        Self { version, ..Self::default() }
    }

    /// Feed one line; yields the handles once the engine reports it is running.
    pub fn feed(&mut self, line: &str) -> Result<Option<ProcessHandles>> {
        match self.version.parse_line(line) {
            Some(BannerEvent::ConsolePort(p)) => self.console_port = Some(p),
            Some(BannerEvent::ConsoleBindFailed) => {
                return Err(BridgeError::StartupFailed("could not bind console input socket".into()));
            }
            Some(BannerEvent::TelemetryPort(p)) => self.telemetry_port = Some(p),
            Some(BannerEvent::OutputConnected) => self.output_connected = true,
            Some(BannerEvent::ExecutionBeginning) => return self.complete().map(Some),
            None => {}
        }
        Ok(None)
    }

    fn complete(&self) -> Result<ProcessHandles> {
        let missing = |what: &str| BridgeError::StartupFailed(format!("execution began before {what}"));
        let console = self.console_port.ok_or_else(|| missing("console port was reported"))?;
        let telemetry = self.telemetry_port.ok_or_else(|| missing("telemetry port was reported"))?;
        if !self.output_connected {
            return Err(missing("output socket connected"));
        }
        Ok(ProcessHandles {
            console: SocketAddr::from((Ipv4Addr::LOCALHOST, console)),
            telemetry: SocketAddr::from((Ipv4Addr::LOCALHOST, telemetry)),
        })
    }
}

/// How to launch the engine and how long to wait for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub banner: BannerVersion,
    pub handshake_timeout: Duration,
    pub trim_timeout: Duration,
    pub trim_settle: Duration,
}

impl ProcessSpec {
    pub fn jsbsim(script: &str) -> Self {
        let args = [
            "--realtime",
            "--suspend",
            "--nice",
            "--simulation-rate=1000",
            "--logdirectivefile=jsbsim/fgout.xml",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(format!("--script={script}")))
        .collect();
        Self {
            program: "JSBSim".to_string(),
            args,
            current_dir: None,
            banner: BannerVersion::JsbSim1,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            trim_timeout: HANDSHAKE_TIMEOUT,
            trim_settle: Duration::from_millis(1500),
        }
    }

    /// Extra engine options, whitespace separated, appended after the script.
    pub fn with_options(mut self, options: &str) -> Self {
        self.args.extend(options.split_whitespace().map(str::to_string));
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Splits a byte stream into lines; carriage returns from the terminal are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Whatever is left without a terminator.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = rest.trim_end_matches('\r');
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

fn open_pty() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut master: libc::c_int = -1;
    let mut slave: libc::c_int = -1;
    let rc = unsafe {
        libc::openpty(
            &mut master,
            &mut slave,
            std::ptr::null_mut(),
            std::ptr::null(),
            std::ptr::null(),
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: openpty succeeded, both descriptors are fresh and owned here.
    Ok(unsafe { (OwnedFd::from_raw_fd(master), OwnedFd::from_raw_fd(slave)) })
}

pub struct PhysicsProcess {
    child: Child,
    terminal: Option<File>,
    lines: LineBuffer,
    /// Lines read during a wait but not yet offered to it.
    unread: VecDeque<String>,
    exit: Option<ExitStatus>,
}

impl PhysicsProcess {
    /// Launch the engine and block until its banner reports every endpoint.
    pub fn spawn(spec: &ProcessSpec) -> Result<(Self, ProcessHandles)> {
        let (master, slave) = open_pty()?;
        let mut command = Command::new(&spec.program);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        let child = command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(slave.try_clone()?))
            .stderr(Stdio::from(slave))
            .spawn()
            .map_err(|e| BridgeError::StartupFailed(format!("cannot launch '{}': {e}", spec.command_line())))?;
        // release our copies of the slave side so the master sees EOF when the child exits
        drop(command);
        info!("physics engine started (pid {}): {}", child.id(), spec.command_line());

        let mut process = Self {
            child,
            terminal: Some(File::from(master)),
            lines: LineBuffer::default(),
            unread: VecDeque::new(),
            exit: None,
        };
        let mut handshake = Handshake::new(spec.banner);
        match process.wait_for("physics engine banner", spec.handshake_timeout, |line| handshake.feed(line)) {
            Ok(handles) => {
                info!("physics console on {}, telemetry on {}", handles.console, handles.telemetry);
                Ok((process, handles))
            }
            Err(e) => {
                process.kill();
                Err(e)
            }
        }
    }

    /// Descriptor carrying the engine's terminal output, until it closes.
    pub fn terminal_fd(&self) -> Option<RawFd> {
        self.terminal.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// One read from the terminal; call after readiness. Lines go to the debug log.
    pub fn read_terminal(&mut self) -> Result<Vec<String>> {
        let Some(term) = self.terminal.as_mut() else {
            return Ok(Vec::new());
        };
        let mut buf = [0u8; 4096];
        let n = match term.read(&mut buf) {
            Ok(n) => n,
            // a pty master reports EIO once the child side has closed
            Err(e) if e.raw_os_error() == Some(libc::EIO) => 0,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut lines = self.lines.push(&buf[..n]);
        if n == 0 {
            self.terminal = None;
            lines.extend(self.lines.flush());
        }
        for line in &lines {
            debug!("[physics] {line}");
        }
        Ok(lines)
    }

    /// Read terminal lines until `on_line` yields a value or `timeout` passes.
    /// Lines after the matching one are kept for the next wait.
    pub fn wait_for<T>(
        &mut self,
        what: &'static str,
        timeout: Duration,
        mut on_line: impl FnMut(&str) -> Result<Option<T>>,
    ) -> Result<T> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(line) = self.unread.pop_front() {
                if let Some(v) = on_line(&line)? {
                    return Ok(v);
                }
            }
            if let Some(sig) = signals::pending() {
                return Err(BridgeError::Interrupted(sig));
            }
            let Some(fd) = self.terminal_fd() else {
                return Err(BridgeError::ProcessExited(self.exit_description()));
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BridgeError::Timeout(what));
            }
            match wait_readable(&[fd], remaining)? {
                Readiness::Ready(_) => {
                    let lines = self.read_terminal()?;
                    self.unread.extend(lines);
                }
                Readiness::TimedOut => return Err(BridgeError::Timeout(what)),
                Readiness::Interrupted => {}
            }
        }
    }

    /// Block until the engine reports its trim, then let it settle.
    pub fn await_trim(&mut self, spec: &ProcessSpec) -> Result<()> {
        self.wait_for("trim computation", spec.trim_timeout, |line| {
            Ok(line.contains(TRIM_MARKER).then_some(()))
        })?;
        thread::sleep(spec.trim_settle);
        Ok(())
    }

    pub fn is_alive(&mut self) -> Result<bool> {
        if self.exit.is_some() {
            return Ok(false);
        }
        self.exit = self.child.try_wait()?;
        Ok(self.exit.is_none())
    }

    pub fn exit_description(&mut self) -> String {
        match self.is_alive() {
            Ok(true) => "still running, output closed".to_string(),
            Ok(false) => self
                .exit
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown status".to_string()),
            Err(e) => format!("status unavailable: {e}"),
        }
    }

    /// SIGKILL and reap. Safe to call more than once.
    pub fn kill(&mut self) {
        if !matches!(self.is_alive(), Ok(true)) {
            return;
        }
        if let Err(e) = self.child.kill() {
            warn!("failed to kill physics engine (pid {}): {e}", self.child.id());
            return;
        }
        match self.child.wait() {
            Ok(status) => {
                debug!("physics engine reaped: {status}");
                self.exit = Some(status);
            }
            Err(e) => warn!("failed to reap physics engine: {e}"),
        }
    }
}

impl std::fmt::Debug for PhysicsProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsProcess")
            .field("pid", &self.child.id())
            .field("terminal_open", &self.terminal.is_some())
            .field("exit", &self.exit)
            .finish()
    }
}
