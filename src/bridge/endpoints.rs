//! endpoints.rs
//! Network endpoints between the physics engine, the flight controller under
//! test and the optional display sink.
//! - all datagram sockets are non-blocking; receive happens only on readiness
//! - a send refused by a receiver that isn't listening yet is dropped, not queued
//! - any other send failure is fatal

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::{
    io::{self, ErrorKind, Read, Write},
    net::{SocketAddr, TcpStream, UdpSocket},
    os::fd::{AsRawFd, RawFd},
};
use log::debug;

use crate::bridge::console::ConsoleCommand;
use crate::utils::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    PhysicsConsole,
    PhysicsTelemetryIn,
    ControllerIn,
    ControllerOut,
    DisplayOut,
}

impl Role {
    pub fn tag(self) -> &'static str {
        match self {
            Role::PhysicsConsole => "physics-console",
            Role::PhysicsTelemetryIn => "physics-telemetry-in",
            Role::ControllerIn => "controller-in",
            Role::ControllerOut => "controller-out",
            Role::DisplayOut => "display-out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    /// Receiver not listening; datagram dropped.
    Refused,
}

fn endpoint_err(role: Role, addr: SocketAddr) -> impl FnOnce(io::Error) -> BridgeError {
    move |source| BridgeError::Endpoint { role: role.tag(), addr, source }
}

fn udp_socket(bind_addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(bind_addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SockAddr::from(bind_addr))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

#[derive(Debug)]
pub struct UdpEndpoint {
    role: Role,
    addr: SocketAddr,
    socket: UdpSocket,
}

impl UdpEndpoint {
    /// Receive endpoint bound to `addr`.
    pub fn bind(role: Role, addr: SocketAddr) -> Result<Self> {
        let socket = udp_socket(addr).map_err(endpoint_err(role, addr))?;
        Ok(Self { role, addr, socket: socket.into() })
    }

    /// Send endpoint connected to `addr` from an ephemeral local port.
    pub fn connect(role: Role, addr: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if addr.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = udp_socket(local)
            .and_then(|s| s.connect(&SockAddr::from(addr)).map(|_| s))
            .map_err(endpoint_err(role, addr))?;
        Ok(Self { role, addr, socket: socket.into() })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// One datagram, or `None` if nothing is queued.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            // ICMP feedback from an earlier send on this socket
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => Ok(None),
            Err(e) => Err(endpoint_err(self.role, self.addr)(e)),
        }
    }

    pub fn send(&self, data: &[u8]) -> Result<SendStatus> {
        match self.socket.send(data) {
            Ok(_) => Ok(SendStatus::Sent),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                debug!("[{}] receiver not listening, dropped {} bytes", self.role.tag(), data.len());
                Ok(SendStatus::Refused)
            }
            Err(e) => Err(endpoint_err(self.role, self.addr)(e)),
        }
    }
}

impl AsRawFd for UdpEndpoint {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

/// Destination for console commands.
pub trait ConsoleSink {
    fn send_command(&mut self, cmd: &ConsoleCommand) -> Result<()>;
}

impl ConsoleSink for Vec<ConsoleCommand> {
    fn send_command(&mut self, cmd: &ConsoleCommand) -> Result<()> {
        self.push(cmd.clone());
        Ok(())
    }
}

/// TCP request/response channel to the engine's console.
#[derive(Debug)]
pub struct ConsoleLink {
    addr: SocketAddr,
    stream: TcpStream,
    open: bool,
}

impl ConsoleLink {
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(endpoint_err(Role::PhysicsConsole, addr))?;
        stream.set_nodelay(true)?;
        Ok(Self { addr, stream, open: true })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Read whatever the console has produced. Call only after readiness.
    pub fn drain(&mut self) -> Result<String> {
        let mut buf = [0u8; 4096];
        let n = self.stream.read(&mut buf)?;
        if n == 0 {
            self.open = false;
        }
        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }
}

impl ConsoleSink for ConsoleLink {
    fn send_command(&mut self, cmd: &ConsoleCommand) -> Result<()> {
        self.stream
            .write_all(cmd.to_line().as_bytes())
            .map_err(endpoint_err(Role::PhysicsConsole, self.addr))
    }
}

impl AsRawFd for ConsoleLink {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// Counters for the periodic status report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub sent: u64,
    pub refused: u64,
}

/// All datagram endpoints of one session. The console link lives next to it
/// in the session because it is created after the engine handshake.
#[derive(Debug)]
pub struct NetworkBridge {
    pub telemetry_in: UdpEndpoint,
    pub controller_in: UdpEndpoint,
    pub controller_out: UdpEndpoint,
    pub display_out: Option<UdpEndpoint>,
    stats: BridgeStats,
}

impl NetworkBridge {
    pub fn open(
        telemetry_in: SocketAddr,
        controller_in: SocketAddr,
        controller_out: SocketAddr,
        display_out: Option<SocketAddr>,
    ) -> Result<Self> {
        Ok(Self {
            telemetry_in: UdpEndpoint::bind(Role::PhysicsTelemetryIn, telemetry_in)?,
            controller_in: UdpEndpoint::bind(Role::ControllerIn, controller_in)?,
            controller_out: UdpEndpoint::connect(Role::ControllerOut, controller_out)?,
            display_out: display_out
                .map(|addr| UdpEndpoint::connect(Role::DisplayOut, addr))
                .transpose()?,
            stats: BridgeStats::default(),
        })
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    fn count(&mut self, status: SendStatus) {
        match status {
            SendStatus::Sent => self.stats.sent += 1,
            SendStatus::Refused => self.stats.refused += 1,
        }
    }

    pub fn send_controller(&mut self, record: &str) -> Result<SendStatus> {
        let status = self.controller_out.send(record.as_bytes())?;
        self.count(status);
        Ok(status)
    }

    pub fn send_display(&mut self, frame: &[u8]) -> Result<Option<SendStatus>> {
        let status = match &self.display_out {
            Some(ep) => ep.send(frame)?,
            None => return Ok(None),
        };
        self.count(status);
        Ok(Some(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn recv_without_data_is_none() {
        let ep = UdpEndpoint::bind(Role::ControllerIn, loopback()).unwrap();
        let mut buf = [0u8; 64];
        assert_eq!(ep.recv(&mut buf).unwrap(), None);
    }

    #[test]
    fn datagram_round_trip() {
        let rx = UdpEndpoint::bind(Role::ControllerIn, loopback()).unwrap();
        let tx = UdpEndpoint::connect(Role::ControllerOut, rx.local_addr().unwrap()).unwrap();
        assert_eq!(tx.send(b"0\t0\t0\t1\t0.5\n").unwrap(), SendStatus::Sent);

        let mut buf = [0u8; 64];
        let mut got = None;
        for _ in 0..100 {
            if let Some(n) = rx.recv(&mut buf).unwrap() {
                got = Some(n);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let n = got.expect("datagram never arrived");
        assert_eq!(&buf[..n], b"0\t0\t0\t1\t0.5\n");
    }

    #[test]
    fn refused_sends_are_swallowed() {
        // reserve a port, then close it so nothing listens there
        let addr = {
            let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap()
        };
        let tx = UdpEndpoint::connect(Role::DisplayOut, addr).unwrap();
        for _ in 0..5 {
            assert!(tx.send(b"frame").is_ok());
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
    }

    #[test]
    fn console_sink_collects_commands() {
        let mut sink: Vec<ConsoleCommand> = Vec::new();
        sink.send_command(&ConsoleCommand::Resume).unwrap();
        assert_eq!(sink, vec![ConsoleCommand::Resume]);
    }
}
