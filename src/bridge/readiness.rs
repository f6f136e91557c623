//! readiness.rs
//! Thin wrapper over `poll(2)` for the single-threaded event loop.

use std::{io, os::fd::RawFd, time::Duration};

/// Result of one wait: which of the watched descriptors can be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready(Vec<bool>),
    TimedOut,
    /// A signal arrived while waiting.
    Interrupted,
}

/// Block until one of `fds` is readable or `timeout` passes. Hang-up and
/// error conditions count as readable so the owner sees EOF on its next read.
pub fn wait_readable(fds: &[RawFd], timeout: Duration) -> io::Result<Readiness> {
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd { fd, events: libc::POLLIN, revents: 0 })
        .collect();
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, millis) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(Readiness::Interrupted);
        }
        return Err(err);
    }
    if rc == 0 {
        return Ok(Readiness::TimedOut);
    }

    let mask = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
    Ok(Readiness::Ready(pollfds.iter().map(|p| p.revents & mask != 0).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{net::UdpSocket, os::fd::AsRawFd};

    #[test]
    fn idle_socket_times_out() {
        let s = UdpSocket::bind("127.0.0.1:0").unwrap();
        let r = wait_readable(&[s.as_raw_fd()], Duration::from_millis(10)).unwrap();
        assert_eq!(r, Readiness::TimedOut);
    }

    #[test]
    fn reports_only_the_ready_socket() {
        let idle = UdpSocket::bind("127.0.0.1:0").unwrap();
        let busy = UdpSocket::bind("127.0.0.1:0").unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();
        tx.send_to(b"x", busy.local_addr().unwrap()).unwrap();

        let r = wait_readable(&[idle.as_raw_fd(), busy.as_raw_fd()], Duration::from_secs(1)).unwrap();
        assert_eq!(r, Readiness::Ready(vec![false, true]));
    }
}
