//! SIGINT/SIGTERM handling.
//!
//! The handler only stores the signal number; the event loop polls it once
//! per iteration and turns it into `BridgeError::Interrupted`.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::utils::error::{BridgeError, Result};

/// Last signal number received; 0 when none is pending.
pub struct SignalFlag(AtomicI32);

impl SignalFlag {
    pub const fn new() -> Self {
        Self(AtomicI32::new(0))
    }

    pub fn raise(&self, sig: i32) {
        self.0.store(sig, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<i32> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            sig => Some(sig),
        }
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

static PENDING: SignalFlag = SignalFlag::new();

extern "C" fn on_signal(sig: libc::c_int) {
    PENDING.raise(sig);
}

fn set_handler(sig: libc::c_int, handler: libc::sighandler_t) -> Result<()> {
    let prev = unsafe { libc::signal(sig, handler) };
    if prev == libc::SIG_ERR {
        return Err(BridgeError::Io(std::io::Error::last_os_error()));
    }
    Ok(())
}

pub fn install() -> Result<()> {
    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    set_handler(libc::SIGINT, handler)?;
    set_handler(libc::SIGTERM, handler)
}

/// Ignore further interrupts; used while tearing down.
pub fn ignore() {
    for sig in [libc::SIGINT, libc::SIGTERM] {
        let _ = set_handler(sig, libc::SIG_IGN);
    }
}

/// Signal received since the last `clear`, if any.
pub fn pending() -> Option<i32> {
    PENDING.get()
}

pub fn clear() {
    PENDING.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_keeps_last_signal() {
        let flag = SignalFlag::new();
        assert_eq!(flag.get(), None);
        flag.raise(libc::SIGINT);
        flag.raise(libc::SIGTERM);
        assert_eq!(flag.get(), Some(libc::SIGTERM));
        flag.clear();
        assert_eq!(flag.get(), None);
    }
}
