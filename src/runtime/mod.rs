// Session lifetime: context object, readiness loop, signal flag.

pub mod event_loop;
pub mod session;
pub mod signals;
