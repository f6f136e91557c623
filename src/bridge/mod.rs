// Everything that talks to the outside world: the engine's console, its
// child process, and the datagram endpoints of the HIL loop.

pub mod console;
pub mod endpoints;
pub mod process;
pub mod readiness;
