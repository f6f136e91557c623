// Fault-injection sweep: attack catalogue, per-run state machine and the
// result tables handed to persistence and plotting.

pub mod attack;
pub mod controller;
pub mod results;
