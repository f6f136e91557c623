//! control_state.rs
//! Tracks the last actuator command forwarded to the physics engine.
//! - parses the flight controller's 5-field tab-separated command line
//! - emits one console `set` per channel whose value actually changed

use crate::bridge::console::{ConsoleCommand, paths};

/// One actuator-command datagram from the flight controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCommand {
    pub aileron: f64,
    pub elevator: f64,
    pub rudder: f64,
    pub running: bool,
    pub throttle: f64,
}

impl ActuatorCommand {
    /// `aileron \t elevator \t rudder \t running \t throttle`.
    /// Any other shape is rejected.
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() != 5 {
            return None;
        }
        let num = |i: usize| fields[i].trim().parse::<f64>().ok();
        Some(Self {
            aileron: num(0)?,
            elevator: num(1)?,
            rudder: num(2)?,
            running: num(3)? != 0.0,
            throttle: num(4)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlState {
    pub aileron: f64,
    pub elevator: f64,
    pub rudder: f64,
    pub throttle: f64,
    /// meters, fixed from the home position at session start
    pub ground_height: f64,
}

impl ControlState {
    pub fn new(ground_height: f64) -> Self {
        Self {
            ground_height,
            ..Self::default()
        }
    }

    /// Start-of-run reset. Ground height is a session constant.
    pub fn reset(&mut self) {
        self.aileron = 0.0;
        self.elevator = 0.0;
        self.rudder = 0.0;
        self.throttle = 0.0;
    }

    /// Update tracked channels and return the console writes for those that changed.
    pub fn apply(&mut self, cmd: &ActuatorCommand) -> Vec<ConsoleCommand> {
        let mut out = Vec::with_capacity(4);
        for (tracked, incoming, path) in [
            (&mut self.aileron, cmd.aileron, paths::AILERON),
            (&mut self.elevator, cmd.elevator, paths::ELEVATOR),
            (&mut self.rudder, cmd.rudder, paths::RUDDER),
            (&mut self.throttle, cmd.throttle, paths::THROTTLE),
        ] {
            if *tracked != incoming {
                *tracked = incoming;
                out.push(ConsoleCommand::set(path, incoming));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(a: f64, e: f64, r: f64, t: f64) -> ActuatorCommand {
        ActuatorCommand {
            aileron: a,
            elevator: e,
            rudder: r,
            running: true,
            throttle: t,
        }
    }

    #[test]
    fn parses_five_fields() {
        let c = ActuatorCommand::parse("0.1\t-0.2\t0\t1\t0.75\n").unwrap();
        assert_eq!(c, cmd(0.1, -0.2, 0.0, 0.75));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(ActuatorCommand::parse("0.1\t0.2\t0.3\t1").is_none());
        assert!(ActuatorCommand::parse("0.1\t0.2\t0.3\t1\t0.5\t9").is_none());
        assert!(ActuatorCommand::parse("").is_none());
        assert!(ActuatorCommand::parse("a\tb\tc\td\te").is_none());
    }

    #[test]
    fn emits_only_changed_channels() {
        let mut state = ControlState::new(5.0);
        let out = state.apply(&cmd(0.0, 0.5, 0.0, 0.8));
        assert_eq!(
            out,
            vec![
                ConsoleCommand::set(paths::ELEVATOR, 0.5),
                ConsoleCommand::set(paths::THROTTLE, 0.8),
            ]
        );
        assert_eq!(state.elevator, 0.5);
        assert_eq!(state.ground_height, 5.0);
    }

    #[test]
    fn repeated_input_is_silent() {
        let mut state = ControlState::default();
        let c = cmd(0.1, 0.2, 0.3, 0.4);
        assert_eq!(state.apply(&c).len(), 4);
        assert!(state.apply(&c).is_empty());
        assert!(state.apply(&c).is_empty());
    }

    #[test]
    fn malformed_line_leaves_state_alone() {
        let mut state = ControlState::default();
        state.apply(&cmd(0.1, 0.2, 0.3, 0.4));
        let before = state.clone();
        if let Some(c) = ActuatorCommand::parse("9\t9\t9") {
            state.apply(&c);
        }
        assert_eq!(state, before);
    }

    #[test]
    fn reset_keeps_ground_height() {
        let mut state = ControlState::new(12.0);
        state.apply(&cmd(0.1, 0.2, 0.3, 0.4));
        state.reset();
        assert_eq!(state, ControlState::new(12.0));
        assert_eq!(state.apply(&cmd(0.1, 0.0, 0.0, 0.0)).len(), 1);
    }
}
