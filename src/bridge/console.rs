//! console.rs
//! Line-oriented command protocol of the physics engine's console port.

use std::fmt;

/// Property paths written by the bridge.
pub mod paths {
    pub const AILERON: &str = "fcs/aileron-cmd-norm";
    pub const ELEVATOR: &str = "fcs/elevator-cmd-norm";
    pub const RUDDER: &str = "fcs/rudder-cmd-norm";
    pub const THROTTLE: &str = "fcs/throttle-cmd-norm";
    pub const WIND_HEADING: &str = "atmosphere/psiw-rad";
    pub const WIND_MAGNITUDE: &str = "atmosphere/wind-mag-fps";
    pub const RESET: &str = "simulation/reset";
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Set { path: &'static str, value: f64 },
    Info,
    /// Pause the engine clock.
    Hold,
    Resume,
    Quit,
}

impl ConsoleCommand {
    pub fn set(path: &'static str, value: f64) -> Self {
        ConsoleCommand::Set { path, value }
    }

    /// Wire form, including the terminator the engine expects.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleCommand::Set { path, value } => write!(f, "set {} {}\r\n", path, value),
            ConsoleCommand::Info => f.write_str("info\n"),
            ConsoleCommand::Hold => f.write_str("hold\n"),
            ConsoleCommand::Resume => f.write_str("resume\n"),
            ConsoleCommand::Quit => f.write_str("quit\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_wire_lines() {
        assert_eq!(
            ConsoleCommand::set(paths::AILERON, 0.25).to_line(),
            "set fcs/aileron-cmd-norm 0.25\r\n"
        );
        assert_eq!(ConsoleCommand::set(paths::RESET, 1.0).to_line(), "set simulation/reset 1\r\n");
        assert_eq!(ConsoleCommand::Hold.to_line(), "hold\n");
        assert_eq!(ConsoleCommand::Resume.to_line(), "resume\n");
        assert_eq!(ConsoleCommand::Quit.to_line(), "quit\n");
    }
}
