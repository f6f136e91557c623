// Control side: actuator commands from the flight controller and the wind
// fed to the physics engine.

pub mod control_state;
pub mod wind;
