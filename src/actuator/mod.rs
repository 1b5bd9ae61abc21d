//! Actuator side of the rig: valve control, hazard supervision and the
//! worker loops that drive them.

pub mod control;
pub mod hazard;
pub mod monitor;
pub mod valve;
pub mod work_log;
pub mod worker;
