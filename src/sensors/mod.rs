//! Sensor facades.

mod fd_q10c;

pub use fd_q10c::FdQ10c;
