//! Driven adapters implementing the port traits: real hardware bridges and
//! the simulated rig.

pub mod hal;
pub mod sim;
