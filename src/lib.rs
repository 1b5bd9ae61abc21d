//! Mist-cooling rig controller library.
//!
//! Drives a solenoid valve that mists the outdoor unit of an air
//! conditioner, reads back the actual water flow over IO-Link, and latches
//! the rig into a safe state when the flow contradicts the valve.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  Adapters (outer ring)                   │
//! │                                                          │
//! │  HalPin / HalSpi / IoUart        SimDevice / SimPin      │
//! │  (real rig)                      (bench + tests)         │
//! │                                                          │
//! │  ───────────────── Port Trait Boundary ──────────────    │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  ValveController · FlowMonitor · ControlHandle     │  │
//! │  │  FdQ10c facade over the IO-Link stack              │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  MarkerStore (persisted state) · WorkLog (operator log)  │
//! └──────────────────────────────────────────────────────────┘
//! ```

#![deny(unused_must_use)]

pub mod actuator;
pub mod adapters;
pub mod config;
pub mod iolink;
pub mod lock;
pub mod marker;
pub mod ports;
pub mod sensors;
pub mod types;

mod error;

pub use error::{Error, ProtocolError, Result};
