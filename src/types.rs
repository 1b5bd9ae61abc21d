//! Shared domain types: valve/cooling states and the inbound control message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical solenoid valve state. Mirrors a single digital output pin;
/// the rig is wired so the high level opens the water path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValveState {
    Open,
    Close,
}

impl ValveState {
    /// Pin level driven for this state (1 = OPEN).
    pub const fn level(self) -> u8 {
        match self {
            Self::Open => 1,
            Self::Close => 0,
        }
    }

    pub const fn from_level(high: bool) -> Self {
        if high { Self::Open } else { Self::Close }
    }
}

impl fmt::Display for ValveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Close => write!(f, "CLOSE"),
        }
    }
}

/// Logical cooling intent, independent of the duty-cycle phase the valve is
/// currently in: WORKING may still mean a physically closed valve during an
/// OFF-duty period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoolingState {
    Working,
    Idle,
}

impl fmt::Display for CoolingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Working => write!(f, "WORKING"),
            Self::Idle => write!(f, "IDLE"),
        }
    }
}

/// Duty-cycle parameters supplied by the decision engine per control message.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DutyParameters {
    /// When false the valve runs continuously while WORKING.
    pub enabled: bool,
    /// ON-phase length in seconds.
    pub on_sec: f64,
    /// OFF-phase length in seconds.
    pub off_sec: f64,
}

/// Inbound control message from the decision engine, consumed once per
/// control tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub state: CoolingState,
    /// Index of the duty table entry the decision engine picked. Only used
    /// for the mode-change work-log event; -1 marks "nothing received yet".
    #[serde(default = "default_mode_index")]
    pub mode_index: i32,
    #[serde(default)]
    pub duty: DutyParameters,
}

fn default_mode_index() -> i32 {
    0
}

impl ControlMessage {
    /// Placeholder applied until the first real message arrives.
    pub fn initial() -> Self {
        Self {
            state: CoolingState::Idle,
            mode_index: -1,
            duty: DutyParameters::default(),
        }
    }
}
