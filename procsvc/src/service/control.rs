//! Service - Control
//! =================
//!
//! Control codes, accepted-controls masks and the status a service
//! publishes. Numeric values match the Win32 service API so they can be
//! handed to the Service Control Manager unchanged and shown to commands
//! as plain numbers.
//!
//! ```text
//!  StartPending ──→ Running ⇄ Paused
//!                      │        │
//!                      └──→ Stopped ←┘
//! ```

use super::error::*;

#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ControlCode {
    Stop = 0x1,
    Pause = 0x2,
    Continue = 0x3,
    Interrogate = 0x4,
    Shutdown = 0x5,
    PreShutdown = 0xF,
}

impl ControlCode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x1 => Some(Self::Stop),
            0x2 => Some(Self::Pause),
            0x3 => Some(Self::Continue),
            0x4 => Some(Self::Interrogate),
            0x5 => Some(Self::Shutdown),
            0xF => Some(Self::PreShutdown),
            _ => None,
        }
    }

    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// State the service enters once this control has been handled.
    /// `None` leaves the state unchanged.
    pub fn target_state(self) -> Option<ServiceState> {
        match self {
            Self::Continue => Some(ServiceState::Running),
            Self::Pause => Some(ServiceState::Paused),
            Self::Stop | Self::Shutdown | Self::PreShutdown => Some(ServiceState::Stopped),
            Self::Interrogate => None,
        }
    }
}

/// Set of controls a service accepts (`SERVICE_ACCEPT_*`).
#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ControlMask(u32);

impl ControlMask {
    pub const NONE: Self = Self(0);
    pub const STOP: Self = Self(0x1);
    pub const PAUSE_CONTINUE: Self = Self(0x2);
    pub const SHUTDOWN: Self = Self(0x4);
    pub const PRESHUTDOWN: Self = Self(0x100);
    pub const ALL: Self = Self(0x107);

    /// Validates a raw mask; bits outside [`ControlMask::ALL`] are rejected.
    pub fn from_bits(bits: i64) -> Result<Self> {
        match u32::try_from(bits) {
            Ok(raw) if raw & !Self::ALL.0 == 0 => Ok(Self(raw)),
            _ => Err(ServiceError::InvalidControlMask { mask: bits }),
        }
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl std::ops::BitOr for ControlMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::fmt::Display for ControlMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    StartPending,
    Running,
    Paused,
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::StartPending => "start pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What a service publishes to its control manager.
#[derive(serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub controls_accepted: ControlMask,
    pub checkpoint: u32,
    pub wait_hint: u32,
}

impl ServiceStatus {
    pub fn start_pending(controls_accepted: ControlMask) -> Self {
        Self {
            state: ServiceState::StartPending,
            controls_accepted,
            checkpoint: 0,
            wait_hint: 0,
        }
    }
}
