//! Operating mode tracking.
//!
//! ```text
//!             start            safe/control           full
//! Unstarted ────────► Passive ──────────────► Safe ─────────► Full
//!                        ▲                     │               │
//!                        └─ clean/max/spot/seek_dock/power ────┘
//! ```
//!
//! The tracker is only advanced by the session after a command has been
//! written successfully.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use super::Opcode;
use crate::error::{OiError, Result};

/// Operating mode of the Open Interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum OiMode {
    Unstarted = 0,
    Passive = 1,
    Safe = 2,
    Full = 3,
}

impl OiMode {
    /// Decode the value reported in sensor packet 35 (0 = off).
    pub fn from_sensor(value: u8) -> Option<Self> {
        match value {
            0 => Some(OiMode::Unstarted),
            1 => Some(OiMode::Passive),
            2 => Some(OiMode::Safe),
            3 => Some(OiMode::Full),
            _ => None,
        }
    }

    fn from_u8(value: u8) -> Self {
        Self::from_sensor(value).unwrap_or(OiMode::Unstarted)
    }

    pub fn is_started(self) -> bool {
        self != OiMode::Unstarted
    }
}

impl fmt::Display for OiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OiMode::Unstarted => "unstarted",
            OiMode::Passive => "passive",
            OiMode::Safe => "safe",
            OiMode::Full => "full",
        };
        f.write_str(name)
    }
}

/// Modes in which a command is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeAccess {
    /// Accepted before start (only `start` itself).
    Always,
    /// Passive, Safe or Full.
    Started,
    /// Safe or Full.
    SafeOrFull,
}

impl ModeAccess {
    pub fn allows(self, mode: OiMode) -> bool {
        match self {
            ModeAccess::Always => true,
            ModeAccess::Started => mode.is_started(),
            ModeAccess::SafeOrFull => matches!(mode, OiMode::Safe | OiMode::Full),
        }
    }
}

/// Current operating mode, shared by the dispatcher operations.
#[derive(Debug)]
pub struct ModeTracker {
    mode: AtomicU8,
}

impl ModeTracker {
    pub fn new() -> Self {
        Self {
            mode: AtomicU8::new(OiMode::Unstarted as u8),
        }
    }

    pub fn get(&self) -> OiMode {
        OiMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Started check followed by the opcode's mode allow-list.
    pub fn authorize(&self, opcode: Opcode) -> Result<OiMode> {
        let mode = self.get();
        if opcode.access() != ModeAccess::Always && !mode.is_started() {
            return Err(OiError::NotStarted);
        }
        if !opcode.access().allows(mode) {
            return Err(OiError::InvalidMode {
                operation: opcode.name(),
                mode,
            });
        }
        Ok(mode)
    }

    /// Apply the transition caused by a command that reached the robot.
    pub(crate) fn record(&self, opcode: Opcode) {
        if let Some(next) = opcode.mode_after() {
            self.set(next);
        }
    }

    pub(crate) fn set(&self, mode: OiMode) {
        self.mode.store(mode as u8, Ordering::Release);
    }
}

impl Default for ModeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unstarted() {
        let tracker = ModeTracker::new();
        assert_eq!(tracker.get(), OiMode::Unstarted);
    }

    #[test]
    fn test_only_start_before_started() {
        let tracker = ModeTracker::new();
        assert!(tracker.authorize(Opcode::Start).is_ok());
        assert!(matches!(
            tracker.authorize(Opcode::Safe),
            Err(OiError::NotStarted)
        ));
        // Not-started wins over the mode allow-list.
        assert!(matches!(
            tracker.authorize(Opcode::Drive),
            Err(OiError::NotStarted)
        ));
    }

    #[test]
    fn test_drive_requires_safe_or_full() {
        let tracker = ModeTracker::new();
        tracker.record(Opcode::Start);
        assert!(matches!(
            tracker.authorize(Opcode::Drive),
            Err(OiError::InvalidMode {
                operation: "drive",
                mode: OiMode::Passive
            })
        ));

        tracker.record(Opcode::Safe);
        assert!(tracker.authorize(Opcode::Drive).is_ok());
        tracker.record(Opcode::Full);
        assert!(tracker.authorize(Opcode::Drive).is_ok());
    }

    #[test]
    fn test_cleaning_returns_to_passive() {
        let tracker = ModeTracker::new();
        tracker.record(Opcode::Start);
        tracker.record(Opcode::Full);
        for op in [Opcode::Clean, Opcode::Max, Opcode::Spot, Opcode::SeekDock, Opcode::Power] {
            tracker.record(Opcode::Full);
            tracker.record(op);
            assert_eq!(tracker.get(), OiMode::Passive, "{}", op);
        }
    }

    #[test]
    fn test_non_mode_commands_keep_mode() {
        let tracker = ModeTracker::new();
        tracker.record(Opcode::Start);
        tracker.record(Opcode::Safe);
        tracker.record(Opcode::Drive);
        tracker.record(Opcode::Sensors);
        assert_eq!(tracker.get(), OiMode::Safe);
    }

    #[test]
    fn test_from_sensor() {
        assert_eq!(OiMode::from_sensor(3), Some(OiMode::Full));
        assert_eq!(OiMode::from_sensor(4), None);
    }
}
