//! Protocol module - opcodes, modes and command encoding.
//!
//! This module implements the command direction of the Open Interface:
//! - Opcode table with per-opcode mode rules
//! - Mode tracker
//! - Validating command encoders

mod command;
mod mode;
mod opcode;
pub mod params;

pub use command::Command;
pub use mode::{ModeAccess, ModeTracker, OiMode};
pub use opcode::Opcode;
pub use params::{BaudCode, ClockTime, Day, Note};
