#![doc = include_str!("../README.md")]

pub mod commands;
pub mod error;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{BotError, ProtocolError, ValidationError};
pub use storage::block_device::{BlockDevice, Completion, DataStage};
pub use transport::{BulkOnly, BulkTransport, CommandStatus, Endpoints, Outcome};

/// Re-export of the `rusb` crate for raw USB device handling.
pub use rusb;
