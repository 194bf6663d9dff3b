use crate::commands::{CommandBlock, REQUEST_SENSE};

/// Size of fixed format sense data.
pub const SENSE_DATA_LEN: u8 = 18;

/// SCSI REQUEST SENSE command (CDB).
///
/// Fetches the sense data describing why the previous command reported
/// `CommandFailed`. Must be the next command sent to the logical unit,
/// otherwise the device is free to discard the sense information.
pub struct RequestSenseCommand {
    /// Allocation length: how many bytes the host expects back.
    pub alloc_len: u8,
}

impl RequestSenseCommand {
    pub fn new(alloc_len: u8) -> Self {
        Self { alloc_len }
    }
}

impl Default for RequestSenseCommand {
    fn default() -> Self {
        Self::new(SENSE_DATA_LEN)
    }
}

impl CommandBlock for RequestSenseCommand {
    fn to_bytes(&self) -> [u8; 16] {
        let mut cdb = [0u8; 16];
        cdb[0] = REQUEST_SENSE;
        cdb[1] = 0x00; // DESC = 0, fixed format
        cdb[4] = self.alloc_len; // allocation length
        cdb
    }
}

/// Sense key field (byte 2, low nibble).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseKey {
    NoSense,
    RecoveredError,
    NotReady,
    MediumError,
    HardwareError,
    IllegalRequest,
    UnitAttention,
    DataProtect,
    AbortedCommand,
    Other(u8),
}

impl From<u8> for SenseKey {
    fn from(value: u8) -> Self {
        match value & 0x0F {
            0x0 => SenseKey::NoSense,
            0x1 => SenseKey::RecoveredError,
            0x2 => SenseKey::NotReady,
            0x3 => SenseKey::MediumError,
            0x4 => SenseKey::HardwareError,
            0x5 => SenseKey::IllegalRequest,
            0x6 => SenseKey::UnitAttention,
            0x7 => SenseKey::DataProtect,
            0xB => SenseKey::AbortedCommand,
            other => SenseKey::Other(other),
        }
    }
}

/// Parsed fixed format sense data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseData {
    /// 0x70 (current) or 0x71 (deferred).
    pub response_code: u8,
    pub sense_key: SenseKey,
    /// Additional sense code.
    pub asc: u8,
    /// Additional sense code qualifier.
    pub ascq: u8,
}

impl SenseData {
    /// Parse fixed format sense data.
    ///
    /// Returns `None` if the buffer is too short to hold the ASC/ASCQ pair.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < 14 {
            return None;
        }

        Some(Self {
            response_code: buf[0] & 0x7F,
            sense_key: SenseKey::from(buf[2]),
            asc: buf[12],
            ascq: buf[13],
        })
    }
}
