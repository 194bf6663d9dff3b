pub mod cbw;
pub mod csw;
pub mod read10;
pub mod request_sense;
pub mod write10;

use crate::error::ValidationError;
use cbw::{Cbw, Direction};
use csw::Csw;

pub const READ_10: u8 = 0x28;
pub const WRITE_10: u8 = 0x2A;
pub const REQUEST_SENSE: u8 = 0x03;

pub trait CommandBlock {
    /// Return the command bytes (CDB), zero padded to 16 bytes.
    fn to_bytes(&self) -> [u8; 16];

    /// Operation code, the first byte of the CDB.
    fn opcode(&self) -> u8 {
        self.to_bytes()[0]
    }
}

/// Length in bytes of the CDB for `opcode`, or 0 when the group is not supported.
///
/// Follows the SCSI group code in the top three bits of the opcode.
pub const fn cdb_length(opcode: u8) -> u8 {
    match opcode {
        0x00..=0x1F => 6,
        0x20..=0x5F => 10,
        0x80..=0x9F => 16,
        0xA0..=0xBF => 12,
        _ => 0,
    }
}

/// Build the 31 byte wire form of a CBW.
///
/// The CDB length is taken from [`cdb_length`] for `cdb[0]`, never from `cdb.len()`.
pub fn encode_cbw(
    tag: u32,
    data_transfer_length: u32,
    direction: Direction,
    lun: u8,
    cdb: &[u8],
) -> Result<[u8; cbw::CBW_LEN], ValidationError> {
    Ok(Cbw::new(tag, data_transfer_length, direction, lun, cdb)?.to_bytes())
}

/// Decode a 13 byte CSW. Only the length is checked here.
pub fn decode_csw(buf: &[u8]) -> Result<Csw, crate::error::ProtocolError> {
    Csw::parse(buf)
}
