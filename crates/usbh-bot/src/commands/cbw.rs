use crate::{commands::cdb_length, error::ValidationError};

pub const CBW_SIGNATURE: u32 = 0x43425355;
pub const CBW_LEN: usize = 31;

const FLAG_DIRECTION_IN: u8 = 0x80;

/// Command Block Wrapper, the request frame of the Bulk-Only Transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_snake_case)]
pub struct Cbw {
    pub dCBWSignature: u32,
    pub dCBWTag: u32,
    pub dCBWDataTransferLength: u32,
    pub bmCBWFlags: u8,
    pub bCBWLUN: u8,
    pub bCBWCBLength: u8,
    pub CBWCB: [u8; 16],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Cbw {
    pub fn new(
        tag: u32,
        data_len: u32,
        direction: Direction,
        lun: u8,
        cdb: &[u8],
    ) -> Result<Self, ValidationError> {
        let Some(&opcode) = cdb.first() else {
            return Err(ValidationError::EmptyCdb);
        };
        if cdb.len() > 16 {
            return Err(ValidationError::CdbTooLong(cdb.len()));
        }
        let length = cdb_length(opcode);
        if length == 0 {
            return Err(ValidationError::UnsupportedOpcode(opcode));
        }

        // Bytes past the declared length stay zero on the wire.
        let significant = cdb.len().min(length as usize);
        let mut block = [0u8; 16];
        block[..significant].copy_from_slice(&cdb[..significant]);

        Ok(Self {
            dCBWSignature: CBW_SIGNATURE,
            dCBWTag: tag,
            dCBWDataTransferLength: data_len,
            bmCBWFlags: match direction {
                Direction::In => FLAG_DIRECTION_IN,
                Direction::Out => 0x00,
            },
            bCBWLUN: lun,
            bCBWCBLength: length,
            CBWCB: block,
        })
    }

    pub fn direction(&self) -> Direction {
        if self.bmCBWFlags & FLAG_DIRECTION_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// The significant bytes of the command block.
    pub fn cdb(&self) -> &[u8] {
        &self.CBWCB[..(self.bCBWCBLength as usize).min(16)]
    }

    /// Serialize into exactly 31 bytes (the CBW size)
    pub fn to_bytes(&self) -> [u8; CBW_LEN] {
        let mut buf = [0u8; CBW_LEN];

        // dCBWSignature ("USBC")
        buf[0..4].copy_from_slice(&self.dCBWSignature.to_le_bytes());

        // dCBWTag
        buf[4..8].copy_from_slice(&self.dCBWTag.to_le_bytes());

        // dCBWDataTransferLength
        buf[8..12].copy_from_slice(&self.dCBWDataTransferLength.to_le_bytes());

        // bmCBWFlags
        buf[12] = self.bmCBWFlags;

        // bCBWLUN
        buf[13] = self.bCBWLUN;

        // bCBWCBLength
        buf[14] = self.bCBWCBLength;

        // CBWCB
        buf[15..31].copy_from_slice(&self.CBWCB);

        buf
    }

    /// Parse a CBW as a device would receive it.
    ///
    /// Returns `None` unless the buffer is exactly 31 bytes and carries the "USBC" signature.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() != CBW_LEN {
            return None;
        }

        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        if word(0) != CBW_SIGNATURE {
            return None;
        }

        let mut block = [0u8; 16];
        block.copy_from_slice(&buf[15..31]);

        Some(Self {
            dCBWSignature: CBW_SIGNATURE,
            dCBWTag: word(4),
            dCBWDataTransferLength: word(8),
            bmCBWFlags: buf[12],
            bCBWLUN: buf[13],
            bCBWCBLength: buf[14],
            CBWCB: block,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn layout_matches_wire_offsets() {
        let cases: [(u32, u32, Direction, &[u8]); 4] = [
            (1, 0, Direction::Out, &[0x00; 6]),
            (0xDEAD_BEEF, 512, Direction::Out, &[0x2A, 0, 0, 0, 0, 7, 0, 0, 1, 0]),
            (0x7F, 4096, Direction::In, &[0xA8, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]),
            (
                u32::MAX,
                u32::MAX,
                Direction::In,
                &[
                    0x88, 0xFF, 0xFE, 0xFD, 0xFC, 0xFB, 0xFA, 0xF9, 0xF8, 0xF7, 0xF6, 0xF5, 0xF4,
                    0xF3, 0xF2, 0xF1,
                ],
            ),
        ];

        for (tag, len, direction, cdb) in cases {
            let buf = Cbw::new(tag, len, direction, 0, cdb).unwrap().to_bytes();
            assert_eq!(buf.len(), 31);
            assert_eq!(&buf[0..4], b"USBC");
            assert_eq!(field_u32(&buf, 4), tag);
            assert_eq!(field_u32(&buf, 8), len);
            assert_eq!(buf[12] == 0x80, direction == Direction::In);
            assert_eq!(buf[13], 0);
            assert_eq!(buf[14] as usize, cdb.len());
            assert_eq!(&buf[15..15 + cdb.len()], cdb);
            assert!(buf[15 + cdb.len()..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn cdb_length_comes_from_opcode() {
        // A short slice still declares the full READ(10) length.
        let cbw = Cbw::new(3, 512, Direction::In, 0, &[0x28, 0, 0, 0, 0, 1]).unwrap();
        assert_eq!(cbw.bCBWCBLength, 10);
        assert_eq!(cbw.cdb(), &[0x28, 0, 0, 0, 0, 1, 0, 0, 0, 0]);

        let padded = Cbw::new(3, 512, Direction::In, 0, &[0x28; 16]).unwrap();
        assert_eq!(padded.bCBWCBLength, 10);
    }

    #[test]
    fn bytes_past_declared_length_are_zeroed() {
        let buf = crate::commands::encode_cbw(1, 512, Direction::In, 0, &[0x28; 16]).unwrap();
        assert_eq!(buf[14], 10);
        assert_eq!(&buf[15..25], &[0x28; 10]);
        assert_eq!(&buf[25..31], &[0; 6]);

        let six = Cbw::new(1, 18, Direction::In, 0, &[0x03; 16]).unwrap().to_bytes();
        assert_eq!(six[14], 6);
        assert!(six[21..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_invalid_cdbs() {
        assert_eq!(
            Cbw::new(1, 0, Direction::Out, 0, &[]),
            Err(ValidationError::EmptyCdb)
        );
        assert_eq!(
            Cbw::new(1, 0, Direction::Out, 0, &[0x28; 17]),
            Err(ValidationError::CdbTooLong(17))
        );
        assert_eq!(
            Cbw::new(1, 0, Direction::Out, 0, &[0xC5, 0, 0, 0, 0, 0]),
            Err(ValidationError::UnsupportedOpcode(0xC5))
        );
    }

    #[test]
    fn parses_what_it_serializes() {
        let cbw = Cbw::new(42, 512, Direction::In, 0, &[0x28, 0, 0, 0, 0, 0, 0, 0, 1, 0]).unwrap();
        let parsed = Cbw::parse(&cbw.to_bytes()).unwrap();
        assert_eq!(parsed, cbw);
        assert_eq!(parsed.direction(), Direction::In);

        assert!(Cbw::parse(&cbw.to_bytes()[..30]).is_none());
        let mut bad = cbw.to_bytes();
        bad[0] = b'X';
        assert!(Cbw::parse(&bad).is_none());
    }
}
