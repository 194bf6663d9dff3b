use crate::error::ProtocolError;

pub const CSW_SIGNATURE: u32 = 0x53425355;
pub const CSW_LEN: usize = 13;

/// Command Status Wrapper, the reply frame of the Bulk-Only Transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_snake_case)]
pub struct Csw {
    pub dCSWSignature: u32,
    pub dCSWTag: u32,
    /// Bytes the device did not process. Some devices report garbage here.
    pub dCSWDataResidue: u32,
    pub bCSWStatus: u8,
}

impl Csw {
    /// Parse a status frame. Anything but exactly 13 bytes is rejected, nothing else is checked.
    pub fn parse(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != CSW_LEN {
            return Err(ProtocolError::StatusFrameLength(buf.len()));
        }

        let word = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);

        Ok(Self {
            dCSWSignature: word(0),
            dCSWTag: word(4),
            dCSWDataResidue: word(8),
            bCSWStatus: buf[12],
        })
    }

    pub fn has_valid_signature(&self) -> bool {
        self.dCSWSignature == CSW_SIGNATURE
    }

    pub fn to_bytes(&self) -> [u8; CSW_LEN] {
        let mut buf = [0u8; CSW_LEN];
        buf[0..4].copy_from_slice(&self.dCSWSignature.to_le_bytes());
        buf[4..8].copy_from_slice(&self.dCSWTag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.dCSWDataResidue.to_le_bytes());
        buf[12] = self.bCSWStatus;
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_any_thirteen_bytes() {
        let csw = Csw::parse(&[0xFF; 13]).unwrap();
        assert!(!csw.has_valid_signature());
        assert_eq!(csw.bCSWStatus, 0xFF);

        let mut frame = [0u8; 13];
        frame[0..4].copy_from_slice(b"USBS");
        frame[4..8].copy_from_slice(&7u32.to_le_bytes());
        frame[8..12].copy_from_slice(&12u32.to_le_bytes());
        frame[12] = 1;
        let csw = Csw::parse(&frame).unwrap();
        assert!(csw.has_valid_signature());
        assert_eq!(csw.dCSWTag, 7);
        assert_eq!(csw.dCSWDataResidue, 12);
        assert_eq!(csw.bCSWStatus, 1);
        assert_eq!(csw.to_bytes(), frame);
    }

    #[test]
    fn rejects_other_lengths() {
        for len in [0, 1, 12, 14, 31, 64] {
            let buf = vec![0u8; len];
            assert_eq!(Csw::parse(&buf), Err(ProtocolError::StatusFrameLength(len)));
        }
    }
}
