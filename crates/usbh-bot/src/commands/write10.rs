use crate::commands::{CommandBlock, WRITE_10};

/// WRITE(10) command: write contiguous blocks starting from an LBA.
#[derive(Debug, Clone, Copy)]
pub struct Write10Command {
    pub logical_block_address: u32,
    pub transfer_length: u16,
}

impl Write10Command {
    pub fn new(logical_block_address: u32, transfer_length: u16) -> Self {
        Self {
            logical_block_address,
            transfer_length,
        }
    }
}

impl CommandBlock for Write10Command {
    fn to_bytes(&self) -> [u8; 16] {
        let mut cdb = [0u8; 16];
        cdb[0] = WRITE_10;
        cdb[2..6].copy_from_slice(&self.logical_block_address.to_be_bytes());
        cdb[7..9].copy_from_slice(&self.transfer_length.to_be_bytes());
        cdb
    }
}
