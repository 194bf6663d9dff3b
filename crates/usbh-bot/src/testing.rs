use std::{collections::VecDeque, time::Duration};

use crate::{
    commands::csw::{CSW_LEN, CSW_SIGNATURE},
    transport::{BulkTransport, Endpoints},
};

pub const TEST_ENDPOINTS: Endpoints = Endpoints {
    bulk_in: 0x81,
    bulk_out: 0x02,
};

pub fn csw_frame(tag: u32, residue: u32, status: u8) -> [u8; CSW_LEN] {
    let mut frame = [0u8; CSW_LEN];
    frame[0..4].copy_from_slice(&CSW_SIGNATURE.to_le_bytes());
    frame[4..8].copy_from_slice(&tag.to_le_bytes());
    frame[8..12].copy_from_slice(&residue.to_le_bytes());
    frame[12] = status;
    frame
}

/// Replays queued transfer results and records what the engine did.
///
/// An empty queue answers with a timeout, like a silent device.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    write_results: VecDeque<rusb::Result<usize>>,
    read_results: VecDeque<rusb::Result<Vec<u8>>>,
    /// Every buffer handed to `write_bulk`, stalled attempts included.
    pub writes: Vec<Vec<u8>>,
    pub reads_issued: usize,
    /// Sizes of the buffers handed to `read_bulk`.
    pub read_sizes: Vec<usize>,
    pub clear_halts: Vec<u8>,
    pub endpoints_used: Vec<u8>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next `write_bulk`. `Ok(n)` reports `n` bytes sent.
    pub fn push_write(&mut self, result: rusb::Result<usize>) {
        self.write_results.push_back(result);
    }

    /// Queue the bytes delivered by the next `read_bulk`.
    pub fn push_read(&mut self, result: rusb::Result<Vec<u8>>) {
        self.read_results.push_back(result);
    }

    /// Queue a full data-out command: accepted CBW, accepted payload and a CSW.
    pub fn accept_write(&mut self, tag: u32, payload_len: usize, status: u8) {
        self.push_write(Ok(crate::commands::cbw::CBW_LEN));
        self.push_write(Ok(payload_len));
        self.push_read(Ok(csw_frame(tag, 0, status).to_vec()));
    }
}

impl BulkTransport for ScriptedTransport {
    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        self.endpoints_used.push(endpoint);
        self.writes.push(buf.to_vec());
        self.write_results
            .pop_front()
            .unwrap_or(Err(rusb::Error::Timeout))
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        self.endpoints_used.push(endpoint);
        self.reads_issued += 1;
        self.read_sizes.push(buf.len());
        let data = self
            .read_results
            .pop_front()
            .unwrap_or(Err(rusb::Error::Timeout))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn clear_halt(&mut self, endpoint: u8) -> rusb::Result<()> {
        self.clear_halts.push(endpoint);
        Ok(())
    }
}
