use log::{debug, warn};

use crate::{
    commands::{
        CommandBlock,
        cbw::{Cbw, Direction},
        read10::Read10Command,
        request_sense::{RequestSenseCommand, SENSE_DATA_LEN, SenseData},
        write10::Write10Command,
    },
    error::{BotError, ProtocolError, Result, ValidationError},
    transport::{BulkOnly, BulkTransport, CommandStatus, Outcome},
};

pub const DEFAULT_BLOCK_SIZE: u32 = 512;

/// Data moved between the CBW and the CSW.
#[derive(Debug)]
pub enum DataStage<'a> {
    None,
    /// Device to host, at most `buf.len()` bytes.
    In(&'a mut [u8]),
    /// Host to device, exactly `data.len()` bytes.
    Out(&'a [u8]),
}

impl DataStage<'_> {
    fn direction(&self) -> Direction {
        match self {
            DataStage::In(_) => Direction::In,
            DataStage::None | DataStage::Out(_) => Direction::Out,
        }
    }

    fn len(&self) -> usize {
        match self {
            DataStage::None => 0,
            DataStage::In(buf) => buf.len(),
            DataStage::Out(data) => data.len(),
        }
    }
}

/// A command that ran through its status stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub outcome: Outcome,
    /// As reported by the device, advisory only.
    pub data_residue: u32,
    /// Bytes actually moved in the data stage.
    pub transferred: usize,
}

impl Completion {
    fn new(status: CommandStatus, transferred: usize) -> Self {
        Self {
            outcome: status.outcome,
            data_residue: status.data_residue,
            transferred,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Block level reads and writes over a Bulk-Only session.
///
/// Every operation runs command, data and status stage in order with a
/// fresh tag. Nothing carries over from one operation to the next.
#[derive(Debug)]
pub struct BlockDevice<T> {
    bot: BulkOnly<T>,
    block_size: u32,
    lun: u8,
}

impl<T: BulkTransport> BlockDevice<T> {
    pub fn new(bot: BulkOnly<T>) -> Self {
        Self {
            bot,
            block_size: DEFAULT_BLOCK_SIZE,
            lun: 0,
        }
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn set_block_size(&mut self, block_size: u32) {
        self.block_size = block_size;
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn bot(&self) -> &BulkOnly<T> {
        &self.bot
    }

    pub fn bot_mut(&mut self) -> &mut BulkOnly<T> {
        &mut self.bot
    }

    pub fn into_inner(self) -> BulkOnly<T> {
        self.bot
    }

    /// Bytes moved by `count` blocks, bounded by the 32 bit transfer length.
    fn span(&self, count: u16) -> Result<usize, ValidationError> {
        let len = (self.block_size as usize)
            .checked_mul(count as usize)
            .ok_or(ValidationError::TransferTooLarge(usize::MAX))?;
        u32::try_from(len).map_err(|_| ValidationError::TransferTooLarge(len))?;
        Ok(len)
    }

    /// Write `count` consecutive blocks starting at `lba` from `data`.
    ///
    /// `data.len()` must be exactly `count * block_size`.
    pub fn write_blocks(&mut self, lba: u32, count: u16, data: &[u8]) -> Result<Completion> {
        let expected = self.span(count)?;
        if data.len() != expected {
            return Err(ValidationError::PayloadLength {
                expected,
                actual: data.len(),
            }
            .into());
        }

        let cmd = Write10Command::new(lba, count);
        self.execute(&cmd, DataStage::Out(data))
    }

    /// Read `count` consecutive blocks starting at `lba` into `buf`.
    ///
    /// A device may return fewer bytes than asked for; only the first
    /// [`Completion::transferred`] bytes of `buf` are written.
    pub fn read_blocks(&mut self, lba: u32, count: u16, buf: &mut [u8]) -> Result<Completion> {
        let needed = self.span(count)?;
        if buf.len() < needed {
            return Err(ValidationError::BufferTooSmall {
                needed,
                actual: buf.len(),
            }
            .into());
        }

        let cmd = Read10Command::new(lba, count);
        self.execute(&cmd, DataStage::In(&mut buf[..needed]))
    }

    /// Like [`read_blocks`](Self::read_blocks), returning exactly the bytes received.
    pub fn read_blocks_to_vec(&mut self, lba: u32, count: u16) -> Result<(Completion, Vec<u8>)> {
        let mut buf = vec![0u8; self.span(count)?];
        let completion = self.read_blocks(lba, count, &mut buf)?;
        buf.truncate(completion.transferred);
        Ok((completion, buf))
    }

    /// Fetch the sense data explaining the last `CommandFailed`.
    pub fn request_sense(&mut self) -> Result<(Completion, Option<SenseData>)> {
        let mut buf = [0u8; SENSE_DATA_LEN as usize];
        let completion = self.execute(&RequestSenseCommand::default(), DataStage::In(&mut buf))?;

        let sense = match completion.outcome {
            Outcome::Success => SenseData::parse(&buf[..completion.transferred]),
            _ => None,
        };
        Ok((completion, sense))
    }

    /// Run any command through the three Bulk-Only stages.
    pub fn execute<C: CommandBlock>(&mut self, cmd: &C, data: DataStage<'_>) -> Result<Completion> {
        let len = data.len();
        let transfer_length =
            u32::try_from(len).map_err(|_| ValidationError::TransferTooLarge(len))?;
        let direction = data.direction();

        // Validate before a tag is spent on the request.
        let mut cbw = Cbw::new(0, transfer_length, direction, self.lun, &cmd.to_bytes())?;
        let tag = self.bot.next_tag();
        cbw.dCBWTag = tag;

        debug!(
            "CBW tag={tag:#010x} opcode={:#04x} length={transfer_length} {direction:?}",
            cmd.opcode()
        );
        self.bot.send_command_block(&cbw.to_bytes())?;

        let transferred = match data {
            DataStage::None => 0,
            DataStage::Out(data) if data.is_empty() => 0,
            DataStage::In(buf) if buf.is_empty() => 0,
            DataStage::Out(data) => self.data_out(data)?,
            DataStage::In(buf) => self.data_in(buf)?,
        };

        let status = self.bot.receive_command_status(tag)?;
        Ok(Completion::new(status, transferred))
    }

    fn data_out(&mut self, data: &[u8]) -> Result<usize> {
        let endpoint = self.bot.endpoints().bulk_out;
        match self.bot.write_data(data) {
            Ok(sent) if sent == data.len() => {
                debug!("data out: {sent} bytes");
                Ok(sent)
            }
            Ok(sent) => {
                warn!("data out stopped after {sent} of {} bytes", data.len());
                Err(ProtocolError::ShortWrite {
                    expected: data.len(),
                    sent,
                }
                .into())
            }
            Err(rusb::Error::Pipe) => {
                warn!("data out stalled on endpoint {endpoint:#04x}");
                self.bot.clear_halt(endpoint);
                Err(BotError::Transport {
                    endpoint,
                    attempts: 1,
                    source: rusb::Error::Pipe,
                })
            }
            Err(source) => Err(BotError::Transport {
                endpoint,
                attempts: 1,
                source,
            }),
        }
    }

    fn data_in(&mut self, buf: &mut [u8]) -> Result<usize> {
        let endpoint = self.bot.endpoints().bulk_in;
        match self.bot.read_data(buf) {
            Ok(received) => {
                if received < buf.len() {
                    debug!("data in: short read of {received} of {} bytes", buf.len());
                } else {
                    debug!("data in: {received} bytes");
                }
                Ok(received)
            }
            Err(rusb::Error::Pipe) => {
                // The device ended the data stage early, the CSW still follows.
                warn!("data in stalled on endpoint {endpoint:#04x}, reading status");
                self.bot.clear_halt(endpoint);
                Ok(0)
            }
            Err(source) => Err(BotError::Transport {
                endpoint,
                attempts: 1,
                source,
            }),
        }
    }
}
