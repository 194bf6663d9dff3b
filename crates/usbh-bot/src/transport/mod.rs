//! Bulk-Only Transport engine.
//!
//! Each command is three strictly ordered bulk transfers:
//!
//! * the CBW, always on Bulk Out,
//! * an optional data stage on Bulk In or Bulk Out,
//! * the CSW, always on Bulk In.
//!
//! Only one command may be in flight per device, which `&mut self` enforces.

mod device_handle;
pub mod tag;

use std::time::Duration;

use log::{debug, warn};

use crate::{
    commands::{cbw::CBW_LEN, csw::CSW_LEN, decode_csw},
    error::{BotError, ProtocolError, Result},
};
pub use tag::TagGenerator;

/// Transfer attempts per stage before a stalling endpoint is given up on.
pub const MAX_ATTEMPTS: usize = 5;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// The blocking bulk pipe primitives the engine runs on.
///
/// Implemented for [`rusb::DeviceHandle`]; tests use a scripted fake.
pub trait BulkTransport {
    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize>;

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn clear_halt(&mut self, endpoint: u8) -> rusb::Result<()>;
}

impl<T: BulkTransport + ?Sized> BulkTransport for &mut T {
    fn write_bulk(&mut self, endpoint: u8, buf: &[u8], timeout: Duration) -> rusb::Result<usize> {
        (**self).write_bulk(endpoint, buf, timeout)
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        (**self).read_bulk(endpoint, buf, timeout)
    }

    fn clear_halt(&mut self, endpoint: u8) -> rusb::Result<()> {
        (**self).clear_halt(endpoint)
    }
}

/// Bulk endpoint addresses of a Bulk-Only interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub bulk_in: u8,
    pub bulk_out: u8,
}

/// What the device said about a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// bCSWStatus 0.
    Success,
    /// bCSWStatus 1, sense data is available through REQUEST SENSE.
    CommandFailed,
    /// Any other bCSWStatus, usually 2 (phase error).
    DeviceMisunderstoodCommand(u8),
}

impl From<u8> for Outcome {
    fn from(status: u8) -> Self {
        match status {
            0 => Outcome::Success,
            1 => Outcome::CommandFailed,
            other => Outcome::DeviceMisunderstoodCommand(other),
        }
    }
}

/// A decoded and tag checked status stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    pub outcome: Outcome,
    /// Advisory only, never used to decide `outcome`.
    pub data_residue: u32,
}

enum Attempt {
    Complete(usize),
    Stalled,
    Failed(rusb::Error),
}

impl From<rusb::Result<usize>> for Attempt {
    fn from(result: rusb::Result<usize>) -> Self {
        match result {
            Ok(n) => Attempt::Complete(n),
            Err(rusb::Error::Pipe) => Attempt::Stalled,
            Err(e) => Attempt::Failed(e),
        }
    }
}

/// A Bulk-Only session with one device.
///
/// Owns the bulk pipe, the endpoint pair, the transfer timeout and the tag
/// counter. Independent sessions can coexist in one process.
#[derive(Debug)]
pub struct BulkOnly<T> {
    transport: T,
    endpoints: Endpoints,
    timeout: Duration,
    tags: TagGenerator,
}

impl<T: BulkTransport> BulkOnly<T> {
    pub fn new(transport: T, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
            timeout: DEFAULT_TIMEOUT,
            tags: TagGenerator::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Continue a tag sequence, e.g. one taken from a session that was reset.
    pub fn with_tags(mut self, tags: TagGenerator) -> Self {
        self.tags = tags;
        self
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// The tag counter, for handing over to a later session.
    pub fn tags(&self) -> &TagGenerator {
        &self.tags
    }

    /// Reserve the tag for the next command.
    pub fn next_tag(&mut self) -> u32 {
        self.tags.issue()
    }

    /// Send an encoded CBW on the Bulk Out endpoint, clearing stalls up to [`MAX_ATTEMPTS`] times.
    pub fn send_command_block(&mut self, cbw: &[u8; CBW_LEN]) -> Result<()> {
        let endpoint = self.endpoints.bulk_out;
        self.retry_on_stall(endpoint, |transport, timeout| {
            transport.write_bulk(endpoint, cbw, timeout)
        })?;
        Ok(())
    }

    /// Read the CSW for `expected_tag` from the Bulk In endpoint.
    ///
    /// A wrong sized frame and a foreign tag are errors. Device reported
    /// failures are not, they come back in [`CommandStatus::outcome`].
    pub fn receive_command_status(&mut self, expected_tag: u32) -> Result<CommandStatus> {
        let endpoint = self.endpoints.bulk_in;

        // One spare byte so an oversized frame shows up as a length error.
        // Longer packets make libusb report an overflow instead.
        let mut frame = [0u8; CSW_LEN + 1];
        let received = match self.retry_on_stall(endpoint, |transport, timeout| {
            transport.read_bulk(endpoint, &mut frame, timeout)
        }) {
            Err(BotError::Transport {
                source: rusb::Error::Overflow,
                ..
            }) => {
                warn!("status frame on endpoint {endpoint:#04x} overflowed the read buffer");
                return Err(ProtocolError::StatusFrameOverflow(frame.len()).into());
            }
            result => result?,
        };

        if received != CSW_LEN {
            warn!("status frame on endpoint {endpoint:#04x} was {received} bytes");
            return Err(ProtocolError::StatusFrameLength(received).into());
        }
        let csw = decode_csw(&frame[..CSW_LEN])?;

        if !csw.has_valid_signature() {
            warn!(
                "status frame signature {:#010x} is not USBS, accepting it",
                csw.dCSWSignature
            );
        }

        if csw.dCSWTag != expected_tag {
            warn!(
                "status tag {:#010x} does not match command tag {expected_tag:#010x}",
                csw.dCSWTag
            );
            return Err(BotError::TagMismatch {
                expected: expected_tag,
                actual: csw.dCSWTag,
            });
        }

        let outcome = Outcome::from(csw.bCSWStatus);
        debug!(
            "CSW tag={expected_tag:#010x} status={} residue={}",
            csw.bCSWStatus, csw.dCSWDataResidue
        );
        if csw.dCSWDataResidue != 0 {
            warn!(
                "device reported a residue of {} bytes for tag {expected_tag:#010x}",
                csw.dCSWDataResidue
            );
        }

        Ok(CommandStatus {
            outcome,
            data_residue: csw.dCSWDataResidue,
        })
    }

    /// One data-out transfer, no retry.
    pub fn write_data(&mut self, data: &[u8]) -> rusb::Result<usize> {
        self.transport
            .write_bulk(self.endpoints.bulk_out, data, self.timeout)
    }

    /// One data-in transfer, no retry.
    pub fn read_data(&mut self, buf: &mut [u8]) -> rusb::Result<usize> {
        self.transport
            .read_bulk(self.endpoints.bulk_in, buf, self.timeout)
    }

    /// Clear a halt condition, logging instead of failing when the clear itself fails.
    pub fn clear_halt(&mut self, endpoint: u8) {
        if let Err(e) = self.transport.clear_halt(endpoint) {
            warn!("clearing halt on endpoint {endpoint:#04x} failed: {e}");
        }
    }

    fn retry_on_stall<F>(&mut self, endpoint: u8, mut transfer: F) -> Result<usize>
    where
        F: FnMut(&mut T, Duration) -> rusb::Result<usize>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match Attempt::from(transfer(&mut self.transport, self.timeout)) {
                Attempt::Complete(n) => return Ok(n),
                Attempt::Stalled => {
                    warn!(
                        "endpoint {endpoint:#04x} stalled (attempt {attempts}/{MAX_ATTEMPTS})"
                    );
                    self.clear_halt(endpoint);
                    if attempts >= MAX_ATTEMPTS {
                        return Err(BotError::Transport {
                            endpoint,
                            attempts,
                            source: rusb::Error::Pipe,
                        });
                    }
                }
                Attempt::Failed(source) => {
                    return Err(BotError::Transport {
                        endpoint,
                        attempts,
                        source,
                    });
                }
            }
        }
    }
}
