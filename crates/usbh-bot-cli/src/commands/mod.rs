use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use usbh_bot::{
    BlockDevice, Completion, Outcome,
    rusb::{DeviceHandle, GlobalContext},
    storage::{Opened, UsbMassStorage},
};

use crate::{id_parser, num_parser};

pub mod read;
pub mod sense;
pub mod write;

/// Blocks moved per command when a transfer spans many blocks.
pub const BLOCKS_PER_COMMAND: u16 = 64;

#[derive(Args, Debug)]
pub struct DeviceArgs {
    /// Vendor id of the device, LUFA's by default
    #[clap(long, default_value = "0x03eb", value_parser = id_parser)]
    pub vid: u16,

    /// Product id of the device, any if not given
    #[clap(long, value_parser = id_parser)]
    pub pid: Option<u16>,

    /// Timeout of each bulk transfer in milliseconds
    #[clap(long, default_value_t = 1000)]
    pub timeout_ms: u64,

    /// Logical block size in bytes
    #[clap(long, default_value = "512", value_parser = num_parser)]
    pub block_size: u32,
}

impl DeviceArgs {
    pub fn open(&self) -> Result<UsbMassStorage<Opened>> {
        log::debug!(
            "Looking for {:04x}:{}",
            self.vid,
            self.pid
                .map(|pid| format!("{pid:04x}"))
                .unwrap_or_else(|| "*".to_string())
        );

        let closed = UsbMassStorage::find(self.vid, self.pid)?;
        log::info!(
            "Found mass storage device {:04x}:{:04x} on bus {} address {}",
            closed.vendor_id,
            closed.product_id,
            closed.device.bus_number(),
            closed.device.address()
        );

        let mut opened = closed.open_with_timeout(Duration::from_millis(self.timeout_ms))?;
        opened.block_device().set_block_size(self.block_size);
        Ok(opened)
    }
}

/// Turn a device reported failure into an error, fetching sense data first.
pub fn ensure_success(
    dev: &mut BlockDevice<DeviceHandle<GlobalContext>>,
    what: &str,
    completion: Completion,
) -> Result<Completion> {
    match completion.outcome {
        Outcome::Success => Ok(completion),
        Outcome::CommandFailed => match dev.request_sense()? {
            (_, Some(sense)) => bail!(
                "{what} failed: sense key {:?}, asc {:#04x}, ascq {:#04x}",
                sense.sense_key,
                sense.asc,
                sense.ascq
            ),
            (_, None) => bail!("{what} failed and the device returned no sense data"),
        },
        Outcome::DeviceMisunderstoodCommand(status) => {
            bail!("{what} was not understood by the device (status {status:#04x})")
        }
    }
}
