use anyhow::{Result, bail};

use crate::commands::DeviceArgs;

pub fn sense(device: &DeviceArgs) -> Result<()> {
    let mut usb = device.open()?;
    let (completion, sense) = usb.block_device().request_sense()?;

    if !completion.is_success() {
        bail!("REQUEST SENSE completed with {:?}", completion.outcome);
    }

    match sense {
        Some(sense) => println!(
            "sense key: {:?}\nasc: {:#04x}\nascq: {:#04x}\nresponse code: {:#04x}",
            sense.sense_key, sense.asc, sense.ascq, sense.response_code
        ),
        None => println!("device returned {} bytes of sense data", completion.transferred),
    }

    Ok(())
}
