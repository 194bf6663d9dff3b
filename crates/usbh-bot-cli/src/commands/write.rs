use std::fs;

use anyhow::{Result, bail};

use crate::{
    commands::{BLOCKS_PER_COMMAND, DeviceArgs, ensure_success},
    progress_bar::ProgressBarReporter,
};

pub fn write(
    device: &DeviceArgs,
    lba: u32,
    count: u16,
    fill: u8,
    input: Option<String>,
) -> Result<()> {
    let block_size = device.block_size as usize;
    if block_size == 0 {
        bail!("Block size must not be zero");
    }

    let payload = match input {
        Some(input) => {
            log::info!("Reading {input:?}");
            let mut data = fs::read(&input)?;
            if data.is_empty() {
                bail!("{input:?} is empty, nothing to write");
            }
            // Pad the tail to a whole block
            let padded = data.len().div_ceil(block_size) * block_size;
            data.resize(padded, 0);
            data
        }
        None => vec![fill; block_size * count as usize],
    };

    let total_blocks = payload.len() / block_size;
    if lba as u64 + total_blocks as u64 > u32::MAX as u64 + 1 {
        bail!("{total_blocks} blocks starting at {lba} run past the last addressable block");
    }

    let mut usb = device.open()?;
    let dev = usb.block_device();

    log::info!("Writing {total_blocks} block(s) starting at block {lba}");
    let mut progress = ProgressBarReporter::new(payload.len());

    let chunk_len = BLOCKS_PER_COMMAND as usize * block_size;
    let mut next_lba = lba;
    for chunk in payload.chunks(chunk_len) {
        let blocks = (chunk.len() / block_size) as u16;
        let completion = dev.write_blocks(next_lba, blocks, chunk)?;
        ensure_success(dev, "WRITE(10)", completion)?;

        progress.advance(chunk.len());
        next_lba = next_lba.wrapping_add(blocks as u32);
    }
    progress.finish();

    log::info!("Wrote {} bytes", payload.len());
    Ok(())
}
