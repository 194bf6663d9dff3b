use std::fs;

use anyhow::{Result, bail};

use crate::commands::{BLOCKS_PER_COMMAND, DeviceArgs, ensure_success};

pub fn read(device: &DeviceArgs, lba: u32, count: u16, output: Option<String>) -> Result<()> {
    if device.block_size == 0 {
        bail!("Block size must not be zero");
    }

    let mut usb = device.open()?;
    let dev = usb.block_device();

    log::info!("Reading {count} block(s) starting at block {lba}");

    let mut data = Vec::with_capacity(count as usize * device.block_size as usize);
    let mut next_lba = lba;
    let mut remaining = count;
    while remaining > 0 {
        let blocks = remaining.min(BLOCKS_PER_COMMAND);
        let (completion, chunk) = dev.read_blocks_to_vec(next_lba, blocks)?;
        let completion = ensure_success(dev, "READ(10)", completion)?;

        let expected = blocks as usize * device.block_size as usize;
        data.extend_from_slice(&chunk);
        if completion.transferred < expected {
            log::warn!(
                "Device returned {} of {expected} bytes for block {next_lba}, stopping",
                completion.transferred
            );
            break;
        }

        remaining -= blocks;
        next_lba = next_lba.wrapping_add(blocks as u32);
    }

    match output {
        Some(output) => {
            fs::write(&output, &data)?;
            log::info!("Saved {} bytes to {output:?}", data.len());
        }
        None => print!("{}", hex_dump(&data)),
    }

    Ok(())
}

fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        out.push_str(&format!("{:08x}: ", i * 16));
        for byte in line {
            out.push_str(&format!("{byte:02x} "));
        }
        for _ in line.len()..16 {
            out.push_str("   ");
        }
        out.push(' ');
        out.extend(line.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('\n');
    }
    out
}
