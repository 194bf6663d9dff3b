use std::error::Error;

use usbh_bot::{Outcome, storage::UsbMassStorage};

// LUFA's vendor id, used by its mass storage demo firmware.
const VENDOR_ID: u16 = 0x03eb;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let closed = match UsbMassStorage::find(VENDOR_ID, None) {
        Ok(closed) => closed,
        Err(err) => {
            eprintln!("{err}");
            return Ok(());
        }
    };

    let mut usb = closed.open()?;
    let dev = usb.block_device();

    // --- Write block 0 ---
    let payload = [b'X'; 512];
    let written = dev.write_blocks(0, 1, &payload)?;
    log::info!("write: {:?}", written);

    if written.outcome == Outcome::CommandFailed {
        let (_, sense) = dev.request_sense()?;
        log::warn!("device rejected the write: {sense:?}");
        return Ok(());
    }

    // --- Read it back ---
    let (read, data) = dev.read_blocks_to_vec(0, 1)?;
    log::info!("read: {:?}", read);

    println!("\nFirst {} bytes from device:", data.len());
    for (i, byte) in data.iter().enumerate() {
        if i % 16 == 0 {
            print!("\n{:04x}: ", i);
        }
        print!("{:02x} ", byte);
    }
    println!();

    if data == payload {
        println!("round trip ok");
    } else {
        println!("read back differs from what was written");
    }

    Ok(())
}
