use clap::{Parser, Subcommand};
use env_logger::Env;

use crate::commands::{DeviceArgs, read::read, sense::sense, write::write};

mod commands;
mod progress_bar;

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Opts {
    /// Verbose
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(flatten)]
    device: DeviceArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write blocks, from a file or filled with a single byte
    Write {
        /// First logical block address
        #[clap(long, default_value = "0", value_parser = num_parser)]
        lba: u32,

        /// Number of blocks to fill when no input file is given
        #[clap(short, long, default_value_t = 1)]
        count: u16,

        /// Byte to fill the blocks with when no input file is given
        #[clap(long, default_value = "0x58", value_parser = byte_parser)]
        fill: u8,

        /// Input file, padded with zeros to a whole number of blocks
        input: Option<String>,
    },
    /// Read blocks and hex dump them, or save them to a file
    Read {
        /// First logical block address
        #[clap(long, default_value = "0", value_parser = num_parser)]
        lba: u32,

        /// Number of blocks to read
        #[clap(short, long, default_value_t = 1)]
        count: u16,

        /// Output file
        #[clap(short, long)]
        output: Option<String>,
    },
    /// Issue REQUEST SENSE and print the sense key
    Sense,
}

// allow user to pass hex formatted numbers
pub(crate) fn num_parser(s: &str) -> Result<u32, &'static str> {
    match s.get(0..2) {
        Some("0x") => u32::from_str_radix(&s[2..], 16).map_err(|_| "invalid hex number"),
        Some("0b") => u32::from_str_radix(&s[2..], 2).map_err(|_| "invalid binary number"),
        _ => s.parse::<u32>().map_err(|_| "invalid decimal number"),
    }
}

pub(crate) fn id_parser(s: &str) -> Result<u16, &'static str> {
    u16::try_from(num_parser(s)?).map_err(|_| "id does not fit in 16 bits")
}

fn byte_parser(s: &str) -> Result<u8, &'static str> {
    u8::try_from(num_parser(s)?).map_err(|_| "value does not fit in a byte")
}

fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();

    let filter = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter)).init();

    match opts.command {
        Command::Write {
            lba,
            count,
            fill,
            input,
        } => write(&opts.device, lba, count, fill, input),
        Command::Read { lba, count, output } => read(&opts.device, lba, count, output),
        Command::Sense => sense(&opts.device),
    }
}
