//! siobridge-sim - Drive a bridge session against emulated hardware
//!
//! Spins up the bridge core with the dummy I2C/SPI/GPIO controllers and
//! plays host: requests entered on the command line are framed, queued
//! through the emulated transport and the responses printed. Useful for
//! poking at the protocol without a device attached.

use clap::{Parser, Subcommand};
use siobridge_core::bridge::{Bridge, BridgeIo};
use siobridge_core::protocol::{opcode, ResponseCode, TransferOptions, RESPONSE_HEADER_SIZE};
use siobridge_dummy::{build_request, pump, DummyGpio, DummyI2c, DummyLink, DummySpi};

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

fn parse_hex_u8(s: &str) -> Result<u8, String> {
    parse_hex_u32(s).and_then(|v| u8::try_from(v).map_err(|_| format!("Value too large: {}", v)))
}

#[derive(Parser)]
#[command(name = "siobridge-sim")]
#[command(author, version, about = "Serial I/O bridge simulator", long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query port counts and firmware version
    Info,
    /// Write bytes into the emulated EEPROM
    Write {
        /// 7-bit slave address
        #[arg(long, value_parser = parse_hex_u8, default_value = "0x50")]
        addr: u8,
        /// Word address to write at
        #[arg(long, value_parser = parse_hex_u8, default_value = "0")]
        offset: u8,
        /// Data bytes
        #[arg(value_parser = parse_hex_u8, required = true)]
        data: Vec<u8>,
    },
    /// Read bytes back from the emulated EEPROM
    Read {
        /// 7-bit slave address
        #[arg(long, value_parser = parse_hex_u8, default_value = "0x50")]
        addr: u8,
        /// Word address to read from
        #[arg(long, value_parser = parse_hex_u8, default_value = "0")]
        offset: u8,
        /// Number of bytes to read
        #[arg(long, default_value = "16")]
        len: u16,
    },
    /// Clock bytes through the emulated SPI shift register
    Spi {
        /// Data bytes
        #[arg(value_parser = parse_hex_u8, required = true)]
        data: Vec<u8>,
    },
}

/// One simulated host session: a bridge wired to the dummy hardware
struct Session {
    bridge: Bridge,
    link: DummyLink,
    i2c: [DummyI2c; 1],
    spi: [DummySpi; 1],
    gpio: [DummyGpio; 1],
    next_id: u8,
}

impl Session {
    fn new() -> Self {
        Self {
            bridge: Bridge::new(),
            link: DummyLink::new(),
            i2c: [DummyI2c::default()],
            spi: [DummySpi::default()],
            gpio: [DummyGpio::default()],
            next_id: 1,
        }
    }

    /// Frame a request, run the bridge until idle and return the response
    fn run(&mut self, op: u16, payload: &[u8]) -> Result<Vec<u8>, String> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.link.queue_request(build_request(id, 0, op, payload));
        let mut io = BridgeIo {
            i2c: &mut self.i2c,
            spi: &mut self.spi,
            gpio: &mut self.gpio,
        };
        pump(&self.bridge, &mut self.link, &mut io);
        let resp = self
            .link
            .sent
            .pop()
            .ok_or_else(|| "bridge produced no response".to_string())?;
        match ResponseCode::from_raw(resp[4]) {
            ResponseCode::Ok => Ok(resp),
            code => Err(format!("request 0x{:04x} failed: {:?}", op, code)),
        }
    }
}

fn hex_dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn rw_payload(addr: u8, options: TransferOptions, length: u16, data: &[u8]) -> Vec<u8> {
    let mut payload = vec![addr, 0x00];
    payload.extend_from_slice(&options.bits().to_le_bytes());
    payload.extend_from_slice(&length.to_le_bytes());
    payload.extend_from_slice(data);
    payload
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.verbose {
        0 => {}
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let mut session = Session::new();
    let start_stop = TransferOptions::EMIT_START | TransferOptions::EMIT_STOP;

    match cli.command {
        Commands::Info => {
            let resp = session.run(opcode::BRIDGE_GET_INFO, &[])?;
            let data = &resp[RESPONSE_HEADER_SIZE..];
            let mut version = [0u8; 4];
            version.copy_from_slice(&data[4..8]);
            let version = u32::from_le_bytes(version);
            println!("i2c ports:  {}", data[0]);
            println!("spi ports:  {}", data[1]);
            println!("gpio ports: {}", data[2]);
            println!("version:    {}.{}", version >> 16, version & 0xFFFF);
            println!("firmware:   {}", String::from_utf8_lossy(&data[8..]));
        }
        Commands::Write { addr, offset, data } => {
            session.run(opcode::I2C_INIT_PORT, &400_000u32.to_le_bytes())?;
            let mut bytes = vec![offset];
            bytes.extend_from_slice(&data);
            session.run(
                opcode::I2C_DEVICE_WRITE,
                &rw_payload(addr, start_stop, bytes.len() as u16, &bytes),
            )?;
            log::info!("wrote {} bytes at 0x{:02x}", data.len(), offset);
            println!("{}", hex_dump(&session.i2c[0].memory[offset as usize..][..data.len()]));
        }
        Commands::Read { addr, offset, len } => {
            session.run(opcode::I2C_INIT_PORT, &400_000u32.to_le_bytes())?;
            // Load the word address, then clock the data out.
            session.run(
                opcode::I2C_DEVICE_WRITE,
                &rw_payload(addr, start_stop, 1, &[offset]),
            )?;
            let resp = session.run(
                opcode::I2C_DEVICE_READ,
                &rw_payload(addr, start_stop | TransferOptions::NACK_LAST_BYTE, len, &[]),
            )?;
            println!("{}", hex_dump(&resp[RESPONSE_HEADER_SIZE..]));
        }
        Commands::Spi { data } => {
            let mut init = Vec::new();
            init.extend_from_slice(&1_000_000u32.to_le_bytes());
            init.push(0);
            session.run(opcode::SPI_INIT_PORT, &init)?;
            let mut payload = Vec::new();
            payload.extend_from_slice(&(data.len() as u16).to_le_bytes());
            payload.extend_from_slice(&data);
            let resp = session.run(opcode::SPI_XFER, &payload)?;
            println!("{}", hex_dump(&resp[RESPONSE_HEADER_SIZE..]));
        }
    }
    Ok(())
}
