//! Wire protocol: packet framing, opcodes, response codes and bus status
//!
//! Every exchange with the host uses fixed 64-byte packets. Requests carry
//! a 5-byte header (`len`, `transaction_id`, `session_id`, `opcode`)
//! followed by an opcode-specific payload; responses carry a 5-byte header
//! (`len`, `transaction_id`, `session_id`, `code`) followed by data. All
//! multi-byte fields are little-endian.
//!
//! Opcodes are grouped into four disjoint u16 family ranges (I2C master,
//! SPI master, GPIO, bridge metadata). Rather than dispatching on raw
//! numeric ranges, requests decode into the [`Command`] enum so handler
//! routing is an exhaustive match.

use crate::error::{Error, Result};
use bitflags::bitflags;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Fixed transport packet size in bytes
pub const PACKET_SIZE: usize = 64;

/// Request header size: len(1) + transaction_id(1) + session_id(1) + opcode(2)
pub const REQUEST_HEADER_SIZE: usize = 5;

/// Response header size: len(2) + transaction_id(1) + session_id(1) + code(1)
pub const RESPONSE_HEADER_SIZE: usize = 5;

/// Maximum request payload / response data per packet
pub const MAX_PAYLOAD: usize = PACKET_SIZE - REQUEST_HEADER_SIZE;

/// Request opcodes, grouped into family ranges
pub mod opcode {
    /// Initialize an I2C port (payload: [`super::PortConfig`])
    pub const I2C_INIT_PORT: u16 = 0x0000;
    /// Deinitialize an I2C port
    pub const I2C_DEINIT_PORT: u16 = 0x0001;
    /// Byte-level write transaction (payload: [`super::RwParams`] + data)
    pub const I2C_DEVICE_WRITE: u16 = 0x0002;
    /// Byte-level read transaction (payload: [`super::RwParams`])
    pub const I2C_DEVICE_READ: u16 = 0x0003;
    /// Composite write-then-read transfer (payload: [`super::XferParams`] + data)
    pub const I2C_DEVICE_XFER: u16 = 0x0004;
    /// Abort the in-flight transaction and recover the bus
    pub const I2C_RESET: u16 = 0x0005;
    /// Exclusive upper bound of the I2C family
    pub const I2C_FAMILY_END: u16 = 0x0100;

    /// Initialize an SPI port (payload: [`super::SpiPortConfig`])
    pub const SPI_INIT_PORT: u16 = 0x0100;
    /// Deinitialize an SPI port
    pub const SPI_DEINIT_PORT: u16 = 0x0101;
    /// Full-duplex SPI transfer (payload: length:u16 + tx data)
    pub const SPI_XFER: u16 = 0x0102;
    /// Exclusive upper bound of the SPI family
    pub const SPI_FAMILY_END: u16 = 0x0200;

    /// Drive port pins high/low by mask (payload: [`super::GpioMasks`])
    pub const GPIO_SET_PORT_VALUE: u16 = 0x0200;
    /// Update the port direction register by mask (payload: [`super::GpioMasks`])
    pub const GPIO_SET_PORT_DIR: u16 = 0x0201;
    /// Configure one pin as output and toggle it (payload: pin:u8)
    pub const GPIO_TOGGLE_PIN: u16 = 0x0202;
    /// Exclusive upper bound of the GPIO family
    pub const GPIO_FAMILY_END: u16 = 0x0300;

    /// Query port counts, firmware version and capabilities
    pub const BRIDGE_GET_INFO: u16 = 0x0300;
}

/// Terminal outcome of a request, reported in the response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseCode {
    /// Request completed successfully
    Ok = 0x00,
    /// Addressed slave rejected the transaction
    SlaveNak = 0x01,
    /// Lost bus arbitration to another master
    ArbitrationLost = 0x02,
    /// Undefined electrical/protocol state on the bus
    BusError = 0x03,
    /// Reset-triggered abort or unclassified controller status
    GenericError = 0x04,
    /// Opcode or session not recognized / not bound. Also the initial
    /// sentinel value of every response template; handlers set the final
    /// code exactly once.
    InvalidCommand = 0xFF,
}

impl Default for ResponseCode {
    fn default() -> Self {
        Self::InvalidCommand
    }
}

impl ResponseCode {
    /// Decode a raw response code byte
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::Ok,
            0x01 => Self::SlaveNak,
            0x02 => Self::ArbitrationLost,
            0x03 => Self::BusError,
            0xFF => Self::InvalidCommand,
            _ => Self::GenericError,
        }
    }
}

bitflags! {
    /// Per-transaction option bits for byte-level I2C transactions
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransferOptions: u16 {
        /// Issue a start condition before the transaction
        const EMIT_START     = 1 << 0;
        /// Issue a stop condition after the transaction
        const EMIT_STOP      = 1 << 1;
        /// Suppress the address byte after a (repeated) start; the slave
        /// is assumed to be already addressed
        const NO_ADDRESS     = 1 << 2;
        /// NAK the final byte of a read so the slave releases the bus
        const NACK_LAST_BYTE = 1 << 3;
        /// Abort a write as soon as the slave NAKs a data byte
        const BREAK_ON_NACK  = 1 << 4;
    }
}

/// Bus status code reported by the I2C controller after each clocked phase
///
/// The raw values are the protocol-defined status byte of the controller
/// hardware; `from_raw` preserves unrecognized values in `Unknown` so the
/// state machine can classify them as generic errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusStatus {
    /// Undefined bus state
    BusError,
    /// Start condition has been transmitted
    Start,
    /// Repeated start condition has been transmitted
    RepeatedStart,
    /// SLA+W transmitted, ACK received
    AddrWriteAck,
    /// SLA+W transmitted, NAK received
    AddrWriteNak,
    /// Data byte transmitted, ACK received
    DataWriteAck,
    /// Data byte transmitted, NAK received
    DataWriteNak,
    /// Arbitration lost to another master
    ArbitrationLost,
    /// SLA+R transmitted, ACK received
    AddrReadAck,
    /// SLA+R transmitted, NAK received
    AddrReadNak,
    /// Data byte received, ACK returned
    DataReadAck,
    /// Data byte received, NAK returned
    DataReadNak,
    /// Any status code the state machine does not model
    Unknown(u8),
}

impl BusStatus {
    /// Decode the controller's raw status byte
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0x00 => Self::BusError,
            0x08 => Self::Start,
            0x10 => Self::RepeatedStart,
            0x18 => Self::AddrWriteAck,
            0x20 => Self::AddrWriteNak,
            0x28 => Self::DataWriteAck,
            0x30 => Self::DataWriteNak,
            0x38 => Self::ArbitrationLost,
            0x40 => Self::AddrReadAck,
            0x48 => Self::AddrReadNak,
            0x50 => Self::DataReadAck,
            0x58 => Self::DataReadNak,
            other => Self::Unknown(other),
        }
    }

    /// The raw status byte this variant was decoded from
    pub fn raw(&self) -> u8 {
        match self {
            Self::BusError => 0x00,
            Self::Start => 0x08,
            Self::RepeatedStart => 0x10,
            Self::AddrWriteAck => 0x18,
            Self::AddrWriteNak => 0x20,
            Self::DataWriteAck => 0x28,
            Self::DataWriteNak => 0x30,
            Self::ArbitrationLost => 0x38,
            Self::AddrReadAck => 0x40,
            Self::AddrReadNak => 0x48,
            Self::DataReadAck => 0x50,
            Self::DataReadNak => 0x58,
            Self::Unknown(raw) => *raw,
        }
    }
}

/// One fixed-size packet slot
///
/// Owned by the queue slot it occupies and overwritten in place on reuse;
/// `Copy` so dequeueing moves the bytes out of the ring.
#[derive(Debug, Clone, Copy)]
pub struct Packet(pub [u8; PACKET_SIZE]);

impl Packet {
    /// An all-zero packet
    pub const fn zeroed() -> Self {
        Self([0; PACKET_SIZE])
    }

    /// Copy `data` into a fresh packet. Fails if `data` exceeds the
    /// transport packet size; shorter buffers are zero-padded.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > PACKET_SIZE {
            return Err(Error::PacketTooLarge);
        }
        let mut pkt = Self::zeroed();
        pkt.0[..data.len()].copy_from_slice(data);
        Ok(pkt)
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Raw request header as it appears on the wire
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct RequestHeader {
    /// Total bytes used in the packet (transport framing)
    pub len: u8,
    /// Host-chosen id echoed in the response
    pub transaction_id: u8,
    /// Logical controller instance this request addresses
    pub session_id: u8,
    /// Request opcode
    pub opcode: U16,
}

/// I2C port configuration payload
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct PortConfig {
    /// Bus clock rate in Hz
    pub bus_speed: U32,
}

/// Parameter block of byte-level read/write transactions
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct RwParams {
    /// 7-bit slave address
    pub slave_addr: u8,
    /// Reserved, must be zero
    pub reserved: u8,
    /// [`TransferOptions`] bits
    pub options: U16,
    /// Bytes to write (write) or read (read)
    pub length: U16,
}

/// Parameter block of the composite write-then-read transfer
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct XferParams {
    /// 7-bit slave address
    pub slave_addr: u8,
    /// Reserved, must be zero
    pub reserved: u8,
    /// [`TransferOptions`] bits
    pub options: U16,
    /// Bytes to transmit
    pub tx_len: U16,
    /// Bytes to receive
    pub rx_len: U16,
}

/// SPI port configuration payload
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SpiPortConfig {
    /// SPI clock rate in Hz
    pub clock_hz: U32,
    /// SPI mode 0-3 (CPOL/CPHA)
    pub mode: u8,
}

/// SPI transfer header preceding the tx data
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SpiXferParams {
    /// Bytes to clock in each direction
    pub length: U16,
}

/// Set/clear mask pair used by the GPIO port operations
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct GpioMasks {
    /// Bits to set
    pub set: U32,
    /// Bits to clear (clear wins on overlap)
    pub clear: U32,
}

/// A parsed view over a received request packet
pub struct Request<'a> {
    header: &'a RequestHeader,
    payload: &'a [u8],
}

impl<'a> Request<'a> {
    /// Parse the fixed header and bound the payload by the framing length
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        let (header, rest) =
            RequestHeader::ref_from_prefix(buf).map_err(|_| Error::MalformedPacket)?;
        let len = header.len as usize;
        if len < REQUEST_HEADER_SIZE {
            return Err(Error::MalformedPacket);
        }
        let payload_len = (len - REQUEST_HEADER_SIZE).min(rest.len());
        Ok(Self {
            header,
            payload: &rest[..payload_len],
        })
    }

    /// Request opcode
    pub fn opcode(&self) -> u16 {
        self.header.opcode.get()
    }

    /// Host transaction id
    pub fn transaction_id(&self) -> u8 {
        self.header.transaction_id
    }

    /// Session id (controller binding index)
    pub fn session_id(&self) -> u8 {
        self.header.session_id
    }

    /// Opcode-specific payload, bounded by the framing length
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

/// Decoded parameters of a byte-level read/write transaction
pub struct RwRequest<'a> {
    /// 7-bit slave address
    pub slave_addr: u8,
    /// Transaction options
    pub options: TransferOptions,
    /// Bytes to transfer
    pub length: u16,
    /// Write data (empty for reads)
    pub data: &'a [u8],
}

/// Decoded parameters of the composite transfer
pub struct XferRequest<'a> {
    /// 7-bit slave address
    pub slave_addr: u8,
    /// Transaction options
    pub options: TransferOptions,
    /// Bytes to receive after the write phase
    pub rx_len: u16,
    /// Write data
    pub data: &'a [u8],
}

/// I2C master family operations
pub enum I2cCommand<'a> {
    /// Initialize the port at the given bus speed
    InitPort {
        /// Bus clock rate in Hz
        bus_speed: u32,
    },
    /// Deinitialize the port
    DeinitPort,
    /// Byte-level write transaction
    DeviceWrite(RwRequest<'a>),
    /// Byte-level read transaction
    DeviceRead(RwRequest<'a>),
    /// Composite write-then-read transfer
    DeviceXfer(XferRequest<'a>),
    /// Bus recovery after an aborted transaction
    Reset,
}

/// SPI master family operations
pub enum SpiCommand<'a> {
    /// Initialize the port
    InitPort {
        /// Clock rate and mode
        config: SpiPortConfig,
    },
    /// Deinitialize the port
    DeinitPort,
    /// Full-duplex transfer; the response echoes as many bytes as were sent
    Xfer {
        /// Bytes to clock out (read data has the same length)
        data: &'a [u8],
    },
}

/// GPIO family operations
pub enum GpioCommand {
    /// Drive pins high (set mask) then low (clear mask)
    SetPortValue {
        /// Pins to drive high
        set: u32,
        /// Pins to drive low (wins on overlap)
        clear: u32,
    },
    /// Read-modify-write the direction register
    SetPortDir {
        /// Pins to make outputs
        set: u32,
        /// Pins to make inputs (wins on overlap)
        clear: u32,
    },
    /// Configure a pin as output and toggle it
    TogglePin {
        /// Pin index within the port
        pin: u8,
    },
}

/// Bridge metadata family operations
pub enum BridgeCommand {
    /// Query port counts, firmware version and capability flags
    GetInfo,
}

/// A request decoded into its opcode family
pub enum Command<'a> {
    /// I2C master family
    I2c(I2cCommand<'a>),
    /// SPI master family
    Spi(SpiCommand<'a>),
    /// GPIO family
    Gpio(GpioCommand),
    /// Bridge metadata family
    Bridge(BridgeCommand),
}

impl<'a> Command<'a> {
    /// Decode a parsed request into a family command
    ///
    /// Fails with [`Error::UnknownOpcode`] for opcodes outside every family
    /// and [`Error::MalformedPacket`] when the payload is too short for the
    /// opcode's parameter block; the dispatcher maps both onto an
    /// `InvalidCommand` response.
    pub fn decode(req: &Request<'a>) -> Result<Self> {
        let payload = req.payload();
        match req.opcode() {
            opcode::I2C_INIT_PORT => {
                let (cfg, _) =
                    PortConfig::ref_from_prefix(payload).map_err(|_| Error::MalformedPacket)?;
                Ok(Self::I2c(I2cCommand::InitPort {
                    bus_speed: cfg.bus_speed.get(),
                }))
            }
            opcode::I2C_DEINIT_PORT => Ok(Self::I2c(I2cCommand::DeinitPort)),
            opcode::I2C_DEVICE_WRITE => {
                let rw = decode_rw(payload, true)?;
                Ok(Self::I2c(I2cCommand::DeviceWrite(rw)))
            }
            opcode::I2C_DEVICE_READ => {
                let rw = decode_rw(payload, false)?;
                Ok(Self::I2c(I2cCommand::DeviceRead(rw)))
            }
            opcode::I2C_DEVICE_XFER => {
                let (params, rest) =
                    XferParams::ref_from_prefix(payload).map_err(|_| Error::MalformedPacket)?;
                let tx_len = params.tx_len.get() as usize;
                if tx_len > rest.len() || params.rx_len.get() as usize > MAX_PAYLOAD {
                    return Err(Error::MalformedPacket);
                }
                Ok(Self::I2c(I2cCommand::DeviceXfer(XferRequest {
                    slave_addr: params.slave_addr,
                    options: TransferOptions::from_bits_truncate(params.options.get()),
                    rx_len: params.rx_len.get(),
                    data: &rest[..tx_len],
                })))
            }
            opcode::I2C_RESET => Ok(Self::I2c(I2cCommand::Reset)),

            opcode::SPI_INIT_PORT => {
                let (cfg, _) =
                    SpiPortConfig::ref_from_prefix(payload).map_err(|_| Error::MalformedPacket)?;
                Ok(Self::Spi(SpiCommand::InitPort {
                    config: SpiPortConfig {
                        clock_hz: cfg.clock_hz,
                        mode: cfg.mode,
                    },
                }))
            }
            opcode::SPI_DEINIT_PORT => Ok(Self::Spi(SpiCommand::DeinitPort)),
            opcode::SPI_XFER => {
                let (params, rest) =
                    SpiXferParams::ref_from_prefix(payload).map_err(|_| Error::MalformedPacket)?;
                let len = params.length.get() as usize;
                if len > rest.len() {
                    return Err(Error::MalformedPacket);
                }
                Ok(Self::Spi(SpiCommand::Xfer {
                    data: &rest[..len],
                }))
            }

            opcode::GPIO_SET_PORT_VALUE | opcode::GPIO_SET_PORT_DIR => {
                let (masks, _) =
                    GpioMasks::ref_from_prefix(payload).map_err(|_| Error::MalformedPacket)?;
                let cmd = if req.opcode() == opcode::GPIO_SET_PORT_VALUE {
                    GpioCommand::SetPortValue {
                        set: masks.set.get(),
                        clear: masks.clear.get(),
                    }
                } else {
                    GpioCommand::SetPortDir {
                        set: masks.set.get(),
                        clear: masks.clear.get(),
                    }
                };
                Ok(Self::Gpio(cmd))
            }
            opcode::GPIO_TOGGLE_PIN => {
                let pin = *payload.first().ok_or(Error::MalformedPacket)?;
                Ok(Self::Gpio(GpioCommand::TogglePin { pin }))
            }

            opcode::BRIDGE_GET_INFO => Ok(Self::Bridge(BridgeCommand::GetInfo)),

            _ => Err(Error::UnknownOpcode),
        }
    }
}

fn decode_rw(payload: &[u8], write: bool) -> Result<RwRequest<'_>> {
    let (params, rest) = RwParams::ref_from_prefix(payload).map_err(|_| Error::MalformedPacket)?;
    let length = params.length.get();
    let data = if write {
        if length as usize > rest.len() {
            return Err(Error::MalformedPacket);
        }
        &rest[..length as usize]
    } else {
        // A read longer than the response data region could never finish.
        if length as usize > MAX_PAYLOAD {
            return Err(Error::MalformedPacket);
        }
        &rest[..0]
    };
    Ok(RwRequest {
        slave_addr: params.slave_addr,
        options: TransferOptions::from_bits_truncate(params.options.get()),
        length,
        data,
    })
}

/// A response packet under construction
///
/// The template starts with `len` at the header size and the sentinel
/// [`ResponseCode::InvalidCommand`]; handlers append data and set the final
/// code exactly once before the response is published.
pub struct Response {
    buf: [u8; PACKET_SIZE],
}

// Response header byte offsets
const RESP_LEN: usize = 0;
const RESP_TRANSACTION_ID: usize = 2;
const RESP_SESSION_ID: usize = 3;
const RESP_CODE: usize = 4;

impl Response {
    /// Build the response template for a request: ids copied, length at
    /// header size, code at the sentinel value
    pub fn template(transaction_id: u8, session_id: u8) -> Self {
        let mut resp = Self {
            buf: [0; PACKET_SIZE],
        };
        resp.set_len(RESPONSE_HEADER_SIZE as u16);
        resp.buf[RESP_TRANSACTION_ID] = transaction_id;
        resp.buf[RESP_SESSION_ID] = session_id;
        resp.buf[RESP_CODE] = ResponseCode::InvalidCommand as u8;
        resp
    }

    /// Bytes used so far, header included
    pub fn len(&self) -> u16 {
        u16::from_le_bytes([self.buf[RESP_LEN], self.buf[RESP_LEN + 1]])
    }

    /// True when no data has been appended yet
    pub fn is_empty(&self) -> bool {
        self.len() as usize == RESPONSE_HEADER_SIZE
    }

    fn set_len(&mut self, len: u16) {
        self.buf[RESP_LEN..RESP_LEN + 2].copy_from_slice(&len.to_le_bytes());
    }

    /// Current response code
    pub fn code(&self) -> ResponseCode {
        ResponseCode::from_raw(self.buf[RESP_CODE])
    }

    /// Set the terminal response code. Must be called at most once per
    /// response; the sentinel is never a valid terminal code.
    pub fn set_code(&mut self, code: ResponseCode) {
        debug_assert_eq!(self.code(), ResponseCode::InvalidCommand);
        self.buf[RESP_CODE] = code as u8;
    }

    /// Append one data byte. Fails (returns false) when the packet is full.
    pub fn append(&mut self, byte: u8) -> bool {
        let len = self.len() as usize;
        if len >= PACKET_SIZE {
            return false;
        }
        self.buf[len] = byte;
        self.set_len(len as u16 + 1);
        true
    }

    /// Append a slice of data bytes. Fails without mutation if it does not fit.
    pub fn append_slice(&mut self, data: &[u8]) -> bool {
        let len = self.len() as usize;
        if len + data.len() > PACKET_SIZE {
            return false;
        }
        self.buf[len..len + data.len()].copy_from_slice(data);
        self.set_len((len + data.len()) as u16);
        true
    }

    /// Grow the length counter without writing data
    ///
    /// Write transactions use the length field as a running count of bytes
    /// clocked out to the slave; the data region stays untouched.
    pub fn add_len(&mut self, n: u16) {
        let len = self.len().saturating_add(n).min(PACKET_SIZE as u16);
        self.set_len(len);
    }

    /// Data appended so far (excluding the header)
    pub fn data(&self) -> &[u8] {
        &self.buf[RESPONSE_HEADER_SIZE..self.len() as usize]
    }

    /// The bytes to hand to the transport
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len() as usize]
    }

    /// Consume the builder into a packet slot
    pub fn into_packet(self) -> Packet {
        Packet(self.buf)
    }

    /// Number of bytes a published response packet occupies on the wire
    pub fn wire_len(packet: &Packet) -> usize {
        let len = u16::from_le_bytes([packet.0[RESP_LEN], packet.0[RESP_LEN + 1]]) as usize;
        len.clamp(RESPONSE_HEADER_SIZE, PACKET_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::build_request;
    use std::vec;

    #[test]
    fn parse_request_header() {
        let buf = build_request(7, 1, opcode::I2C_DEINIT_PORT, &[0xAA, 0xBB]);
        let req = Request::parse(&buf).unwrap();
        assert_eq!(req.transaction_id(), 7);
        assert_eq!(req.session_id(), 1);
        assert_eq!(req.opcode(), opcode::I2C_DEINIT_PORT);
        assert_eq!(req.payload(), &[0xAA, 0xBB]);
    }

    #[test]
    fn parse_rejects_short_framing() {
        let mut buf = build_request(0, 0, opcode::I2C_DEINIT_PORT, &[]);
        buf[0] = 2; // framing length below the header size
        assert!(matches!(Request::parse(&buf), Err(Error::MalformedPacket)));
    }

    #[test]
    fn payload_bounded_by_framing_length() {
        let mut buf = build_request(0, 0, opcode::I2C_DEVICE_WRITE, &[1, 2, 3, 4, 5, 6, 7, 8]);
        buf[0] = REQUEST_HEADER_SIZE as u8 + 3;
        let req = Request::parse(&buf).unwrap();
        assert_eq!(req.payload().len(), 3);
    }

    #[test]
    fn decode_unknown_opcode() {
        let buf = build_request(0, 0, 0x0400, &[]);
        let req = Request::parse(&buf).unwrap();
        assert!(matches!(Command::decode(&req), Err(Error::UnknownOpcode)));
    }

    #[test]
    fn decode_write_with_data() {
        let mut payload = vec![0x50, 0x00];
        payload.extend_from_slice(&(TransferOptions::EMIT_START | TransferOptions::EMIT_STOP).bits().to_le_bytes());
        payload.extend_from_slice(&3u16.to_le_bytes());
        payload.extend_from_slice(&[0x11, 0x22, 0x33]);
        let buf = build_request(1, 0, opcode::I2C_DEVICE_WRITE, &payload);
        let req = Request::parse(&buf).unwrap();
        match Command::decode(&req).unwrap() {
            Command::I2c(I2cCommand::DeviceWrite(rw)) => {
                assert_eq!(rw.slave_addr, 0x50);
                assert_eq!(rw.length, 3);
                assert_eq!(rw.data, &[0x11, 0x22, 0x33]);
                assert!(rw.options.contains(TransferOptions::EMIT_STOP));
            }
            _ => panic!("decoded into the wrong family"),
        }
    }

    #[test]
    fn decode_read_longer_than_data_region_is_malformed() {
        let mut payload = vec![0x50, 0x00];
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&(MAX_PAYLOAD as u16 + 1).to_le_bytes());
        let buf = build_request(1, 0, opcode::I2C_DEVICE_READ, &payload);
        let req = Request::parse(&buf).unwrap();
        assert!(matches!(Command::decode(&req), Err(Error::MalformedPacket)));
    }

    #[test]
    fn decode_write_truncated_data_is_malformed() {
        let mut payload = vec![0x50, 0x00];
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&8u16.to_le_bytes());
        payload.extend_from_slice(&[0x11, 0x22]); // 2 of 8 declared bytes
        let buf = build_request(1, 0, opcode::I2C_DEVICE_WRITE, &payload);
        let req = Request::parse(&buf).unwrap();
        assert!(matches!(Command::decode(&req), Err(Error::MalformedPacket)));
    }

    #[test]
    fn response_template_and_append() {
        let mut resp = Response::template(9, 2);
        assert_eq!(resp.len() as usize, RESPONSE_HEADER_SIZE);
        assert_eq!(resp.code(), ResponseCode::InvalidCommand);
        assert!(resp.append(0xAB));
        assert!(resp.append_slice(&[1, 2, 3]));
        resp.set_code(ResponseCode::Ok);
        assert_eq!(resp.data(), &[0xAB, 1, 2, 3]);
        assert_eq!(resp.as_bytes()[RESP_TRANSACTION_ID], 9);
        assert_eq!(resp.as_bytes()[RESP_SESSION_ID], 2);
        assert_eq!(resp.len() as usize, RESPONSE_HEADER_SIZE + 4);
    }

    #[test]
    fn response_append_respects_packet_size() {
        let mut resp = Response::template(0, 0);
        for i in 0..MAX_PAYLOAD {
            assert!(resp.append(i as u8));
        }
        assert!(!resp.append(0xFF));
        assert!(!resp.append_slice(&[0xFF]));
        assert_eq!(resp.len() as usize, PACKET_SIZE);
    }

    #[test]
    fn bus_status_round_trip() {
        for raw in [0x00u8, 0x08, 0x10, 0x18, 0x20, 0x28, 0x30, 0x38, 0x40, 0x48, 0x50, 0x58] {
            assert_eq!(BusStatus::from_raw(raw).raw(), raw);
        }
        assert_eq!(BusStatus::from_raw(0x60), BusStatus::Unknown(0x60));
    }
}
