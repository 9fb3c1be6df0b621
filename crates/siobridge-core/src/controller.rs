//! Collaborator traits at the bridge's hardware seams
//!
//! The bridge core consumes its environment only through these narrow
//! interfaces: a packet transport ([`HostLink`]), per-protocol bus
//! controllers ([`I2cController`], [`SpiController`]) and a digital I/O
//! port ([`GpioPort`]). Board bring-up, pin muxing and the transport's
//! enumeration machinery live behind them and never leak into the core.

use crate::protocol::{BusStatus, ResponseCode, TransferOptions};

/// The packet transport the bridge rides on
///
/// Implementations wrap an interrupt endpoint pair (or an emulation of
/// one). `arm_receive` hands the transport a buffer for the next inbound
/// packet; the transport later delivers it to
/// [`crate::bridge::Bridge::rx_complete`].
pub trait HostLink {
    /// Whether the host side of the transport is up
    fn is_connected(&self) -> bool;

    /// Start transmitting one response packet. Returns false when the
    /// transport could not accept it.
    fn send_response(&mut self, packet: &[u8]) -> bool;

    /// Allow the transport to receive the next request packet
    fn arm_receive(&mut self);
}

/// Byte-level I2C master controller primitives
///
/// Mirrors the register-level driver of a status-code style I2C block:
/// every bus phase latches a status code ([`BusStatus`]) and raises a
/// status-changed signal that the state machine polls. Methods never
/// block.
pub trait I2cController {
    /// Enable the controller
    fn init(&mut self);

    /// Disable the controller
    fn deinit(&mut self);

    /// Program the bus clock rate
    fn set_bus_speed(&mut self, hz: u32);

    /// Issue a start (or repeated start) condition
    fn send_start(&mut self);

    /// Issue a stop condition
    fn send_stop(&mut self);

    /// Issue a stop immediately followed by a start, used for bus recovery
    fn send_start_after_stop(&mut self);

    /// Clock one byte out
    fn write_byte(&mut self, byte: u8);

    /// Read the last byte clocked in
    fn read_byte(&mut self) -> u8;

    /// ACK the next received byte
    fn ack_next_byte(&mut self);

    /// NAK the next received byte (final byte of a read)
    fn nack_next_byte(&mut self);

    /// Acknowledge the status-changed signal so the bus advances
    fn clear_status(&mut self);

    /// Whether a new status code has latched since the last clear
    fn status_changed(&self) -> bool;

    /// The currently latched status code
    fn current_status(&self) -> BusStatus;

    /// Kick off a composite write-then-read transfer
    fn start_transfer(&mut self, xfer: &mut Transfer<'_>);

    /// Advance a composite transfer by one latched status
    ///
    /// Returns true when the transfer reached a terminal state; the
    /// terminal status left in [`Transfer::status`] is defined to map
    /// directly onto [`ResponseCode`].
    fn advance_transfer(&mut self, xfer: &mut Transfer<'_>) -> bool;
}

/// In-progress composite transfer owned by the controller driver
pub struct Transfer<'a> {
    /// 7-bit slave address
    pub slave_addr: u8,
    /// Transaction options
    pub options: TransferOptions,
    /// Bytes to transmit
    pub tx: &'a [u8],
    /// Receive buffer
    pub rx: &'a mut [u8],
    /// Bytes transmitted so far
    pub tx_pos: usize,
    /// Bytes received so far
    pub rx_pos: usize,
    /// Terminal status, response-code compatible; starts at the sentinel
    pub status: ResponseCode,
}

impl<'a> Transfer<'a> {
    /// Set up a transfer over the given buffers
    pub fn new(
        slave_addr: u8,
        options: TransferOptions,
        tx: &'a [u8],
        rx: &'a mut [u8],
    ) -> Self {
        Self {
            slave_addr,
            options,
            tx,
            rx,
            tx_pos: 0,
            rx_pos: 0,
            status: ResponseCode::InvalidCommand,
        }
    }

    /// The bytes actually received so far
    pub fn received(&self) -> &[u8] {
        &self.rx[..self.rx_pos]
    }
}

/// SPI port configuration decoded from a request
#[derive(Debug, Clone, Copy)]
pub struct SpiConfig {
    /// Clock rate in Hz
    pub clock_hz: u32,
    /// SPI mode 0-3 (CPOL/CPHA)
    pub mode: u8,
}

/// Synchronous SPI master controller
pub trait SpiController {
    /// Enable the controller with the given clock and mode
    fn init(&mut self, config: &SpiConfig);

    /// Disable the controller
    fn deinit(&mut self);

    /// Full-duplex transfer: clock `tx` out while filling `rx` (same
    /// length). Returns false on a controller fault.
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> bool;
}

/// Register-level digital I/O port
pub trait GpioPort {
    /// Drive the masked pins high
    fn set_value(&mut self, mask: u32);

    /// Drive the masked pins low
    fn clear_value(&mut self, mask: u32);

    /// Current port value register
    fn value(&self) -> u32;

    /// Current direction register (1 = output)
    fn direction(&self) -> u32;

    /// Replace the direction register
    fn set_direction(&mut self, dir: u32);

    /// Configure one pin as an output
    fn pin_to_output(&mut self, pin: u8);

    /// Toggle one pin
    fn toggle_pin(&mut self, pin: u8);
}
