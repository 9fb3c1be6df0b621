//! Shared fakes for unit tests: a scripted I2C controller, trivial SPI and
//! GPIO implementations and a recording host link.

use crate::controller::{GpioPort, HostLink, I2cController, SpiConfig, SpiController, Transfer};
use crate::protocol::{
    BusStatus, ResponseCode, RwRequest, TransferOptions, PACKET_SIZE, REQUEST_HEADER_SIZE,
};
use core::cell::Cell;
use std::vec::Vec;

/// Build a 64-byte request packet with the framing length filled in
pub fn build_request(transaction_id: u8, session_id: u8, opcode: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = std::vec![0u8; PACKET_SIZE];
    buf[0] = (REQUEST_HEADER_SIZE + payload.len()) as u8;
    buf[1] = transaction_id;
    buf[2] = session_id;
    buf[3..5].copy_from_slice(&opcode.to_le_bytes());
    buf[REQUEST_HEADER_SIZE..REQUEST_HEADER_SIZE + payload.len()].copy_from_slice(payload);
    buf
}

/// Convenience constructor for decoded read/write parameters
pub fn rw_request<'a>(
    slave_addr: u8,
    options: TransferOptions,
    length: u16,
    data: &'a [u8],
) -> RwRequest<'a> {
    RwRequest {
        slave_addr,
        options,
        length,
        data,
    }
}

/// Scripted I2C controller
///
/// `script` is the sequence of raw status codes the bus will latch, in
/// order. A status stays latched until the state machine both observes it
/// and clears it, mirroring status-interrupt hardware. An exhausted script
/// means the bus never signals again (a stuck bus).
#[derive(Default)]
pub struct FakeI2c {
    script: Vec<u8>,
    pos: usize,
    observed: Cell<bool>,

    /// Bytes for `read_byte` to return, consumed front to back
    pub read_data: Vec<u8>,
    reads_done: usize,

    /// Data handed back by `advance_transfer`
    pub xfer_rx: Vec<u8>,
    /// Terminal status handed back by `advance_transfer`
    pub xfer_status: ResponseCode,

    /// Every byte clocked out, address bytes included
    pub written: Vec<u8>,
    /// Read counts at the moments a NAK instruction arrived
    pub nack_points: Vec<usize>,
    /// ACK instructions received
    pub acks: usize,
    /// Start conditions issued
    pub starts: usize,
    /// Stop conditions issued
    pub stops: usize,
    /// Recovery start-after-stop conditions issued
    pub start_after_stops: usize,
    /// Composite transfers kicked off
    pub transfers_started: usize,
    /// Whether `init` ran
    pub inited: bool,
    /// Whether `deinit` ran
    pub deinited: bool,
    /// Last programmed bus speed
    pub bus_speed: u32,
}

impl FakeI2c {
    /// A controller that will latch the given raw statuses in order
    pub fn with_script(script: &[u8]) -> Self {
        Self {
            script: script.to_vec(),
            ..Self::default()
        }
    }

    /// Total hardware operations observed (for "no hardware call" asserts)
    pub fn op_count(&self) -> usize {
        self.written.len()
            + self.starts
            + self.stops
            + self.start_after_stops
            + self.transfers_started
            + self.inited as usize
            + self.deinited as usize
    }
}

impl I2cController for FakeI2c {
    fn init(&mut self) {
        self.inited = true;
    }

    fn deinit(&mut self) {
        self.deinited = true;
    }

    fn set_bus_speed(&mut self, hz: u32) {
        self.bus_speed = hz;
    }

    fn send_start(&mut self) {
        self.starts += 1;
    }

    fn send_stop(&mut self) {
        self.stops += 1;
    }

    fn send_start_after_stop(&mut self) {
        self.start_after_stops += 1;
    }

    fn write_byte(&mut self, byte: u8) {
        self.written.push(byte);
    }

    fn read_byte(&mut self) -> u8 {
        let byte = self.read_data.get(self.reads_done).copied().unwrap_or(0xFF);
        self.reads_done += 1;
        byte
    }

    fn ack_next_byte(&mut self) {
        self.acks += 1;
    }

    fn nack_next_byte(&mut self) {
        self.nack_points.push(self.reads_done);
    }

    fn clear_status(&mut self) {
        if self.observed.get() {
            self.pos += 1;
            self.observed.set(false);
        }
    }

    fn status_changed(&self) -> bool {
        self.pos < self.script.len()
    }

    fn current_status(&self) -> BusStatus {
        self.observed.set(true);
        BusStatus::from_raw(self.script[self.pos])
    }

    fn start_transfer(&mut self, _xfer: &mut Transfer<'_>) {
        self.transfers_started += 1;
    }

    fn advance_transfer(&mut self, xfer: &mut Transfer<'_>) -> bool {
        let n = self.xfer_rx.len().min(xfer.rx.len());
        xfer.rx[..n].copy_from_slice(&self.xfer_rx[..n]);
        xfer.rx_pos = n;
        xfer.tx_pos = xfer.tx.len();
        xfer.status = self.xfer_status;
        true
    }
}

/// Trivial full-duplex SPI controller: receives the complement of what it
/// transmits, so tests can tell rx apart from tx.
#[derive(Default)]
pub struct FakeSpi {
    /// Whether `init` ran
    pub inited: bool,
    /// Whether `deinit` ran
    pub deinited: bool,
    /// Last programmed configuration
    pub config: Option<SpiConfig>,
    /// Every byte clocked out
    pub written: Vec<u8>,
    /// Force transfer faults
    pub fail: bool,
}

impl SpiController for FakeSpi {
    fn init(&mut self, config: &SpiConfig) {
        self.inited = true;
        self.config = Some(*config);
    }

    fn deinit(&mut self) {
        self.deinited = true;
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> bool {
        if self.fail {
            return false;
        }
        self.written.extend_from_slice(tx);
        for (r, t) in rx.iter_mut().zip(tx) {
            *r = !*t;
        }
        true
    }
}

/// Register-backed GPIO port
#[derive(Default)]
pub struct FakeGpio {
    /// Port value register
    pub value: u32,
    /// Port direction register
    pub dir: u32,
}

impl GpioPort for FakeGpio {
    fn set_value(&mut self, mask: u32) {
        self.value |= mask;
    }

    fn clear_value(&mut self, mask: u32) {
        self.value &= !mask;
    }

    fn value(&self) -> u32 {
        self.value
    }

    fn direction(&self) -> u32 {
        self.dir
    }

    fn set_direction(&mut self, dir: u32) {
        self.dir = dir;
    }

    fn pin_to_output(&mut self, pin: u8) {
        self.dir |= 1 << pin;
    }

    fn toggle_pin(&mut self, pin: u8) {
        self.value ^= 1 << pin;
    }
}

/// Host link that records everything the bridge does with it
pub struct TestLink {
    /// Connection state reported to the bridge
    pub connected: bool,
    /// Response packets the bridge transmitted
    pub sent: Vec<Vec<u8>>,
    /// Number of receive arms
    pub armed: usize,
}

impl TestLink {
    /// A connected link with nothing sent yet
    pub fn new() -> Self {
        Self {
            connected: true,
            sent: Vec::new(),
            armed: 0,
        }
    }
}

impl HostLink for TestLink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_response(&mut self, packet: &[u8]) -> bool {
        self.sent.push(packet.to_vec());
        true
    }

    fn arm_receive(&mut self) {
        self.armed += 1;
    }
}
