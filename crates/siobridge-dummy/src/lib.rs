//! siobridge-dummy - In-memory bus hardware emulation for testing
//!
//! This crate provides emulated implementations of the bridge's controller
//! traits so whole host sessions can be exercised without real hardware:
//! an I2C controller with a 256-byte EEPROM-style slave behind it, a
//! shift-register SPI device, a register-backed GPIO port and a host link
//! that queues inbound packets until a receive is armed.
//!
//! The I2C emulation latches the same raw status codes a status-interrupt
//! controller would, so the byte-level transaction state machine runs
//! against it unmodified. A `stuck` bus latches nothing, which is how
//! tests reproduce a transaction that blocks until a reset request aborts
//! it.

use siobridge_core::bridge::{Bridge, BridgeIo};
use siobridge_core::controller::{
    GpioPort, HostLink, I2cController, SpiConfig, SpiController, Transfer,
};
use siobridge_core::protocol::{BusStatus, ResponseCode, PACKET_SIZE, REQUEST_HEADER_SIZE};
use std::cell::Cell;
use std::collections::VecDeque;

/// Size of the emulated EEPROM behind the dummy I2C controller
pub const EEPROM_SIZE: usize = 256;

/// Build a host request packet with the framing length filled in
pub fn build_request(transaction_id: u8, session_id: u8, opcode: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; PACKET_SIZE];
    buf[0] = (REQUEST_HEADER_SIZE + payload.len()) as u8;
    buf[1] = transaction_id;
    buf[2] = session_id;
    buf[3..5].copy_from_slice(&opcode.to_le_bytes());
    buf[REQUEST_HEADER_SIZE..REQUEST_HEADER_SIZE + payload.len()].copy_from_slice(payload);
    buf
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Start condition sent, the next written byte is SLA+R/W
    Start,
    /// Slave addressed for writing; the first data byte loads the pointer
    Write,
    /// Slave addressed for reading; bytes clock in while the bus runs
    Read,
    /// Bus recovery in progress, data bytes are ignored
    Recovery,
}

/// Emulated I2C controller with one EEPROM-style slave on the bus
///
/// The slave answers at [`DummyI2c::slave_addr`] with word addressing: the
/// first byte written after SLA+W loads the memory pointer, further bytes
/// store at the pointer, and reads clock memory out from it. Any other
/// address NAKs. Setting [`DummyI2c::stuck`] stops the bus from latching
/// status codes until a recovery sequence runs.
pub struct DummyI2c {
    /// 7-bit address the emulated slave answers at
    pub slave_addr: u8,
    /// Backing memory of the emulated slave
    pub memory: [u8; EEPROM_SIZE],
    /// When set, the bus latches no status codes and transactions hang
    pub stuck: bool,
    /// Whether `init` ran
    pub inited: bool,
    /// Whether `deinit` ran
    pub deinited: bool,
    /// Last programmed bus speed
    pub bus_speed: u32,
    ptr: usize,
    phase: Phase,
    first_data: bool,
    nack_next: bool,
    status: Option<u8>,
    observed: Cell<bool>,
}

impl DummyI2c {
    /// An idle bus with the slave at the given address and zeroed memory
    pub fn new(slave_addr: u8) -> Self {
        Self {
            slave_addr,
            memory: [0; EEPROM_SIZE],
            stuck: false,
            inited: false,
            deinited: false,
            bus_speed: 0,
            ptr: 0,
            phase: Phase::Idle,
            first_data: false,
            nack_next: false,
            status: None,
            observed: Cell::new(false),
        }
    }

    fn latch(&mut self, raw: u8) {
        if self.stuck {
            return;
        }
        self.status = Some(raw);
        self.observed.set(false);
    }
}

impl Default for DummyI2c {
    fn default() -> Self {
        Self::new(0x50)
    }
}

impl I2cController for DummyI2c {
    fn init(&mut self) {
        self.inited = true;
        self.phase = Phase::Idle;
        self.status = None;
    }

    fn deinit(&mut self) {
        self.deinited = true;
    }

    fn set_bus_speed(&mut self, hz: u32) {
        self.bus_speed = hz;
    }

    fn send_start(&mut self) {
        let raw = if self.phase == Phase::Idle { 0x08 } else { 0x10 };
        self.phase = Phase::Start;
        self.latch(raw);
    }

    fn send_stop(&mut self) {
        self.phase = Phase::Idle;
        self.status = None;
        self.observed.set(false);
    }

    fn send_start_after_stop(&mut self) {
        // The recovery sequence unwedges a stuck bus.
        self.stuck = false;
        self.phase = Phase::Recovery;
        self.status = None;
        self.observed.set(false);
    }

    fn write_byte(&mut self, byte: u8) {
        match self.phase {
            Phase::Start => {
                let addressed = byte >> 1 == self.slave_addr;
                let read = byte & 1 != 0;
                let raw = match (addressed, read) {
                    (true, false) => {
                        self.phase = Phase::Write;
                        self.first_data = true;
                        0x18
                    }
                    (true, true) => {
                        self.phase = Phase::Read;
                        0x40
                    }
                    (false, false) => {
                        self.phase = Phase::Idle;
                        0x20
                    }
                    (false, true) => {
                        self.phase = Phase::Idle;
                        0x48
                    }
                };
                self.latch(raw);
            }
            Phase::Write => {
                if self.first_data {
                    self.ptr = byte as usize;
                    self.first_data = false;
                } else {
                    self.memory[self.ptr] = byte;
                    self.ptr = (self.ptr + 1) % EEPROM_SIZE;
                }
                self.latch(0x28);
            }
            // Recovery dummy byte, or noise on an idle bus.
            Phase::Recovery | Phase::Idle | Phase::Read => {}
        }
    }

    fn read_byte(&mut self) -> u8 {
        let byte = self.memory[self.ptr];
        self.ptr = (self.ptr + 1) % EEPROM_SIZE;
        byte
    }

    fn ack_next_byte(&mut self) {
        self.nack_next = false;
    }

    fn nack_next_byte(&mut self) {
        self.nack_next = true;
    }

    fn clear_status(&mut self) {
        if !self.observed.get() {
            return;
        }
        self.observed.set(false);
        self.status = None;
        // While addressed for reading the bus keeps clocking bytes in; the
        // next status appears as soon as the previous one is cleared.
        if self.phase == Phase::Read && !self.stuck {
            if self.nack_next {
                self.nack_next = false;
                self.latch(0x58);
            } else {
                self.latch(0x50);
            }
        }
    }

    fn status_changed(&self) -> bool {
        self.status.is_some()
    }

    fn current_status(&self) -> BusStatus {
        self.observed.set(true);
        BusStatus::from_raw(self.status.unwrap_or(0x00))
    }

    fn start_transfer(&mut self, _xfer: &mut Transfer<'_>) {
        self.latch(0x08);
    }

    fn advance_transfer(&mut self, xfer: &mut Transfer<'_>) -> bool {
        self.status = None;
        if xfer.slave_addr != self.slave_addr {
            xfer.status = ResponseCode::SlaveNak;
            return true;
        }
        if let Some((&pointer, data)) = xfer.tx.split_first() {
            self.ptr = pointer as usize;
            for &byte in data {
                self.memory[self.ptr] = byte;
                self.ptr = (self.ptr + 1) % EEPROM_SIZE;
            }
        }
        xfer.tx_pos = xfer.tx.len();
        for i in 0..xfer.rx.len() {
            xfer.rx[i] = self.memory[self.ptr];
            self.ptr = (self.ptr + 1) % EEPROM_SIZE;
        }
        xfer.rx_pos = xfer.rx.len();
        xfer.status = ResponseCode::Ok;
        true
    }
}

/// Emulated SPI device behaving like a one-byte shift register: every byte
/// clocked in pushes the previously received byte out, so received data is
/// the transmitted data delayed by one (0xFF before anything was sent).
pub struct DummySpi {
    /// Whether `init` ran
    pub inited: bool,
    /// Whether `deinit` ran
    pub deinited: bool,
    /// Last programmed configuration
    pub config: Option<SpiConfig>,
    /// Every byte clocked out by the bridge
    pub written: Vec<u8>,
    shift: u8,
}

impl Default for DummySpi {
    fn default() -> Self {
        Self {
            inited: false,
            deinited: false,
            config: None,
            written: Vec::new(),
            shift: 0xFF,
        }
    }
}

impl SpiController for DummySpi {
    fn init(&mut self, config: &SpiConfig) {
        self.inited = true;
        self.config = Some(*config);
        self.shift = 0xFF;
    }

    fn deinit(&mut self) {
        self.deinited = true;
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> bool {
        if !self.inited {
            return false;
        }
        for (t, r) in tx.iter().zip(rx.iter_mut()) {
            *r = self.shift;
            self.shift = *t;
        }
        self.written.extend_from_slice(tx);
        true
    }
}

/// Register-backed GPIO port
#[derive(Default)]
pub struct DummyGpio {
    /// Port value register
    pub value: u32,
    /// Port direction register (1 = output)
    pub dir: u32,
}

impl GpioPort for DummyGpio {
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

/// Host link that holds inbound packets until a receive is armed
///
/// Packets queued via [`DummyLink::queue_request`] are only delivered to
/// the bridge while a receive is armed, so the bridge's back-pressure
/// behavior (stalling the receive on a saturated queue) is observable.
pub struct DummyLink {
    /// Connection state reported to the bridge
    pub connected: bool,
    /// Packets from the host waiting for an armed receive
    pub inbound: VecDeque<Vec<u8>>,
    /// Whether a receive is currently armed
    pub rx_armed: bool,
    /// Response packets the bridge transmitted
    pub sent: Vec<Vec<u8>>,
}

impl DummyLink {
    /// A connected link with nothing in flight
    pub fn new() -> Self {
        Self {
            connected: true,
            inbound: VecDeque::new(),
            rx_armed: false,
            sent: Vec::new(),
        }
    }

    /// Queue a request packet for delivery
    pub fn queue_request(&mut self, packet: Vec<u8>) {
        self.inbound.push_back(packet);
    }
}

impl Default for DummyLink {
    fn default() -> Self {
        Self::new()
    }
}

impl HostLink for DummyLink {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send_response(&mut self, packet: &[u8]) -> bool {
        self.sent.push(packet.to_vec());
        true
    }

    fn arm_receive(&mut self) {
        self.rx_armed = true;
    }
}

/// Drive the bridge until it goes quiescent
///
/// Each round models one pass of the firmware main loop plus the transport
/// interrupts it would trigger: run the dispatch loop once, complete any
/// transmission immediately, then deliver the next inbound packet if a
/// receive is armed. Stops when a full round makes no progress.
pub fn pump<I, S, G>(bridge: &Bridge, link: &mut DummyLink, io: &mut BridgeIo<'_, I, S, G>)
where
    I: I2cController,
    S: SpiController,
    G: GpioPort,
{
    loop {
        let sent_before = link.sent.len();
        bridge.process(link, io);
        bridge.tx_complete(link);

        let mut delivered = false;
        if link.rx_armed {
            if let Some(packet) = link.inbound.pop_front() {
                link.rx_armed = false;
                bridge.rx_complete(link, &packet);
                delivered = true;
            }
        }
        if !delivered && link.sent.len() == sent_before {
            return;
        }
    }
}
