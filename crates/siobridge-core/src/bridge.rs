//! Bridge control block: queueing, dispatch and the reset path
//!
//! [`Bridge`] owns the two packet rings and the handful of flags shared
//! between the transport's interrupt context and the cooperative dispatch
//! loop. Every entry point takes `&self`; the struct is `Sync` and designed
//! to live in a `static`.
//!
//! Context discipline:
//!
//! - interrupt context: [`Bridge::rx_complete`] produces into the request
//!   ring and [`Bridge::tx_complete`] consumes from the response ring.
//! - dispatch context: [`Bridge::process`] consumes requests and produces
//!   responses.
//!
//! The response ring's consumer role is shared, serialized by the idle
//! flag: while `resp_idle` is set no transmit completion is outstanding,
//! so the dispatch loop may kick-start transmission itself; once a send is
//! in flight only the completion interrupt drains the ring.

use crate::controller::{GpioPort, HostLink, I2cController, SpiController, SpiConfig, Transfer};
use crate::gpio;
use crate::i2c::{self, Direction};
use crate::protocol::{
    opcode, BridgeCommand, Command, GpioCommand, I2cCommand, Packet, Request, Response,
    ResponseCode, SpiCommand, MAX_PAYLOAD,
};
use crate::ring::PacketRing;
use crate::spi;
use core::sync::atomic::{AtomicBool, Ordering};

/// Queue depth of both packet rings (requests and responses)
pub const QUEUE_DEPTH: usize = 4;

/// Bridge firmware major version, reported by GetInfo
pub const VERSION_MAJOR: u16 = 2;

/// Bridge firmware minor version, reported by GetInfo
pub const VERSION_MINOR: u16 = 0;

/// Human-readable firmware identification appended to the GetInfo response
pub const VERSION_STRING: &str = "siobridge 2.0";

/// The controller bindings a bridge instance executes requests against
///
/// Session ids index into these slices; a session at or beyond a slice's
/// length is rejected with `InvalidCommand` before any hardware call.
pub struct BridgeIo<'a, I, S, G> {
    /// I2C master controllers, indexed by session id
    pub i2c: &'a mut [I],
    /// SPI master controllers, indexed by session id
    pub spi: &'a mut [S],
    /// GPIO ports, indexed by session id
    pub gpio: &'a mut [G],
}

/// Bridge control block
pub struct Bridge {
    requests: PacketRing<QUEUE_DEPTH>,
    responses: PacketRing<QUEUE_DEPTH>,
    // One-slot park for a packet that arrived on a saturated request
    // ring. Non-empty iff the receive is stopped, so at most one packet
    // is ever parked.
    parked: PacketRing<2>,
    connected: AtomicBool,
    resp_idle: AtomicBool,
    reset_pending: AtomicBool,
}

impl Bridge {
    /// Create an idle, disconnected bridge
    pub const fn new() -> Self {
        Self {
            requests: PacketRing::new(),
            responses: PacketRing::new(),
            parked: PacketRing::new(),
            connected: AtomicBool::new(false),
            resp_idle: AtomicBool::new(true),
            reset_pending: AtomicBool::new(false),
        }
    }

    /// Whether an abort of the in-flight transaction is pending
    pub fn reset_pending(&self) -> bool {
        self.reset_pending.load(Ordering::Acquire)
    }

    /// Receive-complete entry point (interrupt context)
    ///
    /// Queues the received packet and re-arms the next receive. A reset
    /// opcode is detected eagerly here - before the packet ever reaches
    /// the dispatcher - so a transaction blocked in the status wait aborts
    /// as soon as possible. When the request ring is saturated the packet
    /// is parked and the receive is not re-armed; the dispatch loop moves
    /// the parked packet into the ring and re-arms once a slot frees, so
    /// nothing is overwritten and nothing is dropped.
    pub fn rx_complete<L: HostLink>(&self, link: &mut L, data: &[u8]) {
        if let Ok(req) = Request::parse(data) {
            if req.opcode() == opcode::I2C_RESET {
                self.reset_pending.store(true, Ordering::Release);
            }
        }

        let packet = match Packet::from_slice(data) {
            Ok(packet) => packet,
            Err(_) => {
                log::warn!("dropping oversized packet ({} bytes)", data.len());
                link.arm_receive();
                return;
            }
        };

        if self.requests.try_enqueue(&packet) {
            link.arm_receive();
        } else {
            log::warn!("request queue saturated; receive stalled");
            // The receive stays stopped while a packet is parked, so this
            // slot cannot see a second packet before the dispatch loop
            // drains it.
            let stored = self.parked.try_enqueue(&packet);
            debug_assert!(stored);
        }
    }

    /// Transmit-complete entry point (interrupt context)
    ///
    /// Sends the next queued response, or marks the channel idle so the
    /// dispatch loop kick-starts the next transmission.
    pub fn tx_complete<L: HostLink>(&self, link: &mut L) {
        match self.responses.try_dequeue() {
            Some(packet) => {
                link.send_response(&packet.0[..Response::wire_len(&packet)]);
            }
            None => {
                self.resp_idle.store(true, Ordering::Release);
            }
        }
    }

    /// Dispatch loop body (cooperative context)
    ///
    /// Handles connection edges, processes at most one queued request and
    /// kick-starts response transmission when the channel is idle. Callers
    /// run this in a loop; the only blocking inside is the bus transaction
    /// status wait, which the reset flag can abort.
    pub fn process<L, I, S, G>(&self, link: &mut L, io: &mut BridgeIo<'_, I, S, G>)
    where
        L: HostLink,
        I: I2cController,
        S: SpiController,
        G: GpioPort,
    {
        if !link.is_connected() {
            if self.connected.swap(false, Ordering::AcqRel) {
                // Transport went down: discard everything queued and start
                // the next session from a clean slate.
                self.requests.reset();
                self.responses.reset();
                self.parked.reset();
                self.resp_idle.store(true, Ordering::Release);
                self.reset_pending.store(false, Ordering::Release);
                log::info!("host disconnected; queues cleared");
            }
            return;
        }

        if !self.connected.swap(true, Ordering::AcqRel) {
            log::info!("host connected");
            link.arm_receive();
        }

        // Only take a request when its response is guaranteed a slot, so a
        // slow host backs pressure up through the request ring instead of
        // clobbering unsent responses.
        if !self.responses.is_full() {
            if let Some(packet) = self.requests.try_dequeue() {
                let resp = self.dispatch(&packet, io);
                let queued = self.responses.try_enqueue(&resp.into_packet());
                debug_assert!(queued, "dispatch is gated on response ring space");
            }
        }

        // A packet is parked only while the receive is stopped, so the
        // interrupt side cannot be enqueueing concurrently here.
        if !self.requests.is_full() {
            if let Some(packet) = self.parked.try_dequeue() {
                let queued = self.requests.try_enqueue(&packet);
                debug_assert!(queued);
                link.arm_receive();
            }
        }

        if self.resp_idle.load(Ordering::Acquire) {
            if let Some(packet) = self.responses.try_dequeue() {
                self.resp_idle.store(false, Ordering::Release);
                link.send_response(&packet.0[..Response::wire_len(&packet)]);
            }
        }
    }

    /// Route one request to its handler and build the response
    fn dispatch<I, S, G>(&self, packet: &Packet, io: &mut BridgeIo<'_, I, S, G>) -> Response
    where
        I: I2cController,
        S: SpiController,
        G: GpioPort,
    {
        let req = match Request::parse(&packet.0) {
            Ok(req) => req,
            Err(_) => {
                // Header bytes are garbage; answer with what we have so
                // the host's transaction bookkeeping still lines up.
                return Response::template(packet.0[1], packet.0[2]);
            }
        };

        let mut resp = Response::template(req.transaction_id(), req.session_id());
        let session = req.session_id() as usize;

        log::debug!(
            "dispatch op=0x{:04x} session={} transaction={}",
            req.opcode(),
            session,
            req.transaction_id()
        );

        match Command::decode(&req) {
            Ok(Command::I2c(cmd)) => {
                if let Some(ctrl) = io.i2c.get_mut(session) {
                    self.handle_i2c(ctrl, cmd, &mut resp);
                }
            }
            Ok(Command::Spi(cmd)) => {
                if let Some(ctrl) = io.spi.get_mut(session) {
                    handle_spi(ctrl, cmd, &mut resp);
                }
            }
            Ok(Command::Gpio(cmd)) => {
                if let Some(port) = io.gpio.get_mut(session) {
                    handle_gpio(port, cmd, &mut resp);
                }
            }
            Ok(Command::Bridge(BridgeCommand::GetInfo)) => {
                handle_get_info(io, &mut resp);
            }
            Err(err) => {
                log::debug!("request rejected: {}", err);
            }
        }
        // Unknown opcode or unbound session: the template goes out
        // untouched, still carrying InvalidCommand.
        resp
    }

    fn handle_i2c<I: I2cController>(&self, ctrl: &mut I, cmd: I2cCommand<'_>, resp: &mut Response) {
        match cmd {
            I2cCommand::InitPort { bus_speed } => {
                ctrl.init();
                ctrl.set_bus_speed(bus_speed);
                resp.set_code(ResponseCode::Ok);
            }
            I2cCommand::DeinitPort => {
                ctrl.deinit();
                resp.set_code(ResponseCode::Ok);
            }
            I2cCommand::DeviceWrite(params) => {
                i2c::run_read_write(ctrl, &params, resp, Direction::Write, &self.reset_pending);
            }
            I2cCommand::DeviceRead(params) => {
                i2c::run_read_write(ctrl, &params, resp, Direction::Read, &self.reset_pending);
            }
            I2cCommand::DeviceXfer(params) => {
                let mut rx = [0u8; MAX_PAYLOAD];
                let rx_len = (params.rx_len as usize).min(MAX_PAYLOAD);
                let mut xfer = Transfer::new(
                    params.slave_addr,
                    params.options,
                    params.data,
                    &mut rx[..rx_len],
                );
                i2c::run_transfer(ctrl, &mut xfer, resp, &self.reset_pending);
            }
            I2cCommand::Reset => {
                i2c::run_bus_recovery(ctrl);
                self.reset_pending.store(false, Ordering::Release);
                resp.set_code(ResponseCode::Ok);
            }
        }
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

fn handle_spi<S: SpiController>(ctrl: &mut S, cmd: SpiCommand<'_>, resp: &mut Response) {
    match cmd {
        SpiCommand::InitPort { config } => {
            let config = SpiConfig {
                clock_hz: config.clock_hz.get(),
                mode: config.mode,
            };
            spi::init_port(ctrl, &config, resp);
        }
        SpiCommand::DeinitPort => spi::deinit_port(ctrl, resp),
        SpiCommand::Xfer { data } => spi::transfer(ctrl, data, resp),
    }
}

fn handle_gpio<G: GpioPort>(port: &mut G, cmd: GpioCommand, resp: &mut Response) {
    match cmd {
        GpioCommand::SetPortValue { set, clear } => gpio::set_port_value(port, set, clear, resp),
        GpioCommand::SetPortDir { set, clear } => gpio::set_port_direction(port, set, clear, resp),
        GpioCommand::TogglePin { pin } => gpio::toggle_pin(port, pin, resp),
    }
}

fn handle_get_info<I, S, G>(io: &BridgeIo<'_, I, S, G>, resp: &mut Response) {
    resp.append(io.i2c.len() as u8);
    resp.append(io.spi.len() as u8);
    resp.append(io.gpio.len() as u8);
    resp.append(0);
    let version = ((VERSION_MAJOR as u32) << 16) | VERSION_MINOR as u32;
    resp.append_slice(&version.to_le_bytes());
    resp.append_slice(VERSION_STRING.as_bytes());
    resp.set_code(ResponseCode::Ok);
}
