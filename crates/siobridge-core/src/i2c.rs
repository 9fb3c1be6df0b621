//! Byte-level I2C bus transaction state machine
//!
//! A transaction is driven to completion by repeatedly waiting for the
//! controller's status-changed signal and branching on the latched
//! [`BusStatus`]. The wait has no timeout: termination relies on the bus
//! eventually latching a status or on the bridge's reset flag, which
//! aborts the transaction with [`ResponseCode::GenericError`]. A stuck bus
//! with neither is an accepted liveness failure.
//!
//! Two entry points share the status interpretation: [`run_read_write`]
//! drives single-primitive transactions byte by byte (required for option
//! combinations like a suppressed address byte or a forced NAK on the
//! final byte), and [`run_transfer`] delegates the common write-then-read
//! case to the controller's composite transfer primitive.

use crate::controller::{I2cController, Transfer};
use crate::protocol::{
    BusStatus, Response, ResponseCode, RwRequest, TransferOptions, RESPONSE_HEADER_SIZE,
};
use core::sync::atomic::{AtomicBool, Ordering};

/// Transaction direction on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Master transmits to the slave
    Write,
    /// Master receives from the slave
    Read,
}

impl Direction {
    /// The R/W bit carried in the address byte
    fn rw_bit(self) -> u8 {
        match self {
            Self::Write => 0,
            Self::Read => 1,
        }
    }
}

/// Wait for the controller to latch a new status code
///
/// This is the only blocking operation in the core. It is bounded solely
/// by the cancellation flag; returns true when cancelled. The flag is
/// checked first so a pending reset wins even when a status is already
/// latched.
pub fn poll_status<C: I2cController>(ctrl: &C, cancel: &AtomicBool) -> bool {
    loop {
        if cancel.load(Ordering::Acquire) {
            return true;
        }
        if ctrl.status_changed() {
            return false;
        }
        core::hint::spin_loop();
    }
}

/// Drive a single-primitive read or write transaction to completion
///
/// The response's length field tracks progress: for reads each received
/// byte is appended to the response data, for writes the length grows as
/// bytes are clocked out so the host can tell how far a NAKed write got.
pub fn run_read_write<C: I2cController>(
    ctrl: &mut C,
    params: &RwRequest<'_>,
    resp: &mut Response,
    dir: Direction,
    cancel: &AtomicBool,
) {
    ctrl.clear_status();

    if params.options.contains(TransferOptions::EMIT_START) {
        ctrl.send_start();
    }

    while resp.code() == ResponseCode::InvalidCommand {
        if poll_status(ctrl, cancel) {
            log::warn!("i2c transaction aborted by reset request");
            resp.set_code(ResponseCode::GenericError);
            break;
        }

        let status = ctrl.current_status();
        log::trace!("i2c status 0x{:02x}", status.raw());

        let handled = match dir {
            Direction::Read => handle_read_state(ctrl, params, resp, status),
            Direction::Write => handle_write_state(ctrl, params, resp, status),
        };
        if !handled {
            handle_shared_state(ctrl, params, resp, status, dir);
        }

        ctrl.clear_status();
    }

    // A stop is issued even after an error or abort, but never after
    // arbitration loss: the bus is no longer ours to drive.
    if resp.code() != ResponseCode::ArbitrationLost
        && params.options.contains(TransferOptions::EMIT_STOP)
    {
        ctrl.send_stop();
    }
}

/// Write-direction status handling. Returns false when the status must be
/// classified by the shared handler instead.
fn handle_write_state<C: I2cController>(
    ctrl: &mut C,
    params: &RwRequest<'_>,
    resp: &mut Response,
    status: BusStatus,
) -> bool {
    let supply_data = match status {
        BusStatus::DataWriteNak => {
            if params.options.contains(TransferOptions::BREAK_ON_NACK) {
                resp.set_code(ResponseCode::SlaveNak);
                return true;
            }
            // A tolerated NAK behaves like the address-phase states below.
            params.options.contains(TransferOptions::NO_ADDRESS)
        }
        // After a (repeated) start the shared handler emits the address
        // byte unless it was suppressed, in which case data flows at once.
        BusStatus::Start | BusStatus::RepeatedStart => {
            params.options.contains(TransferOptions::NO_ADDRESS)
        }
        BusStatus::AddrWriteAck | BusStatus::DataWriteAck => true,
        _ => false,
    };
    if !supply_data {
        return false;
    }

    let sent = resp.len() as usize - RESPONSE_HEADER_SIZE;
    if sent < params.length as usize {
        ctrl.write_byte(params.data[sent]);
        resp.add_len(1);
    } else {
        resp.set_code(ResponseCode::Ok);
    }
    true
}

/// Read-direction status handling. Returns false when the status must be
/// classified by the shared handler instead.
fn handle_read_state<C: I2cController>(
    ctrl: &mut C,
    params: &RwRequest<'_>,
    resp: &mut Response,
    status: BusStatus,
) -> bool {
    match status {
        BusStatus::DataReadNak => {
            // Final byte arrived with our NAK already on the wire.
            let byte = ctrl.read_byte();
            resp.append(byte);
            resp.set_code(ResponseCode::Ok);
            true
        }
        BusStatus::AddrReadAck | BusStatus::DataReadAck => {
            if status == BusStatus::DataReadAck {
                let byte = ctrl.read_byte();
                resp.append(byte);
            } else {
                ctrl.ack_next_byte();
            }
            let received = resp.len() as usize - RESPONSE_HEADER_SIZE;
            let length = params.length as usize;
            // With NACK_LAST_BYTE the transaction ends at the DataReadNak
            // state instead of here, except when there is no byte to nack.
            if params.options.contains(TransferOptions::NACK_LAST_BYTE) && length > received {
                if length == received + 1 {
                    ctrl.nack_next_byte();
                }
            } else if length == received {
                resp.set_code(ResponseCode::Ok);
            }
            true
        }
        _ => false,
    }
}

/// Status handling shared by both directions: address emission and the
/// terminal error states.
fn handle_shared_state<C: I2cController>(
    ctrl: &mut C,
    params: &RwRequest<'_>,
    resp: &mut Response,
    status: BusStatus,
    dir: Direction,
) {
    match status {
        BusStatus::Start | BusStatus::RepeatedStart => {
            if !params.options.contains(TransferOptions::NO_ADDRESS) {
                ctrl.write_byte((params.slave_addr << 1) | dir.rw_bit());
            }
        }
        BusStatus::AddrWriteNak | BusStatus::AddrReadNak => {
            resp.set_code(ResponseCode::SlaveNak);
        }
        BusStatus::ArbitrationLost => {
            resp.set_code(ResponseCode::ArbitrationLost);
        }
        BusStatus::BusError => {
            resp.set_code(ResponseCode::BusError);
        }
        _ => {
            log::debug!("unexpected i2c status 0x{:02x}", status.raw());
            resp.set_code(ResponseCode::GenericError);
        }
    }
}

/// Drive a composite transfer via the controller's transfer primitive
///
/// Status interpretation is delegated to the driver; the bytes it actually
/// received are appended to the response and its terminal status becomes
/// the response code directly.
pub fn run_transfer<C: I2cController>(
    ctrl: &mut C,
    xfer: &mut Transfer<'_>,
    resp: &mut Response,
    cancel: &AtomicBool,
) {
    ctrl.start_transfer(xfer);

    loop {
        if poll_status(ctrl, cancel) {
            log::warn!("i2c transfer aborted by reset request");
            xfer.status = ResponseCode::GenericError;
            break;
        }
        if ctrl.advance_transfer(xfer) {
            break;
        }
    }

    if xfer.rx_pos > 0 {
        resp.append_slice(xfer.received());
    }
    resp.set_code(xfer.status);
}

/// Hardware bus recovery after an aborted transaction: force a start
/// behind a stop, clock out a dummy byte, then release the bus.
pub fn run_bus_recovery<C: I2cController>(ctrl: &mut C) {
    ctrl.send_start_after_stop();
    ctrl.write_byte(0xFF);
    ctrl.send_stop();
}
