//! Digital I/O request handlers
//!
//! All three operations are synchronous register accesses with no state
//! machine behind them. The set/clear mask pairs apply the set mask first,
//! then the clear mask, so a pin named in both ends up cleared. Every
//! operation reports `Ok` and echoes the resulting register value.

use crate::controller::GpioPort;
use crate::protocol::{Response, ResponseCode};

/// Drive pins high (set mask) then low (clear mask), echoing the port value
pub fn set_port_value<G: GpioPort>(port: &mut G, set: u32, clear: u32, resp: &mut Response) {
    port.set_value(set);
    port.clear_value(clear);
    resp.append_slice(&port.value().to_le_bytes());
    resp.set_code(ResponseCode::Ok);
}

/// Read-modify-write the direction register, echoing the result
pub fn set_port_direction<G: GpioPort>(port: &mut G, set: u32, clear: u32, resp: &mut Response) {
    let dir = (port.direction() | set) & !clear;
    port.set_direction(dir);
    resp.append_slice(&port.direction().to_le_bytes());
    resp.set_code(ResponseCode::Ok);
}

/// Force a pin to output, toggle it, and echo the port value
pub fn toggle_pin<G: GpioPort>(port: &mut G, pin: u8, resp: &mut Response) {
    port.pin_to_output(pin);
    port.toggle_pin(pin);
    resp.append_slice(&port.value().to_le_bytes());
    resp.set_code(ResponseCode::Ok);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeGpio;

    fn echoed(resp: &Response) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(resp.data());
        u32::from_le_bytes(bytes)
    }

    #[test]
    fn clear_wins_on_overlapping_value_masks() {
        let mut port = FakeGpio::default();
        let mut resp = Response::template(0, 0);
        set_port_value(&mut port, 0b1111, 0b0110, &mut resp);
        assert_eq!(resp.code(), ResponseCode::Ok);
        assert_eq!(port.value, 0b1001);
        assert_eq!(echoed(&resp), 0b1001);
    }

    #[test]
    fn direction_read_modify_write() {
        let mut port = FakeGpio {
            dir: 0b1000_0001,
            ..FakeGpio::default()
        };
        let mut resp = Response::template(0, 0);
        set_port_direction(&mut port, 0b0110, 0b0011, &mut resp);
        // set applied first, clear wins on bit 1
        assert_eq!(port.dir, 0b1000_0100);
        assert_eq!(echoed(&resp), 0b1000_0100);
        assert_eq!(resp.code(), ResponseCode::Ok);
    }

    #[test]
    fn toggle_forces_output_and_echoes() {
        let mut port = FakeGpio::default();
        let mut resp = Response::template(0, 0);
        toggle_pin(&mut port, 3, &mut resp);
        assert_eq!(port.dir & (1 << 3), 1 << 3);
        assert_eq!(port.value, 1 << 3);
        assert_eq!(echoed(&resp), 1 << 3);

        let mut resp = Response::template(0, 0);
        toggle_pin(&mut port, 3, &mut resp);
        assert_eq!(port.value, 0);
        assert_eq!(echoed(&resp), 0);
    }
}
