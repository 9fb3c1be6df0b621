//! SPI master request handlers
//!
//! The SPI family is simpler than the I2C one: the controller exposes a
//! synchronous full-duplex transfer, so there is no status-polling state
//! machine and no mid-transaction abort. The response echoes exactly as
//! many bytes as the request clocked out.

use crate::controller::{SpiConfig, SpiController};
use crate::protocol::{Response, ResponseCode, MAX_PAYLOAD};

/// Initialize the port with the requested clock and mode
pub fn init_port<S: SpiController>(ctrl: &mut S, config: &SpiConfig, resp: &mut Response) {
    ctrl.init(config);
    resp.set_code(ResponseCode::Ok);
}

/// Deinitialize the port
pub fn deinit_port<S: SpiController>(ctrl: &mut S, resp: &mut Response) {
    ctrl.deinit();
    resp.set_code(ResponseCode::Ok);
}

/// Full-duplex transfer: clock `data` out and echo what came back
pub fn transfer<S: SpiController>(ctrl: &mut S, data: &[u8], resp: &mut Response) {
    let mut rx = [0u8; MAX_PAYLOAD];
    let rx = &mut rx[..data.len()];
    if ctrl.transfer(data, rx) {
        resp.append_slice(rx);
        resp.set_code(ResponseCode::Ok);
    } else {
        log::warn!("spi transfer fault");
        resp.set_code(ResponseCode::GenericError);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeSpi;

    #[test]
    fn transfer_echoes_received_bytes() {
        let mut ctrl = FakeSpi::default();
        let mut resp = Response::template(0, 0);
        transfer(&mut ctrl, &[0x0F, 0xF0], &mut resp);
        assert_eq!(resp.code(), ResponseCode::Ok);
        assert_eq!(resp.data(), &[0xF0, 0x0F]);
        assert_eq!(ctrl.written, &[0x0F, 0xF0]);
    }

    #[test]
    fn transfer_fault_reports_generic_error() {
        let mut ctrl = FakeSpi {
            fail: true,
            ..FakeSpi::default()
        };
        let mut resp = Response::template(0, 0);
        transfer(&mut ctrl, &[0xAA], &mut resp);
        assert_eq!(resp.code(), ResponseCode::GenericError);
        assert!(resp.data().is_empty());
    }

    #[test]
    fn init_records_configuration() {
        let mut ctrl = FakeSpi::default();
        let mut resp = Response::template(0, 0);
        let config = SpiConfig {
            clock_hz: 8_000_000,
            mode: 3,
        };
        init_port(&mut ctrl, &config, &mut resp);
        assert_eq!(resp.code(), ResponseCode::Ok);
        assert!(ctrl.inited);
        assert_eq!(ctrl.config.unwrap().clock_hz, 8_000_000);
        assert_eq!(ctrl.config.unwrap().mode, 3);
    }
}
