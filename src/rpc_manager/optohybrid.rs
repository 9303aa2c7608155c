// MIT License
// Copyright 2017--present xhal developers

//! Broadcast register access on an OptoHybrid.
//!
//! A broadcast targets every VFAT selected by `vfat_mask` on OptoHybrid
//! `oh_number` at once. The board module answering these is `optohybrid`.

use crate::error::{Result, XhalError};
use crate::interface::XhalInterface;
use crate::message::RpcMessage;
use crate::rpc_manager::{execute, into_status};
use crate::status::xhal_status_t;
use crate::transport::Transport;

pub const BROADCAST_READ: &str = "optohybrid.broadcastRead";
pub const BROADCAST_WRITE: &str = "optohybrid.broadcastWrite";

fn broadcast_read_request(oh_number: u32, reg_name: &str, vfat_mask: u32) -> RpcMessage {
    let mut req = RpcMessage::new(BROADCAST_READ);
    req.set_word("oh_number", oh_number)
        .set_string("reg_name", reg_name)
        .set_word("mask", vfat_mask);
    req
}

/// Read `reg_name` from the VFATs in `vfat_mask`.
///
/// The returned data is not interpreted; use [`broadcast_read_values`] to
/// get it.
pub fn broadcast_read<T: Transport>(
    iface: &mut XhalInterface<T>,
    oh_number: u32,
    reg_name: &str,
    vfat_mask: u32,
) -> xhal_status_t {
    let req = broadcast_read_request(oh_number, reg_name, vfat_mask);
    let outcome = execute(iface, &req);
    into_status(iface, outcome)
}

/// Read `reg_name` from the VFATs in `vfat_mask` and return the `"data"`
/// words, one per VFAT position.
pub fn broadcast_read_values<T: Transport>(
    iface: &mut XhalInterface<T>,
    oh_number: u32,
    reg_name: &str,
    vfat_mask: u32,
) -> Result<Vec<u32>> {
    let req = broadcast_read_request(oh_number, reg_name, vfat_mask);
    let rsp = execute(iface, &req)?;
    rsp.get_word_array("data")
        .map(<[u32]>::to_vec)
        .ok_or_else(|| XhalError::Rpc(format!("{BROADCAST_READ}: response has no data")))
}

/// Write `value` to `reg_name` on the VFATs in `vfat_mask`.
pub fn broadcast_write<T: Transport>(
    iface: &mut XhalInterface<T>,
    oh_number: u32,
    reg_name: &str,
    value: u32,
    vfat_mask: u32,
) -> xhal_status_t {
    let mut req = RpcMessage::new(BROADCAST_WRITE);
    req.set_word("oh_number", oh_number)
        .set_string("reg_name", reg_name)
        .set_word("value", value)
        .set_word("mask", vfat_mask);
    let outcome = execute(iface, &req);
    into_status(iface, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::interface::tests::session;
    use crate::message::ERROR_KEY;
    use crate::transport::mock::MockTransport;

    #[test]
    fn write_builds_request_and_succeeds() {
        let (mock, journal) = MockTransport::new();
        let (mut iface, _) = session(mock);

        let status = broadcast_write(&mut iface, 3, "CFG_VALUE", 0x1, 0xFF);
        assert_eq!(status, xhal_status_t::XHAL_SUCCESS);

        let journal = journal.lock();
        let req = &journal.requests[0];
        assert_eq!(req.method(), "optohybrid.broadcastWrite");
        assert_eq!(req.get_word("oh_number"), Some(3));
        assert_eq!(req.get_string("reg_name"), Some("CFG_VALUE"));
        assert_eq!(req.get_word("value"), Some(1));
        assert_eq!(req.get_word("mask"), Some(0xFF));
        assert_eq!(req.len(), 4);
    }

    #[test]
    fn read_builds_request_without_value() {
        let (mock, journal) = MockTransport::new();
        let (mut iface, _) = session(mock);

        let status = broadcast_read(&mut iface, 3, "CFG_VALUE", 0xFF);
        assert_eq!(status, xhal_status_t::XHAL_SUCCESS);

        let journal = journal.lock();
        let req = &journal.requests[0];
        assert_eq!(req.method(), "optohybrid.broadcastRead");
        assert_eq!(req.get_word("oh_number"), Some(3));
        assert_eq!(req.get_word("mask"), Some(0xFF));
        assert!(!req.key_exists("value"));
    }

    #[test]
    fn error_field_wins_over_other_content() {
        let mut rsp = RpcMessage::new(BROADCAST_READ);
        rsp.set_word_array("data", vec![0; 24])
            .set_string(ERROR_KEY, "timeout");
        let (mock, _) = MockTransport::new();
        let (mut iface, out) = session(mock.respond(Ok(rsp)));

        let status = broadcast_read(&mut iface, 3, "CFG_VALUE", 0xFF);
        assert_eq!(status.code(), 1);
        assert_eq!(out.count("Caught an error: timeout"), 1);
    }

    #[test]
    fn remote_error_logged_by_each_session_in_turn() {
        for _ in 0..2 {
            let (mock, _) = MockTransport::new();
            let (mut iface, out) = session(mock.respond_error(BROADCAST_READ, "timeout"));

            let status = broadcast_read(&mut iface, 0, "CFG_VALUE", 0xFF);
            assert_eq!(status, xhal_status_t::XHAL_REMOTE_ERROR);
            drop(iface);
            assert_eq!(out.count("Caught an error: timeout"), 1);
        }
    }

    #[test]
    fn disconnected_session_never_reaches_transport() {
        let (mock, journal) = MockTransport::new();
        let (mut iface, _) = session(mock);
        iface.disconnect().unwrap();

        let status = broadcast_write(&mut iface, 0, "CFG_VALUE", 0, 0xFF);
        assert_eq!(status, xhal_status_t::XHAL_NOT_CONNECTED);
        assert!(journal.lock().requests.is_empty());
    }

    #[test]
    fn transport_exception_degrades_to_status() {
        let (mock, _) = MockTransport::new();
        let (mut iface, _) = session(mock.respond(Err(TransportError::Rpc("eof".into()))));
        let status = broadcast_read(&mut iface, 1, "CFG_THR_ARM_DAC", 0x1);
        assert_eq!(status, xhal_status_t::XHAL_RPC_ERROR);
    }

    #[test]
    fn read_values_returns_data_words() {
        let mut rsp = RpcMessage::new(BROADCAST_READ);
        rsp.set_word_array("data", vec![10, 11, 12]);
        let (mock, _) = MockTransport::new();
        let (mut iface, _) = session(mock.respond(Ok(rsp)).respond(Ok(RpcMessage::new(
            BROADCAST_READ,
        ))));

        let values = broadcast_read_values(&mut iface, 2, "CFG_IREF", 0x7).unwrap();
        assert_eq!(values, vec![10, 11, 12]);

        let err = broadcast_read_values(&mut iface, 2, "CFG_IREF", 0x7).unwrap_err();
        assert!(matches!(err, XhalError::Rpc(_)));
    }
}
