// MIT License
// Copyright 2017--present xhal developers

//! C exports for OptoHybrid broadcast register access.
//!
//! Return values are plain `uint32_t`: 0 on success, 1 when the board
//! reported an error, and the higher [`xhal_status_t`] codes for local
//! failures. The message of any failure is available from
//! `xhal_last_error()`.

#![allow(non_snake_case)]

use std::os::raw::c_char;

use crate::c_api::{str_arg, with_session, xhal_interface_t};
use crate::rpc_manager::optohybrid::{broadcast_read, broadcast_write};

/// Broadcast read of `regName` from the VFATs in `vfatMask` on OptoHybrid
/// `ohN`.
///
/// # Safety
/// `iface` must be NULL or a live handle; `regName` must be NULL or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn broadcastRead(
    iface: *mut xhal_interface_t,
    ohN: u32,
    regName: *const c_char,
    vfatMask: u32,
) -> u32 {
    let status = unsafe {
        with_session(iface, "broadcastRead", |s| {
            match str_arg(regName, "broadcastRead", "regName") {
                Ok(reg) => broadcast_read(s, ohN, reg, vfatMask),
                Err(status) => status,
            }
        })
    };
    status.code()
}

/// Broadcast write of `value` to `regName` on the VFATs in `vfatMask` of
/// OptoHybrid `ohN`.
///
/// # Safety
/// `iface` must be NULL or a live handle; `regName` must be NULL or a
/// NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn broadcastWrite(
    iface: *mut xhal_interface_t,
    ohN: u32,
    regName: *const c_char,
    value: u32,
    vfatMask: u32,
) -> u32 {
    let status = unsafe {
        with_session(iface, "broadcastWrite", |s| {
            match str_arg(regName, "broadcastWrite", "regName") {
                Ok(reg) => broadcast_write(s, ohN, reg, value, vfatMask),
                Err(status) => status,
            }
        })
    };
    status.code()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c_api::interface::{xhal_interface_disconnect, xhal_interface_free};
    use crate::c_api::tests::{handle, last_error};
    use crate::message::{RpcMessage, ERROR_KEY};
    use crate::status::xhal_status_t;
    use crate::transport::mock::MockTransport;

    #[test]
    fn write_then_failing_read_scenario() {
        let mut timeout = RpcMessage::new("optohybrid.broadcastRead");
        timeout.set_string(ERROR_KEY, "timeout");
        let (mock, journal) = MockTransport::new();
        // the write is echoed, the read gets the error response
        let mock = mock
            .respond(Ok(RpcMessage::new("optohybrid.broadcastWrite")))
            .respond(Ok(timeout));
        let (iface, out) = handle(mock);
        assert_eq!(out.count("INFO"), out.lines().len());
        assert_eq!(out.count("RPC connected"), 1);

        unsafe {
            assert_eq!(broadcastWrite(iface, 3, c"CFG_VALUE".as_ptr(), 0x1, 0xFF), 0);
            assert_eq!(broadcastRead(iface, 3, c"CFG_VALUE".as_ptr(), 0xFF), 1);
            assert_eq!(last_error(), "Caught an error: timeout");
            xhal_interface_free(iface);
        }

        assert_eq!(out.count("Caught an error: timeout"), 1);
        let journal = journal.lock();
        assert_eq!(journal.requests.len(), 2);
        assert_eq!(journal.disconnects, 1);
        assert_eq!(out.count("RPC disconnected"), 1);
    }

    #[test]
    fn null_arguments_are_invalid() {
        let (mock, journal) = MockTransport::new();
        let (iface, _) = handle(mock);
        unsafe {
            assert_eq!(
                broadcastRead(iface, 0, std::ptr::null(), 0xFF),
                xhal_status_t::XHAL_INVALID_PARAMETER.code()
            );
            assert_eq!(last_error(), "broadcastRead: regName is NULL");
            assert_eq!(
                broadcastWrite(std::ptr::null_mut(), 0, c"CFG_VALUE".as_ptr(), 1, 0xFF),
                xhal_status_t::XHAL_INVALID_PARAMETER.code()
            );
            xhal_interface_free(iface);
        }
        assert!(journal.lock().requests.is_empty());
    }

    #[test]
    fn disconnected_handle_reports_not_connected() {
        let (mock, _) = MockTransport::new();
        let (iface, _) = handle(mock);
        unsafe {
            xhal_interface_disconnect(iface);
            assert_eq!(
                broadcastRead(iface, 0, c"CFG_VALUE".as_ptr(), 0xFF),
                xhal_status_t::XHAL_NOT_CONNECTED.code()
            );
            xhal_interface_free(iface);
        }
    }
}
