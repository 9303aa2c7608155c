// MIT License
// Copyright 2017--present xhal developers

//! C API for the session lifecycle.
//!
//! ```c
//! // 1. Create (connects immediately); NULL on failure
//! xhal_interface_t *iface = xhal_interface_new("eagle60", 0);
//! if (!iface) { fprintf(stderr, "%s\n", xhal_last_error()); return 1; }
//!
//! // 2. Load the board modules the register functions need
//! xhal_interface_load_module(iface, "optohybrid", "optohybrid v1.0.1");
//!
//! // 3. Register access
//! uint32_t s = broadcastWrite(iface, 3, "CFG_VALUE", 0x1, 0xFF);
//!
//! // 4. Disconnect and release
//! xhal_interface_free(iface);
//! ```

use std::os::raw::{c_char, c_int};

use crate::c_api::{str_arg, with_session, xhal_interface_t};
use crate::status::{catch_unwind, set_last_error, xhal_status_t};

/// Create a session to board `domain` using the Cap'n Proto transport and
/// connect it.
///
/// `instance_id` distinguishes the logger names of sessions in one process.
/// The port and initial log level come from `XHAL_RPC_PORT` and
/// `XHAL_LOG_LEVEL` when set.
///
/// Returns a heap-allocated handle, or `NULL` on failure. The caller must
/// eventually call `xhal_interface_free`.
///
/// # Safety
/// `domain` must be NULL or a NUL-terminated string.
#[cfg(feature = "rpc")]
#[no_mangle]
pub unsafe extern "C" fn xhal_interface_new(
    domain: *const c_char,
    instance_id: u32,
) -> *mut xhal_interface_t {
    use crate::c_api::InterfaceHandle;
    use crate::config::XhalConfig;
    use crate::interface::XhalInterface;
    use crate::logging::InstanceId;
    use crate::rpc::client::CapnpTransport;
    use crate::transport::Transport;

    let result = std::panic::catch_unwind(|| {
        let domain = match unsafe { str_arg(domain, "xhal_interface_new", "domain") } {
            Ok(d) => d,
            Err(_) => return std::ptr::null_mut(),
        };
        let config = XhalConfig::from_env();
        let transport: Box<dyn Transport> = match CapnpTransport::new(config.port) {
            Ok(t) => Box::new(t),
            Err(e) => {
                set_last_error(&format!("xhal_interface_new: {e}"));
                return std::ptr::null_mut();
            }
        };
        match XhalInterface::with_config(domain, transport, InstanceId(instance_id), &config) {
            Ok(session) => InterfaceHandle::new(session).into_raw(),
            Err(e) => {
                set_last_error(&format!("xhal_interface_new: {e}"));
                std::ptr::null_mut()
            }
        }
    });
    result.unwrap_or_else(|_| {
        set_last_error("xhal_interface_new: internal error");
        std::ptr::null_mut()
    })
}

/// Connect the session. A session that is already connected is left alone.
///
/// # Safety
/// `iface` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn xhal_interface_connect(iface: *mut xhal_interface_t) -> xhal_status_t {
    unsafe {
        with_session(iface, "xhal_interface_connect", |s| match s.connect() {
            Ok(()) => xhal_status_t::XHAL_SUCCESS,
            Err(e) => {
                set_last_error(&format!("xhal_interface_connect: {e}"));
                xhal_status_t::from(&e)
            }
        })
    }
}

/// Disconnect the session. Disconnecting twice is not an error.
///
/// # Safety
/// `iface` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn xhal_interface_disconnect(iface: *mut xhal_interface_t) -> xhal_status_t {
    unsafe {
        with_session(iface, "xhal_interface_disconnect", |s| match s.disconnect() {
            Ok(()) => xhal_status_t::XHAL_SUCCESS,
            Err(e) => {
                set_last_error(&format!("xhal_interface_disconnect: {e}"));
                xhal_status_t::from(&e)
            }
        })
    }
}

/// Ask the board to load module `name` at `version`.
///
/// # Safety
/// `iface` must be NULL or a live handle; `name` and `version` must be NULL
/// or NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn xhal_interface_load_module(
    iface: *mut xhal_interface_t,
    name: *const c_char,
    version: *const c_char,
) -> xhal_status_t {
    const FUNC: &str = "xhal_interface_load_module";
    unsafe {
        with_session(iface, FUNC, |s| {
            let name = match str_arg(name, FUNC, "name") {
                Ok(n) => n,
                Err(status) => return status,
            };
            let version = match str_arg(version, FUNC, "version") {
                Ok(v) => v,
                Err(status) => return status,
            };
            match s.load_module(name, version) {
                Ok(()) => xhal_status_t::XHAL_SUCCESS,
                Err(e) => {
                    set_last_error(&format!("{FUNC}: {e}"));
                    xhal_status_t::from(&e)
                }
            }
        })
    }
}

/// Set the session log level: 0 = ERROR, 1 = WARN, 2 = INFO, 3 = DEBUG,
/// 4 = TRACE. Other values are ignored.
///
/// # Safety
/// `iface` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn xhal_interface_set_log_level(iface: *mut xhal_interface_t, level: c_int) {
    unsafe {
        with_session(iface, "xhal_interface_set_log_level", |s| {
            s.set_log_level_raw(level);
            xhal_status_t::XHAL_SUCCESS
        });
    }
}

/// Whether the session is currently connected. NULL reads as disconnected.
///
/// # Safety
/// `iface` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn xhal_interface_is_connected(iface: *mut xhal_interface_t) -> bool {
    if iface.is_null() {
        return false;
    }
    unsafe { &*iface }.session.lock().is_connected()
}

/// Disconnect and free a session handle.
///
/// If `iface` is `NULL`, this is a no-op. After this call, `iface` must not
/// be used again. A panic while tearing the session down is recorded in
/// [`xhal_last_error`](crate::status::xhal_last_error).
///
/// # Safety
/// `iface` must be NULL or a live handle.
#[no_mangle]
pub unsafe extern "C" fn xhal_interface_free(iface: *mut xhal_interface_t) {
    if iface.is_null() {
        return;
    }
    let handle = unsafe { Box::from_raw(iface) };
    catch_unwind(std::panic::AssertUnwindSafe(move || {
        drop(handle);
        xhal_status_t::XHAL_SUCCESS
    }));
}
