// MIT License
// Copyright 2017--present xhal developers

//! Public C API entry points.
//!
//! Each submodule exposes `extern "C"` functions that cbindgen collects into
//! `include/xhal.h`. All functions in this module follow three invariants:
//!
//! 1. **Return a status** ([`xhal_status_t`], or its `uint32_t` value for the
//!    register functions whose ABI predates the enum) or a pointer / void
//!    for constructors and destructors.
//! 2. **Wrap the body in [`catch_unwind`]** to prevent panics from crossing
//!    the FFI boundary.
//! 3. **Validate pointer arguments** and call [`set_last_error`] before
//!    returning a non-success status.
//!
//! Every function takes the session handle explicitly; there is no
//! process-wide "current" session.
//!
//! ## Submodules
//!
//! - [`interface`]: lifecycle of [`xhal_interface_t`]: create, connect,
//!   disconnect, load modules, set the log level, free.
//! - [`optohybrid`]: `broadcastRead` / `broadcastWrite`.
//! - [`gbt`]: `writeGBTConfig` / `writeGBTPhase` / `scanGBTPhases`.

pub mod gbt;
pub mod interface;
pub mod optohybrid;

use std::ffi::CStr;
use std::os::raw::c_char;

use parking_lot::Mutex;

use crate::interface::XhalInterface;
use crate::status::{catch_unwind, set_last_error, xhal_status_t};
use crate::transport::Transport;

/// A session shared with C, serialized behind a mutex.
pub struct InterfaceHandle {
    session: Mutex<XhalInterface<Box<dyn Transport>>>,
}

impl InterfaceHandle {
    pub fn new(session: XhalInterface<Box<dyn Transport>>) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    /// Move the handle to the heap and give up ownership to C.
    pub fn into_raw(self) -> *mut xhal_interface_t {
        Box::into_raw(Box::new(self))
    }
}

/// Opaque session handle exposed to C as `xhal_interface_t`.
pub type xhal_interface_t = InterfaceHandle;

/// Borrow a C string argument as UTF-8.
///
/// # Safety
/// `ptr` must be NULL or point to a NUL-terminated string.
unsafe fn str_arg<'a>(
    ptr: *const c_char,
    func: &str,
    name: &str,
) -> Result<&'a str, xhal_status_t> {
    if ptr.is_null() {
        set_last_error(&format!("{func}: {name} is NULL"));
        return Err(xhal_status_t::XHAL_INVALID_PARAMETER);
    }
    unsafe { CStr::from_ptr(ptr) }.to_str().map_err(|e| {
        set_last_error(&format!("{func}: invalid {name} string: {e}"));
        xhal_status_t::XHAL_INVALID_PARAMETER
    })
}

/// Lock the session behind `iface` and run `f` on it, catching panics.
///
/// # Safety
/// `iface` must be NULL or a live handle from `xhal_interface_new` /
/// [`InterfaceHandle::into_raw`].
unsafe fn with_session<F>(iface: *mut xhal_interface_t, func: &str, f: F) -> xhal_status_t
where
    F: FnOnce(&mut XhalInterface<Box<dyn Transport>>) -> xhal_status_t,
{
    catch_unwind(std::panic::AssertUnwindSafe(|| {
        if iface.is_null() {
            set_last_error(&format!("{func}: iface is NULL"));
            return xhal_status_t::XHAL_INVALID_PARAMETER;
        }
        let handle = unsafe { &*iface };
        let mut session = handle.session.lock();
        f(&mut session)
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::logging::capture::{logger, Capture};
    use crate::transport::mock::MockTransport;

    pub(crate) fn handle(mock: MockTransport) -> (*mut xhal_interface_t, Capture) {
        let (log, out) = logger("XHALInterface_eagle60_0");
        let transport: Box<dyn Transport> = Box::new(mock);
        let session = XhalInterface::with_logger("eagle60", transport, log).unwrap();
        (InterfaceHandle::new(session).into_raw(), out)
    }

    pub(crate) fn last_error() -> String {
        let ptr = unsafe { crate::status::xhal_last_error() };
        unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_owned()
    }

    #[test]
    fn null_handle_is_rejected() {
        let status = unsafe { with_session(std::ptr::null_mut(), "f", |_| unreachable!()) };
        assert_eq!(status, xhal_status_t::XHAL_INVALID_PARAMETER);
        assert_eq!(last_error(), "f: iface is NULL");
    }

    #[test]
    fn panics_inside_a_session_call_are_caught() {
        let (mock, _) = MockTransport::new();
        let (iface, _) = handle(mock);
        let status = unsafe { with_session(iface, "f", |_| panic!("register map corrupt")) };
        assert_eq!(status, xhal_status_t::XHAL_INTERNAL_ERROR);
        assert_eq!(last_error(), "register map corrupt");

        // the lock was released by the unwind
        let status = unsafe { with_session(iface, "f", |s| {
            assert!(s.is_connected());
            xhal_status_t::XHAL_SUCCESS
        }) };
        assert_eq!(status, xhal_status_t::XHAL_SUCCESS);
        unsafe { interface::xhal_interface_free(iface) };
    }

    #[test]
    fn str_arg_validates() {
        let ok = c"CFG_VALUE";
        assert_eq!(unsafe { str_arg(ok.as_ptr(), "f", "regName") }, Ok("CFG_VALUE"));
        assert_eq!(
            unsafe { str_arg(std::ptr::null(), "f", "regName") },
            Err(xhal_status_t::XHAL_INVALID_PARAMETER)
        );
        assert_eq!(last_error(), "f: regName is NULL");

        let bad = [0xffu8, 0xfe, 0];
        assert!(unsafe { str_arg(bad.as_ptr().cast(), "f", "regName") }.is_err());
    }
}
