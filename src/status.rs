// MIT License
// Copyright 2017--present xhal developers

//! Status codes and error reporting at the C boundary.
//!
//! Three pieces work together so that C/C++ and Python (`ctypes`) callers
//! get informative errors out of Rust:
//!
//! 1. **[`xhal_status_t`]**: the integer-valued code returned by every
//!    register-access function. `XHAL_SUCCESS` (0) means the call went
//!    through; `XHAL_REMOTE_ERROR` (1) means the board answered with an
//!    `"error"` field. Higher values are local failures.
//!
//! 2. **Thread-local error message**: on failure a human-readable
//!    description is stored in a thread-local `CString`. C callers fetch it
//!    with [`xhal_last_error()`]. The pointer stays valid until the next
//!    `xhal_*` call on the same thread.
//!
//! 3. **[`catch_unwind`]**: wraps every `extern "C"` body so Rust panics
//!    never unwind across the FFI boundary. A caught panic becomes
//!    `XHAL_INTERNAL_ERROR` with the panic message stored for retrieval.
//!
//! ## Usage from C
//!
//! ```c
//! uint32_t s = broadcastWrite(iface, 3, "CFG_VALUE", 0x1, 0xFF);
//! if (s != XHAL_SUCCESS) {
//!     fprintf(stderr, "xhal error: %s\n", xhal_last_error());
//! }
//! ```

use std::cell::RefCell;
use std::ffi::CString;
use std::os::raw::c_char;

use crate::error::XhalError;

/// Status codes returned by the register-access and session C functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum xhal_status_t {
    /// Operation completed successfully.
    XHAL_SUCCESS = 0,
    /// The remote side answered with an `"error"` field.
    XHAL_REMOTE_ERROR = 1,
    /// The session is not connected; nothing was sent.
    XHAL_NOT_CONNECTED = 2,
    /// The transport failed (connection lost, module load refused, ...).
    XHAL_RPC_ERROR = 3,
    /// An invalid parameter was passed (null pointer, out-of-range value).
    XHAL_INVALID_PARAMETER = 4,
    /// An internal error occurred (e.g. a Rust panic was caught).
    XHAL_INTERNAL_ERROR = 5,
}

impl xhal_status_t {
    /// Numeric code as returned through the `uint32_t` register functions.
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl From<&XhalError> for xhal_status_t {
    fn from(err: &XhalError) -> Self {
        match err {
            XhalError::Remote(_) => xhal_status_t::XHAL_REMOTE_ERROR,
            XhalError::NotConnected => xhal_status_t::XHAL_NOT_CONNECTED,
            XhalError::Connection(_) | XhalError::Rpc(_) => xhal_status_t::XHAL_RPC_ERROR,
            XhalError::InvalidParameter(_)
            | XhalError::Io { .. }
            | XhalError::CorruptResultsFile { .. } => {
                xhal_status_t::XHAL_INVALID_PARAMETER
            }
        }
    }
}

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

/// Store an error message in the thread-local slot.
pub(crate) fn set_last_error(msg: &str) {
    LAST_ERROR.with(|cell| {
        let c = CString::new(msg).unwrap_or_else(|_| {
            CString::from(c"(error message contained interior NUL)")
        });
        *cell.borrow_mut() = c;
    });
}

/// Clear the thread-local slot, used at the start of a successful call.
pub(crate) fn clear_last_error() {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = CString::default());
}

/// Retrieve a pointer to the last error message for the current thread.
///
/// The pointer is valid until the next call to any `xhal_*` or register
/// function on the same thread. An empty string means no error was recorded.
///
/// # Safety
/// This is intended to be called from C. The returned pointer must not
/// be freed by the caller.
#[no_mangle]
pub unsafe extern "C" fn xhal_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| cell.borrow().as_ptr())
}

/// Execute a closure, catching any panics and converting them to status codes.
///
/// On panic, stores the panic message in the thread-local error slot and
/// returns `XHAL_INTERNAL_ERROR`.
pub(crate) fn catch_unwind<F>(f: F) -> xhal_status_t
where
    F: FnOnce() -> xhal_status_t + std::panic::UnwindSafe,
{
    match std::panic::catch_unwind(f) {
        Ok(status) => status,
        Err(e) => {
            let msg = if let Some(s) = e.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = e.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            set_last_error(&msg);
            xhal_status_t::XHAL_INTERNAL_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn last_error() -> String {
        let ptr = unsafe { xhal_last_error() };
        let msg = unsafe { std::ffi::CStr::from_ptr(ptr) };
        msg.to_str().unwrap().to_owned()
    }

    #[test]
    fn test_set_and_get_last_error() {
        set_last_error("test error");
        assert_eq!(last_error(), "test error");
        clear_last_error();
        assert_eq!(last_error(), "");
    }

    #[test]
    fn interior_nul_is_replaced() {
        set_last_error("bad\0message");
        assert_eq!(last_error(), "(error message contained interior NUL)");
    }

    #[test]
    fn test_catch_unwind_success() {
        let status = catch_unwind(|| xhal_status_t::XHAL_SUCCESS);
        assert_eq!(status, xhal_status_t::XHAL_SUCCESS);
    }

    #[test]
    fn test_catch_unwind_panic() {
        let status = catch_unwind(|| panic!("boom"));
        assert_eq!(status, xhal_status_t::XHAL_INTERNAL_ERROR);
        assert_eq!(last_error(), "boom");
    }

    #[test]
    fn codes_match_register_contract() {
        assert_eq!(xhal_status_t::XHAL_SUCCESS.code(), 0);
        assert_eq!(xhal_status_t::XHAL_REMOTE_ERROR.code(), 1);
        assert_eq!(
            xhal_status_t::from(&XhalError::Remote("timeout".into())),
            xhal_status_t::XHAL_REMOTE_ERROR
        );
        assert_eq!(
            xhal_status_t::from(&XhalError::NotConnected),
            xhal_status_t::XHAL_NOT_CONNECTED
        );
        assert_eq!(
            xhal_status_t::from(&XhalError::Rpc("lost".into())),
            xhal_status_t::XHAL_RPC_ERROR
        );
    }
}
