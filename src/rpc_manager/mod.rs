// MIT License
// Copyright 2017--present xhal developers

//! Register-access functions.
//!
//! Every function here has the same shape: build a named [`RpcMessage`],
//! send it through the caller's session with [`execute`], and turn the
//! outcome into an [`xhal_status_t`] with [`into_status`]. Nothing is
//! retried and no state is kept between calls.
//!
//! `into_status` is the single failure policy for all of them: failures are
//! logged on the session logger, recorded as the thread's last error and
//! returned as a non-zero code. They are never propagated as panics.
//!
//! - [`optohybrid`]: broadcast register reads and writes across the VFATs
//!   of one OptoHybrid.
//! - [`gbt`]: GBTx configuration and VFAT phase alignment.

pub mod gbt;
pub mod optohybrid;

use crate::error::{Result, XhalError};
use crate::interface::XhalInterface;
use crate::message::RpcMessage;
use crate::status::{clear_last_error, set_last_error, xhal_status_t};
use crate::transport::Transport;

/// Send `request` and fail with [`XhalError::Remote`] if the board answered
/// with an `"error"` field.
pub fn execute<T: Transport>(
    iface: &mut XhalInterface<T>,
    request: &RpcMessage,
) -> Result<RpcMessage> {
    let response = iface.call(request)?;
    match response.error() {
        Some(msg) => Err(XhalError::Remote(msg)),
        None => Ok(response),
    }
}

/// Log a failed register call and map any outcome to its status code.
pub fn into_status<T: Transport, R>(
    iface: &XhalInterface<T>,
    outcome: Result<R>,
) -> xhal_status_t {
    match outcome {
        Ok(_) => {
            clear_last_error();
            xhal_status_t::XHAL_SUCCESS
        }
        Err(e) => {
            let msg = e.to_string();
            iface.logger().error(&msg);
            set_last_error(&msg);
            xhal_status_t::from(&e)
        }
    }
}
