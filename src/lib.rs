// MIT License
// Copyright 2017--present xhal developers

//! Register access for OptoHybrid front-end boards over RPC.
//!
//! `xhal-core` is the host side of the xhal stack: a session to one board's
//! control service ([`interface::XhalInterface`]) and register-access
//! functions ([`rpc_manager`]) that turn each call into a named RPC request
//! and the answer into a status code. The board-side modules and firmware do
//! the actual register work.
//!
//! The same surface is exported to C (and to Python through `ctypes`) by
//! [`c_api`]; build with `--features gen-header` to regenerate
//! `include/xhal.h`.
//!
//! ## Modules
//!
//! - [`interface`]: session lifecycle, module loading, log level.
//! - [`rpc_manager`]: `optohybrid` broadcast access and `gbt` phase and
//!   configuration functions.
//! - [`message`] / [`transport`]: the request/response type and the
//!   transport seam.
//! - [`rpc`]: the Cap'n Proto transport (feature `rpc`).
//! - [`logging`], [`config`], [`error`], [`status`]: ambient pieces.
//!
//! ## Features
//!
//! - `rpc`: Cap'n Proto transport and `xhal_interface_new`.
//! - `gen-header`: regenerate the C header with cbindgen.

#![allow(non_camel_case_types)]

pub mod c_api;
pub mod config;
pub mod error;
pub mod interface;
pub mod logging;
pub mod message;
pub mod rpc_manager;
pub mod status;
pub mod transport;

#[cfg(feature = "rpc")]
pub mod xhal_capnp {
    include!(concat!(env!("OUT_DIR"), "/xhal_capnp.rs"));
}

#[cfg(feature = "rpc")]
pub mod rpc;
