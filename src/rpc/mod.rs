// MIT License
// Copyright 2017--present xhal developers

//! Cap'n Proto transport to the board control service.
//!
//! This module is only compiled when the `rpc` Cargo feature is enabled.
//!
//! ## Schema
//!
//! [`schema`] is the Rust code generated from `schema/xhal.capnp` by
//! `capnpc` during `build.rs`. It defines:
//!
//! - `Field` / `Message`: the wire form of [`RpcMessage`](crate::message::RpcMessage).
//! - `RpcService`: `loadModule` and `callMethod`.
//!
//! ## Client
//!
//! [`client::CapnpTransport`] implements [`Transport`](crate::transport::Transport)
//! over TCP. It owns a tokio runtime and a `LocalSet` so the blocking
//! session API can drive the async, `!Send` RPC system between calls.

pub use crate::xhal_capnp as schema;

pub mod client;
