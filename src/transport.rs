// MIT License
// Copyright 2017--present xhal developers

//! The transport seam.
//!
//! [`Transport`] is the named-message RPC client the session drives. The
//! crate ships one implementation, the Cap'n Proto client in
//! [`crate::rpc::client`] (feature `rpc`); anything else that can connect to
//! a board and exchange [`RpcMessage`]s can be plugged in.

use crate::error::TransportError;
use crate::message::RpcMessage;

/// A blocking, named-message RPC client bound to at most one remote board.
pub trait Transport {
    /// Connect to the board control service at `host`.
    fn connect(&mut self, host: &str) -> Result<(), TransportError>;

    /// Drop the connection. Returns [`TransportError::NotConnected`] if
    /// there is none.
    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Ask the remote side to load `name` at `version`.
    fn load_module(&mut self, name: &str, version: &str) -> Result<bool, TransportError>;

    /// Send `request` and wait for the response.
    fn call_method(&mut self, request: &RpcMessage) -> Result<RpcMessage, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self, host: &str) -> Result<(), TransportError> {
        (**self).connect(host)
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        (**self).disconnect()
    }

    fn load_module(&mut self, name: &str, version: &str) -> Result<bool, TransportError> {
        (**self).load_module(name, version)
    }

    fn call_method(&mut self, request: &RpcMessage) -> Result<RpcMessage, TransportError> {
        (**self).call_method(request)
    }
}
