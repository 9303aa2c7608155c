// MIT License
// Copyright 2017--present xhal developers

//! Error types for the session and transport layers.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The connection to the remote service could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    /// The operation needs a live connection and there is none.
    #[error("not connected: {0}")]
    NotConnected(String),
    /// Any other RPC-level failure.
    #[error("{0}")]
    Rpc(String),
}

impl TransportError {
    /// The bare message carried by the error, without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            TransportError::ConnectionFailed(m)
            | TransportError::NotConnected(m)
            | TransportError::Rpc(m) => m,
        }
    }
}

/// Errors surfaced by [`XhalInterface`](crate::interface::XhalInterface) and
/// the register-access functions.
#[derive(Debug, Error)]
pub enum XhalError {
    /// The session could not connect to the board.
    #[error("{0}")]
    Connection(String),
    /// A transport call failed for a reason other than "not connected".
    #[error("{0}")]
    Rpc(String),
    /// A register call was attempted on a disconnected session.
    #[error("session is not connected")]
    NotConnected,
    /// The call succeeded at transport level but the board reported an error.
    #[error("Caught an error: {0}")]
    Remote(String),
    /// A parameter was rejected before anything was sent.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Reading or writing a local file failed.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// An existing file is not a phase scan results file.
    #[error("{path:?} is either corrupted or not a GBT phase scan results file ({reason})")]
    CorruptResultsFile { path: PathBuf, reason: &'static str },
}

impl XhalError {
    /// Wrap a transport error raised while connecting.
    pub(crate) fn connection(err: &TransportError) -> Self {
        match err {
            TransportError::ConnectionFailed(m) => {
                XhalError::Connection(format!("RPC ConnectionFailedException: {m}"))
            }
            other => XhalError::Connection(format!("RPC exception: {}", other.message())),
        }
    }

    /// Wrap a transport error raised by any call other than connect.
    pub(crate) fn rpc(err: &TransportError) -> Self {
        XhalError::Rpc(format!("RPC exception: {}", err.message()))
    }
}

pub type Result<T> = std::result::Result<T, XhalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_failure_keeps_transport_message() {
        let err = XhalError::connection(&TransportError::ConnectionFailed("no route".into()));
        assert_eq!(err.to_string(), "RPC ConnectionFailedException: no route");

        let err = XhalError::connection(&TransportError::Rpc("refused".into()));
        assert_eq!(err.to_string(), "RPC exception: refused");
    }

    #[test]
    fn remote_error_renders_like_the_board_log() {
        let err = XhalError::Remote("timeout".into());
        assert_eq!(err.to_string(), "Caught an error: timeout");
    }

    #[test]
    fn rpc_wraps_message_only() {
        let err = XhalError::rpc(&TransportError::NotConnected("closed".into()));
        assert_eq!(err.to_string(), "RPC exception: closed");
    }
}
