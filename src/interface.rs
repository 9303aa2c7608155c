// MIT License
// Copyright 2017--present xhal developers

//! The RPC session to one board.
//!
//! [`XhalInterface`] owns a [`Transport`] and a [`SessionLogger`]. Creating
//! one connects immediately; dropping it disconnects and shuts the logger
//! down. All state-changing operations take `&mut self`, so a register call
//! can never overlap a connect or disconnect on the same session.
//!
//! ```no_run
//! # #[cfg(feature = "rpc")]
//! # fn demo() -> xhal_core::error::Result<()> {
//! use xhal_core::interface::XhalInterface;
//! use xhal_core::logging::InstanceIdAllocator;
//! use xhal_core::rpc::client::CapnpTransport;
//!
//! let ids = InstanceIdAllocator::new();
//! let transport = CapnpTransport::new(87)?;
//! let mut iface = XhalInterface::new("eagle60", transport, ids.next_id())?;
//! iface.load_module("optohybrid", "optohybrid v1.0.1")?;
//! # Ok(())
//! # }
//! ```

use crate::config::XhalConfig;
use crate::error::{Result, TransportError, XhalError};
use crate::logging::{logger_name, InstanceId, LogLevel, SessionLogger};
use crate::message::RpcMessage;
use crate::transport::Transport;

pub struct XhalInterface<T: Transport> {
    board_domain_name: String,
    connected: bool,
    opened: bool,
    logger: SessionLogger,
    transport: T,
}

impl<T: Transport> XhalInterface<T> {
    /// Create a session with a console logger named after `domain` and `id`,
    /// and connect it.
    pub fn new(domain: impl Into<String>, transport: T, id: InstanceId) -> Result<Self> {
        let domain = domain.into();
        let logger = SessionLogger::console(logger_name(&domain, id));
        Self::with_logger(domain, transport, logger)
    }

    /// Create and connect a session using `config` for the initial log level.
    pub fn with_config(
        domain: impl Into<String>,
        transport: T,
        id: InstanceId,
        config: &XhalConfig,
    ) -> Result<Self> {
        let domain = domain.into();
        let mut logger = SessionLogger::console(logger_name(&domain, id));
        logger.set_level(config.log_level);
        Self::open(domain, transport, logger)
    }

    /// Create a session that logs through a caller supplied logger, and
    /// connect it. The logger is reset to INFO.
    pub fn with_logger(
        domain: impl Into<String>,
        transport: T,
        mut logger: SessionLogger,
    ) -> Result<Self> {
        logger.set_level(LogLevel::Info);
        Self::open(domain.into(), transport, logger)
    }

    fn open(board_domain_name: String, transport: T, logger: SessionLogger) -> Result<Self> {
        let mut iface = Self {
            board_domain_name,
            connected: false,
            opened: false,
            logger,
            transport,
        };
        iface.logger.info("XHAL Logger tuned up");
        iface.connect()?;
        iface.opened = true;
        iface.logger.info("XHAL Interface connected");
        Ok(iface)
    }

    pub fn board_domain_name(&self) -> &str {
        &self.board_domain_name
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn logger(&self) -> &SessionLogger {
        &self.logger
    }

    /// Connect the transport to the board.
    ///
    /// Connecting a session that is already connected does nothing.
    pub fn connect(&mut self) -> Result<()> {
        if self.connected {
            self.logger.debug(format_args!(
                "Already connected to {}, ignoring connect",
                self.board_domain_name
            ));
            return Ok(());
        }
        match self.transport.connect(&self.board_domain_name) {
            Ok(()) => {
                self.connected = true;
                self.logger.info("RPC connected");
                Ok(())
            }
            Err(e) => {
                match &e {
                    TransportError::ConnectionFailed(m) => self
                        .logger
                        .error(format_args!("Caught RPCErrorException: {m}")),
                    other => self
                        .logger
                        .error(format_args!("Caught exception: {}", other.message())),
                }
                Err(XhalError::connection(&e))
            }
        }
    }

    /// Tear down the connection.
    ///
    /// A transport reporting "not connected" is logged and treated as done.
    pub fn disconnect(&mut self) -> Result<()> {
        match self.transport.disconnect() {
            Ok(()) => {
                self.logger.info("RPC disconnected");
                self.connected = false;
                Ok(())
            }
            Err(TransportError::NotConnected(m)) => {
                self.logger
                    .info(format_args!("Caught RPCNotConnectedException: {m}"));
                self.connected = false;
                Ok(())
            }
            Err(e) => {
                self.logger
                    .error(format_args!("Caught exception: {}", e.message()));
                Err(XhalError::rpc(&e))
            }
        }
    }

    /// Ask the board to load `name` at `version`.
    pub fn load_module(&mut self, name: &str, version: &str) -> Result<()> {
        match self.transport.load_module(name, version) {
            Ok(true) => {
                self.logger
                    .debug(format_args!("Loaded module {name} ({version})"));
                Ok(())
            }
            Ok(false) => {
                let msg = format!("RPC exception: failed to load module {name} ({version})");
                self.logger.error(&msg);
                Err(XhalError::Rpc(msg))
            }
            Err(e) => {
                self.logger
                    .error(format_args!("Caught exception: {}", e.message()));
                Err(XhalError::rpc(&e))
            }
        }
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.logger.set_level(level);
    }

    /// Set the level from its number (0 = ERROR .. 4 = TRACE).
    ///
    /// Out-of-range values leave the level unchanged.
    pub fn set_log_level_raw(&mut self, level: i32) {
        if let Ok(level) = LogLevel::try_from(level) {
            self.logger.set_level(level);
        }
    }

    /// Send `request` over the session and return the raw response.
    ///
    /// Fails with [`XhalError::NotConnected`] without touching the transport
    /// when the session is disconnected. The response is returned even if it
    /// carries an `"error"` field; see [`crate::rpc_manager::execute`].
    pub fn call(&mut self, request: &RpcMessage) -> Result<RpcMessage> {
        if !self.connected {
            return Err(XhalError::NotConnected);
        }
        self.logger
            .trace(format_args!("Calling {}", request.method()));
        self.transport
            .call_method(request)
            .map_err(|e| XhalError::rpc(&e))
    }
}

impl<T: Transport> Drop for XhalInterface<T> {
    fn drop(&mut self) {
        // A session whose construction failed was never connected.
        if self.opened {
            if let Err(e) = self.disconnect() {
                self.logger
                    .error(format_args!("Disconnect on drop failed: {e}"));
            }
        }
        self.logger.shutdown();
    }
}
