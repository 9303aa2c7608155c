// MIT License
// Copyright 2017--present xhal developers

//! Per-session leveled logger.
//!
//! All sessions emit through one process-wide `tracing` dispatcher: a
//! registry with a [`SessionRouter`] layer. While a [`SessionLogger`] emits,
//! its sink (level plus `fmt` layer) is installed as the thread's current
//! sink and the router forwards the event to it. Two sessions in one process
//! can run at different verbosities, and the global subscriber the host
//! application may have installed is left alone.
//!
//! The logger name (`XHALInterface_<domain>_<id>`) is attached to every
//! event as the `logger` field.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::subscriber::Interest;
use tracing::{Dispatch, Event, Metadata};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

use crate::error::XhalError;

/// Verbosity levels, numbered as the C API and Python bindings pass them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Parse a level name such as `"debug"` (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

impl TryFrom<i32> for LogLevel {
    type Error = XhalError;

    fn try_from(value: i32) -> Result<Self, XhalError> {
        match value {
            0 => Ok(LogLevel::Error),
            1 => Ok(LogLevel::Warn),
            2 => Ok(LogLevel::Info),
            3 => Ok(LogLevel::Debug),
            4 => Ok(LogLevel::Trace),
            other => Err(XhalError::InvalidParameter(format!(
                "unknown log level {other}"
            ))),
        }
    }
}

/// Identifier disambiguating logger names of sessions in one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out increasing [`InstanceId`]s. Owned by whoever creates sessions.
#[derive(Debug, Default)]
pub struct InstanceIdAllocator {
    next: AtomicU32,
}

impl InstanceIdAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    pub fn next_id(&self) -> InstanceId {
        InstanceId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Logger name for the session talking to `domain`.
pub fn logger_name(domain: &str, id: InstanceId) -> String {
    format!("XHALInterface_{domain}_{id}")
}

type SinkLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Output of one session: its level and the layer formatting its events.
struct Sink {
    filter: RwLock<LevelFilter>,
    layer: SinkLayer,
}

thread_local! {
    static CURRENT_SINK: RefCell<Option<Arc<Sink>>> = const { RefCell::new(None) };
}

/// Forwards each event to the sink of the session emitting it.
struct SessionRouter;

impl SessionRouter {
    fn with_current<R>(f: impl FnOnce(&Sink) -> R) -> Option<R> {
        CURRENT_SINK.with(|current| current.borrow().as_deref().map(f))
    }
}

impl Layer<Registry> for SessionRouter {
    fn register_callsite(&self, _: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        Some(LevelFilter::TRACE)
    }

    fn enabled(&self, metadata: &Metadata<'_>, _: Context<'_, Registry>) -> bool {
        Self::with_current(|sink| *metadata.level() <= *sink.filter.read()).unwrap_or(false)
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, Registry>) {
        Self::with_current(|sink| sink.layer.on_event(event, ctx));
    }
}

fn shared_dispatch() -> &'static Dispatch {
    static DISPATCH: OnceLock<Dispatch> = OnceLock::new();
    DISPATCH.get_or_init(|| Dispatch::new(Registry::default().with(SessionRouter)))
}

/// A named console logger with its own settable level.
pub struct SessionLogger {
    name: String,
    level: LogLevel,
    sink: Option<Arc<Sink>>,
}

impl SessionLogger {
    /// Logger writing to standard output at INFO.
    pub fn console(name: impl Into<String>) -> Self {
        Self::with_writer(name, BoxMakeWriter::new(std::io::stdout))
    }

    /// Logger writing to `writer` at INFO.
    pub fn with_writer(name: impl Into<String>, writer: BoxMakeWriter) -> Self {
        let level = LogLevel::Info;
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false)
            .boxed();
        Self {
            name: name.into(),
            level,
            sink: Some(Arc::new(Sink {
                filter: RwLock::new(level.as_filter()),
                layer,
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn set_level(&mut self, level: LogLevel) {
        if let Some(sink) = &self.sink {
            *sink.filter.write() = level.as_filter();
        }
        self.level = level;
    }

    /// Stop emitting. Later calls to the logging methods are no-ops.
    pub fn shutdown(&mut self) {
        self.sink = None;
    }

    pub fn is_shut_down(&self) -> bool {
        self.sink.is_none()
    }

    pub fn log(&self, level: LogLevel, msg: impl fmt::Display) {
        let Some(sink) = &self.sink else {
            return;
        };
        let logger = self.name.as_str();
        CURRENT_SINK.with(|current| {
            let previous = current.replace(Some(Arc::clone(sink)));
            tracing::dispatcher::with_default(shared_dispatch(), || match level {
                LogLevel::Error => tracing::error!(logger, "{msg}"),
                LogLevel::Warn => tracing::warn!(logger, "{msg}"),
                LogLevel::Info => tracing::info!(logger, "{msg}"),
                LogLevel::Debug => tracing::debug!(logger, "{msg}"),
                LogLevel::Trace => tracing::trace!(logger, "{msg}"),
            });
            current.replace(previous);
        });
    }

    pub fn error(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Error, msg);
    }

    pub fn warn(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Warn, msg);
    }

    pub fn info(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Info, msg);
    }

    pub fn debug(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Debug, msg);
    }

    pub fn trace(&self, msg: impl fmt::Display) {
        self.log(LogLevel::Trace, msg);
    }
}

impl fmt::Debug for SessionLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLogger")
            .field("name", &self.name)
            .field("level", &self.level)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
