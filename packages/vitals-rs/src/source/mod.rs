// Pluggable device sources
//
// The `DeviceSource` trait gives the engine one contract for every place
// readings can come from: a stream of `SourceEvent::Data` readings and
// `SourceEvent::Error` notifications pushed through an mpsc channel. The
// engine, cache and capture session never know which variant is live.
//
// Current implementations:
// - Serial: physical or virtual serial port speaking one of the line formats
// - Simulated: synthetic vitals at a randomized cadence, for demos and tests
//
// New sources are added by implementing the trait, adding a variant to
// `SourceConfig` and a match arm in `create_source`.

mod serial;
mod simulated;

use crate::config::SerialConfig;
use crate::error::Result;
use crate::types::Reading;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use serial::{PortInfo, SerialSource};
pub use simulated::{SimulatedSource, SIMULATED_PERIOD_MS};

/// Configuration for the available source types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SourceConfig {
    /// Serial port connection (e.g., /dev/ttyACM0 on Linux, COM3 on Windows)
    #[serde(rename = "serial")]
    Serial(SerialConfig),

    /// Synthetic vitals; a seed makes the stream reproducible
    #[serde(rename = "simulated")]
    Simulated {
        #[serde(default)]
        seed: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Serial,
    Simulated,
    /// Sources supplied by embedding code through `VitalsEngine::connect_source`
    Custom,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Serial => "serial",
            SourceKind::Simulated => "simulated",
            SourceKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Something a live source reports to the engine
#[derive(Debug, Clone)]
pub enum SourceEvent {
    /// A successfully parsed reading
    Data(Reading),

    /// Setup or mid-stream failure; the source is disconnected afterwards
    Error(String),
}

/// Descriptive information about a source, for status displays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub kind: SourceKind,

    /// Human-readable connection target (port name, "simulator", ...)
    pub target: String,

    /// Source-specific properties (baud rate, tick period, ...)
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Read-only view of a source that stays usable while the source streams.
///
/// The engine holds the source itself for the whole stream, so status
/// queries go through this handle instead.
pub trait SourceMonitor: Send + Sync {
    fn snapshot(&self) -> SourceMetadata;
}

/// A fixed description, for sources without live counters
impl SourceMonitor for SourceMetadata {
    fn snapshot(&self) -> SourceMetadata {
        self.clone()
    }
}

/// Trait for all device sources
///
/// # Extension Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use tokio::sync::mpsc;
/// use vitals_rs::source::{DeviceSource, SourceEvent, SourceKind, SourceMetadata};
///
/// pub struct BleCuff { /* ... */ }
///
/// #[async_trait]
/// impl DeviceSource for BleCuff {
///     async fn open(&mut self) -> vitals_rs::Result<()> { Ok(()) }
///
///     async fn start(&mut self, sender: mpsc::Sender<SourceEvent>) -> vitals_rs::Result<()> {
///         loop {
///             let line = self.next_notification().await?;
///             if let Some(reading) = vitals_rs::parse_line(&line) {
///                 if sender.send(SourceEvent::Data(reading)).await.is_err() {
///                     return Ok(());
///                 }
///             }
///         }
///     }
///
///     async fn close(&mut self) -> vitals_rs::Result<()> { Ok(()) }
///     fn is_connected(&self) -> bool { true }
///     fn kind(&self) -> SourceKind { SourceKind::Custom }
///     fn describe(&self) -> SourceMetadata { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait DeviceSource: Send + Sync {
    /// Establish the connection. Calling it on an open source is a no-op.
    async fn open(&mut self) -> Result<()>;

    /// Emit events until stopped, the receiver goes away, or the device fails.
    ///
    /// Must not emit anything after returning.
    async fn start(&mut self, sender: mpsc::Sender<SourceEvent>) -> Result<()>;

    /// Release the device. Idempotent and safe on a source never opened.
    async fn close(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    fn kind(&self) -> SourceKind;

    fn describe(&self) -> SourceMetadata;

    /// Handle reporting this source's metadata without borrowing it.
    ///
    /// Defaults to the description taken when the handle is created.
    fn monitor(&self) -> Arc<dyn SourceMonitor> {
        Arc::new(self.describe())
    }
}

/// Build a source from configuration
pub fn create_source(config: SourceConfig) -> Box<dyn DeviceSource> {
    match config {
        SourceConfig::Serial(serial) => Box::new(SerialSource::new(serial)),
        SourceConfig::Simulated { seed } => Box::new(match seed {
            Some(seed) => SimulatedSource::with_seed(seed),
            None => SimulatedSource::new(),
        }),
    }
}
