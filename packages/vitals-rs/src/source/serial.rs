// Serial port device source
//
// Connects to a serial port (e.g., /dev/ttyACM0, /dev/tty.usbmodem1101, COM3)
// and receives newline-delimited readings in any of the formats understood by
// `parse_line`. Unrecognized lines (boot banners, partial writes) are skipped.
//
// Useful for:
// - Arduino-based vitals rigs (pulse oximeter + thermometer + breathalyzer)
// - USB-serial bridges on commercial monitors
// - Virtual serial pairs (socat, com0com) for bench testing

use super::{DeviceSource, SourceEvent, SourceKind, SourceMetadata, SourceMonitor};
use crate::config::SerialConfig;
use crate::error::{Result, VitalsError};
use crate::parser::parse_line;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};

/// Longer lines are discarded; a device that never sends a newline must not
/// grow the read buffer without bound.
pub const MAX_LINE_BYTES: usize = 4096;

/// A serial port visible to this machine
#[derive(Debug, Clone, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Default)]
struct LineCounters {
    received: AtomicU64,
    dropped: AtomicU64,
}

/// Port settings plus line counters, shared with the engine's status view
struct SerialStatus {
    config: SerialConfig,
    counters: LineCounters,
}

impl SourceMonitor for SerialStatus {
    fn snapshot(&self) -> SourceMetadata {
        SourceMetadata {
            kind: SourceKind::Serial,
            target: self.config.port.clone(),
            properties: [
                ("baud_rate".to_string(), self.config.baud_rate.to_string()),
                (
                    "read_timeout_ms".to_string(),
                    self.config.read_timeout_ms.to_string(),
                ),
                (
                    "lines_received".to_string(),
                    self.counters.received.load(Ordering::Relaxed).to_string(),
                ),
                (
                    "lines_dropped".to_string(),
                    self.counters.dropped.load(Ordering::Relaxed).to_string(),
                ),
            ]
            .into_iter()
            .collect(),
        }
    }
}

pub struct SerialSource {
    status: Arc<SerialStatus>,
    // Only touched through &mut self
    port: Mutex<Option<SerialStream>>,
    is_connected: bool,
}

impl SerialSource {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            status: Arc::new(SerialStatus {
                config,
                counters: LineCounters::default(),
            }),
            port: Mutex::new(None),
            is_connected: false,
        }
    }

    fn config(&self) -> &SerialConfig {
        &self.status.config
    }

    /// Whether this environment can talk to serial hardware at all.
    ///
    /// Independent of any connection attempt: it only asks the OS for its
    /// port list.
    pub fn is_supported() -> bool {
        tokio_serial::available_ports().is_ok()
    }

    pub fn available_ports() -> Result<Vec<PortInfo>> {
        let ports = tokio_serial::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|p| {
                let (kind, description) = match p.port_type {
                    SerialPortType::UsbPort(usb) => ("usb", usb.product.or(usb.manufacturer)),
                    SerialPortType::PciPort => ("pci", None),
                    SerialPortType::BluetoothPort => ("bluetooth", None),
                    SerialPortType::Unknown => ("unknown", None),
                };
                PortInfo {
                    name: p.port_name,
                    kind: kind.to_string(),
                    description,
                }
            })
            .collect())
    }
}

#[async_trait]
impl DeviceSource for SerialSource {
    async fn open(&mut self) -> Result<()> {
        if self.is_connected {
            return Ok(());
        }

        log::info!(
            "Opening serial port: {} at {} baud",
            self.config().port,
            self.config().baud_rate
        );

        let config = self.config();
        let port = tokio_serial::new(&config.port, config.baud_rate)
            .timeout(config.read_timeout())
            .open_native_async()
            .map_err(|e| {
                VitalsError::Connection(format!(
                    "Failed to open serial port {}: {}",
                    config.port, e
                ))
            })?;

        *self.port.get_mut() = Some(port);
        self.is_connected = true;
        log::info!("Serial port opened successfully");

        Ok(())
    }

    async fn start(&mut self, sender: mpsc::Sender<SourceEvent>) -> Result<()> {
        if !self.is_connected {
            if let Err(e) = self.open().await {
                let _ = sender.send(SourceEvent::Error(e.to_string())).await;
                return Err(e);
            }
        }

        let port = self
            .port
            .get_mut()
            .take()
            .ok_or_else(|| VitalsError::Connection("Serial port is not open".to_string()))?;

        log::info!("Serial stream started on {}", self.config().port);

        let result = pump_lines(port, &sender, &self.status.counters).await;
        self.is_connected = false;

        if let Err(e) = &result {
            log::error!("Serial read error on {}: {}", self.config().port, e);
            let _ = sender.send(SourceEvent::Error(e.to_string())).await;
        }
        result
    }

    async fn close(&mut self) -> Result<()> {
        if self.port.get_mut().take().is_some() || self.is_connected {
            log::info!("Closing serial port {}", self.config().port);
        }
        self.is_connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Serial
    }

    fn describe(&self) -> SourceMetadata {
        self.status.snapshot()
    }

    fn monitor(&self) -> Arc<dyn SourceMonitor> {
        Arc::clone(&self.status) as Arc<dyn SourceMonitor>
    }
}

/// Split a byte stream into lines and forward every parsed reading.
///
/// Returns `Ok(())` when the receiver goes away and an error when the stream
/// ends or fails, since a serial device never legitimately reaches EOF.
/// Lines over [`MAX_LINE_BYTES`] are counted as dropped and skipped up to the
/// next newline.
async fn pump_lines<R>(
    reader: R,
    sender: &mpsc::Sender<SourceEvent>,
    counters: &LineCounters,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf: Vec<u8> = Vec::with_capacity(256);
    // Inside the tail of an overlong line
    let mut discarding = false;

    loop {
        let budget = (MAX_LINE_BYTES + 1).saturating_sub(buf.len()) as u64;
        match (&mut reader).take(budget).read_until(b'\n', &mut buf).await {
            Ok(0) => {
                log::warn!("Serial port closed unexpectedly");
                return Err(VitalsError::Connection(
                    "Serial port closed unexpectedly".to_string(),
                ));
            }
            Ok(_) => {
                let complete = buf.last() == Some(&b'\n');
                if !complete && buf.len() > MAX_LINE_BYTES {
                    if !discarding {
                        counters.received.fetch_add(1, Ordering::Relaxed);
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                        log::warn!("Discarding line longer than {} bytes", MAX_LINE_BYTES);
                        discarding = true;
                    }
                    buf.clear();
                    continue;
                }
                if discarding {
                    buf.clear();
                    discarding = !complete;
                    continue;
                }

                // Devices occasionally emit non-UTF-8 garbage on reset
                let line = String::from_utf8_lossy(&buf).into_owned();
                buf.clear();

                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                counters.received.fetch_add(1, Ordering::Relaxed);
                log::debug!("Received from device: {}", trimmed);

                match parse_line(trimmed) {
                    Some(reading) => {
                        if sender.send(SourceEvent::Data(reading)).await.is_err() {
                            log::warn!("Source receiver closed");
                            return Ok(());
                        }
                    }
                    None => {
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                        log::debug!("Ignoring unrecognized line: {}", trimmed);
                    }
                }
            }
            // Partial bytes stay in `buf` and are completed by the next read
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                return Err(VitalsError::Connection(format!("Read failed: {}", e)));
            }
        }
    }
}
