// Vitals engine - owns the acquisition pipeline for one kiosk
//
// The engine manages:
// - Device source lifecycle (at most one live source at a time)
// - The latest-reading cache and its collecting/paused switch
// - Single-flight "next fresh reading" acquisitions
// - The capture session fed by every parsed reading
// - Event emission to the embedding application
// - Task cancellation via CancellationToken on disconnect and drop

use crate::cache::{CacheStats, ReadingCache};
use crate::config::EngineConfig;
use crate::error::{Result, VitalsError};
use crate::gate::CaptureGate;
use crate::session::{CaptureSession, SessionSnapshot, REQUIRED_CHANNELS};
use crate::sink::ReadingSink;
use crate::source::{
    create_source, DeviceSource, SourceConfig, SourceEvent, SourceKind, SourceMetadata,
    SourceMonitor,
};
use crate::types::{Channel, Reading};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const SOURCE_CHANNEL_CAPACITY: usize = 100;

/// Events emitted by the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A reading was parsed from the live source
    Reading(Reading),

    /// The live source failed to open or stopped with an error
    Error(String),

    /// A source was connected (`Some`) or disconnected (`None`)
    SourceChanged(Option<SourceKind>),

    /// A capture window closed and these channels were committed
    CaptureFinished(BTreeMap<Channel, f64>),
}

type EventCallback = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// State shared between the engine handle and its background tasks
struct Shared {
    cache: ReadingCache,
    gate: CaptureGate,
    session: Mutex<CaptureSession>,
    connected: AtomicBool,
    event_callback: RwLock<Option<EventCallback>>,
}

impl Shared {
    fn emit(&self, event: EngineEvent) {
        // Released before the call so a callback may replace itself
        let callback = self.event_callback.read().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn dispatch(&self, reading: Reading) {
        self.cache.offer(&reading);
        self.session.lock().ingest(&reading);
        // Resolve last so a woken waiter sees cache and session up to date
        self.gate.resolve(&reading);
        self.emit(EngineEvent::Reading(reading));
    }
}

struct LiveSource {
    source: Arc<TokioMutex<Box<dyn DeviceSource>>>,
    kind: SourceKind,
    monitor: Arc<dyn SourceMonitor>,
    cancel_token: CancellationToken,
    producer: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// Debug snapshot of the whole engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub source: Option<SourceMetadata>,
    pub connected: bool,
    pub collecting: bool,
    pub capture_in_flight: bool,
    pub capture_active: bool,
    pub latest: Option<Reading>,
    pub cache: CacheStats,
}

pub struct VitalsEngine {
    config: EngineConfig,
    shared: Arc<Shared>,
    live: TokioMutex<Option<LiveSource>>,
}

impl VitalsEngine {
    pub fn new(config: EngineConfig) -> Self {
        let window = config.capture_window();
        Self {
            config,
            shared: Arc::new(Shared {
                cache: ReadingCache::new(),
                gate: CaptureGate::new(),
                session: Mutex::new(CaptureSession::new(window)),
                connected: AtomicBool::new(false),
                event_callback: RwLock::new(None),
            }),
            live: TokioMutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Set event callback function
    pub fn set_event_callback<F>(&self, callback: F)
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        *self.shared.event_callback.write() = Some(Arc::new(callback));
    }

    // ------------------------------------------------------------------
    // Source lifecycle
    // ------------------------------------------------------------------

    /// Connect the source described by `config`, replacing any live one.
    pub async fn connect(&self, config: SourceConfig) -> Result<()> {
        self.connect_source(create_source(config)).await
    }

    /// Connect the serial port from the engine configuration.
    pub async fn connect_serial(&self) -> Result<()> {
        self.connect(SourceConfig::Serial(self.config.serial.clone()))
            .await
    }

    /// Start the simulator. A no-op when the simulator is already live.
    pub async fn start_simulation(&self, seed: Option<u64>) -> Result<()> {
        {
            let live = self.live.lock().await;
            if let Some(current) = live.as_ref() {
                if current.kind == SourceKind::Simulated && self.is_connected() {
                    log::debug!("Simulator already running");
                    return Ok(());
                }
            }
        }
        self.connect(SourceConfig::Simulated { seed }).await
    }

    /// Make `source` the live source.
    ///
    /// The previous source, if any, is fully closed first, so two sources
    /// never feed the pipeline at once.
    pub async fn connect_source(&self, mut source: Box<dyn DeviceSource>) -> Result<()> {
        let mut live = self.live.lock().await;

        if let Some(current) = live.take() {
            log::info!("Replacing {} source", current.kind);
            Self::shutdown(&self.shared, current).await;
        }

        log::info!("Connecting {} source", source.kind());

        if let Err(e) = source.open().await {
            log::error!("Failed to connect {} source: {}", source.kind(), e);
            self.shared.emit(EngineEvent::Error(e.to_string()));
            return Err(e);
        }

        let kind = source.kind();
        let monitor = source.monitor();
        let cancel_token = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<SourceEvent>(SOURCE_CHANNEL_CAPACITY);
        let source = Arc::new(TokioMutex::new(source));

        self.shared.connected.store(true, Ordering::Release);

        let producer = Self::spawn_producer(
            Arc::clone(&source),
            tx,
            Arc::clone(&self.shared),
            cancel_token.clone(),
        );
        let dispatcher =
            Self::spawn_dispatcher(rx, Arc::clone(&self.shared), cancel_token.clone());

        *live = Some(LiveSource {
            source,
            kind,
            monitor,
            cancel_token,
            producer,
            dispatcher,
        });

        self.shared.emit(EngineEvent::SourceChanged(Some(kind)));
        log::info!("{} source connected", kind);

        Ok(())
    }

    /// Stop and close the live source. Safe to call with none connected.
    pub async fn disconnect(&self) -> Result<()> {
        let current = self.live.lock().await.take();
        if let Some(current) = current {
            log::info!("Disconnecting {} source", current.kind);
            Self::shutdown(&self.shared, current).await;
            self.shared.emit(EngineEvent::SourceChanged(None));
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Metadata of the live source, if any, with its current counters.
    pub async fn source(&self) -> Option<SourceMetadata> {
        let live = self.live.lock().await;
        live.as_ref().map(|current| current.monitor.snapshot())
    }

    fn spawn_producer(
        source: Arc<TokioMutex<Box<dyn DeviceSource>>>,
        tx: mpsc::Sender<SourceEvent>,
        shared: Arc<Shared>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut source = source.lock().await;
            // select! so cancellation drops the read future and its device handle
            tokio::select! {
                result = source.start(tx) => {
                    match result {
                        Ok(()) => log::info!("Source stream ended"),
                        Err(e) => log::error!("Source streaming error: {}", e),
                    }
                    shared.connected.store(false, Ordering::Release);
                }
                _ = cancel_token.cancelled() => {
                    log::debug!("Source streaming cancelled");
                }
            }
        })
    }

    fn spawn_dispatcher(
        mut rx: mpsc::Receiver<SourceEvent>,
        shared: Arc<Shared>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = cancel_token.cancelled() => {
                        log::debug!("Dispatcher cancelled");
                        break;
                    }

                    event = rx.recv() => {
                        match event {
                            Some(SourceEvent::Data(reading)) => shared.dispatch(reading),
                            Some(SourceEvent::Error(message)) => {
                                log::warn!("Source reported error: {}", message);
                                shared.connected.store(false, Ordering::Release);
                                shared.emit(EngineEvent::Error(message));
                            }
                            None => {
                                log::debug!("Source channel closed");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    async fn shutdown(shared: &Shared, current: LiveSource) {
        current.cancel_token.cancel();
        let _ = current.producer.await;
        let _ = current.dispatcher.await;

        if let Err(e) = current.source.lock().await.close().await {
            log::warn!("Error closing {} source: {}", current.kind, e);
        }
        shared.connected.store(false, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Acquisition and cache
    // ------------------------------------------------------------------

    /// Wait for the next reading parsed after this call.
    ///
    /// Uses the configured acquire timeout when `timeout` is `None`.
    pub async fn acquire_next(&self, timeout: Option<Duration>) -> Result<Reading> {
        if !self.is_connected() {
            return Err(VitalsError::NoDevice);
        }
        let timeout = timeout.unwrap_or_else(|| self.config.acquire_timeout());
        self.shared.gate.acquire_next(timeout).await
    }

    pub fn capture_in_flight(&self) -> bool {
        self.shared.gate.in_flight()
    }

    pub fn latest(&self) -> Option<Reading> {
        self.shared.cache.latest()
    }

    pub fn pause(&self) {
        self.shared.cache.pause();
    }

    pub fn resume(&self) {
        self.shared.cache.resume();
    }

    pub fn is_collecting(&self) -> bool {
        self.shared.cache.is_collecting()
    }

    /// Acquire one fresh reading and hand it to `sink`.
    pub async fn capture_and_save(&self, sink: &dyn ReadingSink) -> Result<Reading> {
        let reading = self.acquire_next(None).await?;
        sink.save(&reading).await?;
        log::info!("Saved fresh reading");
        Ok(reading)
    }

    /// Save the cached latest reading, then pause collecting so the saved
    /// value stays on display.
    pub async fn save_latest(&self, sink: &dyn ReadingSink) -> Result<Reading> {
        let reading = self.latest().ok_or(VitalsError::NoReading)?;
        sink.save(&reading).await?;
        self.pause();
        log::info!("Saved latest reading");
        Ok(reading)
    }

    // ------------------------------------------------------------------
    // Capture session
    // ------------------------------------------------------------------

    pub fn start_capture(&self) -> Uuid {
        self.shared.session.lock().start(Instant::now())
    }

    /// Stop the window and commit every channel that has samples.
    pub fn stop_capture(&self) -> BTreeMap<Channel, f64> {
        let (was_active, committed) = {
            let mut session = self.shared.session.lock();
            let was_active = session.is_active();
            (was_active, session.finish())
        };
        if was_active {
            self.shared
                .emit(EngineEvent::CaptureFinished(committed.clone()));
        }
        committed
    }

    /// Commit the median of one channel now.
    pub fn capture_vital(&self, channel: Channel) -> Option<f64> {
        self.shared.session.lock().commit(channel)
    }

    pub fn recapture(&self, channel: Channel) {
        self.shared
            .session
            .lock()
            .recapture(channel, Instant::now());
    }

    /// Close the window if it has elapsed. Meant to be called on a short tick.
    pub fn poll_capture(&self) -> Option<BTreeMap<Channel, f64>> {
        let committed = self.shared.session.lock().poll(Instant::now())?;
        self.shared
            .emit(EngineEvent::CaptureFinished(committed.clone()));
        Some(committed)
    }

    pub fn capture_progress(&self) -> f64 {
        self.shared.session.lock().progress(Instant::now())
    }

    pub fn is_capturing(&self) -> bool {
        self.shared.session.lock().is_active()
    }

    pub fn committed_vitals(&self) -> BTreeMap<Channel, f64> {
        self.shared.session.lock().committed_vitals()
    }

    pub fn is_vitals_complete(&self) -> bool {
        self.shared.session.lock().is_complete(&REQUIRED_CHANNELS)
    }

    pub fn session_snapshot(&self) -> SessionSnapshot {
        self.shared.session.lock().snapshot(Instant::now())
    }

    /// Start over for the next patient: session back to waiting, cache
    /// emptied and collecting again. The source stays connected.
    pub fn reset_visit(&self) {
        self.shared.session.lock().reset();
        self.shared.cache.clear();
        self.shared.cache.resume();
        log::info!("Visit reset");
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            source: self.source().await,
            connected: self.is_connected(),
            collecting: self.is_collecting(),
            capture_in_flight: self.capture_in_flight(),
            capture_active: self.is_capturing(),
            latest: self.latest(),
            cache: self.shared.cache.stats(),
        }
    }
}

impl Default for VitalsEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Drop for VitalsEngine {
    fn drop(&mut self) {
        if let Some(current) = self.live.get_mut().as_ref() {
            current.cancel_token.cancel();
        }
    }
}
