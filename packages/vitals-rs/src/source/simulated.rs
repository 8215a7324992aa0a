// Simulated vitals source
//
// Emits a plausible adult vitals reading (blood pressure, heart rate, SpO2,
// temperature, weight) at a randomized cadence of 100-200 ms, so the rest of
// the pipeline can be exercised without hardware. Useful for:
// - Kiosk demos and front-end development
// - Deterministic tests (pass a seed)

use super::{DeviceSource, SourceEvent, SourceKind, SourceMetadata, SourceMonitor};
use crate::error::Result;
use crate::types::{Channel, LineFormat, Reading};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Bounds of the tick period, in milliseconds. The actual period is drawn
/// once per `start`.
pub const SIMULATED_PERIOD_MS: RangeInclusive<u64> = 100..=200;

struct SimulatorStatus {
    seed: Option<u64>,
    /// Zero until the first `start`
    period_ms: AtomicU64,
    emitted: AtomicU64,
}

impl SourceMonitor for SimulatorStatus {
    fn snapshot(&self) -> SourceMetadata {
        let mut properties = HashMap::new();
        if let Some(seed) = self.seed {
            properties.insert("seed".to_string(), seed.to_string());
        }
        let period_ms = self.period_ms.load(Ordering::Relaxed);
        if period_ms > 0 {
            properties.insert("period_ms".to_string(), period_ms.to_string());
        }
        properties.insert(
            "emitted".to_string(),
            self.emitted.load(Ordering::Relaxed).to_string(),
        );

        SourceMetadata {
            kind: SourceKind::Simulated,
            target: "simulator".to_string(),
            properties,
        }
    }
}

pub struct SimulatedSource {
    rng: StdRng,
    status: Arc<SimulatorStatus>,
    is_connected: bool,
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self::build(StdRng::from_os_rng(), None)
    }

    /// Reproducible stream: the same seed yields the same values and period.
    pub fn with_seed(seed: u64) -> Self {
        Self::build(StdRng::seed_from_u64(seed), Some(seed))
    }

    fn build(rng: StdRng, seed: Option<u64>) -> Self {
        Self {
            rng,
            status: Arc::new(SimulatorStatus {
                seed,
                period_ms: AtomicU64::new(0),
                emitted: AtomicU64::new(0),
            }),
            is_connected: false,
        }
    }

    /// Period in use by the current (or last) run.
    pub fn period(&self) -> Option<Duration> {
        match self.status.period_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn jitter(&mut self, center: f64, spread: f64) -> f64 {
        center + self.rng.random_range(-spread..=spread)
    }

    fn next_reading(&mut self) -> Reading {
        let sys = self.jitter(120.0, 10.0).round();
        let dia = self.jitter(80.0, 7.5).round();
        let hr = self.jitter(75.0, 10.0).round();
        let spo2 = round1(self.jitter(98.0, 2.0));
        let temp_c = round1(self.jitter(36.8, 0.4));
        let weight_kg = round1(self.jitter(70.0, 5.0));

        let now = Utc::now();
        // Same shape a JSON-speaking kiosk device puts on the wire
        let raw = serde_json::json!({
            "ts": now.timestamp_millis(),
            "bp": { "sys": sys, "dia": dia },
            "hr": hr,
            "spo2": spo2,
            "tempC": temp_c,
            "weightKg": weight_kg,
        })
        .to_string();

        Reading::new(LineFormat::Json, raw, now)
            .with_value(Channel::Systolic, sys)
            .with_value(Channel::Diastolic, dia)
            .with_value(Channel::HeartRate, hr)
            .with_value(Channel::SpO2, spo2)
            .with_value(Channel::TempC, temp_c)
            .with_value(Channel::WeightKg, weight_kg)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[async_trait]
impl DeviceSource for SimulatedSource {
    async fn open(&mut self) -> Result<()> {
        if !self.is_connected {
            log::info!("Simulated device connected");
            self.is_connected = true;
        }
        Ok(())
    }

    async fn start(&mut self, sender: mpsc::Sender<SourceEvent>) -> Result<()> {
        if !self.is_connected {
            self.open().await?;
        }

        let period_ms = self.rng.random_range(SIMULATED_PERIOD_MS);
        self.status.period_ms.store(period_ms, Ordering::Relaxed);
        let period = Duration::from_millis(period_ms);
        log::info!("Simulated stream started ({:?} period)", period);

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let reading = self.next_reading();
            if sender.send(SourceEvent::Data(reading)).await.is_err() {
                log::warn!("Source receiver closed, stopping simulator");
                self.is_connected = false;
                return Ok(());
            }
            self.status.emitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.is_connected {
            log::info!(
                "Simulated device stopped after {} readings",
                self.status.emitted.load(Ordering::Relaxed)
            );
        }
        self.is_connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.is_connected
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Simulated
    }

    fn describe(&self) -> SourceMetadata {
        self.status.snapshot()
    }

    fn monitor(&self) -> Arc<dyn SourceMonitor> {
        Arc::clone(&self.status) as Arc<dyn SourceMonitor>
    }
}
