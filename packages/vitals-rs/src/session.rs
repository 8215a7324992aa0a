// Fixed-duration capture session
//
// A session collects every value each channel reports during a window
// (10 s by default) and commits the median per channel. The clock is passed
// in by the caller, so the type itself never sleeps or spawns.

use crate::types::{Channel, Reading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Channels that must be committed before a visit can continue.
pub const REQUIRED_CHANNELS: [Channel; 5] = [
    Channel::Systolic,
    Channel::Diastolic,
    Channel::HeartRate,
    Channel::SpO2,
    Channel::TempC,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalStatus {
    #[default]
    Waiting,
    Capturing,
    Captured,
}

/// Per-channel capture state.
///
/// `committed` is only ever set together with [`VitalStatus::Captured`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalState {
    pub status: VitalStatus,
    pub samples: Vec<f64>,
    /// Most recent live value, for display
    pub current: Option<f64>,
    pub committed: Option<f64>,
}

impl VitalState {
    fn begin_capture(&mut self) {
        self.status = VitalStatus::Capturing;
        self.samples.clear();
        self.committed = None;
    }
}

/// Upper-middle median: `sorted[n / 2]`. `None` for no samples.
pub fn median(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(sorted[sorted.len() / 2])
}

#[derive(Debug)]
pub struct CaptureSession {
    id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    window: Duration,
    active: bool,
    vitals: BTreeMap<Channel, VitalState>,
}

impl CaptureSession {
    pub fn new(window: Duration) -> Self {
        Self {
            id: None,
            started_at: None,
            started: None,
            window,
            active: false,
            vitals: Channel::ALL
                .iter()
                .map(|c| (*c, VitalState::default()))
                .collect(),
        }
    }

    /// Open a new window. Every channel goes back to capturing with no samples
    /// and no committed value; live values are kept.
    pub fn start(&mut self, now: Instant) -> Uuid {
        let id = Uuid::new_v4();
        self.id = Some(id);
        self.started_at = Some(Utc::now());
        self.started = Some(now);
        self.active = true;

        for state in self.vitals.values_mut() {
            state.begin_capture();
        }

        log::info!("Capture session {} started ({:?} window)", id, self.window);
        id
    }

    /// Feed one reading. Returns how many samples were appended.
    ///
    /// Ignored entirely while no window is open.
    pub fn ingest(&mut self, reading: &Reading) -> usize {
        if !self.active {
            return 0;
        }

        let mut appended = 0;
        for (channel, value) in reading.channels() {
            if let Some(state) = self.vitals.get_mut(&channel) {
                state.current = Some(value);
                if state.status == VitalStatus::Capturing {
                    state.samples.push(value);
                    appended += 1;
                }
            }
        }
        appended
    }

    /// Commit the median of `channel`'s samples.
    ///
    /// A channel already captured keeps its value; a channel with no samples
    /// is left untouched and yields `None`.
    pub fn commit(&mut self, channel: Channel) -> Option<f64> {
        let state = self.vitals.get_mut(&channel)?;
        if state.status == VitalStatus::Captured {
            return state.committed;
        }

        let value = median(&state.samples)?;
        state.committed = Some(value);
        state.status = VitalStatus::Captured;
        log::debug!(
            "Committed {} = {} from {} samples",
            channel,
            channel.format_value(value),
            state.samples.len()
        );
        Some(value)
    }

    /// Discard `channel`'s samples and committed value and capture it again.
    ///
    /// If no window is open, one is reopened at `now` for this channel only;
    /// other channels keep their state.
    pub fn recapture(&mut self, channel: Channel, now: Instant) {
        if let Some(state) = self.vitals.get_mut(&channel) {
            state.begin_capture();
        }
        if !self.active {
            self.active = true;
            self.started = Some(now);
            self.started_at = Some(Utc::now());
            log::info!("Capture window reopened to recapture {}", channel);
        }
    }

    /// Close the window without committing anything.
    pub fn stop(&mut self) {
        if self.active {
            log::info!("Capture session stopped");
        }
        self.active = false;
        self.started = None;
    }

    /// Stop and commit every channel that has samples.
    ///
    /// Only sweeps when a window was open, so calling it again is a no-op that
    /// returns an empty map.
    pub fn finish(&mut self) -> BTreeMap<Channel, f64> {
        if !self.active {
            return BTreeMap::new();
        }
        self.stop();

        let pending: Vec<Channel> = self
            .vitals
            .iter()
            .filter(|(_, s)| s.status == VitalStatus::Capturing && !s.samples.is_empty())
            .map(|(c, _)| *c)
            .collect();

        let committed: BTreeMap<Channel, f64> = pending
            .into_iter()
            .filter_map(|c| self.commit(c).map(|v| (c, v)))
            .collect();

        log::info!("Capture session finished: {} channels committed", committed.len());
        committed
    }

    /// Finish the session once the window has elapsed.
    ///
    /// Returns the newly committed values when this call closed the window.
    pub fn poll(&mut self, now: Instant) -> Option<BTreeMap<Channel, f64>> {
        if self.is_expired(now) {
            Some(self.finish())
        } else {
            None
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match (self.active, self.started) {
            (true, Some(started)) => now.saturating_duration_since(started),
            _ => Duration::ZERO,
        }
    }

    /// Percentage of the window elapsed, 0 to 100. Zero when inactive.
    pub fn progress(&self, now: Instant) -> f64 {
        if !self.active || self.window.is_zero() {
            return 0.0;
        }
        let ratio = self.elapsed(now).as_secs_f64() / self.window.as_secs_f64();
        ratio.min(1.0) * 100.0
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.active && self.elapsed(now) >= self.window
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn vital(&self, channel: Channel) -> Option<&VitalState> {
        self.vitals.get(&channel)
    }

    /// Committed values only; uncommitted channels are omitted.
    pub fn committed_vitals(&self) -> BTreeMap<Channel, f64> {
        self.vitals
            .iter()
            .filter_map(|(c, s)| s.committed.map(|v| (*c, v)))
            .collect()
    }

    pub fn is_complete(&self, required: &[Channel]) -> bool {
        required
            .iter()
            .all(|c| self.vitals.get(c).is_some_and(|s| s.committed.is_some()))
    }

    /// Back to a fresh visit: inactive, every channel waiting and empty.
    pub fn reset(&mut self) {
        self.id = None;
        self.started_at = None;
        self.started = None;
        self.active = false;
        for state in self.vitals.values_mut() {
            *state = VitalState::default();
        }
    }

    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            started_at: self.started_at,
            active: self.active,
            window_ms: self.window.as_millis() as u64,
            elapsed_ms: self.elapsed(now).as_millis() as u64,
            progress: self.progress(now),
            complete: self.is_complete(&REQUIRED_CHANNELS),
            vitals: self.vitals.clone(),
        }
    }
}

/// Serializable view of a session at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub window_ms: u64,
    pub elapsed_ms: u64,
    pub progress: f64,
    pub complete: bool,
    pub vitals: BTreeMap<Channel, VitalState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use crate::types::LineFormat;

    const WINDOW: Duration = Duration::from_secs(10);

    fn hr(value: f64) -> Reading {
        Reading::new(LineFormat::Json, "{}", Utc::now()).with_value(Channel::HeartRate, value)
    }

    fn sys(value: f64) -> Reading {
        Reading::new(LineFormat::Json, "{}", Utc::now()).with_value(Channel::Systolic, value)
    }

    #[test]
    fn test_median_upper_middle() {
        assert_eq!(median(&[120.0, 118.0, 122.0, 121.0]), Some(121.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[5.0]), Some(5.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_commit_uses_median_of_samples() {
        let mut session = CaptureSession::new(WINDOW);
        session.start(Instant::now());
        for v in [120.0, 118.0, 122.0, 121.0] {
            session.ingest(&sys(v));
        }
        assert_eq!(session.commit(Channel::Systolic), Some(121.0));

        let state = session.vital(Channel::Systolic).unwrap();
        assert_eq!(state.status, VitalStatus::Captured);
        assert_eq!(state.committed, Some(121.0));
    }

    #[test]
    fn test_commit_without_samples_is_noop() {
        let mut session = CaptureSession::new(WINDOW);
        session.start(Instant::now());
        assert_eq!(session.commit(Channel::SpO2), None);
        assert_eq!(session.vital(Channel::SpO2).unwrap().status, VitalStatus::Capturing);
    }

    #[test]
    fn test_commit_on_captured_keeps_value() {
        let mut session = CaptureSession::new(WINDOW);
        session.start(Instant::now());
        session.ingest(&hr(70.0));
        assert_eq!(session.commit(Channel::HeartRate), Some(70.0));
        session.ingest(&hr(90.0));
        assert_eq!(session.commit(Channel::HeartRate), Some(70.0));
    }

    #[test]
    fn test_start_resets_all_channels() {
        let mut session = CaptureSession::new(WINDOW);
        session.start(Instant::now());
        session.ingest(&parse_line("72,98,37,98,0,12").unwrap());
        session.finish();
        assert!(!session.committed_vitals().is_empty());

        let first = session.id();
        let second = session.start(Instant::now());
        assert_ne!(first, Some(second));
        for channel in Channel::ALL {
            let state = session.vital(channel).unwrap();
            assert_eq!(state.status, VitalStatus::Capturing);
            assert!(state.samples.is_empty());
            assert!(state.committed.is_none());
        }
        // Live values survive a restart
        assert_eq!(session.vital(Channel::HeartRate).unwrap().current, Some(72.0));
    }

    #[test]
    fn test_inactive_session_ignores_readings() {
        let mut session = CaptureSession::new(WINDOW);
        assert_eq!(session.ingest(&hr(70.0)), 0);
        assert!(session.vital(Channel::HeartRate).unwrap().current.is_none());

        session.start(Instant::now());
        session.stop();
        assert_eq!(session.ingest(&hr(70.0)), 0);
        assert!(session.vital(Channel::HeartRate).unwrap().samples.is_empty());
    }

    #[test]
    fn test_recapture_next_reading_is_first_sample() {
        let mut session = CaptureSession::new(WINDOW);
        let now = Instant::now();
        session.start(now);
        session.ingest(&hr(70.0));
        session.ingest(&hr(72.0));
        session.commit(Channel::HeartRate);

        session.recapture(Channel::HeartRate, now);
        let state = session.vital(Channel::HeartRate).unwrap();
        assert_eq!(state.status, VitalStatus::Capturing);
        assert!(state.samples.is_empty());
        assert!(state.committed.is_none());

        session.ingest(&hr(80.0));
        assert_eq!(session.vital(Channel::HeartRate).unwrap().samples, vec![80.0]);
    }

    #[test]
    fn test_recapture_after_finish_reopens_window_for_one_channel() {
        let mut session = CaptureSession::new(WINDOW);
        let start = Instant::now();
        session.start(start);
        session.ingest(&parse_line("72,98").unwrap());
        session.finish();

        session.recapture(Channel::SpO2, start + WINDOW);
        assert!(session.is_active());
        session.ingest(&parse_line("90,95").unwrap());

        let committed = session.finish();
        assert_eq!(committed.get(&Channel::SpO2), Some(&95.0));
        assert!(!committed.contains_key(&Channel::HeartRate));
        assert_eq!(session.committed_vitals().get(&Channel::HeartRate), Some(&72.0));
    }

    #[test]
    fn test_stop_does_not_commit() {
        let mut session = CaptureSession::new(WINDOW);
        session.start(Instant::now());
        session.ingest(&hr(70.0));
        session.stop();
        assert!(session.committed_vitals().is_empty());
        assert_eq!(session.vital(Channel::HeartRate).unwrap().samples, vec![70.0]);
    }

    #[test]
    fn test_finish_runs_once() {
        let mut session = CaptureSession::new(WINDOW);
        session.start(Instant::now());
        session.ingest(&hr(70.0));

        let first = session.finish();
        assert_eq!(first.get(&Channel::HeartRate), Some(&70.0));
        assert!(session.finish().is_empty());
        assert!(!session.is_active());
    }

    #[test]
    fn test_poll_finishes_after_window() {
        let mut session = CaptureSession::new(WINDOW);
        let start = Instant::now();
        session.start(start);
        session.ingest(&hr(70.0));

        assert!(session.poll(start + Duration::from_secs(5)).is_none());
        assert!((session.progress(start + Duration::from_secs(5)) - 50.0).abs() < 1e-9);

        let committed = session.poll(start + Duration::from_secs(11)).unwrap();
        assert_eq!(committed.get(&Channel::HeartRate), Some(&70.0));
        assert_eq!(session.progress(start + Duration::from_secs(11)), 0.0);
        assert!(session.poll(start + Duration::from_secs(12)).is_none());
    }

    #[test]
    fn test_progress_caps_at_100() {
        let mut session = CaptureSession::new(WINDOW);
        let start = Instant::now();
        session.start(start);
        assert_eq!(session.progress(start + Duration::from_secs(30)), 100.0);
    }

    #[test]
    fn test_completeness_requires_core_vitals() {
        let mut session = CaptureSession::new(WINDOW);
        session.start(Instant::now());
        session.ingest(&parse_line("72,98,37,98").unwrap());
        session.finish();
        assert!(!session.is_complete(&REQUIRED_CHANNELS));

        session.start(Instant::now());
        session.ingest(
            &parse_line(r#"{"bp":{"sys":121,"dia":79},"hr":72,"spo2":98.1,"tempC":36.9}"#)
                .unwrap(),
        );
        session.finish();
        assert!(session.is_complete(&REQUIRED_CHANNELS));
        assert!(session.snapshot(Instant::now()).complete);
    }

    #[test]
    fn test_reset_returns_to_waiting() {
        let mut session = CaptureSession::new(WINDOW);
        session.start(Instant::now());
        session.ingest(&hr(70.0));
        session.finish();
        session.reset();

        assert!(session.id().is_none());
        assert!(!session.is_active());
        for channel in Channel::ALL {
            assert_eq!(session.vital(channel), Some(&VitalState::default()));
        }
    }

    #[test]
    fn test_snapshot_serializes_channel_keys() {
        let mut session = CaptureSession::new(WINDOW);
        session.start(Instant::now());
        let json = serde_json::to_value(session.snapshot(Instant::now())).unwrap();
        assert_eq!(json["vitals"]["bp_sys"]["status"], "capturing");
        assert_eq!(json["active"], true);
    }
}
