// Single-flight "next fresh reading" gate
//
// At most one acquisition may be outstanding. The outstanding marker is the
// registered one-shot sender itself: `resolve` takes it out before sending, so
// the marker is already clear by the time the waiter wakes up and a follow-up
// call is immediately eligible.

use crate::error::{Result, VitalsError};
use crate::types::Reading;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

struct Waiter {
    ticket: u64,
    sender: oneshot::Sender<Reading>,
}

pub struct CaptureGate {
    waiter: Mutex<Option<Waiter>>,
    next_ticket: AtomicU64,
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureGate {
    pub fn new() -> Self {
        Self {
            waiter: Mutex::new(None),
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Whether an acquisition is currently outstanding.
    pub fn in_flight(&self) -> bool {
        self.waiter.lock().is_some()
    }

    /// Wait for the next reading handed to [`resolve`](Self::resolve).
    ///
    /// Fails immediately with [`VitalsError::Busy`] if another acquisition is
    /// outstanding, and with [`VitalsError::Timeout`] if nothing arrives in
    /// `timeout`. Dropping the returned future releases the gate.
    pub async fn acquire_next(&self, timeout: Duration) -> Result<Reading> {
        let (ticket, receiver) = self.register()?;
        let _release = Release { gate: self, ticket };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reading)) => Ok(reading),
            Ok(Err(_)) => Err(VitalsError::Connection(
                "reading stream closed while waiting".to_string(),
            )),
            Err(_) => {
                log::warn!("Timed out after {:?} waiting for a reading", timeout);
                Err(VitalsError::Timeout(timeout))
            }
        }
    }

    /// Hand `reading` to the outstanding acquisition, if any.
    ///
    /// Returns whether a waiter was resolved.
    pub fn resolve(&self, reading: &Reading) -> bool {
        let Some(waiter) = self.waiter.lock().take() else {
            return false;
        };

        log::debug!("Resolving acquisition #{}", waiter.ticket);
        // The waiter may have timed out concurrently; the reading is then dropped.
        waiter.sender.send(reading.clone()).is_ok()
    }

    fn register(&self) -> Result<(u64, oneshot::Receiver<Reading>)> {
        let mut slot = self.waiter.lock();
        if slot.is_some() {
            return Err(VitalsError::Busy);
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        *slot = Some(Waiter { ticket, sender });
        Ok((ticket, receiver))
    }

    /// Drop the waiter registered under `ticket`, leaving any newer one alone.
    fn release(&self, ticket: u64) {
        let mut slot = self.waiter.lock();
        if slot.as_ref().is_some_and(|w| w.ticket == ticket) {
            *slot = None;
        }
    }
}

struct Release<'a> {
    gate: &'a CaptureGate,
    ticket: u64,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.gate.release(self.ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn test_resolve_without_waiter_is_noop() {
        let gate = CaptureGate::new();
        assert!(!gate.resolve(&parse_line("70,98").unwrap()));
        assert!(!gate.in_flight());
    }

    #[tokio::test]
    async fn test_acquire_resolves_with_next_reading() {
        let gate = Arc::new(CaptureGate::new());

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire_next(Duration::from_secs(2)).await })
        };

        while !gate.in_flight() {
            tokio::task::yield_now().await;
        }
        assert!(gate.resolve(&parse_line("72,99").unwrap()));
        assert!(!gate.in_flight());

        let reading = waiter.await.unwrap().unwrap();
        assert_eq!(reading.raw, "72,99");
    }

    #[tokio::test]
    async fn test_second_concurrent_acquire_is_busy_immediately() {
        let gate = Arc::new(CaptureGate::new());

        let first = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.acquire_next(Duration::from_secs(2)).await })
        };
        while !gate.in_flight() {
            tokio::task::yield_now().await;
        }

        let started = Instant::now();
        let second = gate.acquire_next(Duration::from_secs(2)).await;
        assert!(matches!(second, Err(VitalsError::Busy)));
        assert!(started.elapsed() < Duration::from_millis(500));

        // The busy rejection must not disturb the outstanding acquisition
        gate.resolve(&parse_line("70,98").unwrap());
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_timeout_clears_marker() {
        let gate = CaptureGate::new();
        let result = gate.acquire_next(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(VitalsError::Timeout(_))));
        assert!(!gate.in_flight());

        // Eligible again straight away
        let again = gate.acquire_next(Duration::from_millis(5)).await;
        assert!(matches!(again, Err(VitalsError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_cancelled_acquire_releases_gate() {
        let gate = CaptureGate::new();
        {
            let fut = gate.acquire_next(Duration::from_secs(5));
            let _ = tokio::time::timeout(Duration::from_millis(10), fut).await;
        }
        assert!(!gate.in_flight());
    }

    #[test]
    fn test_stale_release_keeps_newer_waiter() {
        let gate = CaptureGate::new();
        let (first, _rx1) = gate.register().unwrap();
        gate.resolve(&parse_line("70,98").unwrap());
        let (_second, _rx2) = gate.register().unwrap();

        gate.release(first);
        assert!(gate.in_flight());
    }
}
