//! Single-flight completion signals

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::watch;

static NEXT_ATTEMPT: AtomicU64 = AtomicU64::new(1);

/// Resolves when one compile attempt for a specifier has finished
#[derive(Debug, Clone)]
pub struct ReadySignal {
    attempt: u64,
    rx: watch::Receiver<bool>,
}

impl ReadySignal {
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the attempt to finish, successfully or not
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // A closed channel means the guard is gone, which also ends the attempt
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

/// Owner side of a [`ReadySignal`] published in the in-flight map
///
/// Dropping the guard resolves the signal and unpublishes it, on every exit
/// path of the attempt.
pub(crate) struct ReadyGuard<'a> {
    in_flight: &'a DashMap<String, ReadySignal>,
    specifier: String,
    attempt: u64,
    tx: watch::Sender<bool>,
}

impl<'a> ReadyGuard<'a> {
    pub(crate) fn install(in_flight: &'a DashMap<String, ReadySignal>, specifier: &str) -> Self {
        let (tx, rx) = watch::channel(false);
        let attempt = NEXT_ATTEMPT.fetch_add(1, Ordering::Relaxed);
        in_flight.insert(specifier.to_string(), ReadySignal { attempt, rx });
        Self {
            in_flight,
            specifier: specifier.to_string(),
            attempt,
            tx,
        }
    }
}

impl Drop for ReadyGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .remove_if(&self.specifier, |_, signal| signal.attempt == self.attempt);
        self.tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_guard_drop_resolves_waiters() {
        let in_flight = DashMap::new();
        let guard = ReadyGuard::install(&in_flight, "/a.ts");
        let signal = in_flight.get("/a.ts").map(|s| s.clone()).unwrap();
        assert!(!signal.is_ready());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_ready());
        assert!(!in_flight.contains_key("/a.ts"));
    }

    #[tokio::test]
    async fn test_stale_guard_keeps_newer_signal() {
        let in_flight = DashMap::new();
        let first = ReadyGuard::install(&in_flight, "/a.ts");
        let second = ReadyGuard::install(&in_flight, "/a.ts");

        drop(first);
        assert!(in_flight.contains_key("/a.ts"));
        drop(second);
        assert!(!in_flight.contains_key("/a.ts"));
    }
}
