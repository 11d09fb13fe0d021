//! Keepalive ticker for idle sessions.
//!
//! A session thread spends most of its life blocked in a socket read, so
//! a dead link is only noticed when something is written. [`Keepalive`]
//! runs a small thread beside the session that sends
//! [`SessionHandle::keepalive`] at a fixed interval. A write that fails
//! tears the session down and reports `on_conn_failed` as usual.
//!
//! The ticker stops when it is stopped or dropped, or on the first tick
//! after the session has ended. Ticks before login completes are skipped.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use wren_session::SessionHandle;

use crate::WrenError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing of the keepalive ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Time between two pings.
    pub interval: Duration,
    /// Upper bound of the random delay added to the *first* tick, so
    /// accounts started together do not ping in lockstep.
    pub initial_jitter: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_jitter: Duration::from_secs(5),
        }
    }
}

impl KeepaliveConfig {
    /// Shortest interval accepted.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Raises an interval below [`Self::MIN_INTERVAL`] to the minimum.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            tracing::warn!(
                interval_ms = self.interval.as_millis(),
                min_ms = Self::MIN_INTERVAL.as_millis(),
                "keepalive interval too short, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }

    fn first_wait(&self) -> Duration {
        let max_us = u64::try_from(self.initial_jitter.as_micros()).unwrap_or(u64::MAX);
        let jitter = if max_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..max_us))
        } else {
            Duration::ZERO
        };
        self.interval + jitter
    }
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// A running keepalive thread. Stops on drop.
#[derive(Debug)]
pub struct Keepalive {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<u64>>,
}

impl Keepalive {
    /// Starts pinging the session's host.
    ///
    /// # Errors
    /// [`WrenError::Spawn`] if the thread cannot be created.
    pub fn start(handle: SessionHandle, config: KeepaliveConfig) -> Result<Self, WrenError> {
        let config = config.validated();
        let (stop, stopped) = mpsc::channel();
        let account = handle.account();
        let thread = thread::Builder::new()
            .name(format!("wren-keepalive-{account}"))
            .spawn(move || tick(&handle, config, &stopped))
            .map_err(WrenError::Spawn)?;

        tracing::debug!(account, interval_ms = config.interval.as_millis(), "keepalive started");
        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Returns `true` while the ticker thread is alive.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the ticker and waits for it. Returns the number of pings
    /// sent.
    pub fn stop(mut self) -> u64 {
        self.shutdown()
    }

    fn shutdown(&mut self) -> u64 {
        // Dropping the sender wakes the ticker immediately.
        self.stop.take();
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(sent)) => sent,
            Some(Err(_)) => {
                tracing::error!("keepalive thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for Keepalive {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn tick(handle: &SessionHandle, config: KeepaliveConfig, stopped: &mpsc::Receiver<()>) -> u64 {
    let host = handle.config().host.clone();
    let mut wait = config.first_wait();
    let mut sent = 0;

    loop {
        match stopped.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        wait = config.interval;

        if handle.is_finished() {
            tracing::debug!(account = handle.account(), "session ended, keepalive exits");
            break;
        }
        if !handle.is_ready() {
            tracing::trace!(account = handle.account(), phase = %handle.phase(), "keepalive skipped");
            continue;
        }
        handle.keepalive(&host);
        sent += 1;
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use wren_session::{Session, SessionConfig};
    use wren_transport::MemoryConnector;

    #[test]
    fn test_validated_clamps_short_interval() {
        let config = KeepaliveConfig::with_interval(Duration::ZERO).validated();
        assert_eq!(config.interval, KeepaliveConfig::MIN_INTERVAL);
    }

    #[test]
    fn test_first_wait_stays_within_jitter() {
        let config = KeepaliveConfig {
            interval: Duration::from_millis(100),
            initial_jitter: Duration::from_millis(50),
        };
        for _ in 0..20 {
            let wait = config.first_wait();
            assert!(wait >= config.interval);
            assert!(wait < config.interval + config.initial_jitter);
        }
    }

    #[test]
    fn test_first_wait_without_jitter_is_interval() {
        let config = KeepaliveConfig {
            interval: Duration::from_millis(100),
            initial_jitter: Duration::ZERO,
        };
        assert_eq!(config.first_wait(), config.interval);
    }

    #[test]
    fn test_ticker_exits_after_session_ends() {
        let config = SessionConfig::new("example.org", "alice", "secret");
        let handle = Session::new(config, MemoryConnector::refusing())
            .spawn()
            .expect("spawn");
        handle.join();

        let keepalive = Keepalive::start(
            handle,
            KeepaliveConfig {
                interval: Duration::from_millis(10),
                initial_jitter: Duration::ZERO,
            },
        )
        .expect("start");

        for _ in 0..200 {
            if !keepalive.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!keepalive.is_running());
        assert_eq!(keepalive.stop(), 0);
    }

    #[test]
    fn test_stop_wakes_ticker_immediately() {
        let (connector, _log) = MemoryConnector::new("");
        let handle = Session::new(SessionConfig::new("example.org", "alice", "pw"), connector)
            .spawn()
            .expect("spawn");
        let keepalive =
            Keepalive::start(handle.clone(), KeepaliveConfig::with_interval(Duration::from_secs(3600)))
                .expect("start");

        let started = std::time::Instant::now();
        assert_eq!(keepalive.stop(), 0);
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join();
    }
}
