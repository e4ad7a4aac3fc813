//! Deadline-bounded connection establishment.
//!
//! The connect (or a whole request exchange) runs on one supervised task
//! that records its outcome in shared state. The caller polls that state
//! at a fixed interval until the task reports success, reports an error,
//! or the deadline elapses.
//!
//! On timeout the task is **abandoned, not cancelled**: it keeps running
//! until the underlying I/O gives up on its own and its result is dropped.
//! That costs one idle task per timed-out attempt.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Error;

/// Default interval between completion checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Smallest deadline accepted from configuration.
pub const MIN_CONFIGURED_DEADLINE: Duration = Duration::from_secs(1);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

type Slot<T> = Arc<Mutex<Option<Result<T, Error>>>>;

/// Runs a connection attempt under a wall-clock deadline.
#[derive(Debug, Clone, Copy)]
pub struct BoundedConnector {
    deadline: Duration,
    poll_interval: Duration,
}

impl BoundedConnector {
    /// Connector with the given deadline and the default poll interval.
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            poll_interval: clamp_poll(DEFAULT_POLL_INTERVAL, deadline),
        }
    }

    /// Connector for a deadline read from configuration, raised to
    /// [`MIN_CONFIGURED_DEADLINE`] if it is smaller.
    pub fn from_configured(deadline: Duration) -> Self {
        Self::new(deadline.max(MIN_CONFIGURED_DEADLINE))
    }

    /// Override the poll interval. It is kept strictly below the deadline.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = clamp_poll(poll_interval, self.deadline);
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Run `attempt` on a supervised task and wait for it under the deadline.
    ///
    /// Returns the attempt's own result if it finishes in time, or
    /// [`Error::Timeout`] once the deadline has elapsed. Never returns a
    /// timeout before the deadline.
    pub async fn run<F, T>(&self, target: &str, attempt: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>> + Send + 'static,
        T: Send + 'static,
    {
        let slot: Slot<T> = Arc::new(Mutex::new(None));
        let worker_slot = Arc::clone(&slot);
        let started = Instant::now();

        let worker = tokio::spawn(async move {
            let outcome = attempt.await;
            *worker_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        });

        loop {
            if let Some(outcome) = take(&slot) {
                debug!(
                    target,
                    elapsed_ms = millis(started.elapsed()),
                    ok = outcome.is_ok(),
                    "bounded connect finished"
                );
                return outcome;
            }

            if worker.is_finished() {
                // The slot is written before the task completes, so a
                // finished worker with an empty slot panicked.
                return take(&slot).unwrap_or_else(|| {
                    Err(Error::WorkerLost {
                        target: target.to_owned(),
                    })
                });
            }

            let elapsed = started.elapsed();
            if elapsed >= self.deadline {
                warn!(
                    target,
                    deadline_ms = millis(self.deadline),
                    "connect deadline elapsed, abandoning worker"
                );
                return Err(Error::Timeout {
                    target: target.to_owned(),
                    deadline_ms: millis(self.deadline),
                });
            }

            let remaining = self.deadline.saturating_sub(elapsed);
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Open a TCP stream to `target` under the deadline.
    pub async fn connect_tcp(&self, target: &str) -> Result<tokio::net::TcpStream, Error> {
        let addr = target.to_owned();
        self.run(target, async move {
            tokio::net::TcpStream::connect(addr).await.map_err(Error::Io)
        })
        .await
    }
}

fn take<T>(slot: &Slot<T>) -> Option<Result<T, Error>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

fn clamp_poll(poll: Duration, deadline: Duration) -> Duration {
    let poll = poll.max(MIN_POLL_INTERVAL);
    if poll < deadline {
        poll
    } else {
        (deadline / 2).max(MIN_POLL_INTERVAL)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn never_completing_connect_times_out_at_deadline() {
        let connector = BoundedConnector::new(Duration::from_millis(200));
        let started = Instant::now();

        let result: Result<(), Error> = connector
            .run("10.0.0.1:5550", std::future::pending())
            .await;

        let elapsed = started.elapsed();
        assert!(matches!(result, Err(Error::Timeout { deadline_ms: 200, .. })));
        assert!(elapsed >= Duration::from_millis(200), "returned early: {elapsed:?}");
        assert!(
            elapsed < Duration::from_millis(200) + connector.poll_interval(),
            "returned late: {elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fast_connect_returns_its_value() {
        let connector = BoundedConnector::new(Duration::from_millis(500));
        let value = connector
            .run("dp1:5550", async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok::<_, Error>(42)
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_io_error_is_returned_before_deadline() {
        let connector = BoundedConnector::new(Duration::from_secs(5));
        let started = Instant::now();
        let result: Result<(), Error> = connector
            .run("dp1:5550", async {
                Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )))
            })
            .await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_worker_reports_worker_lost() {
        let connector = BoundedConnector::new(Duration::from_secs(5));
        let result: Result<(), Error> = connector
            .run("dp1:5550", async { panic!("connect blew up") })
            .await;
        assert!(matches!(result, Err(Error::WorkerLost { .. })));
    }

    #[test]
    fn poll_interval_stays_below_deadline() {
        let connector = BoundedConnector::new(Duration::from_millis(50));
        assert!(connector.poll_interval() < connector.deadline());

        let connector = BoundedConnector::new(Duration::from_secs(1))
            .with_poll_interval(Duration::from_secs(5));
        assert_eq!(connector.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn configured_deadline_has_safety_minimum() {
        let connector = BoundedConnector::from_configured(Duration::from_millis(10));
        assert_eq!(connector.deadline(), MIN_CONFIGURED_DEADLINE);
    }
}
