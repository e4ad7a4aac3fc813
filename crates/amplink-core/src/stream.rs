// ── Reactive status streams ──
//
// Subscription handle for consuming domain status changes from the
// `StatusStore`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::store::DomainStatusRow;

type Snapshot = Arc<Vec<DomainStatusRow>>;

/// A subscription to the status store.
///
/// Provides point-in-time snapshot access and change notification via
/// [`changed`](Self::changed) or by converting into a `Stream`.
pub struct StatusStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl StatusStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot captured at creation or at the last `changed()`.
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Latest snapshot, which may be newer than `current()`.
    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the store is gone.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    pub fn into_stream(self) -> StatusWatchStream {
        StatusWatchStream {
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter yielding a snapshot per store mutation.
pub struct StatusWatchStream {
    inner: WatchStream<Snapshot>,
}

impl Stream for StatusWatchStream {
    type Item = Snapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::model::{DomainStatus, OperationStatus};
    use crate::store::StatusStore;

    #[tokio::test]
    async fn changed_yields_new_snapshots() {
        let store = StatusStore::new();
        let mut stream = StatusStream::new(store.subscribe());
        assert!(stream.current().is_empty());

        store.upsert(
            "dp1:5550",
            "default",
            DomainStatus {
                op: OperationStatus::Up,
                ..DomainStatus::default()
            },
        );
        let snap = stream.changed().await.unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(stream.current().len(), 1);

        let mut watch = StatusStream::new(store.subscribe()).into_stream();
        // WatchStream yields the current value first.
        assert_eq!(watch.next().await.unwrap().len(), 1);
    }

    #[test]
    fn identical_upsert_does_not_wake_waiters() {
        let store = StatusStore::new();
        let mut stream = StatusStream::new(store.subscribe());

        let mut changed = tokio_test::task::spawn(stream.changed());
        tokio_test::assert_pending!(changed.poll());
        store.upsert("dp1:5550", "default", DomainStatus::default());
        assert!(changed.is_woken());
        tokio_test::assert_ready!(changed.poll());
        drop(changed);

        let mut again = tokio_test::task::spawn(stream.changed());
        tokio_test::assert_pending!(again.poll());
        store.upsert("dp1:5550", "default", DomainStatus::default());
        assert!(!again.is_woken());
        tokio_test::assert_pending!(again.poll());
    }
}
