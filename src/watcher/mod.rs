//! Live queries
//!
//! An `InvalidationTracker` keeps one observer per live query, keyed by the
//! tables it reads. After a write transaction commits, the store hands the
//! tracker the touched tables and the tracker re-runs every observer whose
//! tables intersect them, pushing the fresh result set down that query's
//! own channel.
//!
//! Refreshes run while the store still holds its connection lock, in commit
//! order, so a subscriber never sees an older snapshot after a newer one.

use crate::storage::Table;
use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Identifier of a registered observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Re-runs a query and delivers it; `Ok(false)` means the subscriber is gone
type Refresh = Box<dyn Fn(&Connection) -> rusqlite::Result<bool> + Send + Sync>;

struct Observer {
    tables: Vec<Table>,
    refresh: Refresh,
}

impl Observer {
    fn watches(&self, touched: &[Table]) -> bool {
        self.tables.iter().any(|t| touched.contains(t))
    }
}

#[derive(Default)]
pub struct InvalidationTracker {
    observers: Mutex<HashMap<ObserverId, Arc<Observer>>>,
    next_id: AtomicU64,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a query over `tables`, delivering results into `sender`
    pub fn register<T, F>(&self, tables: &[Table], query: F, sender: Sender<Vec<T>>) -> ObserverId
    where
        T: Send + 'static,
        F: Fn(&Connection) -> rusqlite::Result<Vec<T>> + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let refresh: Refresh = Box::new(move |conn| {
            let rows = query(conn)?;
            Ok(sender.send(rows).is_ok())
        });
        let observer = Arc::new(Observer {
            tables: tables.to_vec(),
            refresh,
        });
        if let Ok(mut observers) = self.observers.lock() {
            observers.insert(id, observer);
        }
        id
    }

    /// Remove an observer; returns whether it was still registered
    pub fn unregister(&self, id: ObserverId) -> bool {
        self.observers
            .lock()
            .map(|mut observers| observers.remove(&id).is_some())
            .unwrap_or(false)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().map(|o| o.len()).unwrap_or(0)
    }

    /// Refresh every observer watching one of `touched`
    pub fn notify(&self, conn: &Connection, touched: &[Table]) {
        let matching: Vec<(ObserverId, Arc<Observer>)> = match self.observers.lock() {
            Ok(observers) => observers
                .iter()
                .filter(|(_, o)| o.watches(touched))
                .map(|(id, o)| (*id, Arc::clone(o)))
                .collect(),
            Err(_) => return,
        };

        let mut gone = Vec::new();
        for (id, observer) in matching {
            match (observer.refresh)(conn) {
                Ok(true) => tracing::debug!("Refreshed live query {:?}", id),
                Ok(false) => gone.push(id),
                Err(e) => tracing::warn!("Live query {:?} failed to refresh: {}", id, e),
            }
        }

        for id in gone {
            tracing::debug!("Dropping live query {:?}: subscriber disconnected", id);
            self.unregister(id);
        }
    }
}

/// A continuous query.
///
/// Yields the full result set on subscribe and again after every committed
/// write to one of its tables. Call `cancel` to stop notifications and
/// release the query; a handle dropped without cancelling is only pruned
/// the next time its tables change.
pub struct LiveQuery<T> {
    id: ObserverId,
    receiver: Receiver<Vec<T>>,
    tracker: Arc<InvalidationTracker>,
}

impl<T> LiveQuery<T> {
    pub(crate) fn new(id: ObserverId, receiver: Receiver<Vec<T>>, tracker: Arc<InvalidationTracker>) -> Self {
        Self {
            id,
            receiver,
            tracker,
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Block until the next snapshot; `None` once the query is cancelled
    pub fn recv(&self) -> Option<Vec<T>> {
        self.receiver.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<T>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(rows) => Some(rows),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Next pending snapshot, without blocking
    pub fn try_recv(&self) -> Option<Vec<T>> {
        match self.receiver.try_recv() {
            Ok(rows) => Some(rows),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Drain pending snapshots and keep only the newest
    pub fn latest(&self) -> Option<Vec<T>> {
        let mut latest = None;
        while let Some(rows) = self.try_recv() {
            latest = Some(rows);
        }
        latest
    }

    pub fn pending(&self) -> usize {
        self.receiver.len()
    }

    /// Stop notifications and release the query
    pub fn cancel(self) {
        if self.tracker.unregister(self.id) {
            tracing::debug!("Cancelled live query {:?}", self.id);
        }
    }
}
