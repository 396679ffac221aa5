//! Bounded async cache with in-flight request deduplication.
//!
//! Multiple concurrent `get` calls for the same key run the producer once;
//! every waiter receives a clone of the result through a broadcast channel.
//! Waiters withdraw by cancelling their parent token; when the last waiter of
//! a pending entry withdraws, the producer's child token is cancelled and the
//! entry removed. Completed values are kept in insertion order and evicted
//! oldest-first once the capacity is exceeded. Failures propagate to the
//! waiters present at completion time and are never memoized.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ContourError;

/// Default number of completed entries retained.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

type CacheResult<V> = Result<V, ContourError>;

struct Pending<V> {
    id: u64,
    tx: broadcast::Sender<CacheResult<V>>,
    waiters: usize,
    cancel: CancellationToken,
}

enum Entry<V> {
    Pending(Pending<V>),
    Done(V),
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// Completion order of `Done` entries, oldest first.
    order: VecDeque<String>,
}

/// Bounded, insertion-ordered async cache keyed by string.
pub struct AsyncCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl<V> AsyncCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache retaining up to `capacity` completed entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            })),
            capacity,
            next_id: AtomicU64::new(0),
        }
    }

    /// Returns the cached or in-flight value for `key`, running `producer`
    /// when neither exists.
    ///
    /// The producer receives the key and a child cancellation token that
    /// fires when every waiter has withdrawn. Cancelling `parent` withdraws
    /// this waiter and yields `ContourError::Cancelled`.
    pub async fn get<F, Fut>(
        &self,
        key: &str,
        producer: F,
        parent: &CancellationToken,
    ) -> CacheResult<V>
    where
        F: FnOnce(String, CancellationToken) -> Fut,
        Fut: Future<Output = CacheResult<V>> + Send + 'static,
    {
        let mut rx;
        let entry_id;
        let mut start: Option<(CancellationToken, broadcast::Sender<CacheResult<V>>)> = None;
        {
            let mut inner = self.inner.lock().unwrap();
            match inner.entries.get_mut(key) {
                Some(Entry::Done(v)) => return Ok(v.clone()),
                Some(Entry::Pending(pending)) => {
                    pending.waiters += 1;
                    rx = pending.tx.subscribe();
                    entry_id = pending.id;
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let child = CancellationToken::new();
                    let (tx, new_rx) = broadcast::channel(1);
                    inner.entries.insert(
                        key.to_string(),
                        Entry::Pending(Pending {
                            id,
                            tx: tx.clone(),
                            waiters: 1,
                            cancel: child.clone(),
                        }),
                    );
                    rx = new_rx;
                    entry_id = id;
                    start = Some((child, tx));
                }
            }
        }
        if let Some((child, tx)) = start {
            self.spawn_producer(key.to_string(), entry_id, tx, producer(key.to_string(), child));
        }

        tokio::select! {
            _ = parent.cancelled() => {
                self.withdraw(key, entry_id);
                Err(ContourError::Cancelled)
            }
            result = rx.recv() => match result {
                Ok(r) => r,
                Err(_) => Err(ContourError::Internal(
                    "cache entry dropped before completion".to_string(),
                )),
            },
        }
    }

    /// Number of entries currently held (pending and completed).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if `key` has a completed value.
    pub fn contains(&self, key: &str) -> bool {
        matches!(
            self.inner.lock().unwrap().entries.get(key),
            Some(Entry::Done(_))
        )
    }

    fn spawn_producer<Fut>(
        &self,
        key: String,
        id: u64,
        tx: broadcast::Sender<CacheResult<V>>,
        fut: Fut,
    ) where
        Fut: Future<Output = CacheResult<V>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let capacity = self.capacity;
        tokio::spawn(async move {
            let result = fut.await;
            {
                let mut inner = inner.lock().unwrap();
                // The entry may have been withdrawn (and possibly re-created
                // by a later request) while we were producing; only our own
                // pending entry is ours to resolve.
                let ours = matches!(
                    inner.entries.get(&key),
                    Some(Entry::Pending(p)) if p.id == id
                );
                if ours {
                    match &result {
                        Ok(v) => {
                            inner.entries.insert(key.clone(), Entry::Done(v.clone()));
                            inner.order.push_back(key.clone());
                            while inner.order.len() > capacity {
                                if let Some(oldest) = inner.order.pop_front() {
                                    debug!(key = %oldest, "evicting oldest cache entry");
                                    inner.entries.remove(&oldest);
                                }
                            }
                        }
                        Err(_) => {
                            inner.entries.remove(&key);
                        }
                    }
                }
            }
            // Waiters may all have gone; a closed channel is fine.
            let _ = tx.send(result);
        });
    }

    /// Removes this waiter from a pending entry, cancelling the producer if
    /// it was the last one. `id` guards against a successor entry that
    /// reused the key after this waiter's entry was resolved.
    fn withdraw(&self, key: &str, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(Entry::Pending(pending)) = inner.entries.get_mut(key) {
            if pending.id != id {
                return;
            }
            pending.waiters -= 1;
            if pending.waiters == 0 {
                debug!(key, "last waiter withdrew, cancelling producer");
                pending.cancel.cancel();
                inner.entries.remove(key);
            }
        }
    }
}
