//! In-flight request deduplication.
//!
//! Concurrent requests for the same logical key share one upstream
//! computation. The first caller spawns the producer; later callers join the
//! pending result. The registry entry is removed before the result is
//! published, so a caller either observes a channel that will still receive
//! data or creates a new one. Failures are never remembered.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared, TryFutureExt};
use parking_lot::Mutex;
use thiserror::Error;

use crate::metrics::names;

/// The shared computation was dropped before it produced a result
/// (the producer panicked or the runtime shut down).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("upstream computation was cancelled")]
pub struct Cancelled;

type Channel<T, E> = Shared<oneshot::Receiver<Result<T, E>>>;
type ChannelMap<T, E> = Arc<Mutex<HashMap<String, Channel<T, E>>>>;

/// Runs a closure when dropped, including during unwinding.
struct CallOnDrop<F: FnOnce()> {
    f: Option<F>,
}

impl<F: FnOnce()> CallOnDrop<F> {
    fn new(f: F) -> Self {
        Self { f: Some(f) }
    }
}

impl<F: FnOnce()> Drop for CallOnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.f.take() {
            f();
        }
    }
}

/// Process-wide registry of pending computations keyed by logical request.
///
/// Cheap to clone; clones share the same registry.
pub struct RequestDeduplicator<T, E> {
    pending: ChannelMap<T, E>,
}

impl<T, E> Clone for RequestDeduplicator<T, E> {
    fn clone(&self) -> Self {
        Self {
            pending: self.pending.clone(),
        }
    }
}

impl<T, E> Default for RequestDeduplicator<T, E> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T, E> RequestDeduplicator<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<Cancelled> + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pending result for `key`, starting `producer` if none is
    /// in flight.
    ///
    /// Not `async`: the check-and-insert happens synchronously and the
    /// producer is spawned eagerly, so two callers can never both miss the
    /// registry and start duplicate work. The returned future resolves to
    /// the same settled value for every caller that joined.
    pub fn register<F>(&self, key: &str, producer: F) -> BoxFuture<'static, Result<T, E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let channel = {
            let mut pending = self.pending.lock();
            if let Some(channel) = pending.get(key) {
                ::metrics::counter!(names::DEDUP_JOINED_TOTAL).increment(1);
                tracing::trace!(key = %key, "joined in-flight request");
                channel.clone()
            } else {
                let channel = self.spawn(key.to_string(), producer);
                pending.insert(key.to_string(), channel.clone());
                channel
            }
        };

        channel
            .unwrap_or_else(|_canceled| Err(E::from(Cancelled)))
            .boxed()
    }

    /// Number of computations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    fn spawn<F>(&self, key: String, producer: F) -> Channel<T, E>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();

        let pending = self.pending.clone();
        let remove_token = CallOnDrop::new(move || {
            pending.lock().remove(&key);
        });

        tokio::spawn(async move {
            let result = producer.await;
            // Evict first: callers arriving from here on start a fresh request.
            drop(remove_token);
            sender.send(result).ok();
        });

        receiver.shared()
    }
}
