//! Request batching for weft.
//!
//! Resolvers that fan out to a backend register their loads with a
//! `BatchCoordinator` instead of firing them one by one. The coordinator
//! wakes between resolver ticks and dispatches every operation that still
//! has buffered work, so sibling fields resolving concurrently share one
//! backend round trip.

use crate::executor::CancelSignal;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{oneshot, Notify};
use tracing::trace;

/// A batchable operation: something that buffers work and can flush it.
pub trait BatchOperation: Send + Sync {
    /// Number of buffered entries awaiting dispatch.
    fn buffered(&self) -> usize;

    /// Flushes the buffered entries.
    fn dispatch(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Wakes and flushes touched batch operations.
///
/// `run` must be spawned alongside the execution, e.g.
/// `tokio::spawn(coordinator.clone().run(cancel))`; loads block until their
/// batch is dispatched, so without a running coordinator they never finish.
#[derive(Default)]
pub struct BatchCoordinator {
    wake: Notify,
    touched: Mutex<Vec<Arc<dyn BatchOperation>>>,
}

impl BatchCoordinator {
    /// Creates a coordinator with nothing touched.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Marks an operation as having buffered work and wakes the run loop.
    pub fn touch(&self, operation: Arc<dyn BatchOperation>) {
        if let Ok(mut touched) = self.touched.lock() {
            touched.push(operation);
        }
        self.wake.notify_one();
    }

    /// Drains and dispatches every touched operation once.
    pub async fn run_cycle(&self) {
        let drained = match self.touched.lock() {
            Ok(mut touched) => std::mem::take(&mut *touched),
            Err(_) => return,
        };
        // identities are usize so the future stays Send across the dispatch
        let mut seen: Vec<usize> = Vec::with_capacity(drained.len());
        for operation in drained {
            let identity = Arc::as_ptr(&operation) as *const () as usize;
            if seen.contains(&identity) {
                continue;
            }
            seen.push(identity);
            if operation.buffered() > 0 {
                trace!(buffered = operation.buffered(), "dispatching batch");
                operation.dispatch().await;
            }
        }
    }

    /// The coordinator loop: waits for touches and dispatches until
    /// cancelled. Cancellation is observed on the wake after `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancelSignal) {
        loop {
            self.wake.notified().await;
            if cancel.is_cancelled() {
                break;
            }
            self.run_cycle().await;
        }
    }
}

impl std::fmt::Debug for BatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let touched = self.touched.lock().map(|t| t.len()).unwrap_or(0);
        f.debug_struct("BatchCoordinator")
            .field("touched", &touched)
            .finish()
    }
}

/// The batch function: unique keys in, key/value map out. Keys without an
/// entry in the map load as `None`.
pub type BatchFn<K, V> =
    Arc<dyn Fn(Vec<K>) -> Pin<Box<dyn Future<Output = HashMap<K, V>> + Send>> + Send + Sync>;

/// A caching, batching loader for one kind of key.
pub struct DataLoader<K, V> {
    inner: Arc<LoaderInner<K, V>>,
    coordinator: Arc<BatchCoordinator>,
}

impl<K, V> Clone for DataLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

struct LoaderInner<K, V> {
    batch_fn: BatchFn<K, V>,
    cache: RwLock<FxHashMap<K, V>>,
    pending: Mutex<Vec<(K, oneshot::Sender<Option<V>>)>>,
    batch_size: usize,
}

impl<K, V> DataLoader<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a loader attached to a coordinator.
    pub fn new<F, Fut>(coordinator: Arc<BatchCoordinator>, batch_fn: F) -> Self
    where
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HashMap<K, V>> + Send + 'static,
    {
        Self {
            inner: Arc::new(LoaderInner {
                batch_fn: Arc::new(move |keys| Box::pin(batch_fn(keys))),
                cache: RwLock::new(FxHashMap::default()),
                pending: Mutex::new(Vec::new()),
                batch_size: usize::MAX,
            }),
            coordinator,
        }
    }

    /// Caps how many keys one dispatch passes to the batch function.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.batch_size = batch_size.max(1);
        }
        self
    }

    /// Loads one key, batched with every other load in flight.
    pub async fn load(&self, key: K) -> Option<V> {
        if let Ok(cache) = self.inner.cache.read() {
            if let Some(value) = cache.get(&key) {
                return Some(value.clone());
            }
        }
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.push((key, tx));
        }
        self.coordinator.touch(self.inner.clone());
        rx.await.ok().flatten()
    }

    /// Loads several keys, preserving order.
    pub async fn load_many(&self, keys: Vec<K>) -> Vec<Option<V>> {
        futures::future::join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    /// Seeds the cache without touching the backend.
    pub fn prime(&self, key: K, value: V) {
        if let Ok(mut cache) = self.inner.cache.write() {
            cache.insert(key, value);
        }
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.cache.write() {
            cache.clear();
        }
    }
}

impl<K, V> BatchOperation for LoaderInner<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn buffered(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn dispatch(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            loop {
                let waiters = match self.pending.lock() {
                    Ok(mut pending) => {
                        let take = pending.len().min(self.batch_size);
                        pending.drain(..take).collect::<Vec<_>>()
                    }
                    Err(_) => return,
                };
                if waiters.is_empty() {
                    return;
                }

                let mut keys: Vec<K> = Vec::with_capacity(waiters.len());
                for (key, _) in &waiters {
                    if !keys.contains(key) {
                        keys.push(key.clone());
                    }
                }
                let loaded = (self.batch_fn)(keys).await;
                if let Ok(mut cache) = self.cache.write() {
                    for (key, value) in &loaded {
                        cache.insert(key.clone(), value.clone());
                    }
                }
                for (key, tx) in waiters {
                    let _ = tx.send(loaded.get(&key).cloned());
                }
            }
        })
    }
}
