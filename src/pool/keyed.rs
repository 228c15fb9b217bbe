//! Keyed, bounded resource pool.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::manager::Manager;
use crate::error::PoolError;

// =============================================================================
// Configuration
// =============================================================================

/// Default maximum number of live resources per key.
pub const DEFAULT_POOL_MAX_SIZE: usize = 5;

/// Default time an idle resource is kept before it is destroyed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default time an acquirer waits for a resource.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sizing and timeouts applied to every key of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of live resources (idle + in use) per key
    pub max_size: usize,

    /// Idle resources older than this are destroyed
    pub idle_timeout: Duration,

    /// How long `acquire` waits before failing with `Exhausted`
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_POOL_MAX_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

impl PoolConfig {
    pub fn new(max_size: usize, idle_timeout: Duration, acquire_timeout: Duration) -> Self {
        Self {
            max_size,
            idle_timeout,
            acquire_timeout,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("pool max_size must be greater than 0".to_string());
        }
        if self.max_size > Semaphore::MAX_PERMITS {
            return Err(format!(
                "pool max_size must be at most {}",
                Semaphore::MAX_PERMITS
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err("pool idle_timeout must be greater than 0".to_string());
        }
        if self.acquire_timeout.is_zero() {
            return Err("pool acquire_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Snapshot of one key's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    /// Live resources (idle + in use)
    pub size: usize,
    pub idle: usize,
    pub in_use: usize,
    pub max_size: usize,
}

// =============================================================================
// Internal State
// =============================================================================

struct IdleEntry<R> {
    resource: R,
    created_at: Instant,
    released_at: Instant,
}

struct SlotState<R> {
    /// Released resources, oldest release at the front
    idle: VecDeque<IdleEntry<R>>,
    in_use: usize,
}

/// Per-key pool: a fair semaphore bounds holders, the state tracks entries.
struct KeySlot<R> {
    semaphore: Arc<Semaphore>,
    state: Mutex<SlotState<R>>,
}

impl<R> KeySlot<R> {
    fn new(max_size: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_size)),
            state: Mutex::new(SlotState {
                idle: VecDeque::with_capacity(max_size),
                in_use: 0,
            }),
        }
    }
}

struct PoolInner<M: Manager> {
    manager: M,
    config: PoolConfig,
    slots: Mutex<HashMap<M::Key, Arc<KeySlot<M::Resource>>>>,
    closed: AtomicBool,
}

impl<M: Manager> PoolInner<M> {
    fn destroy(&self, key: &M::Key, resource: M::Resource, reason: &'static str) {
        match self.manager.destroy(key, resource) {
            Ok(()) => debug!(key = %key, reason, "Destroyed pooled resource"),
            Err(e) => warn!(
                key = %key,
                reason,
                error = %e,
                "Failed to destroy pooled resource, dropping it"
            ),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// =============================================================================
// KeyedPool
// =============================================================================

/// A pool of expensive resources grouped by key.
///
/// - At most `max_size` resources exist per key (idle + in use)
/// - Acquirers beyond that wait in FIFO order, up to `acquire_timeout`
/// - Released resources are reused until idle for `idle_timeout`
/// - Keys never block each other
///
/// Cloning is cheap and shares the same pool.
///
/// # Example
///
/// ```ignore
/// let pool = KeyedPool::new(manager, PoolConfig::default());
///
/// let mut renderer = pool.acquire(&"osm".to_string()).await?;
/// renderer.render()?;
/// // Returned to the pool here
/// drop(renderer);
/// ```
pub struct KeyedPool<M: Manager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: Manager> Clone for KeyedPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Manager> fmt::Debug for KeyedPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedPool")
            .field("config", &self.inner.config)
            .field("keys", &self.inner.slots.lock().len())
            .field("closed", &self.inner.is_closed())
            .finish()
    }
}

impl<M: Manager> KeyedPool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                manager,
                config,
                slots: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Get or lazily register the slot for `key`.
    fn slot(&self, key: &M::Key) -> Result<Arc<KeySlot<M::Resource>>, PoolError> {
        let mut slots = self.inner.slots.lock();
        if self.inner.is_closed() {
            return Err(PoolError::Closed);
        }
        let slot = slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeySlot::new(self.inner.config.max_size)));
        Ok(Arc::clone(slot))
    }

    /// Borrow a resource for `key`.
    ///
    /// Reuses an idle resource when one is available and valid, otherwise
    /// constructs one if the key is below `max_size`, otherwise waits in FIFO
    /// order for a release. Dropping the returned future while waiting
    /// leaves the queue without consuming a slot.
    ///
    /// # Errors
    ///
    /// - `Exhausted` if nothing is available within `acquire_timeout`
    /// - `Construction` if the manager fails to create a resource; the slot
    ///   is freed for the next acquirer
    /// - `Closed` after [`shutdown`](Self::shutdown)
    pub async fn acquire(&self, key: &M::Key) -> Result<PooledResource<M>, PoolError> {
        let slot = self.slot(key)?;
        let start = Instant::now();

        let permit = match tokio::time::timeout(
            self.inner.config.acquire_timeout,
            Arc::clone(&slot.semaphore).acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(PoolError::Closed),
            Err(_) => {
                let waited = start.elapsed();
                warn!(
                    key = %key,
                    wait_ms = waited.as_millis() as u64,
                    max_size = self.inner.config.max_size,
                    "Pool exhausted"
                );
                return Err(PoolError::Exhausted {
                    key: key.to_string(),
                    waited,
                });
            }
        };

        let wait_ms = start.elapsed().as_millis() as u64;

        // Reuse the most recently released entry that is still usable
        loop {
            let entry = slot.state.lock().idle.pop_back();
            let Some(entry) = entry else { break };

            if entry.released_at.elapsed() >= self.inner.config.idle_timeout {
                self.inner.destroy(key, entry.resource, "idle timeout");
                continue;
            }
            if !self.inner.manager.validate(key, &entry.resource) {
                self.inner.destroy(key, entry.resource, "failed validation");
                continue;
            }

            slot.state.lock().in_use += 1;
            debug!(key = %key, wait_ms, "Reused pooled resource");
            return Ok(PooledResource::new(
                key.clone(),
                entry.resource,
                entry.created_at,
                permit,
                slot,
                Arc::clone(&self.inner),
            ));
        }

        let resource = match self.inner.manager.create(key).await {
            Ok(resource) => resource,
            Err(e) => {
                // The permit drops here, so the slot is free for a retry
                warn!(key = %key, error = %e, "Failed to construct pooled resource");
                return Err(PoolError::Construction {
                    key: key.to_string(),
                    message: e.to_string(),
                });
            }
        };

        if self.inner.is_closed() {
            self.inner.destroy(key, resource, "pool closed during construction");
            return Err(PoolError::Closed);
        }

        slot.state.lock().in_use += 1;
        debug!(key = %key, wait_ms, "Constructed pooled resource");

        Ok(PooledResource::new(
            key.clone(),
            resource,
            Instant::now(),
            permit,
            slot,
            Arc::clone(&self.inner),
        ))
    }

    /// Destroy idle resources that have outlived `idle_timeout`.
    ///
    /// Returns the number of resources destroyed.
    pub fn reap_idle(&self) -> usize {
        let idle_timeout = self.inner.config.idle_timeout;
        let slots: Vec<_> = self
            .inner
            .slots
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut reaped = 0;
        for (key, slot) in slots {
            let expired: Vec<_> = {
                let mut state = slot.state.lock();
                let mut expired = Vec::new();
                while state
                    .idle
                    .front()
                    .is_some_and(|entry| entry.released_at.elapsed() >= idle_timeout)
                {
                    if let Some(entry) = state.idle.pop_front() {
                        expired.push(entry);
                    }
                }
                expired
            };

            for entry in expired {
                self.inner.destroy(&key, entry.resource, "idle timeout");
                reaped += 1;
            }
        }

        if reaped > 0 {
            debug!(reaped, "Reaped idle pooled resources");
        }
        reaped
    }

    /// Run [`reap_idle`](Self::reap_idle) every `interval` until shutdown.
    pub fn spawn_reaper(&self, interval: Duration) -> JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if pool.is_closed() {
                    break;
                }
                pool.reap_idle();
            }
        })
    }

    /// Close the pool.
    ///
    /// Every idle resource is destroyed now, resources still borrowed are
    /// destroyed when their guards drop, and all waiting and future
    /// acquirers fail with `Closed`.
    pub fn shutdown(&self) {
        let slots: Vec<_> = {
            let mut slots = self.inner.slots.lock();
            if self.inner.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            slots.drain().collect()
        };

        let mut destroyed = 0;
        let mut in_use = 0;
        for (key, slot) in slots {
            slot.semaphore.close();
            let drained: Vec<_> = {
                let mut state = slot.state.lock();
                in_use += state.in_use;
                state.idle.drain(..).collect()
            };
            for entry in drained {
                self.inner.destroy(&key, entry.resource, "shutdown");
                destroyed += 1;
            }
        }

        info!(destroyed, in_use, "Pool shut down");
    }

    /// Bookkeeping for one key, if it has been used.
    pub fn status(&self, key: &M::Key) -> Option<PoolStatus> {
        let slot = self.inner.slots.lock().get(key).cloned()?;
        Some(self.slot_status(&slot))
    }

    /// Keys the pool has seen since it was created.
    pub fn keys(&self) -> Vec<M::Key> {
        self.inner.slots.lock().keys().cloned().collect()
    }

    /// Bookkeeping for every key the pool has seen.
    pub fn statuses(&self) -> Vec<(M::Key, PoolStatus)> {
        let slots: Vec<_> = self
            .inner
            .slots
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        slots
            .into_iter()
            .map(|(key, slot)| (key, self.slot_status(&slot)))
            .collect()
    }

    fn slot_status(&self, slot: &KeySlot<M::Resource>) -> PoolStatus {
        let state = slot.state.lock();
        PoolStatus {
            size: state.idle.len() + state.in_use,
            idle: state.idle.len(),
            in_use: state.in_use,
            max_size: self.inner.config.max_size,
        }
    }
}

// =============================================================================
// PooledResource
// =============================================================================

/// A resource on loan from a [`KeyedPool`].
///
/// Dereferences to the resource. Dropping the guard returns the resource to
/// its key's idle queue exactly once and wakes the longest waiter. The
/// resource is destroyed instead when the guard was
/// [`discard`](Self::discard)ed, when it is dropped during a panic, or when
/// the pool has been shut down.
pub struct PooledResource<M: Manager> {
    resource: Option<M::Resource>,
    key: M::Key,
    created_at: Instant,
    discard: bool,
    slot: Arc<KeySlot<M::Resource>>,
    inner: Arc<PoolInner<M>>,
    // Dropped after `Drop::drop` has put the resource back
    _permit: OwnedSemaphorePermit,
}

impl<M: Manager> PooledResource<M> {
    fn new(
        key: M::Key,
        resource: M::Resource,
        created_at: Instant,
        permit: OwnedSemaphorePermit,
        slot: Arc<KeySlot<M::Resource>>,
        inner: Arc<PoolInner<M>>,
    ) -> Self {
        Self {
            resource: Some(resource),
            key,
            created_at,
            discard: false,
            slot,
            inner,
            _permit: permit,
        }
    }

    pub fn key(&self) -> &M::Key {
        &self.key
    }

    /// Time since the resource was constructed.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Destroy the resource now instead of returning it.
    pub fn discard(mut self) {
        self.discard = true;
    }
}

impl<M: Manager> Deref for PooledResource<M> {
    type Target = M::Resource;

    fn deref(&self) -> &Self::Target {
        self.resource
            .as_ref()
            .expect("pooled resource is present until drop")
    }
}

impl<M: Manager> DerefMut for PooledResource<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resource
            .as_mut()
            .expect("pooled resource is present until drop")
    }
}

impl<M: Manager> fmt::Debug for PooledResource<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("key", &self.key.to_string())
            .field("age", &self.age())
            .field("discard", &self.discard)
            .finish()
    }
}

impl<M: Manager> Drop for PooledResource<M> {
    fn drop(&mut self) {
        let Some(resource) = self.resource.take() else {
            return;
        };

        let reason = if self.discard {
            Some("discarded")
        } else if std::thread::panicking() {
            Some("holder panicked")
        } else {
            None
        };

        // The closed flag is read under the slot lock so a concurrent
        // shutdown either sees this entry in the idle queue or we see it closed
        let to_destroy = {
            let mut state = self.slot.state.lock();
            state.in_use = state.in_use.saturating_sub(1);
            match reason {
                None if !self.inner.is_closed() => {
                    state.idle.push_back(IdleEntry {
                        resource,
                        created_at: self.created_at,
                        released_at: Instant::now(),
                    });
                    None
                }
                None => Some((resource, "shutdown")),
                Some(reason) => Some((resource, reason)),
            }
        };

        if let Some((resource, reason)) = to_destroy {
            self.inner.destroy(&self.key, resource, reason);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
