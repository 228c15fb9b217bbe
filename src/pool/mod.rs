//! Keyed renderer pool.
//!
//! Renderers are expensive to build (they load a style) and are not safe to
//! share between concurrent renders, so each style key owns a bounded FIFO
//! pool of them.
//!
//! ```text
//! acquire("osm") ──► ┌──────────── KeySlot "osm" ────────────┐
//!                    │ Semaphore(max_size)   FIFO waiters     │
//!                    │ idle: [r2, r1]        in_use: 1        │
//!                    └──────────────┬─────────────────────────┘
//!                                   │ pop newest idle, or Manager::create
//!                                   ▼
//!                          PooledResource (guard)
//!                                   │ drop
//!                                   ▼
//!                push to idle, wake next waiter (or destroy)
//! ```
//!
//! Idle entries older than the idle timeout are destroyed by
//! [`KeyedPool::reap_idle`], normally driven by [`KeyedPool::spawn_reaper`].

mod keyed;
mod manager;

pub use keyed::{
    KeyedPool, PoolConfig, PoolStatus, PooledResource, DEFAULT_ACQUIRE_TIMEOUT,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_POOL_MAX_SIZE,
};
pub use manager::Manager;
