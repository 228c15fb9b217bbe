use std::fmt;
use std::hash::Hash;

use async_trait::async_trait;

/// Lifecycle hooks for resources held by a [`KeyedPool`](super::KeyedPool).
///
/// The pool is the only caller of these methods. `create` may be slow and
/// runs without any pool lock held; `validate` and `destroy` are synchronous
/// because they also run when a borrowed resource is returned on drop.
#[async_trait]
pub trait Manager: Send + Sync + 'static {
    /// Grouping key; resources are bounded per key.
    type Key: Clone + Eq + Hash + fmt::Display + Send + Sync + 'static;

    /// The pooled resource.
    type Resource: Send + 'static;

    /// Error reported by `create` and `destroy`.
    type Error: fmt::Display + Send + 'static;

    /// Construct a new resource for `key`.
    async fn create(&self, key: &Self::Key) -> Result<Self::Resource, Self::Error>;

    /// Check an idle resource before handing it out again.
    ///
    /// Returning `false` destroys the resource and the acquirer moves on to
    /// the next idle entry or a fresh one.
    fn validate(&self, _key: &Self::Key, _resource: &Self::Resource) -> bool {
        true
    }

    /// Release everything the resource holds.
    ///
    /// Failures are logged by the pool and the resource is forgotten either
    /// way.
    fn destroy(&self, key: &Self::Key, resource: Self::Resource) -> Result<(), Self::Error>;
}
