//! Resource port for pooled client handles.
//!
//! The pool is agnostic to what a handle does. It only needs a way to
//! create one and a way to ask whether an existing one is still usable.

use async_trait::async_trait;

/// Minimal capability every pooled handle must expose.
///
/// Called during the pool's health check before an idle handle is lent
/// out again. Must be cheap and non-blocking; anything expensive belongs in
/// the domain operations performed through the handle.
pub trait Probe {
    /// Whether the handle can still serve requests.
    fn is_alive(&self) -> bool;
}

/// Factory for expensive-to-create client handles.
///
/// Implemented by the host around whatever memory/vector-store client it
/// uses. Failures are logged by the pool and surface to borrowers as
/// [`PoolError::ResourceCreation`](crate::error::PoolError::ResourceCreation).
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The handle type lent out by the pool.
    type Handle: Probe + Send + Sync + 'static;

    /// Create a new handle. May suspend (network handshake, index load, ...).
    async fn create(&self) -> anyhow::Result<Self::Handle>;

    /// Human-readable name used in logs.
    fn name(&self) -> &'static str {
        "resource"
    }
}
