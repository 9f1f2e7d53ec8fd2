use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::Mechanism;
use crate::error::Result;
use crate::types::{Delta, Listing, Scope};

#[cfg(test)]
pub(crate) mod fake;
pub mod kubernetes;
pub use self::kubernetes::KubeControlPlane;

/// Stream of changes produced by a single watch call.
pub type DeltaStream = BoxStream<'static, Result<Delta>>;

/// The list and watch calls the reflector drives against the cluster.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// Returns every object of `kind` in `scope` plus the token to resume from.
    async fn list(&self, kind: Mechanism, scope: &Scope) -> Result<Listing>;

    /// Streams the changes made after `resource_version`.
    async fn watch(
        &self,
        kind: Mechanism,
        scope: &Scope,
        resource_version: &str,
    ) -> Result<DeltaStream>;
}
