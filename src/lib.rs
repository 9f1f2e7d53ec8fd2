//! Live peer list for a distributed cache, derived from the pods or
//! endpoints selected by a label selector in a Kubernetes namespace.
//!
//! ```no_run
//! use k8s_peerpool::{Mechanism, PeerPool, PoolConfig};
//!
//! # async fn run() -> k8s_peerpool::Result<()> {
//! let config = PoolConfig::new(|peers| println!("peers: {:?}", peers))
//!     .mechanism(Mechanism::Pods)
//!     .namespace("cache")
//!     .selector("app=groupcache");
//! let mut pool = PeerPool::connect(config).await?;
//! // ...
//! pool.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control_plane;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod peers;
pub mod pool;
pub mod reflector;
pub mod types;

pub use config::{Mechanism, PoolConfig, Settings, UpdateFn};
pub use control_plane::{ControlPlane, KubeControlPlane};
pub use error::{Error, Result};
pub use logging::{LogFacade, Logger, NoopLogger};
pub use pool::{PeerPool, PoolState};
pub use types::{ClusterObject, Delta, Listing, ObjectKey, Scope};
