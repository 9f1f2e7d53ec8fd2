//! Lifecycle of a peer subscription.
//!
//! A [`PeerPool`] moves through `Uninitialized → Syncing → Running →
//! Closed` and never back.  [`PeerPool::start`] spawns the reflector task
//! and blocks until its first listing is applied; [`PeerPool::close`]
//! stops the task and waits for it, so no callback runs after it returns.
//!
//! The initial listing already dispatches one notification per listed
//! object, as a client-go informer does, so the update callback first
//! runs while the pool is still `Syncing`.  A callback slow enough to
//! exhaust the sync timeout therefore runs before `SyncTimeout` comes back.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::PoolConfig;
use crate::control_plane::{ControlPlane, KubeControlPlane};
use crate::dispatcher::PeerDispatcher;
use crate::error::{Error, Result};
use crate::reflector::{Reflector, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Uninitialized,
    Syncing,
    Running,
    Closed,
}

impl PoolState {
    fn name(self) -> &'static str {
        match self {
            PoolState::Uninitialized => "uninitialized",
            PoolState::Syncing => "syncing",
            PoolState::Running => "running",
            PoolState::Closed => "closed",
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct PeerPool {
    config: PoolConfig,
    control_plane: Option<Arc<dyn ControlPlane>>,
    store: Store,
    state: PoolState,
    shutdown: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl PeerPool {
    pub fn new(config: PoolConfig, control_plane: Arc<dyn ControlPlane>) -> Self {
        Self {
            config: config.normalized(),
            control_plane: Some(control_plane),
            store: Store::default(),
            state: PoolState::Uninitialized,
            shutdown: None,
            worker: None,
        }
    }

    /// Connects to the cluster and starts watching, returning a running pool.
    pub async fn connect(config: PoolConfig) -> Result<Self> {
        let control_plane = KubeControlPlane::connect().await?;
        let mut pool = Self::new(config, Arc::new(control_plane));
        pool.start().await?;
        Ok(pool)
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Read-only view of the mirrored objects.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Starts the reflector and waits for the initial sync.
    ///
    /// On timeout the reflector is stopped before `SyncTimeout` is returned
    /// and the pool ends up closed.
    pub async fn start(&mut self) -> Result<()> {
        let control_plane = match (self.state, self.control_plane.take()) {
            (PoolState::Uninitialized, Some(control_plane)) => control_plane,
            (state, _) => return Err(invalid("start", state)),
        };
        self.state = PoolState::Syncing;

        let logger = Arc::clone(&self.config.logger);
        logger.debug(format_args!(
            "Starting {} watch in namespace {:?} with selector {:?}",
            self.config.mechanism, self.config.namespace, self.config.selector
        ));

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (synced_tx, synced_rx) = oneshot::channel();
        let dispatcher = PeerDispatcher::new(&self.config, self.store.clone());
        let reflector = Reflector::new(
            control_plane,
            self.config.mechanism,
            self.config.scope(),
            self.store.clone(),
            Arc::new(dispatcher),
            Arc::clone(&logger),
            self.config.retry_delay,
        );
        let worker = tokio::spawn(reflector.run(shutdown_rx, synced_tx));

        let error = match timeout(self.config.sync_timeout, synced_rx).await {
            Ok(Ok(())) => {
                self.shutdown = Some(shutdown);
                self.worker = Some(worker);
                self.state = PoolState::Running;
                logger.debug(format_args!("Peer pool running"));
                return Ok(());
            }
            Ok(Err(_)) => Error::Watch("reflector stopped before the initial sync".into()),
            Err(_) => Error::SyncTimeout(self.config.sync_timeout),
        };

        let _ = shutdown.send(true);
        if let Err(e) = worker.await {
            logger.error(format_args!("Reflector task failed: {}", e));
        }
        self.state = PoolState::Closed;
        logger.error(format_args!("Failed to start peer pool: {}", error));
        Err(error)
    }

    /// Stops the watch and waits for the reflector task to exit.
    ///
    /// A callback already running completes first; none starts afterwards.
    pub async fn close(&mut self) -> Result<()> {
        if self.state != PoolState::Running {
            return Err(invalid("close", self.state));
        }
        self.state = PoolState::Closed;

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                self.config
                    .logger
                    .error(format_args!("Reflector task failed: {}", e));
            }
        }
        self.config.logger.debug(format_args!("Peer pool closed"));
        Ok(())
    }
}

impl Drop for PeerPool {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }
}

impl fmt::Debug for PeerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerPool")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn invalid(op: &'static str, state: PoolState) -> Error {
    Error::InvalidState {
        op,
        state: state.name(),
    }
}
