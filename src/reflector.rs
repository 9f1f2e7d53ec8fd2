//! List-then-watch mirror of the control plane.
//!
//! The [`Reflector`] lists every matching object once, then follows the
//! watch stream from the listing's resume token, applying each change to
//! its [`Store`] and notifying an [`EventHandler`].  It runs as a single
//! background task, so notifications are delivered one at a time and in
//! the order the control plane produced them.
//!
//! Steady-state failures never stop the task:
//!
//! * an expired resume token triggers an immediate re-list, or a delayed
//!   one when the watch expired again before delivering anything,
//! * other list or watch failures are logged and retried after a delay,
//! * a watch stream that simply ends is re-opened from the last token,
//! * an object without a usable key is logged and dropped.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{oneshot, watch, RwLock};
use tokio::time::sleep;

use crate::config::Mechanism;
use crate::control_plane::ControlPlane;
use crate::error::Error;
use crate::logging::Logger;
use crate::types::{ClusterObject, Delta, Listing, ObjectKey, Scope};

/// Receives one notification per change applied to the store.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_add(&self, key: &ObjectKey, object: &ClusterObject);
    async fn on_update(&self, key: &ObjectKey, old: &ClusterObject, new: &ClusterObject);
    async fn on_delete(&self, key: &ObjectKey, object: &ClusterObject);
}

/// Keyed snapshot of the objects last seen by the reflector.
///
/// Cloning yields another handle to the same store.  Only the reflector
/// writes to it; everyone else reads.
#[derive(Debug, Clone, Default)]
pub struct Store {
    objects: Arc<RwLock<HashMap<ObjectKey, ClusterObject>>>,
}

impl Store {
    /// Copies out every stored object under a single read lock.
    pub async fn list(&self) -> Vec<ClusterObject> {
        self.objects.read().await.values().cloned().collect()
    }

    pub async fn get(&self, key: &ObjectKey) -> Option<ClusterObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    async fn keys(&self) -> Vec<ObjectKey> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub(crate) async fn insert(
        &self,
        key: ObjectKey,
        object: ClusterObject,
    ) -> Option<ClusterObject> {
        self.objects.write().await.insert(key, object)
    }

    pub(crate) async fn remove(&self, key: &ObjectKey) -> Option<ClusterObject> {
        self.objects.write().await.remove(key)
    }

    async fn clear(&self) {
        self.objects.write().await.clear();
    }
}

enum Flow {
    Relist,
    /// The resume token expired; `progressed` tells whether the watch
    /// applied any change before that.
    Expired { progressed: bool },
    Stop,
}

pub struct Reflector {
    control_plane: Arc<dyn ControlPlane>,
    kind: Mechanism,
    scope: Scope,
    store: Store,
    handler: Arc<dyn EventHandler>,
    logger: Arc<dyn Logger>,
    retry_delay: Duration,
}

impl Reflector {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        kind: Mechanism,
        scope: Scope,
        store: Store,
        handler: Arc<dyn EventHandler>,
        logger: Arc<dyn Logger>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            control_plane,
            kind,
            scope,
            store,
            handler,
            logger,
            retry_delay,
        }
    }

    /// Runs until `shutdown` turns true or its sender goes away.
    ///
    /// `synced` fires once, after the first listing has been applied.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, synced: oneshot::Sender<()>) {
        let mut synced = Some(synced);
        let mut expired_streak = 0u32;
        loop {
            let listing = tokio::select! {
                _ = stopped(&mut shutdown) => break,
                listing = self.control_plane.list(self.kind, &self.scope) => listing,
            };

            let mut version = match listing {
                Ok(listing) => self.replace(listing).await,
                Err(e) => {
                    self.logger.error(format_args!(
                        "Failed to list {}: {}. Retrying in {:?}...",
                        self.kind, e, self.retry_delay
                    ));
                    if !self.pause(&mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if let Some(tx) = synced.take() {
                let count = self.store.len().await;
                self.logger.debug(format_args!(
                    "Cache synced with {} {} objects",
                    count, self.kind
                ));
                let _ = tx.send(());
            }

            match self.follow(&mut version, &mut shutdown).await {
                Flow::Relist => expired_streak = 0,
                Flow::Expired { progressed } => {
                    expired_streak = if progressed { 1 } else { expired_streak + 1 };
                    if expired_streak > 1 {
                        self.logger.debug(format_args!(
                            "Watch expired again right after listing, re-listing in {:?}",
                            self.retry_delay
                        ));
                        if !self.pause(&mut shutdown).await {
                            break;
                        }
                    }
                }
                Flow::Stop => break,
            }
        }

        self.store.clear().await;
        self.logger.debug(format_args!("Reflector for {} stopped", self.kind));
    }

    /// Applies a full listing: listed objects are added or updated, stored
    /// objects missing from the listing are deleted.
    async fn replace(&self, listing: Listing) -> String {
        let mut seen = HashSet::new();
        for object in listing.objects {
            let Some(key) = self.key_of(&object) else {
                continue;
            };
            seen.insert(key.clone());
            self.upsert(key, object).await;
        }

        for key in self.store.keys().await {
            if seen.contains(&key) {
                continue;
            }
            if let Some(old) = self.store.remove(&key).await {
                self.logger.debug(format_args!("Queue (Delete) '{}'", key));
                self.handler.on_delete(&key, &old).await;
            }
        }

        listing.resource_version
    }

    /// Follows watch streams until a re-list is needed or shutdown.
    async fn follow(&self, version: &mut String, shutdown: &mut watch::Receiver<bool>) -> Flow {
        let mut progressed = false;
        loop {
            let opened = tokio::select! {
                _ = stopped(shutdown) => return Flow::Stop,
                opened = self.control_plane.watch(self.kind, &self.scope, version) => opened,
            };

            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => return self.watch_failed(e, progressed, shutdown).await,
            };

            loop {
                let next = tokio::select! {
                    _ = stopped(shutdown) => return Flow::Stop,
                    next = stream.next() => next,
                };
                match next {
                    Some(Ok(delta)) => {
                        self.apply(delta, version).await;
                        progressed = true;
                    }
                    Some(Err(e)) => return self.watch_failed(e, progressed, shutdown).await,
                    None => {
                        self.logger.debug(format_args!(
                            "Watch closed, resuming from resource version {:?}",
                            version
                        ));
                        break;
                    }
                }
            }
        }
    }

    async fn watch_failed(
        &self,
        error: Error,
        progressed: bool,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Flow {
        if let Error::Expired(_) = error {
            self.logger.debug(format_args!("{}", error));
            return Flow::Expired { progressed };
        }
        self.logger.error(format_args!(
            "Watch on {} failed: {}. Re-listing in {:?}...",
            self.kind, error, self.retry_delay
        ));
        if self.pause(shutdown).await {
            Flow::Relist
        } else {
            Flow::Stop
        }
    }

    async fn apply(&self, delta: Delta, version: &mut String) {
        match delta {
            Delta::Bookmark(resource_version) => *version = resource_version,
            Delta::Added(object) | Delta::Modified(object) => {
                advance(version, &object);
                if let Some(key) = self.key_of(&object) {
                    self.upsert(key, object).await;
                }
            }
            Delta::Deleted(object) => {
                advance(version, &object);
                if let Some(key) = self.key_of(&object) {
                    self.store.remove(&key).await;
                    self.logger.debug(format_args!("Queue (Delete) '{}'", key));
                    self.handler.on_delete(&key, &object).await;
                }
            }
        }
    }

    async fn upsert(&self, key: ObjectKey, object: ClusterObject) {
        match self.store.insert(key.clone(), object.clone()).await {
            Some(old) => {
                self.logger.debug(format_args!("Queue (Update) '{}'", key));
                self.handler.on_update(&key, &old, &object).await;
            }
            None => {
                self.logger.debug(format_args!("Queue (Add) '{}'", key));
                self.handler.on_add(&key, &object).await;
            }
        }
    }

    fn key_of(&self, object: &ClusterObject) -> Option<ObjectKey> {
        match object.key() {
            Ok(key) => Some(key),
            Err(e) => {
                self.logger.error(format_args!(
                    "while computing key of {} object: {}",
                    object.kind(),
                    e
                ));
                None
            }
        }
    }

    /// Sleeps for the retry delay; false when shutdown came first.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = stopped(shutdown) => false,
            _ = sleep(self.retry_delay) => true,
        }
    }
}

fn advance(version: &mut String, object: &ClusterObject) {
    if let Some(resource_version) = object.resource_version() {
        *version = resource_version.to_string();
    }
}

async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as a stop request too.
    let _ = shutdown.wait_for(|stop| *stop).await;
}
