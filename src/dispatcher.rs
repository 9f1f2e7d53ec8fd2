//! Rebuilds and publishes the peer list on every store notification.
//!
//! No filtering or debouncing happens here: each add, update or delete,
//! observable to the builder or not, produces one full rebuild and one
//! call of the update callback with the complete list.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{PoolConfig, UpdateFn};
use crate::logging::Logger;
use crate::peers::PeerListBuilder;
use crate::reflector::{EventHandler, Store};
use crate::types::{ClusterObject, ObjectKey};

pub struct PeerDispatcher {
    store: Store,
    builder: PeerListBuilder,
    on_update: UpdateFn,
    logger: Arc<dyn Logger>,
}

impl PeerDispatcher {
    pub fn new(config: &PoolConfig, store: Store) -> Self {
        Self {
            store,
            builder: PeerListBuilder::new(config),
            on_update: Arc::clone(&config.on_update),
            logger: Arc::clone(&config.logger),
        }
    }

    /// Builds the peer list from a store snapshot and hands it to the
    /// callback.
    pub async fn publish(&self) {
        let snapshot = self.store.list().await;
        let peers = self.builder.build(&snapshot);
        self.logger
            .debug(format_args!("Publishing {} peers", peers.len()));
        (self.on_update)(peers);
    }
}

#[async_trait]
impl EventHandler for PeerDispatcher {
    async fn on_add(&self, key: &ObjectKey, _object: &ClusterObject) {
        self.logger.debug(format_args!("Peer source added '{}'", key));
        self.publish().await;
    }

    async fn on_update(&self, key: &ObjectKey, _old: &ClusterObject, _new: &ClusterObject) {
        self.logger.debug(format_args!("Peer source updated '{}'", key));
        self.publish().await;
    }

    async fn on_delete(&self, key: &ObjectKey, _object: &ClusterObject) {
        self.logger.debug(format_args!("Peer source deleted '{}'", key));
        self.publish().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::Mechanism;
    use crate::logging::NoopLogger;
    use crate::types::fixtures::{container, pod};

    fn dispatcher(store: Store) -> (PeerDispatcher, Arc<Mutex<Vec<Vec<String>>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let config = PoolConfig::new(move |peers| sink.lock().unwrap().push(peers))
            .mechanism(Mechanism::Pods)
            .logger(Arc::new(NoopLogger));
        (PeerDispatcher::new(&config, store), calls)
    }

    #[tokio::test]
    async fn every_notification_publishes_once() {
        let store = Store::default();
        let object = pod("web-0", "10.0.0.1", vec![container(true, true)]);
        let key = object.key().unwrap();
        store.insert(key.clone(), object.clone()).await;
        let (dispatcher, calls) = dispatcher(store.clone());

        dispatcher.on_add(&key, &object).await;
        dispatcher.on_update(&key, &object, &object).await;
        store.remove(&key).await;
        dispatcher.on_delete(&key, &object).await;

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                vec!["http://10.0.0.1:8080".to_string()],
                vec!["http://10.0.0.1:8080".to_string()],
                vec![],
            ]
        );
    }

    #[tokio::test]
    async fn unobservable_change_still_publishes() {
        let store = Store::default();
        let object = pod("web-0", "10.0.0.1", vec![container(false, true)]);
        let key = object.key().unwrap();
        store.insert(key.clone(), object.clone()).await;
        let (dispatcher, calls) = dispatcher(store);

        dispatcher.on_update(&key, &object, &object).await;
        assert_eq!(*calls.lock().unwrap(), vec![Vec::<String>::new()]);
    }
}
