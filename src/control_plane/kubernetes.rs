//! Kubernetes implementation of [`ControlPlane`].

use std::fmt::Debug;

use async_trait::async_trait;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{Endpoints, Pod};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::{Client, Resource};
use log::info;
use serde::de::DeserializeOwned;

use super::{ControlPlane, DeltaStream};
use crate::config::Mechanism;
use crate::error::{Error, Result};
use crate::types::{ClusterObject, Delta, Listing, Scope};

/// HTTP status the API server uses for a resume token it no longer retains.
const GONE: u16 = 410;

pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connects with the in-cluster service account, falling back to the
    /// local kubeconfig.
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await.map_err(Error::Client)?;
        info!(
            "Connected to cluster API, default namespace {}",
            client.default_namespace()
        );
        Ok(Self::new(client))
    }

    fn api<K>(&self, scope: &Scope) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        if scope.namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), &scope.namespace)
        }
    }

    async fn list_as<K>(&self, scope: &Scope, wrap: fn(K) -> ClusterObject) -> Result<Listing>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug,
        K::DynamicType: Default,
    {
        let mut params = ListParams::default();
        if !scope.label_selector.is_empty() {
            params = params.labels(&scope.label_selector);
        }
        let list = self
            .api::<K>(scope)
            .list(&params)
            .await
            .map_err(classify)?;
        Ok(Listing {
            resource_version: list.metadata.resource_version.unwrap_or_default(),
            objects: list.items.into_iter().map(wrap).collect(),
        })
    }

    async fn watch_as<K>(
        &self,
        scope: &Scope,
        resource_version: &str,
        wrap: fn(K) -> ClusterObject,
    ) -> Result<DeltaStream>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug
            + Send
            + 'static,
        K::DynamicType: Default,
    {
        let mut params = WatchParams::default();
        if !scope.label_selector.is_empty() {
            params = params.labels(&scope.label_selector);
        }
        let stream = self
            .api::<K>(scope)
            .watch(&params, resource_version)
            .await
            .map_err(classify)?;
        Ok(stream
            .map(move |event| match event {
                Ok(event) => into_delta(event, wrap),
                Err(err) => Err(classify(err)),
            })
            .boxed())
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn list(&self, kind: Mechanism, scope: &Scope) -> Result<Listing> {
        match kind {
            Mechanism::Pods => self.list_as::<Pod>(scope, ClusterObject::Pod).await,
            Mechanism::Endpoints => {
                self.list_as::<Endpoints>(scope, ClusterObject::Endpoints)
                    .await
            }
        }
    }

    async fn watch(
        &self,
        kind: Mechanism,
        scope: &Scope,
        resource_version: &str,
    ) -> Result<DeltaStream> {
        match kind {
            Mechanism::Pods => {
                self.watch_as::<Pod>(scope, resource_version, ClusterObject::Pod)
                    .await
            }
            Mechanism::Endpoints => {
                self.watch_as::<Endpoints>(scope, resource_version, ClusterObject::Endpoints)
                    .await
            }
        }
    }
}

fn classify(err: kube::Error) -> Error {
    match err {
        kube::Error::Api(response) if response.code == GONE => Error::Expired(response.message),
        other => Error::Api(other),
    }
}

fn into_delta<K>(event: WatchEvent<K>, wrap: fn(K) -> ClusterObject) -> Result<Delta> {
    match event {
        WatchEvent::Added(object) => Ok(Delta::Added(wrap(object))),
        WatchEvent::Modified(object) => Ok(Delta::Modified(wrap(object))),
        WatchEvent::Deleted(object) => Ok(Delta::Deleted(wrap(object))),
        WatchEvent::Bookmark(bookmark) => Ok(Delta::Bookmark(bookmark.metadata.resource_version)),
        WatchEvent::Error(response) if response.code == GONE => {
            Err(Error::Expired(response.message))
        }
        WatchEvent::Error(response) => Err(Error::Watch(format!(
            "{} ({}): {}",
            response.reason, response.code, response.message
        ))),
    }
}
