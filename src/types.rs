//! Data structures flowing from the control plane into the pool.
//!
//! The pool watches one of two object kinds, pods or endpoints, and
//! keeps them in a single store.  [`ClusterObject`] wraps either kind so
//! the store, the reflector and the dispatcher stay kind-agnostic; only
//! the peer list builder looks inside.

use std::fmt;

use k8s_openapi::api::core::v1::{Endpoints, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::error::{Error, Result};

/// A cached copy of an object owned by the control plane.
///
/// The pool never mutates these; they are replaced wholesale whenever the
/// control plane reports a newer version.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterObject {
    /// A running workload unit.
    Pod(Pod),
    /// The ready addresses published for a service.
    Endpoints(Endpoints),
}

impl ClusterObject {
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ClusterObject::Pod(pod) => &pod.metadata,
            ClusterObject::Endpoints(endpoints) => &endpoints.metadata,
        }
    }

    /// Computes the `namespace/name` key (or just `name` for cluster scoped
    /// objects) under which the object is stored.
    pub fn key(&self) -> Result<ObjectKey> {
        let meta = self.metadata();
        let name = meta
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or(Error::MissingName)?;
        Ok(ObjectKey {
            namespace: meta.namespace.clone().filter(|ns| !ns.is_empty()),
            name: name.to_string(),
        })
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClusterObject::Pod(_) => "Pod",
            ClusterObject::Endpoints(_) => "Endpoints",
        }
    }
}

impl From<Pod> for ClusterObject {
    fn from(pod: Pod) -> Self {
        ClusterObject::Pod(pod)
    }
}

impl From<Endpoints> for ClusterObject {
    fn from(endpoints: Endpoints) -> Self {
        ClusterObject::Endpoints(endpoints)
    }
}

/// Store key of an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Namespace and label selector shared by the list and the watch call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    /// Empty means every namespace.
    pub namespace: String,
    pub label_selector: String,
}

/// A consistent snapshot returned by a list call.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub objects: Vec<ClusterObject>,
    /// Token the following watch resumes from.
    pub resource_version: String,
}

/// One change streamed by a watch call.
#[derive(Debug, Clone)]
pub enum Delta {
    Added(ClusterObject),
    Modified(ClusterObject),
    Deleted(ClusterObject),
    /// Progress marker carrying only a newer resume token.
    Bookmark(String),
}
