//! Scripted in-memory control plane for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{future, stream, StreamExt};
use tokio::sync::mpsc;

use super::{ControlPlane, DeltaStream};
use crate::config::Mechanism;
use crate::error::Result;
use crate::types::{Delta, Listing, Scope};

/// Each list call consumes the next queued listing and each watch call the
/// next queued stream.  With nothing queued, the call never completes.
#[derive(Default)]
pub struct FakeControlPlane {
    listings: Mutex<VecDeque<Result<Listing>>>,
    watches: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<Delta>>>>,
    list_calls: AtomicUsize,
    watch_calls: AtomicUsize,
    last_scope: Mutex<Option<(Mechanism, Scope)>>,
}

impl FakeControlPlane {
    pub fn push_listing(&self, listing: Result<Listing>) {
        self.listings.lock().unwrap().push_back(listing);
    }

    /// Queues a watch stream and returns the sender feeding it.  Dropping
    /// the sender ends the stream.
    pub fn push_watch(&self) -> mpsc::UnboundedSender<Result<Delta>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watches.lock().unwrap().push_back(rx);
        tx
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn last_scope(&self) -> Option<(Mechanism, Scope)> {
        self.last_scope.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn list(&self, kind: Mechanism, scope: &Scope) -> Result<Listing> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_scope.lock().unwrap() = Some((kind, scope.clone()));
        let next = self.listings.lock().unwrap().pop_front();
        match next {
            Some(listing) => listing,
            None => future::pending().await,
        }
    }

    async fn watch(
        &self,
        _kind: Mechanism,
        _scope: &Scope,
        _resource_version: &str,
    ) -> Result<DeltaStream> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.watches.lock().unwrap().pop_front();
        match next {
            Some(rx) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }
}
