//! In-process publish/subscribe keyed by [`Channel`].
//!
//! Handlers run in the publisher's context over a snapshot of the current
//! subscriber set. A failing or panicking handler is logged and does not
//! affect its siblings or the publisher. Async handlers are spawned on the
//! current tokio runtime and never awaited.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use parkdash_core::protocol::{Channel, Message};
use parkdash_core::Filters;

#[derive(Debug, Clone)]
pub enum BusEvent {
    Opened,
    Closed,
    Message(Arc<Message>),
    Filters(Filters),
}

impl BusEvent {
    pub fn message(&self) -> Option<&Message> {
        match self {
            BusEvent::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

type SyncFn = dyn Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync;
type AsyncFn = dyn Fn(BusEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A subscriber. Identity is the allocation behind the `Arc`, so clones of one
/// handler count as the same subscriber.
#[derive(Clone)]
pub enum Handler {
    Sync(Arc<SyncFn>),
    Async(Arc<AsyncFn>),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&BusEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(BusEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Handler::Async(Arc::new(move |ev| f(ev).boxed()))
    }

    fn identity(&self) -> *const () {
        match self {
            Handler::Sync(f) => Arc::as_ptr(f) as *const (),
            Handler::Async(f) => Arc::as_ptr(f) as *const (),
        }
    }

    fn same(&self, other: &Handler) -> bool {
        self.identity() == other.identity()
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Handler::Sync(_) => "Sync",
            Handler::Async(_) => "Async",
        };
        write!(f, "Handler::{kind}({:p})", self.identity())
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<Channel, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the handler was already registered on `channel`.
    pub fn subscribe(&self, channel: Channel, handler: Handler) -> bool {
        let mut map = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let list = map.entry(channel).or_default();
        if list.iter().any(|h| h.same(&handler)) {
            return false;
        }
        list.push(handler);
        true
    }

    pub fn unsubscribe(&self, channel: Channel, handler: &Handler) -> bool {
        let mut map = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        let Some(list) = map.get_mut(&channel) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| !h.same(handler));
        before != list.len()
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        let map = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&channel).map_or(0, Vec::len)
    }

    pub fn publish(&self, channel: Channel, event: BusEvent) {
        let snapshot: Vec<Handler> = {
            let map = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            map.get(&channel).cloned().unwrap_or_default()
        };

        for handler in snapshot {
            match handler {
                Handler::Sync(f) => match catch_unwind(AssertUnwindSafe(|| f(&event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::error!(%channel, "handler failed: {e:#}"),
                    Err(_) => tracing::error!(%channel, "handler panicked"),
                },
                Handler::Async(f) => {
                    let Ok(rt) = tokio::runtime::Handle::try_current() else {
                        tracing::error!(%channel, "async handler skipped: no runtime");
                        continue;
                    };
                    let fut = match catch_unwind(AssertUnwindSafe(|| f(event.clone()))) {
                        Ok(fut) => fut,
                        Err(_) => {
                            tracing::error!(%channel, "handler panicked");
                            continue;
                        }
                    };
                    rt.spawn(async move {
                        match AssertUnwindSafe(fut).catch_unwind().await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => tracing::error!(%channel, "async handler failed: {e:#}"),
                            Err(_) => tracing::error!(%channel, "async handler panicked"),
                        }
                    });
                }
            }
        }
    }
}
