// src/notify/registry.rs
//! Connected real-time clients and the social-monitoring flag.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::RealtimeEvent;

pub const DEFAULT_CLIENT_BUFFER: usize = 64;

pub type SubscriberId = u64;

#[derive(Debug)]
pub struct SubscriberRegistry {
    clients: Mutex<HashMap<SubscriberId, mpsc::Sender<RealtimeEvent>>>,
    next_id: AtomicU64,
    monitoring: AtomicBool,
    buffer: usize,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CLIENT_BUFFER)
    }
}

impl SubscriberRegistry {
    /// `buffer` is the per-client queue length; events beyond it are dropped for that client.
    pub fn new(buffer: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            monitoring: AtomicBool::new(false),
            buffer: buffer.max(1),
        }
    }

    fn clients(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<RealtimeEvent>>> {
        // map state stays consistent even if a holder panicked
        self.clients.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients().insert(id, tx);
        tracing::debug!(target: "notify", subscriber = id, "client subscribed");
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(self),
        }
    }

    pub fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.clients().remove(&id).is_some();
        if removed {
            tracing::debug!(target: "notify", subscriber = id, "client unsubscribed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.clients().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blocking send to every client. Returns how many received it.
    pub fn broadcast(&self, event: &RealtimeEvent) -> usize {
        let mut clients = self.clients();
        let mut delivered = 0;
        clients.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(target: "notify", subscriber = *id, event = event.name(), "client lagging, event dropped");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    pub fn monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Relaxed)
    }

    /// Returns the previous value.
    pub fn set_monitoring(&self, on: bool) -> bool {
        self.monitoring.swap(on, Ordering::Relaxed)
    }
}

/// One client's event stream. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<RealtimeEvent>,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = RealtimeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
