//! In-memory fan-out of freshly persisted messages to open live streams.

mod session;
mod stream;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::models::Message;

pub use session::{LiveEvent, LiveSession};
pub use stream::subscribe;

pub type SessionId = u64;

/// Registry of live sessions keyed by owning user, plus the dispatcher that
/// feeds them. Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    sessions: DashMap<Uuid, HashMap<SessionId, mpsc::Sender<Message>>>,
    next_id: AtomicU64,
    capacity: usize,
}

/// Outcome of one [`Hub::dispatch`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

impl Hub {
    /// `capacity` bounds every session's delivery queue.
    pub fn new(capacity: usize) -> Self {
        Hub {
            inner: Arc::new(HubInner {
                sessions: DashMap::new(),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn register(&self, user_id: Uuid) -> (Subscription, mpsc::Receiver<Message>) {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);

        self.inner.sessions.entry(user_id).or_default().insert(id, tx);
        tracing::debug!(user_id = %user_id, session_id = id, "live session registered");

        let subscription = Subscription {
            hub: self.clone(),
            user_id,
            id,
            registered: true,
        };
        (subscription, rx)
    }

    /// Sessions owned by `user_id` right now, in registration order.
    pub fn sessions_for(&self, user_id: Uuid) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .inner
            .sessions
            .get(&user_id)
            .map(|sessions| sessions.keys().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn session_count(&self) -> usize {
        self.inner.sessions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Enqueues `message` on every session of its receiver without waiting on
    /// any of them. A session whose queue is full or whose stream is gone is
    /// dropped from the registry; its stream ends once it drains and the client
    /// reconnects.
    pub fn dispatch(&self, message: &Message) -> Delivery {
        let mut delivery = Delivery::default();
        let Some(receiver_id) = message.receiver_id else {
            return delivery;
        };

        let payload = Message {
            mine: false,
            ..message.clone()
        };

        if let Some(mut sessions) = self.inner.sessions.get_mut(&receiver_id) {
            sessions.retain(|&session_id, queue| match queue.try_send(payload.clone()) {
                Ok(()) => {
                    delivery.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        user_id = %receiver_id,
                        session_id,
                        "live session fell behind, dropping it"
                    );
                    delivery.dropped += 1;
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    delivery.dropped += 1;
                    false
                }
            });
        }

        if delivery.dropped > 0 {
            self.inner.sessions.remove_if(&receiver_id, |_, sessions| sessions.is_empty());
        }

        delivery
    }

    fn remove(&self, user_id: Uuid, id: SessionId) -> bool {
        let removed = {
            let Some(mut sessions) = self.inner.sessions.get_mut(&user_id) else {
                return false;
            };
            sessions.remove(&id).is_some()
        };

        self.inner.sessions.remove_if(&user_id, |_, sessions| sessions.is_empty());
        removed
    }
}

/// Capability to leave the registry. Dropping it unregisters.
pub struct Subscription {
    hub: Hub,
    user_id: Uuid,
    id: SessionId,
    registered: bool,
}

impl Subscription {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Safe to call any number of times, also after the hub already dropped
    /// this session.
    pub fn unregister(&mut self) {
        if !std::mem::replace(&mut self.registered, false) {
            return;
        }
        if self.hub.remove(self.user_id, self.id) {
            tracing::debug!(user_id = %self.user_id, session_id = self.id, "live session unregistered");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}
