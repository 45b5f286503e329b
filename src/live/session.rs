use std::time::Duration;

use axum::response::sse::Event;
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::Message;

use super::{Hub, Subscription};

/// What a live stream emits next.
#[derive(Debug, PartialEq)]
pub enum LiveEvent {
    Message(Message),
    Ping,
}

impl LiveEvent {
    /// One SSE event per message, a comment per ping. A message that cannot be
    /// encoded turns into an `error` event and the stream carries on.
    pub fn into_sse(self) -> Event {
        match self {
            LiveEvent::Message(message) => Event::default().json_data(&message).unwrap_or_else(|err| {
                tracing::warn!(message_id = %message.id, error = %err, "could not encode live message");
                Event::default().event("error").data(err.to_string())
            }),
            LiveEvent::Ping => Event::default().comment("ping"),
        }
    }
}

/// One open client stream. Registered on open; unregistered when it ends or is
/// dropped, whichever comes first.
pub struct LiveSession {
    subscription: Subscription,
    queue: mpsc::Receiver<Message>,
    keep_alive: Interval,
    shutdown: CancellationToken,
}

impl LiveSession {
    pub fn open(hub: &Hub, user_id: Uuid, keep_alive: Duration, shutdown: CancellationToken) -> Self {
        let (subscription, queue) = hub.register(user_id);

        let mut keep_alive = interval_at(Instant::now() + keep_alive, keep_alive);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        LiveSession {
            subscription,
            queue,
            keep_alive,
            shutdown,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.subscription.user_id()
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_registered()
    }

    /// Waits for the next queued message, or a keep-alive ping once the stream
    /// has been quiet for a full interval. `None` once the server shuts down or
    /// the hub dropped this session; the session is unregistered by then.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        if !self.is_open() {
            return None;
        }

        let event = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            message = self.queue.recv() => message.map(LiveEvent::Message),
            _ = self.keep_alive.tick() => Some(LiveEvent::Ping),
        };

        match event {
            Some(LiveEvent::Message(_)) => self.keep_alive.reset(),
            Some(LiveEvent::Ping) => {}
            None => self.close(),
        }
        event
    }

    pub fn close(&mut self) {
        if self.is_open() {
            tracing::info!(user_id = %self.user_id(), session_id = self.subscription.id(), "live stream closed");
        }
        self.subscription.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::created_at_of;

    const KEEP_ALIVE: Duration = Duration::from_secs(15);

    fn message_to(receiver_id: Uuid, content: &str) -> Message {
        let id = Uuid::now_v7();
        Message {
            id,
            content: content.to_owned(),
            user_id: Uuid::now_v7(),
            conversation_id: Uuid::now_v7(),
            created_at: created_at_of(id),
            mine: true,
            receiver_id: Some(receiver_id),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_messages_then_pings_when_idle() {
        let hub = Hub::new(8);
        let bob = Uuid::now_v7();
        let mut session = LiveSession::open(&hub, bob, KEEP_ALIVE, CancellationToken::new());
        assert_eq!(hub.sessions_for(bob).len(), 1);

        hub.dispatch(&message_to(bob, "hello"));
        match session.next_event().await {
            Some(LiveEvent::Message(m)) => {
                assert_eq!(m.content, "hello");
                assert!(!m.mine);
            }
            other => panic!("expected a message, got {other:?}"),
        }

        let before = Instant::now();
        assert_eq!(session.next_event().await, Some(LiveEvent::Ping));
        assert!(Instant::now() - before >= KEEP_ALIVE - Duration::from_millis(1));
        assert_eq!(session.next_event().await, Some(LiveEvent::Ping));
        assert!(session.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn messages_push_the_next_ping_back() {
        let hub = Hub::new(8);
        let bob = Uuid::now_v7();
        let mut session = LiveSession::open(&hub, bob, KEEP_ALIVE, CancellationToken::new());

        tokio::time::sleep(Duration::from_secs(10)).await;
        hub.dispatch(&message_to(bob, "busy"));
        assert!(matches!(session.next_event().await, Some(LiveEvent::Message(_))));

        let delivered = Instant::now();
        assert_eq!(session.next_event().await, Some(LiveEvent::Ping));
        assert!(Instant::now() - delivered >= KEEP_ALIVE - Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_unregisters_without_any_message() {
        let hub = Hub::new(8);
        let bob = Uuid::now_v7();
        let shutdown = CancellationToken::new();
        let mut session = LiveSession::open(&hub, bob, KEEP_ALIVE, shutdown.clone());

        shutdown.cancel();
        assert_eq!(session.next_event().await, None);
        assert!(!session.is_open());
        assert!(hub.sessions_for(bob).is_empty());
        assert_eq!(session.next_event().await, None);
    }

    #[tokio::test]
    async fn dropping_the_session_unregisters() {
        let hub = Hub::new(8);
        let bob = Uuid::now_v7();
        let session = LiveSession::open(&hub, bob, KEEP_ALIVE, CancellationToken::new());
        let other = LiveSession::open(&hub, bob, KEEP_ALIVE, CancellationToken::new());
        assert_eq!(hub.sessions_for(bob).len(), 2);

        drop(session);
        assert_eq!(hub.sessions_for(bob).len(), 1);
        drop(other);
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_by_hub_drains_then_ends() {
        let hub = Hub::new(1);
        let bob = Uuid::now_v7();
        let mut session = LiveSession::open(&hub, bob, KEEP_ALIVE, CancellationToken::new());

        hub.dispatch(&message_to(bob, "kept"));
        hub.dispatch(&message_to(bob, "overflow"));
        assert!(hub.sessions_for(bob).is_empty());

        assert!(matches!(session.next_event().await, Some(LiveEvent::Message(m)) if m.content == "kept"));
        assert_eq!(session.next_event().await, None);
        assert!(!session.is_open());
    }
}
