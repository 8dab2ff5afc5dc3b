use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::config::GAME_COMPLETED_EVENT;

pub type ListenerId = u64;
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Named-event subscribe/unsubscribe capability. The real-time channel and the
/// in-process broadcast bus both look like this from our side.
pub trait EventChannel: Send + Sync {
    fn subscribe(&self, event: &str, handler: EventHandler) -> ListenerId;
    /// Returns false when `id` was not registered for `event`.
    fn unsubscribe(&self, event: &str, id: ListenerId) -> bool;
}

/// Same-process publish/subscribe bus.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, EventHandler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls every handler registered for `event` and returns how many ran.
    /// Handlers run on the publisher's thread, outside the registry lock.
    pub fn publish(&self, event: &str, payload: &Value) -> usize {
        let handlers: Vec<EventHandler> = {
            let listeners = self
                .listeners
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            listeners
                .get(event)
                .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners.get(event).map(Vec::len).unwrap_or(0)
    }
}

impl EventChannel for EventBus {
    fn subscribe(&self, event: &str, handler: EventHandler) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        listeners
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    fn unsubscribe(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    Channel,
    Broadcast,
}

/// A live registration. Dropping it unregisters the handler.
pub struct Subscription {
    channel: Arc<dyn EventChannel>,
    event: String,
    id: ListenerId,
    active: bool,
}

impl Subscription {
    pub fn cancel(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if !self.channel.unsubscribe(&self.event, self.id) {
            tracing::debug!(event = %self.event, id = self.id, "listener already gone");
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The one internal "a game just completed" signal. Every event source feeds
/// it through [`GameCompletedPort::attach`].
#[derive(Clone)]
pub struct GameCompletedPort {
    notify: Arc<dyn Fn(SignalSource) + Send + Sync>,
}

impl GameCompletedPort {
    pub fn new(notify: impl Fn(SignalSource) + Send + Sync + 'static) -> Self {
        Self {
            notify: Arc::new(notify),
        }
    }

    pub fn signal(&self, source: SignalSource) {
        (self.notify)(source);
    }

    pub fn attach(&self, source: SignalSource, channel: Arc<dyn EventChannel>) -> Subscription {
        let port = self.clone();
        let handler: EventHandler = Arc::new(move |_payload: &Value| port.signal(source));
        let id = channel.subscribe(GAME_COMPLETED_EVENT, handler);
        Subscription {
            channel,
            event: GAME_COMPLETED_EVENT.to_string(),
            id,
            active: true,
        }
    }
}

/// Keeps the channel-bound and broadcast-bound adapters registered while the
/// sync runs.
pub struct Invalidator {
    port: GameCompletedPort,
    channel: Option<Subscription>,
    broadcast: Option<Subscription>,
}

impl Invalidator {
    pub fn start(
        port: GameCompletedPort,
        channel: Option<Arc<dyn EventChannel>>,
        broadcast: Arc<dyn EventChannel>,
    ) -> Self {
        let channel = channel.map(|ch| port.attach(SignalSource::Channel, ch));
        let broadcast = Some(port.attach(SignalSource::Broadcast, broadcast));
        Self {
            port,
            channel,
            broadcast,
        }
    }

    /// Moves the channel listener to `channel`, or drops it when `None`.
    pub fn rebind_channel(&mut self, channel: Option<Arc<dyn EventChannel>>) {
        if let Some(mut old) = self.channel.take() {
            old.cancel();
        }
        self.channel = channel.map(|ch| self.port.attach(SignalSource::Channel, ch));
    }

    pub fn stop(&mut self) {
        if let Some(mut sub) = self.channel.take() {
            sub.cancel();
        }
        if let Some(mut sub) = self.broadcast.take() {
            sub.cancel();
        }
    }

    pub fn has_channel(&self) -> bool {
        self.channel.as_ref().is_some_and(Subscription::is_active)
    }

    pub fn is_listening(&self) -> bool {
        self.broadcast.as_ref().is_some_and(Subscription::is_active)
    }
}
