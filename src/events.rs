use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect,
    End,
    /// A subscription push, carrying its payload.
    Notification(serde_json::Value),
    /// Any other inbound frame, tagged with its frame type.
    Data {
        kind: String,
        body: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    End,
    Notification,
    Data,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connect => EventKind::Connect,
            Event::End => EventKind::End,
            Event::Notification(_) => EventKind::Notification,
            Event::Data { .. } => EventKind::Data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, EventKind, Listener)>,
}

/// Publish/subscribe hub with one channel per [`EventKind`].
///
/// Emission is synchronous and follows registration order. Nothing is
/// buffered: a listener added after an emission never sees it.
#[derive(Clone, Default)]
pub struct EventChannel {
    inner: Arc<Mutex<Listeners>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_id += 1;
        let id = ListenerId(inner.next_id);
        inner.entries.push((id, kind, Arc::new(listener)));
        id
    }

    /// Removes a listener, returns false if it was not registered.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.entries.len();
        inner.entries.retain(|(entry, _, _)| *entry != id);
        inner.entries.len() != before
    }

    /// Calls every listener of the event's channel, returns how many ran.
    pub fn emit(&self, event: &Event) -> usize {
        // snapshot so listeners may call on/off without deadlocking
        let listeners: Vec<Listener> = {
            let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner
                .entries
                .iter()
                .filter(|(_, kind, _)| *kind == event.kind())
                .map(|(_, _, listener)| listener.clone())
                .collect()
        };
        tracing::trace!(kind = ?event.kind(), listeners = listeners.len(), "emit");
        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.entries.iter().filter(|(_, k, _)| *k == kind).count()
    }

    /// Forwards every event of `kind` into a channel. The listener stays
    /// registered until the receiver is dropped and the next event arrives.
    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = self.clone();
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::default();
        let id = self.on(kind, {
            let slot = slot.clone();
            move |event| {
                if tx.send(event.clone()).is_err() {
                    if let Some(id) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                        channel.off(id);
                    }
                }
            }
        });
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(id);
        rx
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventChannel")
            .field("listeners", &inner.entries.len())
            .finish()
    }
}
