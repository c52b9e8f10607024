use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::Error;
use crate::Result;

/// Payload of a cross-context message, as handed to `message` listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageData {
    Text(String),
    Structured(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub data: MessageData,
}

impl MessageEvent {
    pub fn text<S: Into<String>>(data: S) -> Self {
        Self {
            data: MessageData::Text(data.into()),
        }
    }

    pub fn structured(data: serde_json::Value) -> Self {
        Self {
            data: MessageData::Structured(data),
        }
    }
}

/// The page side of the cross-context message primitive.
pub trait MessagePort: Send + Sync + 'static {
    /// The page's own origin, `None` when unavailable.
    fn origin(&self) -> Option<String>;

    fn post_message(&self, data: String, target_origin: &str) -> Result<()>;

    /// Registers a new `message` listener. Every listener sees every
    /// inbound message.
    fn add_listener(&self) -> mpsc::UnboundedReceiver<MessageEvent>;
}

/// A message posted through a [`ChannelPort`].
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub data: String,
    pub target_origin: String,
}

impl PostedMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.data).unwrap_or(serde_json::Value::Null)
    }
}

/// Fan-out of inbound events to every registered listener.
#[derive(Clone, Default)]
pub(crate) struct ListenerSet {
    inner: Arc<Mutex<Vec<mpsc::UnboundedSender<MessageEvent>>>>,
}

impl ListenerSet {
    pub(crate) fn add(&self) -> mpsc::UnboundedReceiver<MessageEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub(crate) fn dispatch(&self, data: MessageData) -> usize {
        let mut listeners = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        listeners.retain(|tx| !tx.is_closed());
        listeners
            .iter()
            .filter(|tx| tx.send(MessageEvent { data: data.clone() }).is_ok())
            .count()
    }
}

/// In-memory port: posted messages come out of the receiver returned by
/// [`ChannelPort::new`], inbound messages go in through [`ChannelPort::dispatch`].
pub struct ChannelPort {
    origin: Option<String>,
    posted_tx: mpsc::UnboundedSender<PostedMessage>,
    listeners: ListenerSet,
}

impl ChannelPort {
    pub fn new(origin: Option<&str>) -> (Self, mpsc::UnboundedReceiver<PostedMessage>) {
        let (posted_tx, posted_rx) = mpsc::unbounded_channel();
        (
            Self {
                origin: origin.map(str::to_string),
                posted_tx,
                listeners: ListenerSet::default(),
            },
            posted_rx,
        )
    }

    /// Delivers `data` to every live listener, returns how many saw it.
    pub fn dispatch(&self, data: MessageData) -> usize {
        self.listeners.dispatch(data)
    }

    pub fn dispatch_json(&self, value: serde_json::Value) -> usize {
        self.dispatch(MessageData::Text(value.to_string()))
    }
}

impl MessagePort for ChannelPort {
    fn origin(&self) -> Option<String> {
        self.origin.clone()
    }

    fn post_message(&self, data: String, target_origin: &str) -> Result<()> {
        self.posted_tx
            .send(PostedMessage {
                data,
                target_origin: target_origin.to_string(),
            })
            .map_err(|_| Error::Transport("message port closed".to_string()))
    }

    fn add_listener(&self) -> mpsc::UnboundedReceiver<MessageEvent> {
        self.listeners.add()
    }
}
