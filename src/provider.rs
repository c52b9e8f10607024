use std::ops::Deref;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use crate::call::Call;
use crate::codec::{self, Envelope, FrameKind, InboundFrame, OutboundFrame};
use crate::error::Error;
use crate::events::{Event, EventChannel, EventKind, ListenerId};
use crate::jsonrpc;
use crate::monitor::{ConnectionMonitor, ConnectionState, Signal};
use crate::options::ProviderOptions;
use crate::port::{MessageEvent, MessagePort};
use crate::registry::{BatchEntry, Callback, Registry, Reply};
use crate::Result;

/// How inbound replies are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    /// `data` and `error` frames; replies are unwrapped to `result`/`error`.
    Ethereum,
    /// `data` frames only; replies are delivered whole.
    Web3,
}

/// One member of [`Provider::send_batch`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BatchRequest {
    pub method: String,
    #[serde(default)]
    pub parameters: Value,
}

impl BatchRequest {
    pub fn new<S: Into<String>>(method: S, parameters: Value) -> Self {
        Self {
            method: method.into(),
            parameters,
        }
    }
}

fn check_method(method: &str) -> Result<()> {
    if method.is_empty() {
        return Err(Error::InvalidMethod(method.to_string()));
    }
    Ok(())
}

/// Missing params mean no params; anything else must be an array.
fn check_params(params: Value) -> Result<Value> {
    match params {
        Value::Null => Ok(Value::Array(Vec::new())),
        params @ Value::Array(_) => Ok(params),
        _ => Err(Error::InvalidParams),
    }
}

fn encode_request(id: i64, method: &str, params: Value) -> Result<Value> {
    serde_json::to_value(jsonrpc::Request {
        id,
        jsonrpc: jsonrpc::VERSION,
        method,
        params,
    })
    .map_err(Error::Encode)
}

enum Command {
    Write {
        ids: Vec<i64>,
        batch: bool,
        method: String,
        message: Value,
        callback: Callback,
    },
}

#[derive(Clone)]
pub struct Provider {
    inner: Arc<ProviderInner>,
}

impl Deref for Provider {
    type Target = ProviderInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("dialect", &self.dialect)
            .field("state", &self.connection_state())
            .finish_non_exhaustive()
    }
}

impl Provider {
    /// Starts a provider on `port`: registers the message listener, posts the
    /// first `create` frame and spawns the background task. Must be called
    /// inside a tokio runtime.
    pub fn new(port: Arc<dyn MessagePort>, options: ProviderOptions) -> Self {
        Self::with_dialect(port, options, Dialect::Ethereum)
    }

    pub(crate) fn with_dialect(port: Arc<dyn MessagePort>, options: ProviderOptions, dialect: Dialect) -> Self {
        let (inner, background) = ProviderInner::start(port, options, dialect);
        tokio::spawn(background.run());
        Self {
            inner: Arc::new(inner),
        }
    }
}

pub struct ProviderInner {
    command_tx: mpsc::UnboundedSender<Command>,
    next_id: AtomicI64,
    events: EventChannel,
    state: watch::Receiver<ConnectionState>,
    dialect: Dialect,
}

impl ProviderInner {
    fn start(port: Arc<dyn MessagePort>, options: ProviderOptions, dialect: Dialect) -> (Self, Background) {
        let envelope = Envelope::new(port.clone());
        let events = EventChannel::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let (mut monitor, state) = ConnectionMonitor::new(envelope.clone(), options.reconnect_interval);
        monitor.start();
        let signals = monitor.attach(&events);
        let inbound = port.add_listener();

        let background = Background {
            dispatcher: Dispatcher {
                dialect,
                subscription_marker: options.subscription_marker,
                registry: Registry::new(),
                events: events.clone(),
                envelope,
            },
            monitor,
            command_rx,
            inbound,
            signals,
        };
        (
            Self {
                command_tx,
                next_id: AtomicI64::new(1),
                events,
                state,
                dialect,
            },
            background,
        )
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.command_tx.send(command).map_err(|_| Error::ChannelSend)
    }

    /// Sends one call. `callback` gets the host's `result`, or its `error`.
    pub fn send<F>(&self, method: &str, params: Value, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        check_method(method)?;
        let params = check_params(params)?;
        let id = self.allocate_id();
        let message = encode_request(id, method, params)?;
        tracing::debug!(id, method, "send");
        self.submit(Command::Write {
            ids: vec![id],
            batch: false,
            method: method.to_string(),
            message,
            callback: Box::new(move |outcome| {
                callback(outcome.and_then(|reply| match reply {
                    Reply::Single(value) => Ok(value),
                    Reply::Batch(entries) => serde_json::to_value(entries).map_err(Error::Encode),
                }))
            }),
        })
    }

    /// Sends several calls as one frame. `callback` gets one entry per call,
    /// in request order.
    pub fn send_batch<I, F>(&self, requests: I, callback: F) -> Result<()>
    where
        I: IntoIterator<Item = BatchRequest>,
        F: FnOnce(Result<Vec<BatchEntry>>) + Send + 'static,
    {
        let checked = requests
            .into_iter()
            .map(|request| -> Result<(String, Value)> {
                check_method(&request.method)?;
                Ok((request.method, check_params(request.parameters)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let Some((first_method, _)) = checked.first() else {
            return Err(Error::EmptyBatch);
        };
        let method = first_method.clone();

        let mut ids = Vec::with_capacity(checked.len());
        let mut payloads = Vec::with_capacity(checked.len());
        for (method, params) in checked {
            let id = self.allocate_id();
            payloads.push(encode_request(id, &method, params)?);
            ids.push(id);
        }
        tracing::debug!(?ids, "send batch");
        self.submit(Command::Write {
            ids,
            batch: true,
            method,
            message: Value::Array(payloads),
            callback: Box::new(move |outcome| {
                callback(outcome.map(|reply| match reply {
                    Reply::Batch(entries) => entries,
                    Reply::Single(value) => vec![BatchEntry {
                        result: Some(value),
                        error: None,
                    }],
                }))
            }),
        })
    }

    /// Sends a caller-built payload (object or array) as is, keyed by the id
    /// of the payload or of its first member.
    pub(crate) fn send_payload(&self, payload: Value, callback: Callback) -> Result<()> {
        let first = match &payload {
            Value::Array(members) => members.first().ok_or(Error::EmptyBatch)?,
            object @ Value::Object(_) => object,
            _ => return Err(Error::InvalidPayload("payload must be an object or an array")),
        };
        let method = first
            .get("method")
            .and_then(Value::as_str)
            .ok_or(Error::InvalidPayload("payload method must be a string"))?
            .to_string();
        let ids = match &payload {
            Value::Array(members) => members
                .iter()
                .map(crate::registry::reply_id)
                .collect::<Option<Vec<_>>>(),
            single => crate::registry::reply_id(single).map(|id| vec![id]),
        }
        .ok_or(Error::InvalidPayload("payload id must be an integer"))?;
        tracing::debug!(?ids, method = %method, "send payload");
        self.submit(Command::Write {
            ids,
            batch: payload.is_array(),
            method,
            message: payload,
            callback,
        })
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.send(method, params, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        rx.await?
    }

    pub async fn request_batch<I>(&self, requests: I) -> Result<Vec<BatchEntry>>
    where
        I: IntoIterator<Item = BatchRequest>,
    {
        let (tx, rx) = oneshot::channel();
        self.send_batch(requests, move |outcome| {
            let _ = tx.send(outcome);
        })?;
        rx.await?
    }

    pub async fn call<C: Call>(&self, call: C) -> Result<C::Response> {
        let params = serde_json::to_value(call.to_params()).map_err(Error::Encode)?;
        let value = self.request(call.method(), params).await?;
        serde_json::from_value(value).map_err(Error::Decode)
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.on(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<Event> {
        self.events.subscribe(kind)
    }

    /// Best-effort view of the link to the host.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }
}

struct Dispatcher {
    dialect: Dialect,
    subscription_marker: String,
    registry: Registry,
    events: EventChannel,
    envelope: Envelope,
}

impl Dispatcher {
    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Write {
                ids,
                batch,
                method,
                message,
                callback,
            } => {
                self.registry.register(&ids, batch, method, callback);
                if let Err(e) = self.envelope.send(&OutboundFrame::Write { message }) {
                    tracing::warn!("write failed: {e}");
                    if let Some(&id) = ids.first() {
                        self.registry.reject(id, e);
                    }
                }
            }
        }
    }

    fn handle_message(&mut self, event: MessageEvent) {
        let Some(InboundFrame { kind, body }) = codec::decode(&event.data) else {
            tracing::trace!("dropped message without jsonrpc shape");
            return;
        };
        match (kind, body) {
            (FrameKind::Connect, _) => {
                self.events.emit(&Event::Connect);
            }
            (FrameKind::End, _) => {
                self.events.emit(&Event::End);
            }
            (kind @ FrameKind::Data, Some(body)) => self.route(kind, body),
            (kind @ FrameKind::Error, Some(body)) if self.dialect == Dialect::Ethereum => {
                self.route(kind, body)
            }
            (FrameKind::Data, None) => tracing::trace!("dropped data frame without message"),
            (kind, body) => {
                self.events.emit(&Event::Data {
                    kind: kind.as_str().to_string(),
                    body,
                });
            }
        }
    }

    fn is_subscription(&self, body: &Value) -> bool {
        body.get("method")
            .and_then(Value::as_str)
            .is_some_and(|method| method.contains(self.subscription_marker.as_str()))
    }

    fn route(&mut self, kind: FrameKind, body: Value) {
        let id = self
            .registry
            .locate(&body)
            .filter(|id| self.registry.contains(*id));
        match id {
            Some(id) => {
                let resolved = match self.dialect {
                    Dialect::Ethereum => self.registry.resolve(id, &kind, body),
                    Dialect::Web3 => self.registry.resolve_raw(id, body),
                };
                debug_assert!(resolved);
            }
            None if self.is_subscription(&body) => {
                tracing::trace!("subscription notification");
                let event = match self.dialect {
                    Dialect::Ethereum => Event::Notification(
                        body.get("result")
                            .or_else(|| body.get("params"))
                            .cloned()
                            .unwrap_or(Value::Null),
                    ),
                    Dialect::Web3 => Event::Data {
                        kind: FrameKind::Data.as_str().to_string(),
                        body: Some(body),
                    },
                };
                self.events.emit(&event);
            }
            None => tracing::trace!("reply without pending request dropped"),
        }
    }
}

struct Background {
    dispatcher: Dispatcher,
    monitor: ConnectionMonitor,
    command_rx: mpsc::UnboundedReceiver<Command>,
    inbound: mpsc::UnboundedReceiver<MessageEvent>,
    signals: mpsc::UnboundedReceiver<Signal>,
}

impl Background {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.dispatcher.handle_command(command),
                    None => break,
                },
                Some(event) = self.inbound.recv() => {
                    self.dispatcher.handle_message(event);
                }
                Some(signal) = self.signals.recv() => {
                    self.monitor.apply(signal);
                }
                _ = self.monitor.tick() => {
                    tracing::debug!("reconnect attempt");
                    self.monitor.connect();
                }
            }
        }
        self.monitor.detach(&self.dispatcher.events);
        tracing::info!(
            pending = self.dispatcher.registry.len(),
            state = ?self.monitor.state(),
            reconnecting = self.monitor.is_reconnecting(),
            "background task shutdown"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_must_be_an_array_or_absent() {
        assert_eq!(check_params(Value::Null).unwrap(), json!([]));
        assert_eq!(check_params(json!([1, "a"])).unwrap(), json!([1, "a"]));
        assert!(matches!(check_params(json!({"a": 1})), Err(Error::InvalidParams)));
        assert!(matches!(check_params(json!("0x1")), Err(Error::InvalidParams)));
    }

    #[test]
    fn empty_method_is_rejected() {
        assert!(matches!(check_method(""), Err(Error::InvalidMethod(_))));
        assert!(check_method("eth_chainId").is_ok());
    }

    #[test]
    fn request_carries_jsonrpc_version() {
        assert_eq!(
            encode_request(3, "net_version", json!([])).unwrap(),
            json!({"id": 3, "jsonrpc": "2.0", "method": "net_version", "params": []})
        );
    }
}
