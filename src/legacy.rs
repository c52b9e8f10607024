use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Error;
use crate::events::{Event, EventChannel, EventKind, ListenerId};
use crate::options::ProviderOptions;
use crate::port::MessagePort;
use crate::provider::{Dialect, Provider};
use crate::registry::Reply;
use crate::Result;

pub const SYNC_UNSUPPORTED_MESSAGE: &str =
    "Synchronous calls are not supported anymore, use the async send";

/// Older single-payload provider kept for callers written against the
/// `send(payload, callback)` convention.
///
/// Callbacks receive the whole JSON-RPC response object, not just its
/// `result`. Subscription pushes and frames of unknown type are emitted on
/// the [`EventKind::Data`] channel.
#[derive(Clone, Debug)]
pub struct LegacyProvider {
    provider: Provider,
}

impl LegacyProvider {
    pub fn new(port: Arc<dyn MessagePort>, options: ProviderOptions) -> Self {
        Self {
            provider: Provider::with_dialect(port, options, Dialect::Web3),
        }
    }

    /// Sends a complete payload, e.g.
    /// `{"id": 1, "jsonrpc": "2.0", "method": "eth_accounts", "params": []}`.
    /// The payload's own id correlates the reply.
    pub fn send<F>(&self, payload: Value, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.provider.send_payload(
            payload,
            Box::new(move |outcome| {
                callback(outcome.and_then(|reply| match reply {
                    Reply::Single(value) => Ok(value),
                    Reply::Batch(entries) => serde_json::to_value(entries).map_err(Error::Encode),
                }))
            }),
        )
    }

    pub fn send_async<F>(&self, payload: Value, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.send(payload, callback)
    }

    /// Always answers with the same JSON-RPC error response; nothing is sent.
    pub fn send_sync(&self, _payload: &Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "error": {"code": -32603, "message": SYNC_UNSUPPORTED_MESSAGE},
        })
    }

    /// Always true; the connection state is not consulted.
    pub fn is_connected(&self) -> bool {
        true
    }

    pub fn events(&self) -> &EventChannel {
        self.provider.events()
    }

    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.provider.on(kind, listener)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.provider.off(id)
    }
}
