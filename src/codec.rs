use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;
use crate::port::{MessageData, MessagePort};
use crate::Result;

pub(crate) const WILDCARD_ORIGIN: &str = "*";

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum OutboundFrame {
    /// Connection intent, no payload.
    Create,
    /// One call object or a batch array.
    Write { message: Value },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Data,
    Error,
    Connect,
    End,
    Other(String),
}

impl FrameKind {
    fn parse(kind: &str) -> Self {
        match kind {
            "data" => Self::Data,
            "error" => Self::Error,
            "connect" => Self::Connect,
            "end" => Self::End,
            other => Self::Other(other.to_string()),
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        match self {
            Self::Data => "data",
            Self::Error => "error",
            Self::Connect => "connect",
            Self::End => "end",
            Self::Other(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InboundFrame {
    pub kind: FrameKind,
    pub body: Option<Value>,
}

/// Target origin for outbound posts: the page's own origin, or the wildcard
/// when there is no usable one.
pub(crate) fn target_origin(origin: Option<&str>) -> &str {
    match origin {
        Some(origin) if !origin.is_empty() && origin != "null" => origin,
        _ => WILDCARD_ORIGIN,
    }
}

fn has_marker(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.contains_key("jsonrpc"))
}

/// A body passes when it, or its first element, carries a `jsonrpc` key.
fn is_rpc_shaped(body: &Value) -> bool {
    has_marker(body)
        || body
            .as_array()
            .and_then(|items| items.first())
            .is_some_and(has_marker)
}

/// Parses and shape-checks an inbound event. Anything that is not an
/// object with a string `type`, or whose `message` is not JSON-RPC shaped,
/// yields `None`.
pub(crate) fn decode(data: &MessageData) -> Option<InboundFrame> {
    let value = match data {
        MessageData::Text(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        MessageData::Structured(value) => value.clone(),
    };
    let Value::Object(mut object) = value else {
        return None;
    };
    let body = match object.remove("message") {
        None | Some(Value::Null) => None,
        Some(body) if is_rpc_shaped(&body) => Some(body),
        Some(_) => return None,
    };
    let kind = FrameKind::parse(object.get("type")?.as_str()?);
    Some(InboundFrame { kind, body })
}

/// Outbound half of the envelope codec, bound to one port.
#[derive(Clone)]
pub(crate) struct Envelope {
    port: Arc<dyn MessagePort>,
}

impl Envelope {
    pub(crate) fn new(port: Arc<dyn MessagePort>) -> Self {
        Self { port }
    }

    pub(crate) fn send(&self, frame: &OutboundFrame) -> Result<()> {
        let text = serde_json::to_string(frame).map_err(Error::Encode)?;
        let origin = self.port.origin();
        let target = target_origin(origin.as_deref());
        tracing::debug!(target_origin = target, "post {text}");
        self.port.post_message(text, target)
    }
}
