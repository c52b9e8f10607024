use std::collections::HashMap;

use serde_json::Value;

use crate::codec::FrameKind;
use crate::error::Error;
use crate::Result;

/// What a resolved request hands to its callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Single(Value),
    Batch(Vec<BatchEntry>),
}

/// One member of a batch reply; only the fields the host sent are set.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BatchEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl BatchEntry {
    fn from_reply(reply: &Value) -> Self {
        let field = |name: &str| reply.get(name).filter(|v| !v.is_null()).cloned();
        Self {
            result: field("result"),
            error: field("error"),
        }
    }

    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::from_remote(error)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

pub(crate) type Callback = Box<dyn FnOnce(Result<Reply>) + Send>;

pub(crate) struct PendingRequest {
    pub id: i64,
    pub method: String,
    pub batch_ids: Option<Vec<i64>>,
    callback: Callback,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("batch_ids", &self.batch_ids)
            .finish_non_exhaustive()
    }
}

pub(crate) fn reply_id(reply: &Value) -> Option<i64> {
    reply.get("id").and_then(Value::as_i64)
}

/// Puts `incoming[i]` in the slot of `batch_ids[i]`. A slot whose id is not
/// found keeps what arrived there.
pub(crate) fn reorder(incoming: Vec<Value>, batch_ids: &[i64]) -> Vec<Value> {
    let mut results = incoming.clone();
    for (slot, expected) in results.iter_mut().zip(batch_ids) {
        if let Some(found) = incoming.iter().find(|reply| reply_id(reply) == Some(*expected)) {
            *slot = found.clone();
        }
    }
    results
}

/// Pending requests of one provider, keyed by the first id of each request.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pending: HashMap<i64, PendingRequest>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn contains(&self, id: i64) -> bool {
        self.pending.contains_key(&id)
    }

    /// Stores `callback` under `ids[0]`; a batch also keeps the member ids in
    /// send order.
    pub(crate) fn register(&mut self, ids: &[i64], batch: bool, method: String, callback: Callback) {
        let Some(&id) = ids.first() else {
            return;
        };
        let batch_ids = batch.then(|| ids.to_vec());
        if let Some(previous) = self.pending.insert(
            id,
            PendingRequest {
                id,
                method,
                batch_ids,
                callback,
            },
        ) {
            tracing::warn!(id, method = %previous.method, "replaced pending request with same id");
        }
    }

    /// Finds the pending entry a reply body belongs to. A batch reply matches
    /// on any member whose id is a registry key, then on batch membership.
    pub(crate) fn locate(&self, body: &Value) -> Option<i64> {
        match body {
            Value::Array(replies) => {
                let ids: Vec<i64> = replies.iter().filter_map(reply_id).collect();
                ids.iter().copied().find(|id| self.contains(*id)).or_else(|| {
                    self.pending
                        .values()
                        .find(|entry| {
                            entry
                                .batch_ids
                                .as_ref()
                                .is_some_and(|members| ids.iter().any(|id| members.contains(id)))
                        })
                        .map(|entry| entry.id)
                })
            }
            _ => reply_id(body),
        }
    }

    /// Delivers a reply, unwrapping `result`/`error` and reordering batches.
    /// Returns false when nothing is pending under `id`.
    pub(crate) fn resolve(&mut self, id: i64, kind: &FrameKind, body: Value) -> bool {
        let Some(entry) = self.pending.remove(&id) else {
            return false;
        };
        tracing::debug!(id, method = %entry.method, "resolve");
        let outcome = if *kind == FrameKind::Error {
            Err(Error::Remote(body))
        } else {
            match body {
                Value::Array(replies) => {
                    let ordered = match entry.batch_ids.as_deref() {
                        Some(batch_ids) => reorder(replies, batch_ids),
                        None => replies,
                    };
                    Ok(Reply::Batch(ordered.iter().map(BatchEntry::from_reply).collect()))
                }
                single => match single.get("error").filter(|e| !e.is_null()) {
                    Some(error) => Err(Error::from_remote(error.clone())),
                    None => Ok(Reply::Single(
                        single.get("result").cloned().unwrap_or(Value::Null),
                    )),
                },
            }
        };
        (entry.callback)(outcome);
        true
    }

    /// Fails a pending request without a reply, e.g. when its frame could
    /// not be posted.
    pub(crate) fn reject(&mut self, id: i64, error: Error) -> bool {
        let Some(entry) = self.pending.remove(&id) else {
            return false;
        };
        (entry.callback)(Err(error));
        true
    }

    /// Delivers the whole reply body untouched.
    pub(crate) fn resolve_raw(&mut self, id: i64, body: Value) -> bool {
        let Some(entry) = self.pending.remove(&id) else {
            return false;
        };
        tracing::debug!(id, method = %entry.method, "resolve raw");
        (entry.callback)(Ok(Reply::Single(body)));
        true
    }
}
