use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite;

use crate::error::Error;
use crate::options::ConnectionMeta;
use crate::port::{ListenerSet, MessageData, MessageEvent, MessagePort};
use crate::Result;

type WSMessage = tokio_tungstenite::tungstenite::Message;
type WSStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

type Connecting = Pin<Box<dyn Future<Output = Result<WSStream>> + Send>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl tungstenite::client::IntoClientRequest for &ConnectionMeta {
    fn into_client_request(self) -> tungstenite::Result<tungstenite::handshake::client::Request> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(origin) = self.origin.as_deref() {
            if let Ok(value) = tungstenite::http::HeaderValue::from_str(origin) {
                request.headers_mut().insert("Origin", value);
            }
        }
        Ok(request)
    }
}

/// A [`MessagePort`] whose far side is a host reached over a WebSocket.
///
/// `create` frames open the socket (or re-acknowledge an open one), `write`
/// frames carry their `message` as a text frame, and host replies come back
/// as `data` frames. Losing the socket, or failing to open it, raises an
/// `end` frame. Only one connect attempt runs at a time: `create`s posted
/// during it are ignored and writes wait for its outcome.
pub struct WsPort {
    origin: Option<String>,
    frame_tx: mpsc::UnboundedSender<String>,
    listeners: ListenerSet,
}

impl MessagePort for WsPort {
    fn origin(&self) -> Option<String> {
        self.origin.clone()
    }

    fn post_message(&self, data: String, _target_origin: &str) -> Result<()> {
        self.frame_tx
            .send(data)
            .map_err(|_| Error::Transport("websocket bridge stopped".to_string()))
    }

    fn add_listener(&self) -> mpsc::UnboundedReceiver<MessageEvent> {
        self.listeners.add()
    }
}

pub struct WsBridge;

impl WsBridge {
    /// Spawns the bridge task. No socket is opened until the first `create`.
    pub fn spawn(meta: ConnectionMeta) -> Arc<WsPort> {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let listeners = ListenerSet::default();
        let origin = meta.origin.clone();
        tokio::spawn(Self::background(meta, frame_rx, listeners.clone()));
        Arc::new(WsPort {
            origin,
            frame_tx,
            listeners,
        })
    }

    async fn background(
        meta: ConnectionMeta,
        mut frame_rx: mpsc::UnboundedReceiver<String>,
        listeners: ListenerSet,
    ) {
        let mut ws_tx: Option<SplitSink<WSStream, WSMessage>> = None;
        let mut ws_rx: Option<SplitStream<WSStream>> = None;
        let mut connecting: Option<Connecting> = None;
        // writes posted while an attempt is in flight
        let mut queued: Vec<Value> = Vec::new();

        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    let Some(frame) = frame else {
                        tracing::info!("bridge task shutdown");
                        return;
                    };
                    let frame: Value = match serde_json::from_str(&frame) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!("unreadable frame: {e}");
                            continue;
                        }
                    };
                    match frame.get("type").and_then(Value::as_str) {
                        Some("create") if ws_tx.is_some() => {
                            Self::control(&listeners, "connect");
                        }
                        Some("create") if connecting.is_some() => {
                            tracing::debug!("connect attempt in flight, create ignored");
                        }
                        Some("create") => {
                            connecting = Some(Box::pin(Self::open(meta.clone())));
                        }
                        Some("write") => {
                            let Some(message) = frame.get("message") else {
                                tracing::warn!("write frame without message dropped");
                                continue;
                            };
                            match ws_tx.as_mut() {
                                Some(sink) => {
                                    if let Err(e) = Self::send_text(sink, message).await {
                                        tracing::error!("send request error: {e}");
                                        ws_tx = None;
                                        ws_rx = None;
                                        Self::control(&listeners, "end");
                                    }
                                }
                                None if connecting.is_some() => queued.push(message.clone()),
                                None => tracing::warn!("not connected, write dropped"),
                            }
                        }
                        other => tracing::debug!("ignored frame type {other:?}"),
                    }
                }
                opened = Self::attempt(&mut connecting) => {
                    connecting = None;
                    match opened {
                        Ok(ws) => {
                            tracing::info!(url = %meta.url, "websocket connected");
                            let (mut tx, rx) = ws.split();
                            Self::control(&listeners, "connect");
                            let mut failed = None;
                            for message in queued.drain(..) {
                                if let Err(e) = Self::send_text(&mut tx, &message).await {
                                    failed = Some(e);
                                    break;
                                }
                            }
                            match failed {
                                Some(e) => {
                                    tracing::error!("send request error: {e}");
                                    Self::control(&listeners, "end");
                                }
                                None => {
                                    ws_tx = Some(tx);
                                    ws_rx = Some(rx);
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!("connect error: {e}");
                            if !queued.is_empty() {
                                tracing::warn!(dropped = queued.len(), "not connected, queued writes dropped");
                                queued.clear();
                            }
                            Self::control(&listeners, "end");
                        }
                    }
                }
                msg = Self::next_message(&mut ws_rx) => {
                    let text = match msg {
                        Some(Ok(WSMessage::Text(text))) => text,
                        Some(Ok(WSMessage::Close(_))) | None => {
                            tracing::info!("websocket closed");
                            ws_tx = None;
                            ws_rx = None;
                            Self::control(&listeners, "end");
                            continue;
                        }
                        Some(Ok(_)) => {
                            continue;
                        }
                        Some(Err(e)) => {
                            tracing::error!("websocket error: {e}");
                            ws_tx = None;
                            ws_rx = None;
                            Self::control(&listeners, "end");
                            continue;
                        }
                    };
                    match serde_json::from_str::<Value>(text.as_str()) {
                        Ok(message) => {
                            listeners.dispatch(MessageData::Structured(
                                json!({"type": "data", "message": message}),
                            ));
                        }
                        Err(e) => tracing::warn!("undecodable host message: {e}"),
                    }
                }
            }
        }
    }

    /// Outcome of the connect attempt in flight; pends forever while none is.
    async fn attempt(connecting: &mut Option<Connecting>) -> Result<WSStream> {
        match connecting.as_mut() {
            Some(open) => open.await,
            None => std::future::pending().await,
        }
    }

    /// Next message of the open socket; pends forever while closed.
    async fn next_message(
        ws_rx: &mut Option<SplitStream<WSStream>>,
    ) -> Option<tungstenite::Result<WSMessage>> {
        match ws_rx.as_mut() {
            Some(stream) => stream.next().await,
            None => std::future::pending().await,
        }
    }

    async fn open(meta: ConnectionMeta) -> Result<WSStream> {
        let (ws, _) = timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&meta))
            .await
            .map_err(|_| Error::Transport(format!("connect to {} timed out", meta.url)))?
            .map_err(Error::Connect)?;
        Ok(ws)
    }

    async fn send_text(sink: &mut SplitSink<WSStream, WSMessage>, message: &Value) -> Result<()> {
        sink.send(WSMessage::Text(
            serde_json::to_string(message)
                .map_err(Error::Encode)?
                .into(),
        ))
        .await
        .map_err(Error::Websocket)
    }

    fn control(listeners: &ListenerSet, kind: &str) {
        listeners.dispatch(MessageData::Structured(json!({"type": kind})));
    }
}
