use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

use postrpc::{
    ConnectionMeta, ConnectionState, Event, EventKind, MessageData, MessagePort, Provider,
    ProviderOptions, WsBridge,
};

/// Answers every request with `"<method>-ok"`, for at most `limit` requests
/// per connection, then closes it.
async fn host(listener: TcpListener, connections: usize, limit: usize) {
    for _ in 0..connections {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut served = 0;
        while served < limit {
            let Some(Ok(msg)) = ws.next().await else {
                break;
            };
            if let Message::Text(text) = msg {
                let request: Value = serde_json::from_str(text.as_str()).unwrap();
                let reply = json!({
                    "id": request["id"],
                    "jsonrpc": "2.0",
                    "result": format!("{}-ok", request["method"].as_str().unwrap()),
                });
                ws.send(Message::Text(reply.to_string().into())).await.unwrap();
                served += 1;
            }
        }
        let _ = ws.close(None).await;
    }
}

#[tokio::test]
async fn calls_travel_over_the_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(host(listener, 1, usize::MAX));

    let port = WsBridge::spawn(ConnectionMeta::new(
        &format!("ws://{addr}"),
        Some("http://localhost:3000"),
    ));
    let provider = Provider::new(port, ProviderOptions::default());
    let mut connected = provider.subscribe(EventKind::Connect);

    let result = provider.request("eth_chainId", json!([])).await.unwrap();
    assert_eq!(result, json!("eth_chainId-ok"));
    assert_eq!(connected.recv().await, Some(Event::Connect));
}

#[tokio::test]
async fn reconnects_after_the_host_hangs_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(host(listener, 2, 1));

    let port = WsBridge::spawn(ConnectionMeta::new(&format!("ws://{addr}"), None));
    let provider = Provider::new(port, ProviderOptions::default());
    let mut events = provider.subscribe(EventKind::Connect);
    let mut ends = provider.subscribe(EventKind::End);

    assert_eq!(provider.request("net_version", json!([])).await.unwrap(), json!("net_version-ok"));
    assert_eq!(events.recv().await, Some(Event::Connect));
    assert_eq!(ends.recv().await, Some(Event::End));
    assert_eq!(events.recv().await, Some(Event::Connect));
    assert_eq!(provider.request("eth_gasPrice", json!([])).await.unwrap(), json!("eth_gasPrice-ok"));
}

#[tokio::test]
async fn retries_until_the_host_comes_up() {
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();

    let port = WsBridge::spawn(ConnectionMeta::new(&format!("ws://{addr}"), None));
    let provider = Provider::new(port, ProviderOptions::default());
    let mut connected = provider.subscribe(EventKind::Connect);
    let mut ends = provider.subscribe(EventKind::End);

    assert_eq!(
        timeout(Duration::from_secs(2), ends.recv()).await.unwrap(),
        Some(Event::End)
    );
    sleep(Duration::from_millis(300)).await;
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(host(listener, 1, usize::MAX));

    assert_eq!(
        timeout(Duration::from_secs(3), connected.recv()).await.unwrap(),
        Some(Event::Connect)
    );
    timeout(Duration::from_secs(1), async {
        while provider.connection_state() != ConnectionState::Connected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(provider.request("eth_chainId", json!([])).await.unwrap(), json!("eth_chainId-ok"));
}

#[tokio::test]
async fn creates_during_a_slow_connect_collapse_into_one() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        sleep(Duration::from_millis(300)).await;
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let request: Value = serde_json::from_str(text.as_str()).unwrap();
                let reply = json!({"id": request["id"], "jsonrpc": "2.0", "result": "late-ok"});
                ws.send(Message::Text(reply.to_string().into())).await.unwrap();
            }
        }
    });

    let port = WsBridge::spawn(ConnectionMeta::new(&format!("ws://{addr}"), None));
    let mut inbound = port.add_listener();
    for _ in 0..3 {
        port.post_message(json!({"type": "create"}).to_string(), "*").unwrap();
    }
    let request = json!({"id": 1, "jsonrpc": "2.0", "method": "eth_chainId", "params": []});
    port.post_message(json!({"type": "write", "message": request}).to_string(), "*")
        .unwrap();

    let mut frames = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_secs(1), inbound.recv()).await {
        let MessageData::Structured(frame) = event.data else {
            panic!("unexpected text frame");
        };
        frames.push(frame);
    }
    assert_eq!(
        frames,
        vec![
            json!({"type": "connect"}),
            json!({"type": "data", "message": {"id": 1, "jsonrpc": "2.0", "result": "late-ok"}}),
        ]
    );
}
