use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};

use postrpc::{ChannelPort, Event, EventKind, LegacyProvider, PostedMessage, ProviderOptions};

async fn legacy() -> (LegacyProvider, Arc<ChannelPort>, mpsc::UnboundedReceiver<PostedMessage>) {
    let (port, mut posted) = ChannelPort::new(Some("null"));
    let port = Arc::new(port);
    let provider = LegacyProvider::new(port.clone(), ProviderOptions::default());
    let create = posted.recv().await.unwrap();
    assert_eq!(create.target_origin, "*");
    assert_eq!(create.json(), json!({"type": "create"}));
    (provider, port, posted)
}

#[tokio::test]
async fn payload_goes_out_as_given_and_reply_comes_back_whole() {
    let (provider, port, mut posted) = legacy().await;
    let payload = json!({"id": 42, "jsonrpc": "2.0", "method": "eth_accounts", "params": []});
    let (tx, rx) = oneshot::channel();
    provider
        .send_async(payload.clone(), move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();

    assert_eq!(
        posted.recv().await.unwrap().json(),
        json!({"type": "write", "message": payload})
    );
    let reply = json!({"id": 42, "jsonrpc": "2.0", "result": ["0xabc"]});
    port.dispatch_json(json!({"type": "data", "message": reply}));
    assert_eq!(rx.await.unwrap().unwrap(), reply);
}

#[tokio::test]
async fn batch_payload_is_keyed_by_first_member() {
    let (provider, port, mut posted) = legacy().await;
    let payload = json!([
        {"id": 7, "jsonrpc": "2.0", "method": "eth_chainId", "params": []},
        {"id": 8, "jsonrpc": "2.0", "method": "net_version", "params": []},
    ]);
    let (tx, rx) = oneshot::channel();
    provider
        .send(payload, move |outcome| {
            let _ = tx.send(outcome);
        })
        .unwrap();
    posted.recv().await.unwrap();

    let reply = json!([
        {"id": 8, "jsonrpc": "2.0", "result": "1"},
        {"id": 7, "jsonrpc": "2.0", "result": "0x1"},
    ]);
    port.dispatch_json(json!({"type": "data", "message": reply}));
    assert_eq!(rx.await.unwrap().unwrap(), reply);
}

#[tokio::test]
async fn pushes_and_unknown_frames_surface_as_data_events() {
    let (provider, port, mut posted) = legacy().await;
    let seen: Arc<Mutex<Vec<Event>>> = Arc::default();
    let sink = seen.clone();
    provider.on(EventKind::Data, move |event| sink.lock().unwrap().push(event.clone()));

    let (tx, rx) = oneshot::channel::<Value>();
    provider
        .send(
            json!({"id": 1, "jsonrpc": "2.0", "method": "eth_blockNumber", "params": []}),
            move |outcome| {
                let _ = tx.send(outcome.unwrap());
            },
        )
        .unwrap();
    posted.recv().await.unwrap();

    let push = json!({"jsonrpc": "2.0", "method": "eth_subscription", "params": {"subscription": "0x9", "result": {}}});
    port.dispatch_json(json!({"type": "data", "message": push}));
    let failure = json!({"id": 1, "jsonrpc": "2.0", "error": {"code": -1, "message": "x"}});
    port.dispatch_json(json!({"type": "error", "message": failure}));
    port.dispatch_json(json!({"type": "data", "message": {"id": 1, "jsonrpc": "2.0", "result": "0x5"}}));

    // error frames are not replies here, so the data frame resolves id 1
    assert_eq!(rx.await.unwrap(), json!({"id": 1, "jsonrpc": "2.0", "result": "0x5"}));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Event::Data { kind: "data".to_string(), body: Some(push) },
            Event::Data { kind: "error".to_string(), body: Some(failure) },
        ]
    );
}
