use serde_json::json;
use tokio::signal;

use postrpc::{ConnectionMeta, Event, EventKind, Provider, ProviderOptions, Result, WsBridge};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let port = WsBridge::spawn(ConnectionMeta::new("ws://localhost:8546", None));
    let provider = Provider::new(port, ProviderOptions::default());

    provider.on(EventKind::End, |_| println!("host went away, reconnecting"));
    let mut rx = provider.subscribe(EventKind::Notification);

    let id = provider.request("eth_subscribe", json!(["newHeads"])).await?;
    println!("subscribed {id}");

    println!("waiting for ctrl-c");
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                break;
            }
            notification = rx.recv() => {
                if let Some(Event::Notification(payload)) = notification {
                    println!("{payload}");
                }
            }
        }
    }

    Ok(())
}
