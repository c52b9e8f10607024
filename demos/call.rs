use serde_json::json;

use postrpc::call::MethodCall;
use postrpc::{BatchRequest, ConnectionMeta, Provider, ProviderOptions, Result, WsBridge};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let port = WsBridge::spawn(ConnectionMeta::new(
        "ws://localhost:8546",
        Some("http://localhost:3000"),
    ));
    let provider = Provider::new(port, ProviderOptions::default());

    let block = provider.call(MethodCall::<String>::new("eth_blockNumber")).await?;
    println!("block number {block}");

    let (tx, rx) = tokio::sync::oneshot::channel();
    provider.send("eth_chainId", json!([]), move |outcome| {
        let _ = tx.send(outcome);
    })?;
    println!("chain id {:?}", rx.await?);

    let entries = provider
        .request_batch([
            BatchRequest::new("net_version", json!([])),
            BatchRequest::new("eth_gasPrice", json!(null)),
        ])
        .await?;
    for entry in entries {
        println!("{:?}", entry.into_result());
    }

    println!("waiting for ctrl-c");
    tokio::signal::ctrl_c().await.unwrap();
    Ok(())
}
