//! JSON-RPC provider for code that can only reach its host through an
//! origin-scoped `postMessage`-style channel.
//!
//! A [`Provider`] correlates outgoing requests with replies that arrive
//! asynchronously, possibly reordered or batched, routes subscription
//! notifications to listeners, and keeps re-sending a `create` frame while
//! the host is unreachable.
pub mod call;
mod codec;
pub mod context;
mod error;
mod events;
mod legacy;
mod monitor;
mod options;
mod port;
mod provider;
mod registry;
mod ws;

/// https://www.jsonrpc.org/specification
mod jsonrpc {
    pub const VERSION: &str = "2.0";

    #[derive(serde::Serialize, Debug, Clone)]
    pub struct Request<'a> {
        pub id: i64,
        pub jsonrpc: &'a str, // jsonrpc must be "2.0"
        pub method: &'a str,
        pub params: serde_json::Value, // always an array here
    }

    #[derive(serde::Deserialize, Debug, Clone)]
    pub struct Error {
        pub code: i64,
        pub message: String,
        #[serde(default)]
        pub data: Option<serde_json::Value>,
    }
}

pub use call::Call;
pub use error::{Error, RpcError};
pub use events::{Event, EventChannel, EventKind, ListenerId};
pub use legacy::{LegacyProvider, SYNC_UNSUPPORTED_MESSAGE};
pub use monitor::ConnectionState;
pub use options::{ConnectionMeta, ProviderOptions};
pub use port::{ChannelPort, MessageData, MessageEvent, MessagePort, PostedMessage};
pub use provider::{BatchRequest, Provider};
pub use registry::{BatchEntry, Reply};
pub use ws::{WsBridge, WsPort};

pub type Result<T> = std::result::Result<T, Error>;
