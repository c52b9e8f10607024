use crate::jsonrpc;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Given method name: {0:?} is not a valid string")]
    InvalidMethod(String),
    #[error("Given parameters are not a valid parameter array")]
    InvalidParams,
    #[error("Batch contains no requests")]
    EmptyBatch,
    #[error("Invalid payload: {0}")]
    InvalidPayload(&'static str),
    #[error("Rpc error {0}")]
    Rpc(RpcError),
    #[error("Remote error {0}")]
    Remote(serde_json::Value),
    #[error("Decode error {0}")]
    Decode(serde_json::Error),
    #[error("Encode error {0}")]
    Encode(serde_json::Error),
    #[error("Transport error {0}")]
    Transport(String),
    #[error("Connect error {0}")]
    Connect(tokio_tungstenite::tungstenite::error::Error),
    #[error("Request send error")]
    ChannelSend,
    #[error("Response recv error {0}")]
    ChannelRecv(#[from] tokio::sync::oneshot::error::RecvError),
    #[error("Websocket error {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RpcError: {{\"code\": {}, \"message\": \"{}\"}}",
            self.code, self.message
        )
    }
}
impl std::error::Error for RpcError {}

impl From<jsonrpc::Error> for Error {
    fn from(err: jsonrpc::Error) -> Self {
        Error::Rpc(RpcError {
            code: err.code,
            message: err.message,
            data: err.data,
        })
    }
}

impl Error {
    /// Builds the error a host-supplied `error` member maps to. Objects that
    /// do not look like a JSON-RPC error are passed through untouched.
    pub(crate) fn from_remote(value: serde_json::Value) -> Self {
        match serde_json::from_value::<jsonrpc::Error>(value.clone()) {
            Ok(err) => err.into(),
            Err(_) => Error::Remote(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conforming_error_object_becomes_rpc_error() {
        let err = Error::from_remote(json!({"code": -32000, "message": "nonce too low"}));
        match err {
            Error::Rpc(rpc) => {
                assert_eq!(rpc.code, -32000);
                assert_eq!(rpc.message, "nonce too low");
                assert_eq!(rpc.data, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn odd_error_object_is_kept_verbatim() {
        let err = Error::from_remote(json!("boom"));
        assert!(matches!(err, Error::Remote(v) if v == json!("boom")));
    }
}
