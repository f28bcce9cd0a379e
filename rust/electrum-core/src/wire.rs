//! JSON-RPC wire envelope.
//!
//! One JSON object per line:
//!
//! - request: `{"id": 7, "method": "server.ping", "params": []}`
//! - response: `{"id": 7, "result": ...}` or `{"id": 7, "error": {"code": 1, "message": "..."}}`
//! - notification: `{"method": "blockchain.headers.subscribe", "params": [...]}`

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{RpcError, ServerError};

pub const LINE_TERMINATOR: u8 = b'\n';

/// Empty positional parameters; serializes as `[]`.
pub const NO_PARAMS: [(); 0] = [];

#[derive(Serialize)]
struct Request<'a, P: Serialize> {
    id: u64,
    method: &'a str,
    params: &'a P,
}

/// Serialize a request and append the line terminator.
pub fn encode_request<P: Serialize>(id: u64, method: &str, params: &P) -> Result<Bytes, RpcError> {
    let mut buf = BytesMut::with_capacity(64 + method.len()).writer();
    serde_json::to_writer(
        &mut buf,
        &Request {
            id,
            method,
            params,
        },
    )
    .map_err(|e| RpcError::Encode(e.to_string()))?;
    let mut buf = buf.into_inner();
    buf.put_u8(LINE_TERMINATOR);
    Ok(buf.freeze())
}

/// The minimal routing view of an inbound message.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub error: Option<ServerError>,
}

impl Envelope {
    pub fn decode(raw: &[u8]) -> Result<Self, RpcError> {
        serde_json::from_slice(raw).map_err(|e| RpcError::Decode(e.to_string()))
    }

    /// The notification method, if this is a server push.
    pub fn push_method(&self) -> Option<&str> {
        self.method.as_deref().filter(|m| !m.is_empty())
    }
}

/// One inbound message as delivered to a waiting caller or push listener.
///
/// Cloning is cheap: the payload is reference-counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// The complete raw JSON object.
    pub payload: Bytes,
    /// The server's error object, if the message carried one.
    pub error: Option<ServerError>,
}

impl Inbound {
    pub fn into_result(self) -> Result<Bytes, RpcError> {
        match self.error {
            Some(e) => Err(RpcError::Server(e)),
            None => Ok(self.payload),
        }
    }

    /// Decode the `result` member of a response.
    pub fn decode_result<R: DeserializeOwned>(&self) -> Result<R, RpcError> {
        decode_result(&self.payload)
    }

    /// Decode the `params` member of a notification.
    pub fn decode_params<P: DeserializeOwned>(&self) -> Result<P, RpcError> {
        #[derive(Deserialize)]
        struct Params {
            #[serde(default)]
            params: serde_json::Value,
        }

        let params: Params =
            serde_json::from_slice(&self.payload).map_err(|e| RpcError::Decode(e.to_string()))?;
        serde_json::from_value(params.params).map_err(|e| RpcError::Decode(e.to_string()))
    }
}

/// Decode the `result` member of a raw response. A missing `result` decodes
/// as JSON `null`.
pub fn decode_result<R: DeserializeOwned>(raw: &[u8]) -> Result<R, RpcError> {
    #[derive(Deserialize)]
    struct Response {
        #[serde(default)]
        result: serde_json::Value,
    }

    let response: Response =
        serde_json::from_slice(raw).map_err(|e| RpcError::Decode(e.to_string()))?;
    serde_json::from_value(response.result).map_err(|e| RpcError::Decode(e.to_string()))
}
