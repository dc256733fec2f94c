//! Wire-level types for the external worker protocol.
//!
//! The transport body is a protobuf [`Frame`] of [`Message`]s; payloads,
//! headers, and failures use the Temporal API shapes so the host side can
//! hand them to the SDK without re-encoding. The structs are hand-derived
//! with `prost` — the schema is small and owned by this repository.

use std::collections::HashMap;

use prost::Message as ProstMessage;

// ─── Payloads ─────────────────────────────────────────────────

/// A single serialized value plus its encoding metadata.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Payload {
    #[prost(map = "string, bytes", tag = "1")]
    pub metadata: HashMap<String, Vec<u8>>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
}

/// Ordered list of payloads (arguments, results).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Payloads {
    #[prost(message, repeated, tag = "1")]
    pub payloads: Vec<Payload>,
}

/// Name → payload map carried alongside workflow/activity invocations.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Header {
    #[prost(map = "string, message", tag = "1")]
    pub fields: HashMap<String, Payload>,
}

// ─── Failures ─────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplicationFailureInfo {
    #[prost(string, tag = "1")]
    pub r#type: String,
    #[prost(bool, tag = "2")]
    pub non_retryable: bool,
    #[prost(message, optional, tag = "3")]
    pub details: Option<Payloads>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CanceledFailureInfo {
    #[prost(message, optional, tag = "1")]
    pub details: Option<Payloads>,
}

/// Temporal failure descriptor. The cause chain is preserved verbatim —
/// Temporal classifies retryability by failure identity, so the bridge must
/// never rewrap one it did not create.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Failure {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(string, tag = "2")]
    pub source: String,
    #[prost(string, tag = "3")]
    pub stack_trace: String,
    #[prost(message, optional, boxed, tag = "4")]
    pub cause: Option<Box<Failure>>,
    #[prost(message, optional, tag = "5")]
    pub application_failure_info: Option<ApplicationFailureInfo>,
    #[prost(message, optional, tag = "6")]
    pub canceled_failure_info: Option<CanceledFailureInfo>,
}

// ─── Executions ───────────────────────────────────────────────

/// Handle to a (child) workflow execution.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkflowExecution {
    #[prost(string, tag = "1")]
    pub workflow_id: String,
    #[prost(string, tag = "2")]
    pub run_id: String,
}

// ─── Protocol frame ───────────────────────────────────────────

/// One protocol message. A message with an empty `command` and a non-zero
/// `id` is a response to a prior message with the same id.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    /// Command discriminator; empty for responses.
    #[prost(string, tag = "2")]
    pub command: String,
    /// Command-specific options blob (JSON).
    #[prost(bytes = "vec", tag = "3")]
    pub options: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub failure: Option<Failure>,
    #[prost(message, optional, tag = "5")]
    pub payloads: Option<Payloads>,
    #[prost(message, optional, tag = "6")]
    pub header: Option<Header>,
    #[prost(int64, tag = "7")]
    pub history_length: i64,
}

/// Ordered batch of messages shipped as one transport unit.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Frame {
    #[prost(message, repeated, tag = "1")]
    pub messages: Vec<Message>,
}

impl Frame {
    pub fn encode_to_vec(&self) -> Vec<u8> {
        ProstMessage::encode_to_vec(self)
    }

    pub fn decode_from(buf: &[u8]) -> Result<Self, prost::DecodeError> {
        ProstMessage::decode(buf)
    }
}

// ─── Default data converter (json/plain) ──────────────────────

pub const ENCODING_KEY: &str = "encoding";
pub const JSON_PLAIN: &[u8] = b"json/plain";

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload encode: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("payload decode: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("unsupported payload encoding {0:?}")]
    Encoding(String),
}

/// Serialize a value into a `json/plain` payload.
pub fn json_payload<T: serde::Serialize>(value: &T) -> Result<Payload, PayloadError> {
    let data = serde_json::to_vec(value).map_err(PayloadError::Encode)?;
    Ok(Payload {
        metadata: HashMap::from([(ENCODING_KEY.to_string(), JSON_PLAIN.to_vec())]),
        data,
    })
}

/// Deserialize a `json/plain` payload.
pub fn from_json_payload<T: serde::de::DeserializeOwned>(
    payload: &Payload,
) -> Result<T, PayloadError> {
    if let Some(enc) = payload.metadata.get(ENCODING_KEY) {
        if enc.as_slice() != JSON_PLAIN {
            return Err(PayloadError::Encoding(
                String::from_utf8_lossy(enc).into_owned(),
            ));
        }
    }
    serde_json::from_slice(&payload.data).map_err(PayloadError::Decode)
}

/// Wrap a single value into a one-element payload list.
pub fn json_payloads<T: serde::Serialize>(value: &T) -> Result<Payloads, PayloadError> {
    Ok(Payloads {
        payloads: vec![json_payload(value)?],
    })
}
