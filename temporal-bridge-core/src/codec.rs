//! Transport payload shape and the frame codec.
//!
//! One transport payload carries the JSON batch context and the protobuf
//! frame body. The framing underneath (length prefixes, flag propagation) is
//! the pool's concern; the only flag the bridge inspects is STREAM, which it
//! must reject.

use temporal_bridge_proto as proto;

use crate::context::TickContext;
use crate::error::BridgeError;
use crate::message::{Command, Message};

/// Reply flag bit marking a streamed response. Streaming is not part of the
/// workflow protocol; a reply carrying it aborts the task.
pub const FLAG_STREAM: u8 = 1 << 2;

/// One transport unit: batch context + encoded frame + transport flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportPayload {
    pub context: Vec<u8>,
    pub body: Vec<u8>,
    pub flags: u8,
}

impl TransportPayload {
    pub fn is_stream(&self) -> bool {
        self.flags & FLAG_STREAM != 0
    }

    /// Zero all fields; buffers keep their capacity for reuse.
    pub fn clear(&mut self) {
        self.context.clear();
        self.body.clear();
        self.flags = 0;
    }
}

/// Stateless frame codec.
pub struct Codec;

impl Codec {
    /// Serialize the batch context and messages into `out`.
    pub fn encode(
        ctx: &TickContext,
        out: &mut TransportPayload,
        messages: &[Message],
    ) -> Result<(), BridgeError> {
        out.clear();
        out.context = serde_json::to_vec(ctx)
            .map_err(|e| BridgeError::Protocol(format!("encode context: {e}")))?;
        out.body = Self::encode_frame(messages)?;
        Ok(())
    }

    /// Deserialize a reply payload into its messages.
    pub fn decode(payload: &TransportPayload) -> Result<Vec<Message>, BridgeError> {
        Self::decode_frame(&payload.body)
    }

    pub fn encode_frame(messages: &[Message]) -> Result<Vec<u8>, BridgeError> {
        let mut frame = proto::Frame {
            messages: Vec::with_capacity(messages.len()),
        };
        for msg in messages {
            frame.messages.push(to_wire(msg)?);
        }
        Ok(frame.encode_to_vec())
    }

    pub fn decode_frame(body: &[u8]) -> Result<Vec<Message>, BridgeError> {
        let frame = proto::Frame::decode_from(body)
            .map_err(|e| BridgeError::Protocol(format!("decode frame: {e}")))?;
        frame.messages.iter().map(from_wire).collect()
    }
}

fn to_wire(msg: &Message) -> Result<proto::Message, BridgeError> {
    let (command, options) = match &msg.command {
        Some(cmd) => (cmd.name().to_string(), cmd.options_json()?),
        None => (String::new(), Vec::new()),
    };
    Ok(proto::Message {
        id: msg.id,
        command,
        options,
        failure: msg.failure.clone(),
        payloads: msg.payloads.clone(),
        header: msg.header.clone(),
        history_length: msg.history_length,
    })
}

fn from_wire(msg: &proto::Message) -> Result<Message, BridgeError> {
    let command = if msg.command.is_empty() {
        None
    } else {
        Some(Command::from_wire(&msg.command, &msg.options)?)
    };
    Ok(Message {
        id: msg.id,
        command,
        payloads: msg.payloads.clone(),
        header: msg.header.clone(),
        failure: msg.failure.clone(),
        history_length: msg.history_length,
    })
}
