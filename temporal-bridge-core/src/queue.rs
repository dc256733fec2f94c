//! Outbound message buffer with monotonic id allocation.

use temporal_bridge_proto::{Failure, Header, Payloads};

use crate::message::{Command, Message};

/// FIFO buffer of not-yet-flushed outbound messages. Ids are unique per run,
/// strictly increasing, and start at 1. Response ids reuse the id of the
/// message they answer and do not advance the sequence.
#[derive(Default)]
pub struct MessageQueue {
    seq: u64,
    queue: Vec<Message>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next message id without buffering anything. Used by the
    /// single-shot query path, which must not ride the shared buffer.
    pub fn allocate_id(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Allocate an id, fill a command message, and append it.
    pub fn allocate_message(
        &mut self,
        command: Command,
        payloads: Option<Payloads>,
        header: Option<Header>,
    ) -> u64 {
        let id = self.allocate_id();
        self.queue.push(Message {
            id,
            command: Some(command),
            payloads,
            header,
            failure: None,
            history_length: 0,
        });
        id
    }

    pub fn push_command(
        &mut self,
        command: Command,
        payloads: Option<Payloads>,
        header: Option<Header>,
    ) -> u64 {
        self.allocate_message(command, payloads, header)
    }

    /// Acknowledge a worker-initiated command within the same flush.
    pub fn push_response(&mut self, id: u64, payloads: Option<Payloads>) {
        self.queue.push(Message {
            id,
            payloads,
            ..Default::default()
        });
    }

    pub fn push_error(&mut self, id: u64, failure: Failure) {
        self.queue.push(Message {
            id,
            failure: Some(failure),
            ..Default::default()
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.queue
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Clear the buffer. Called only after a successful transport round trip.
    pub fn flush(&mut self) {
        self.queue.clear();
    }
}
