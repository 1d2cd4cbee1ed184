//! Message codec abstraction
//!
//! Bit-level framing of the real wire format lives outside the engine. The
//! engine encodes and decodes through `MessageCodec`; `BincodeCodec` is the
//! reference implementation used by the runtime and the tests.

use crate::message::Message;
use crate::Result;

/// Converts between structured messages and wire bytes
pub trait MessageCodec: Send {
    fn encode(&self, message: &Message) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Message>;
}

/// bincode-based codec
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    pub fn new() -> Self {
        Self
    }
}

impl MessageCodec for BincodeCodec {
    fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        Ok(bincode::serialize(message)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        Ok(bincode::deserialize(bytes)?)
    }
}
