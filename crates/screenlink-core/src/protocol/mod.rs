//! Wire protocol: message model, binary codec, and sequence numbering.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{decode_message, encode_message, MessageDecoder, ProtocolError};
pub use sequence::SequenceCounter;
