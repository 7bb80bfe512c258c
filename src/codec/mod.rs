//! Codec module - serialize/deserialize strategies for message bodies.
//!
//! Message bodies are opaque to the transport; codecs are how callers and
//! typed handlers turn them into values:
//!
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`)
//! - [`JsonCodec`] - JSON using `serde_json`
//!
//! # Example
//!
//! ```
//! use channel_rpc::codec::{Codec, JsonCodec, MsgPackCodec};
//!
//! let encoded = MsgPackCodec::encode(&"hello").unwrap();
//! let decoded: String = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, "hello");
//!
//! let json = JsonCodec::encode(&vec![1, 2]).unwrap();
//! assert_eq!(json, b"[1,2]");
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

mod json;
mod msgpack;

pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;

/// A serialization strategy for message bodies.
///
/// Implemented by marker structs so the codec is picked at compile time.
pub trait Codec: Send + Sync + 'static {
    /// Encode a value to bytes.
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>>;

    /// Decode bytes to a value.
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}
