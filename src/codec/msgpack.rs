//! MsgPack codec using `rmp-serde`.
//!
//! Always uses `to_vec_named`, so structs are encoded as maps with field
//! names. Peers written against other MessagePack libraries (notably the
//! JavaScript ones used in browsers) expect that layout.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Codec;
use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl Codec for MsgPackCodec {
    #[inline]
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        // to_vec_named, NOT to_vec
        Ok(rmp_serde::to_vec_named(value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct SayRequest {
        text: String,
        repeat: u8,
        tags: Vec<String>,
    }

    #[test]
    fn test_request_body_uses_field_names() {
        let body = SayRequest {
            text: "hi".into(),
            repeat: 2,
            tags: vec!["loud".into()],
        };
        let encoded = MsgPackCodec::encode(&body).unwrap();

        // fixmap of 3 entries, first key "text"; positional layout would start 0x93
        assert_eq!(encoded[0], 0x83, "Expected fixmap, got {:02X}", encoded[0]);
        assert_eq!(&encoded[1..6], &[0xa4, b't', b'e', b'x', b't']);

        let decoded: SayRequest = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, body);
    }

    #[test]
    fn test_empty_reply_is_nil() {
        let encoded = MsgPackCodec::encode(&()).unwrap();
        assert_eq!(encoded, vec![0xc0]);

        let missing: Option<SayRequest> = MsgPackCodec::decode(&encoded).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_wrong_shape_is_decode_error() {
        let encoded = MsgPackCodec::encode(&"just a string").unwrap();
        let result: Result<SayRequest> = MsgPackCodec::decode(&encoded);
        assert!(matches!(result, Err(RpcError::MsgPackDecode(_))));
    }
}
