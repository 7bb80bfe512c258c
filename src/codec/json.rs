//! JSON codec using `serde_json`.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Codec;
use crate::error::Result;

/// JSON codec for structured data.
pub struct JsonCodec;

impl Codec for JsonCodec {
    #[inline]
    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Greeting {
        name: String,
        times: u32,
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = Greeting {
            name: "ada".into(),
            times: 3,
        };
        let encoded = JsonCodec::encode(&original).unwrap();
        assert_eq!(encoded, br#"{"name":"ada","times":3}"#.to_vec());

        let decoded: Greeting = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_escapes_control_characters() {
        let tricky = "quote \" backslash \\ newline \n return \r tab \t";
        let encoded = JsonCodec::encode(&tricky).unwrap();
        let text = std::str::from_utf8(&encoded).unwrap();
        assert!(!text.contains('\n'));
        assert!(!text.contains('\t'));

        let decoded: String = JsonCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, tricky);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Greeting> = JsonCodec::decode(b"{not json");
        assert!(result.is_err());
    }
}
