use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DecodeError;

/// A crawled resource as published on the content subject
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMessage {
    /// Source location, usually with an `http://` or `https://` scheme
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    /// Raw body to persist
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ResourceMessage {
    /// Decode one delivery payload.
    ///
    /// Unknown fields are ignored; missing and `null` fields decode as empty
    /// strings, and a bare `null` decodes as an empty record. Malformed JSON
    /// and values of the wrong type are errors.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let decoded: Option<Self> = serde_json::from_slice(payload)?;
        Ok(decoded.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_well_formed_record() {
        let msg = ResourceMessage::decode(br#"{"url":"http://a.com/x","content":"hello"}"#).unwrap();
        assert_eq!(msg.url, "http://a.com/x");
        assert_eq!(msg.content, "hello");
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let msg = ResourceMessage::decode(
            br#"{"url":"https://b.org","content":"<html></html>","status":200,"meta":{"k":1}}"#,
        )
        .unwrap();
        assert_eq!(msg.url, "https://b.org");
        assert_eq!(msg.content, "<html></html>");
    }

    #[test]
    fn test_decode_missing_fields_default_to_empty() {
        let msg = ResourceMessage::decode(br#"{"url":"http://a.com"}"#).unwrap();
        assert_eq!(msg.url, "http://a.com");
        assert_eq!(msg.content, "");

        let msg = ResourceMessage::decode(b"{}").unwrap();
        assert_eq!(msg, ResourceMessage::default());
    }

    #[test]
    fn test_decode_null_fields_as_empty() {
        let msg = ResourceMessage::decode(br#"{"url":null,"content":"x"}"#).unwrap();
        assert_eq!(msg.url, "");
        assert_eq!(msg.content, "x");

        let msg = ResourceMessage::decode(br#"{"url":"http://a.com","content":null}"#).unwrap();
        assert_eq!(msg.url, "http://a.com");
        assert_eq!(msg.content, "");
    }

    #[test]
    fn test_decode_top_level_null_as_empty_record() {
        assert_eq!(
            ResourceMessage::decode(b"null").unwrap(),
            ResourceMessage::default()
        );
        assert_eq!(
            ResourceMessage::decode(b" null\n").unwrap(),
            ResourceMessage::default()
        );
    }

    #[test]
    fn test_decode_malformed_input() {
        assert!(ResourceMessage::decode(br#"{"url":"http://a.com","con"#).is_err());
        assert!(ResourceMessage::decode(b"not json at all").is_err());
        assert!(ResourceMessage::decode(b"").is_err());
        assert!(ResourceMessage::decode(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_shape() {
        assert!(ResourceMessage::decode(b"[1,2,3]").is_err());
        assert!(ResourceMessage::decode(br#"{"url":42,"content":"x"}"#).is_err());
        assert!(ResourceMessage::decode(br#"{"url":"u","content":{"a":1}}"#).is_err());
        assert!(ResourceMessage::decode(b"42").is_err());
    }

    #[test]
    fn test_decode_preserves_unicode_content() {
        let msg = ResourceMessage::decode(r#"{"url":"u","content":"héllo é ✓"}"#.as_bytes()).unwrap();
        assert_eq!(msg.content, "héllo é ✓");
    }
}
