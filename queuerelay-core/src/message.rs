//! Relay message model and its wire format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A relayed message.
///
/// Serialized on the queue as `{"publishedAt": "<RFC 3339>", "toDeadLetter": <bool>}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub published_at: DateTime<Utc>,
    pub to_dead_letter: bool,
}

impl Message {
    pub fn new(published_at: DateTime<Utc>, to_dead_letter: bool) -> Self {
        Self {
            published_at,
            to_dead_letter,
        }
    }

    /// Create a message stamped with the current time
    pub fn now(to_dead_letter: bool) -> Self {
        Self::new(Utc::now(), to_dead_letter)
    }

    /// Encode as a queue message body
    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a queue message body
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wire_field_names() {
        let published_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let body = Message::new(published_at, true).to_body().unwrap();

        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["publishedAt"], "2024-03-01T12:30:00Z");
        assert_eq!(value["toDeadLetter"], true);
    }

    #[test]
    fn test_decode_with_offset() {
        let message =
            Message::from_body(r#"{"publishedAt":"2024-03-01T09:30:00-03:00","toDeadLetter":false}"#)
                .unwrap();

        assert_eq!(
            message.published_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        );
        assert!(!message.to_dead_letter);
    }

    #[test]
    fn test_now_keeps_sub_second_precision() {
        let message = Message::now(false);
        let decoded = Message::from_body(&message.to_body().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_rejects_malformed_body() {
        assert!(Message::from_body("not json").is_err());
        assert!(Message::from_body(r#"{"toDeadLetter":true}"#).is_err());
        assert!(Message::from_body(r#"{"publishedAt":"yesterday","toDeadLetter":true}"#).is_err());
    }
}
