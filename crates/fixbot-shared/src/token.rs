//! Callback token codec.
//!
//! Button payloads carry `{session ref, field, value}` as one opaque,
//! deterministically parseable string. The value is the final segment so
//! it may contain the separator; message ids and field wire names never
//! do.

use serde::{Deserialize, Serialize};

/// Codec version tag; bump on layout changes so stale buttons fail to
/// parse instead of mis-routing.
const PREFIX: &str = "w1";
const SEP: char = '|';

/// Reserved field slot for the submit action.
pub const ACTION_SUBMIT: &str = "submit";
/// Reserved field slot for the cancel action.
pub const ACTION_CANCEL: &str = "cancel";

/// Value prefix on tree fields: browse back to a reference node.
pub const VALUE_BACK: &str = "back:";
/// Back-navigation sentinel for the forest root.
pub const BACK_ROOT: &str = "root";
/// Value arming free-text entry for the field instead of a pick.
pub const VALUE_MANUAL: &str = "manual";
/// Value skipping the agency date.
pub const VALUE_SKIP: &str = "skip";
/// Agency value meaning "no agency involved".
pub const VALUE_NONE: &str = "none";

/// Decoded button payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackToken {
    /// Tracked message id, the session key.
    pub message_id: String,
    /// Field wire name, or one of the reserved action slots.
    pub field: String,
    pub value: String,
}

impl CallbackToken {
    pub fn new(
        message_id: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "{PREFIX}{SEP}{}{SEP}{}{SEP}{}",
            self.message_id, self.field, self.value
        )
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(4, SEP);
        if parts.next() != Some(PREFIX) {
            return None;
        }
        let message_id = parts.next()?;
        let field = parts.next()?;
        let value = parts.next()?;
        if message_id.is_empty() || field.is_empty() {
            return None;
        }
        Some(Self::new(message_id, field, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let token = CallbackToken::new("412", "priority", "high");
        assert_eq!(CallbackToken::parse(&token.encode()), Some(token));
    }

    #[test]
    fn test_value_may_contain_separator() {
        let token = CallbackToken::new("412", "field_note", "a|b|c");
        let back = CallbackToken::parse(&token.encode()).unwrap();
        assert_eq!(back.value, "a|b|c");
    }

    #[test]
    fn test_rejects_foreign_payloads() {
        assert_eq!(CallbackToken::parse(""), None);
        assert_eq!(CallbackToken::parse("w2|1|f|v"), None);
        assert_eq!(CallbackToken::parse("w1|1"), None);
        assert_eq!(CallbackToken::parse("w1||field|v"), None);
        assert_eq!(CallbackToken::parse("random text"), None);
    }

    #[test]
    fn test_empty_value_allowed() {
        // Action buttons carry no value.
        let token = CallbackToken::new("9", ACTION_SUBMIT, "");
        assert_eq!(CallbackToken::parse(&token.encode()), Some(token));
    }
}
