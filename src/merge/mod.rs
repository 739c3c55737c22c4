//! Transaction message merge processors
//!
//! Bank alerts arrive as many small SMS ("NEFT of Rs. 500.00 ...") and
//! are much easier to read once consecutive ones are coalesced. A processor
//! takes a newest-first message list and returns a new list in which each
//! run of mergeable neighbours has become one message carrying the summed
//! amount and a `[Merged: N messages]` marker.

pub mod account;
pub mod amount;
mod engine;
pub mod prefix;
pub mod registry;

use crate::error::{Error, Result};
use crate::messages::{MessageType, SmsRecord};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use account::AccountScopedProcessor;
pub use prefix::PrefixMergeProcessor;
pub use registry::ProcessorKind;

/// Message as rendered on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeableMessage {
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub phone: String,
    pub body: String,
}

impl From<&SmsRecord> for MergeableMessage {
    fn from(record: &SmsRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            message_type: record.message_type,
            phone: record.phone.clone(),
            body: record.body.clone(),
        }
    }
}

/// Caller-supplied processor options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOptions {
    /// Last two digits of the account, used by the account-scoped processor
    #[serde(
        default,
        alias = "input",
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub account_last_digits: Option<String>,
}

impl MergeOptions {
    pub fn with_account(digits: impl Into<String>) -> Self {
        Self {
            account_last_digits: Some(digits.into()),
        }
    }

    /// Options from an arbitrary JSON object. Unknown keys are ignored.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            other => Err(Error::Parse(format!(
                "merge options must be an object, got {}",
                other
            ))),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A merge rule over a newest-first message list
pub trait MergeProcessor: Send + Sync {
    /// Produce the merged list. The input is never modified.
    fn process(
        &self,
        messages: &[MergeableMessage],
        options: &MergeOptions,
    ) -> Result<Vec<MergeableMessage>>;
}

/// Identity processor
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughProcessor;

impl MergeProcessor for PassThroughProcessor {
    fn process(
        &self,
        messages: &[MergeableMessage],
        _options: &MergeOptions,
    ) -> Result<Vec<MergeableMessage>> {
        Ok(messages.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let msg: MergeableMessage = serde_json::from_value(json!({
            "timestamp": 1700000000000i64,
            "type": "received",
            "phone": "VM-HDFCBK",
            "body": "INR 500.00 credited"
        }))
        .unwrap();
        assert_eq!(msg.message_type, MessageType::Received);

        let back = serde_json::to_value(&msg).unwrap();
        assert_eq!(back["type"], "received");
    }

    #[test]
    fn test_from_sms_record() {
        let record = SmsRecord {
            message_type: MessageType::Sent,
            phone: "+919876543210".to_string(),
            body: "hi".to_string(),
            timestamp: 42,
            read: true,
        };
        let msg = MergeableMessage::from(&record);
        assert_eq!(msg.timestamp, 42);
        assert_eq!(msg.message_type, MessageType::Sent);
        assert_eq!(msg.body, "hi");
    }

    #[test]
    fn test_options_aliases() {
        let opts = MergeOptions::from_value(json!({"accountLastDigits": "68"})).unwrap();
        assert_eq!(opts.account_last_digits.as_deref(), Some("68"));

        let opts = MergeOptions::from_value(json!({"input": "07", "theme": "dark"})).unwrap();
        assert_eq!(opts.account_last_digits.as_deref(), Some("07"));

        let opts = MergeOptions::from_value(json!({"input": 68})).unwrap();
        assert_eq!(opts.account_last_digits.as_deref(), Some("68"));

        let opts = MergeOptions::from_value(Value::Null).unwrap();
        assert_eq!(opts, MergeOptions::default());

        assert!(MergeOptions::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_pass_through_is_identity() {
        let input = vec![
            MergeableMessage {
                timestamp: 2,
                message_type: MessageType::Received,
                phone: "A".to_string(),
                body: "NEFT of Rs. 1.00".to_string(),
            },
            MergeableMessage {
                timestamp: 1,
                message_type: MessageType::Received,
                phone: "A".to_string(),
                body: "NEFT of Rs. 2.00".to_string(),
            },
        ];
        let out = PassThroughProcessor
            .process(&input, &MergeOptions::default())
            .unwrap();
        assert_eq!(out, input);
    }
}
