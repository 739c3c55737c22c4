//! SMS and notification records captured on the device

use crate::contacts::normalize_phone;
use crate::sync::SyncRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Direction of an SMS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Sent,
    Received,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SMS read from the device inbox or outbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsRecord {
    pub message_type: MessageType,
    pub phone: String,
    pub body: String,
    pub timestamp: i64,
    #[serde(default)]
    pub read: bool,
}

impl SyncRecord for SmsRecord {
    const SNAPSHOT_KEY: &'static str = "messages";
    const ENDPOINT: &'static str = "/api/messages/";

    fn natural_key(&self) -> Option<String> {
        // Bank senders are alphanumeric ("AD-HDFCBK"), so fall back to the raw id
        let phone = match normalize_phone(&self.phone) {
            p if p.is_empty() => self.phone.trim().to_string(),
            p => p,
        };
        if phone.is_empty() {
            return None;
        }
        Some(format!("{}:{}:{}", self.message_type, phone, self.timestamp))
    }

    fn recency(&self) -> Option<i64> {
        Some(self.timestamp)
    }

    fn to_wire(&self) -> Value {
        json!({
            "message_type": self.message_type.as_str(),
            "phone": self.phone,
            "body": self.body,
            "timestamp": self.timestamp,
            "read": self.read,
        })
    }
}

/// A notification captured by the device listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub package_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    pub timestamp: i64,
}

impl SyncRecord for NotificationRecord {
    const SNAPSHOT_KEY: &'static str = "notifications";
    const ENDPOINT: &'static str = "/api/notifications/";

    fn natural_key(&self) -> Option<String> {
        let package = self.package_name.trim();
        if package.is_empty() {
            None
        } else {
            Some(format!("{}:{}", package, self.timestamp))
        }
    }

    fn recency(&self) -> Option<i64> {
        Some(self.timestamp)
    }

    fn to_wire(&self) -> Value {
        json!({
            "package_name": self.package_name,
            "title": self.title,
            "text": self.text,
            "timestamp": self.timestamp,
        })
    }
}
