//! Device contacts - the primary record type synced to the backend

use crate::sync::SyncRecord;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A contact read from the device address book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_contacted: Option<i64>,
}

impl Contact {
    pub fn new(name: &str, phone_number: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            phone_number: phone_number.to_string(),
            display_name: None,
            company: None,
            job_title: None,
            last_contacted: None,
        }
    }

    pub fn with_last_contacted(mut self, last_contacted: Option<i64>) -> Self {
        self.last_contacted = last_contacted;
        self
    }
}

impl SyncRecord for Contact {
    const SNAPSHOT_KEY: &'static str = "contacts";
    const ENDPOINT: &'static str = "/api/contacts/";

    fn natural_key(&self) -> Option<String> {
        let normalized = normalize_phone(&self.phone_number);
        if normalized.is_empty() || normalized == "+" {
            None
        } else {
            Some(normalized)
        }
    }

    fn recency(&self) -> Option<i64> {
        self.last_contacted
    }

    fn to_wire(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), json!(self.name));
        map.insert(
            "phone_number".into(),
            json!(self.natural_key().unwrap_or_default()),
        );
        map.insert("last_contacted".into(), json!(self.last_contacted));

        // Optional fields only when present on the device record
        let optional = [
            ("display_name", &self.display_name),
            ("company", &self.company),
            ("job_title", &self.job_title),
        ];
        for (field, value) in optional {
            if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
                map.insert(field.into(), json!(v));
            }
        }

        Value::Object(map)
    }
}

/// Normalize a phone number for use as a dedup key.
///
/// Formatting characters are dropped and a leading `+` is kept. No country
/// code is assumed, since device address books mix local and international
/// numbers.
pub fn normalize_phone(phone: &str) -> String {
    let trimmed = phone.trim();
    let has_plus = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        String::new()
    } else if has_plus {
        format!("+{}", digits)
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone_e164() {
        assert_eq!(normalize_phone("+919876543210"), "+919876543210");
    }

    #[test]
    fn test_normalize_phone_with_spaces() {
        assert_eq!(normalize_phone("+91 98765 43210"), "+919876543210");
    }

    #[test]
    fn test_normalize_phone_with_dashes() {
        assert_eq!(normalize_phone("987-654-3210"), "9876543210");
    }

    #[test]
    fn test_normalize_phone_empty() {
        assert_eq!(normalize_phone(""), "");
        assert_eq!(normalize_phone("  "), "");
        assert_eq!(normalize_phone("+"), "");
    }

    #[test]
    fn test_natural_key_missing() {
        let contact = Contact::new("Nobody", "");
        assert_eq!(contact.natural_key(), None);

        let contact = Contact::new("Nobody", "n/a");
        assert_eq!(contact.natural_key(), None);
    }

    #[test]
    fn test_natural_key_normalized() {
        let contact = Contact::new("Asha", "(022) 555-0101");
        assert_eq!(contact.natural_key(), Some("0225550101".to_string()));
    }

    #[test]
    fn test_wire_shape_required_fields() {
        let contact = Contact::new("Asha", "+91 98765 43210").with_last_contacted(Some(42));
        let wire = contact.to_wire();
        assert_eq!(wire["name"], "Asha");
        assert_eq!(wire["phone_number"], "+919876543210");
        assert_eq!(wire["last_contacted"], 42);
        assert!(wire.get("display_name").is_none());
        assert!(wire.get("company").is_none());
        assert!(wire.get("job_title").is_none());
    }

    #[test]
    fn test_wire_shape_optional_fields() {
        let mut contact = Contact::new("Asha", "+919876543210");
        contact.display_name = Some("Asha K".to_string());
        contact.company = Some("Acme".to_string());
        contact.job_title = Some(String::new());

        let wire = contact.to_wire();
        assert_eq!(wire["display_name"], "Asha K");
        assert_eq!(wire["company"], "Acme");
        assert!(wire.get("job_title").is_none());
        assert!(wire["last_contacted"].is_null());
    }

    #[test]
    fn test_contact_json_is_camel_case() {
        let contact = Contact::new("Asha", "+919876543210").with_last_contacted(Some(7));
        let json = serde_json::to_string(&contact).unwrap();
        assert!(json.contains("phoneNumber"));
        assert!(json.contains("lastContacted"));

        let parsed: Contact = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, contact);
    }
}
