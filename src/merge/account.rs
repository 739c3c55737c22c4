//! IOB account-scoped merge
//!
//! Only credit alerts for one configured account (identified by the last two
//! digits of the masked account number) are merged.

use super::engine::{merge_runs, AmountMatch, MergeRule};
use super::{amount::parse_amount, MergeOptions, MergeProcessor, MergeableMessage};
use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Amount phrasings, tried in order
static AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?P<label>(?:credited|debited) by Rs\.?)\s*(?P<amount>\d[\d,]*(?:\.\d+)?)",
        r"(?P<label>Rs\.?|INR)\s*(?P<amount>\d[\d,]*(?:\.\d+)?)",
        r"^\s*(?P<amount>\d[\d,]*(?:\.\d+)?)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("Invalid amount regex"))
    .collect()
});

/// Validate the account suffix option: exactly two ASCII digits
pub fn account_digits(options: &MergeOptions) -> Result<&str> {
    let digits = options
        .account_last_digits
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();

    if digits.len() == 2 && digits.bytes().all(|b| b.is_ascii_digit()) {
        Ok(digits)
    } else {
        Err(Error::ConfigurationRequired(
            "account-scoped merge needs the last two digits of the account (accountLastDigits)"
                .to_string(),
        ))
    }
}

struct AccountRule {
    credit_alert: Regex,
}

impl AccountRule {
    fn new(digits: &str) -> Result<Self> {
        let pattern = format!(
            r"Your a/c no\. X+{} is credited by Rs\.",
            regex::escape(digits)
        );
        let credit_alert =
            Regex::new(&pattern).map_err(|e| Error::Parse(format!("account pattern: {}", e)))?;
        Ok(Self { credit_alert })
    }
}

impl MergeRule for AccountRule {
    fn same_pattern(&self, newer: &MergeableMessage, older: &MergeableMessage) -> bool {
        self.credit_alert.is_match(&newer.body) && self.credit_alert.is_match(&older.body)
    }

    fn find_amount(&self, body: &str) -> Option<AmountMatch> {
        AMOUNT_PATTERNS.iter().find_map(|pattern| {
            let caps = pattern.captures(body)?;
            let amount = caps.name("amount")?;
            let value = parse_amount(amount.as_str())?;
            let (start, label) = match caps.name("label") {
                Some(label) => (label.start(), label.as_str().to_string()),
                None => (amount.start(), String::new()),
            };
            Some(AmountMatch {
                start,
                end: amount.end(),
                label,
                value,
            })
        })
    }
}

/// Merges consecutive credit alerts for a single configured account
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountScopedProcessor;

impl MergeProcessor for AccountScopedProcessor {
    fn process(
        &self,
        messages: &[MergeableMessage],
        options: &MergeOptions,
    ) -> Result<Vec<MergeableMessage>> {
        let rule = AccountRule::new(account_digits(options)?)?;
        Ok(merge_runs(messages, &rule))
    }
}
