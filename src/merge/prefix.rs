//! NEFT / INR prefix merge
//!
//! Adjacent messages starting with the same recognized prefix are merged.
//! For the INR family the action word (third token, e.g. "credited") must
//! also be the same on both sides.

use super::engine::{merge_runs, AmountMatch, MergeRule};
use super::{amount::parse_amount, MergeOptions, MergeProcessor, MergeableMessage};
use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;

struct PrefixFamily {
    prefix: &'static str,
    label: &'static str,
    amount: Regex,
    same_action: bool,
}

static FAMILIES: Lazy<Vec<PrefixFamily>> = Lazy::new(|| {
    vec![
        PrefixFamily {
            prefix: "NEFT of Rs.",
            label: "NEFT of Rs.",
            amount: Regex::new(r"NEFT of Rs\.\s*(?P<amount>\d[\d,]*(?:\.\d+)?)")
                .expect("Invalid NEFT regex"),
            same_action: false,
        },
        PrefixFamily {
            prefix: "INR ",
            label: "INR",
            amount: Regex::new(r"^INR\s*(?P<amount>\d[\d,]*(?:\.\d+)?)")
                .expect("Invalid INR regex"),
            same_action: true,
        },
    ]
});

fn family_of(body: &str) -> Option<&'static PrefixFamily> {
    FAMILIES.iter().find(|family| body.starts_with(family.prefix))
}

fn action_word(body: &str) -> Option<&str> {
    body.split_whitespace().nth(2)
}

/// Merges runs of "NEFT of Rs." or "INR " transaction messages
#[derive(Debug, Clone, Copy, Default)]
pub struct PrefixMergeProcessor;

impl MergeRule for PrefixMergeProcessor {
    fn same_pattern(&self, newer: &MergeableMessage, older: &MergeableMessage) -> bool {
        let (Some(a), Some(b)) = (family_of(&newer.body), family_of(&older.body)) else {
            return false;
        };
        if a.prefix != b.prefix {
            return false;
        }
        if a.same_action {
            return matches!(
                (action_word(&newer.body), action_word(&older.body)),
                (Some(x), Some(y)) if x == y
            );
        }
        true
    }

    fn find_amount(&self, body: &str) -> Option<AmountMatch> {
        let family = family_of(body)?;
        let caps = family.amount.captures(body)?;
        let whole = caps.get(0)?;
        let value = parse_amount(caps.name("amount")?.as_str())?;
        Some(AmountMatch {
            start: whole.start(),
            end: whole.end(),
            label: family.label.to_string(),
            value,
        })
    }
}

impl MergeProcessor for PrefixMergeProcessor {
    fn process(
        &self,
        messages: &[MergeableMessage],
        _options: &MergeOptions,
    ) -> Result<Vec<MergeableMessage>> {
        Ok(merge_runs(messages, self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageType;

    fn msg(ts: i64, body: &str) -> MergeableMessage {
        MergeableMessage {
            timestamp: ts,
            message_type: MessageType::Received,
            phone: format!("BANK-{}", ts),
            body: body.to_string(),
        }
    }

    fn run(messages: &[MergeableMessage]) -> Vec<MergeableMessage> {
        PrefixMergeProcessor
            .process(messages, &MergeOptions::default())
            .unwrap()
    }

    #[test]
    fn test_neft_pair_merges() {
        let out = run(&[msg(200, "NEFT of Rs. 500.00"), msg(100, "NEFT of Rs. 300.00")]);
        assert_eq!(out.len(), 1);
        assert!(out[0].body.contains("NEFT of Rs. 800"));
        assert!(out[0].body.contains("[Merged: 2 messages]"));
        assert_eq!(out[0].timestamp, 200);
        assert_eq!(out[0].phone, "BANK-200");
    }

    #[test]
    fn test_three_message_chain() {
        let out = run(&[
            msg(300, "NEFT of Rs. 100.00 received from A"),
            msg(200, "NEFT of Rs. 200.00 received from B"),
            msg(100, "NEFT of Rs. 300.00 received from C"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].body,
            "NEFT of Rs. 600 received from C [Merged: 3 messages]"
        );
        assert_eq!(out[0].timestamp, 300);
    }

    #[test]
    fn test_inr_requires_same_action() {
        let out = run(&[
            msg(200, "INR 1,000.00 credited to A/c XX12"),
            msg(100, "INR 500.00 debited from A/c XX12"),
        ]);
        assert_eq!(out.len(), 2);

        let out = run(&[
            msg(200, "INR 1,000.00 credited to A/c XX12"),
            msg(100, "INR 500.00 credited to A/c XX12"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].body,
            "INR 1,500 credited to A/c XX12 [Merged: 2 messages]"
        );
    }

    #[test]
    fn test_mixed_families_do_not_merge() {
        let input = vec![
            msg(200, "NEFT of Rs. 500.00"),
            msg(100, "INR 300.00 credited to A/c"),
        ];
        assert_eq!(run(&input), input);
    }

    #[test]
    fn test_unmatched_messages_pass_through_between_runs() {
        let out = run(&[
            msg(500, "NEFT of Rs. 10.00"),
            msg(400, "NEFT of Rs. 20.00"),
            msg(300, "Your OTP is 1234"),
            msg(200, "NEFT of Rs. 30.00"),
            msg(100, "NEFT of Rs. 40.00"),
        ]);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].body, "NEFT of Rs. 30 [Merged: 2 messages]");
        assert_eq!(out[0].timestamp, 500);
        assert_eq!(out[1].body, "Your OTP is 1234");
        assert_eq!(out[2].body, "NEFT of Rs. 70 [Merged: 2 messages]");
        assert_eq!(out[2].timestamp, 200);
    }

    #[test]
    fn test_existing_markers_accumulate() {
        let out = run(&[
            msg(200, "NEFT of Rs. 800 [Merged: 2 messages]"),
            msg(100, "NEFT of Rs. 200 [Merged: 3 messages]"),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].body, "NEFT of Rs. 1,000 [Merged: 5 messages]");
    }

    #[test]
    fn test_missing_amount_is_not_mergeable() {
        let input = vec![msg(200, "NEFT of Rs. pending"), msg(100, "NEFT of Rs. 300.00")];
        assert_eq!(run(&input), input);
    }

    #[test]
    fn test_fractional_amounts_floor() {
        let out = run(&[msg(200, "NEFT of Rs. 10.75"), msg(100, "NEFT of Rs. 5.50")]);
        assert_eq!(out[0].body, "NEFT of Rs. 15 [Merged: 2 messages]");
    }

    #[test]
    fn test_input_is_not_modified() {
        let input = vec![msg(200, "NEFT of Rs. 500.00"), msg(100, "NEFT of Rs. 300.00")];
        let before = input.clone();
        let _ = run(&input);
        assert_eq!(input, before);
    }
}
