//! Run-collapsing reduction shared by the merging processors
//!
//! Walks a newest-first slice once. Each maximal run of adjacent mergeable
//! messages becomes a single message: the oldest member's body with its
//! amount replaced by the run total, the newest member's timestamp and phone,
//! and a marker counting every original message the run represents.

use super::amount::{format_amount, marker_count, strip_marker, with_marker};
use super::MergeableMessage;

/// Amount located inside a message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AmountMatch {
    /// Byte range of the text to rewrite (label and number)
    pub start: usize,
    pub end: usize,
    /// Text written before the new amount, empty for a bare number
    pub label: String,
    pub value: i64,
}

/// Bank-specific matching used by `merge_runs`
pub(crate) trait MergeRule {
    /// Whether the pair shares a pattern (amounts are checked separately)
    fn same_pattern(&self, newer: &MergeableMessage, older: &MergeableMessage) -> bool;

    /// Locate the amount in a body without merge marker
    fn find_amount(&self, body: &str) -> Option<AmountMatch>;
}

struct RunTotal {
    amount: i64,
    count: u32,
}

fn amount_of(rule: &impl MergeRule, body: &str) -> Option<i64> {
    rule.find_amount(&strip_marker(body)).map(|m| m.value)
}

fn can_merge(rule: &impl MergeRule, newer: &MergeableMessage, older: &MergeableMessage) -> bool {
    rule.same_pattern(newer, older)
        && amount_of(rule, &newer.body).is_some()
        && amount_of(rule, &older.body).is_some()
}

pub(crate) fn merge_runs(
    messages: &[MergeableMessage],
    rule: &impl MergeRule,
) -> Vec<MergeableMessage> {
    if messages.len() < 2 {
        return messages.to_vec();
    }

    let mut out = Vec::with_capacity(messages.len());
    let mut start = 0;

    while start < messages.len() {
        let mut end = start;
        while end + 1 < messages.len() && can_merge(rule, &messages[end], &messages[end + 1]) {
            end += 1;
        }

        if end == start {
            out.push(messages[start].clone());
        } else {
            out.push(collapse(&messages[start..=end], rule));
        }
        start = end + 1;
    }

    out
}

fn collapse(run: &[MergeableMessage], rule: &impl MergeRule) -> MergeableMessage {
    let total = run.iter().fold(RunTotal { amount: 0, count: 0 }, |acc, msg| RunTotal {
        amount: acc
            .amount
            .saturating_add(amount_of(rule, &msg.body).unwrap_or(0)),
        count: acc.count.saturating_add(marker_count(&msg.body)),
    });

    let newest = &run[0];
    let oldest = &run[run.len() - 1];

    let base = strip_marker(&oldest.body);
    let rewritten = match rule.find_amount(&base) {
        Some(found) => {
            let formatted = format_amount(total.amount);
            let replacement = if found.label.is_empty() {
                formatted
            } else {
                format!("{} {}", found.label, formatted)
            };
            format!("{}{}{}", &base[..found.start], replacement, &base[found.end..])
        }
        None => base,
    };

    MergeableMessage {
        timestamp: newest.timestamp,
        message_type: oldest.message_type,
        phone: newest.phone.clone(),
        body: with_marker(&rewritten, total.count),
    }
}
