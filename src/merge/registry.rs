//! The closed set of merge processors selectable by id

use super::{
    AccountScopedProcessor, MergeOptions, MergeProcessor, MergeableMessage, PassThroughProcessor,
    PrefixMergeProcessor,
};
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

static PASS_THROUGH: PassThroughProcessor = PassThroughProcessor;
static PREFIX_MERGE: PrefixMergeProcessor = PrefixMergeProcessor;
static ACCOUNT_SCOPED: AccountScopedProcessor = AccountScopedProcessor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessorKind {
    PassThrough,
    #[default]
    PrefixMerge,
    AccountScoped,
}

impl ProcessorKind {
    /// Registry order
    pub const ALL: [ProcessorKind; 3] = [
        ProcessorKind::PassThrough,
        ProcessorKind::PrefixMerge,
        ProcessorKind::AccountScoped,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::PassThrough => "passthrough",
            Self::PrefixMerge => "neft_inr",
            Self::AccountScoped => "iob",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::PassThrough => "No processing",
            Self::PrefixMerge => "Merge consecutive NEFT / INR transaction alerts",
            Self::AccountScoped => "Merge IOB credit alerts for one account (needs account digits)",
        }
    }

    pub fn from_id(id: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == id.trim())
            .ok_or_else(|| Error::UnknownProcessor(id.to_string()))
    }

    pub fn processor(&self) -> &'static dyn MergeProcessor {
        match self {
            Self::PassThrough => &PASS_THROUGH,
            Self::PrefixMerge => &PREFIX_MERGE,
            Self::AccountScoped => &ACCOUNT_SCOPED,
        }
    }

    pub fn process(
        &self,
        messages: &[MergeableMessage],
        options: &MergeOptions,
    ) -> Result<Vec<MergeableMessage>> {
        self.processor().process(messages, options)
    }

    /// Render-layer variant: a missing configuration yields an empty list
    pub fn process_or_empty(
        &self,
        messages: &[MergeableMessage],
        options: &MergeOptions,
    ) -> Vec<MergeableMessage> {
        match self.process(messages, options) {
            Ok(out) => out,
            Err(e) => {
                warn!(processor = self.id(), error = %e, "Merge processor not usable");
                Vec::new()
            }
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProcessorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_id(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageType;
    use proptest::prelude::*;

    fn msg(ts: i64, body: &str) -> MergeableMessage {
        MergeableMessage {
            timestamp: ts,
            message_type: MessageType::Received,
            phone: "BANK".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(ProcessorKind::from_id("passthrough").unwrap(), ProcessorKind::PassThrough);
        assert_eq!(ProcessorKind::from_id("neft_inr").unwrap(), ProcessorKind::PrefixMerge);
        assert_eq!("iob".parse::<ProcessorKind>().unwrap(), ProcessorKind::AccountScoped);
        assert!(matches!(
            ProcessorKind::from_id("hdfc"),
            Err(Error::UnknownProcessor(id)) if id == "hdfc"
        ));
    }

    #[test]
    fn test_default_is_prefix_merge() {
        assert_eq!(ProcessorKind::default(), ProcessorKind::PrefixMerge);
    }

    #[test]
    fn test_ids_unique_and_round_trip() {
        for kind in ProcessorKind::ALL {
            assert_eq!(ProcessorKind::from_id(kind.id()).unwrap(), kind);
            assert_eq!(kind.to_string(), kind.id());
        }
    }

    #[test]
    fn test_process_dispatches() {
        let input = vec![msg(2, "NEFT of Rs. 1.00"), msg(1, "NEFT of Rs. 2.00")];
        let options = MergeOptions::default();

        assert_eq!(ProcessorKind::PassThrough.process(&input, &options).unwrap(), input);
        assert_eq!(ProcessorKind::PrefixMerge.process(&input, &options).unwrap().len(), 1);
        assert!(matches!(
            ProcessorKind::AccountScoped.process(&input, &options),
            Err(Error::ConfigurationRequired(_))
        ));
    }

    #[test]
    fn test_process_or_empty() {
        let input = vec![msg(1, "hello")];
        let options = MergeOptions::default();
        assert!(ProcessorKind::AccountScoped
            .process_or_empty(&input, &options)
            .is_empty());
        assert_eq!(
            ProcessorKind::PrefixMerge.process_or_empty(&input, &options),
            input
        );
    }

    fn arb_body() -> impl Strategy<Value = String> {
        prop_oneof![
            (1u32..100_000).prop_map(|n| format!("NEFT of Rs. {}.00 received", n)),
            (1u32..100_000).prop_map(|n| format!("INR {}.00 credited to A/c XX68", n)),
            (1u32..100_000).prop_map(|n| format!("INR {}.00 debited from A/c XX68", n)),
            (1u32..100_000)
                .prop_map(|n| format!("Your a/c no. XXXXX68 is credited by Rs.{}.00", n)),
            "[a-z ]{0,20}".prop_map(|s| format!("OTP {}", s)),
        ]
    }

    fn arb_messages() -> impl Strategy<Value = Vec<MergeableMessage>> {
        proptest::collection::vec(arb_body(), 0..30).prop_map(|bodies| {
            let n = bodies.len() as i64;
            bodies
                .into_iter()
                .enumerate()
                .map(|(i, body)| msg(n - i as i64, &body))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_merge_preserves_message_count(input in arb_messages()) {
            let options = MergeOptions::with_account("68");
            for kind in ProcessorKind::ALL {
                let out = kind.process(&input, &options).unwrap();
                let represented: u32 = out
                    .iter()
                    .map(|m| crate::merge::amount::marker_count(&m.body))
                    .sum();
                prop_assert_eq!(represented as usize, input.len());
                prop_assert!(out.len() <= input.len());
            }
        }

        #[test]
        fn prop_output_stays_newest_first(input in arb_messages()) {
            let options = MergeOptions::with_account("68");
            for kind in ProcessorKind::ALL {
                let out = kind.process(&input, &options).unwrap();
                for pair in out.windows(2) {
                    prop_assert!(pair[0].timestamp > pair[1].timestamp);
                }
            }
        }

        #[test]
        fn prop_process_is_idempotent(input in arb_messages()) {
            let options = MergeOptions::default();
            let once = ProcessorKind::PrefixMerge.process(&input, &options).unwrap();
            let twice = ProcessorKind::PrefixMerge.process(&once, &options).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
