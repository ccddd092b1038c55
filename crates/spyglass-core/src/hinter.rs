//! Auto hinting for ambiguous return positions.
//!
//! A call whose return shape is statically unknown receives a placeholder
//! during recording. If the block then needs a concrete shape (a typed proxy
//! converting the result, or a chained call expecting a specific class), it
//! fails with [`MockError::ShapeMismatch`]. The hinter records "at call N,
//! synthesize the expected shape" and asks for the round to be rerun.

use std::collections::BTreeMap;

use crate::errors::{MockError, MockResult};
use crate::round::RecordingRound;
use crate::value::Value;

/// Call index within a block -> shape to synthesize for its return value.
pub type HintTable = BTreeMap<usize, crate::value::ValueType>;

/// What the recorder should do after a pass.
#[derive(Debug)]
pub enum HintReview {
    /// The pass completed; keep the round.
    Complete(RecordingRound),
    /// A hint was added; discard the partial round and run the block again.
    Retry,
}

/// Drives hinted passes of one recorded statement.
#[derive(Debug, Default)]
pub struct AutoHinter {
    hints: HintTable,
    passes: usize,
}

impl AutoHinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hints collected so far. They persist across the rounds of a statement.
    pub fn hints(&self) -> &HintTable {
        &self.hints
    }

    /// Reset the pass counter at the start of a round.
    pub fn start_round(&mut self) {
        self.passes = 0;
    }

    /// Review the outcome of one pass over the block.
    ///
    /// Budget: a round may take at most (distinct calls captured + 1) passes,
    /// where calls differing only in arguments count separately.
    pub fn review(
        &mut self,
        outcome: anyhow::Result<Value>,
        round: RecordingRound,
    ) -> MockResult<HintReview> {
        self.passes += 1;
        let err = match outcome {
            Ok(_) => return Ok(HintReview::Complete(round)),
            Err(err) => MockError::from_block(err),
        };

        let (expected, placeholder) = match &err {
            MockError::ShapeMismatch {
                expected,
                placeholder,
                ..
            } => (expected.clone(), *placeholder),
            _ => return Err(err),
        };
        // The call whose placeholder was rejected, else the latest ambiguous one.
        let call_index = placeholder
            .and_then(|id| round.call_returning(id))
            .or_else(|| round.last_ambiguous_call(&self.hints));
        let Some(call_index) = call_index else {
            // Not caused by a synthesized value.
            return Err(err);
        };

        let budget = round.distinct_invocation_count() + 1;
        if self.passes >= budget {
            return Err(MockError::AutoHintExhausted {
                call_index,
                expected,
                passes: self.passes,
            });
        }

        tracing::debug!(
            round = round.index,
            call = call_index,
            expected = %expected,
            pass = self.passes,
            "auto hint: retrying round"
        );
        self.hints.insert(call_index, expected);
        Ok(HintReview::Retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::RoundBuilder;
    use crate::signature::SignatureGenerator;
    use crate::value::{MethodDescriptor, ObjectRef, ValueType};

    fn ambiguous_round(hints: &HintTable) -> RecordingRound {
        let mut gen = SignatureGenerator::new(Some(1));
        let mut builder = RoundBuilder::start(0, hints.clone());
        let target = ObjectRef::new("Repo");
        let find = MethodDescriptor::new("find", vec![ValueType::Long], ValueType::Generic);
        builder.capture_call(&mut gen, &target, &find, vec![Value::Long(1)], None);
        builder.finish()
    }

    fn mismatch(expected: ValueType) -> anyhow::Result<Value> {
        Err(MockError::shape_mismatch(expected, "?").into())
    }

    #[test]
    fn test_success_completes() {
        let mut hinter = AutoHinter::new();
        let review = hinter
            .review(Ok(Value::Unit), ambiguous_round(&HintTable::new()))
            .expect("review");
        assert!(matches!(review, HintReview::Complete(_)));
    }

    #[test]
    fn test_mismatch_adds_hint_then_exhausts() {
        let mut hinter = AutoHinter::new();
        hinter.start_round();
        let review = hinter
            .review(mismatch(ValueType::Int), ambiguous_round(hinter.hints()))
            .expect("first pass retries");
        assert!(matches!(review, HintReview::Retry));
        assert_eq!(hinter.hints().get(&0), Some(&ValueType::Int));

        // One distinct call: budget is two passes.
        let err = hinter
            .review(mismatch(ValueType::Int), ambiguous_round(hinter.hints()))
            .expect_err("second pass exhausts");
        assert!(matches!(
            err,
            MockError::AutoHintExhausted {
                call_index: 0,
                passes: 2,
                ..
            }
        ));
    }

    fn two_finds(hints: &HintTable) -> RecordingRound {
        let mut gen = SignatureGenerator::new(Some(4));
        let mut builder = RoundBuilder::start(0, hints.clone());
        let target = ObjectRef::new("Repo");
        let find = MethodDescriptor::new("find", vec![ValueType::Long], ValueType::Generic);
        builder.capture_call(&mut gen, &target, &find, vec![Value::Long(1)], None);
        builder.capture_call(&mut gen, &target, &find, vec![Value::Long(2)], None);
        builder.finish()
    }

    #[test]
    fn test_hint_goes_to_the_call_that_returned_the_placeholder() {
        let mut hinter = AutoHinter::new();
        hinter.start_round();

        let round = two_finds(hinter.hints());
        let first = round.calls[0].returned.clone();
        let review = hinter
            .review(Err(MockError::rejected_value(ValueType::Str, &first).into()), round)
            .expect("first pass retries");
        assert!(matches!(review, HintReview::Retry));
        assert_eq!(hinter.hints().get(&0), Some(&ValueType::Str));
        assert_eq!(hinter.hints().get(&1), None);

        let round = two_finds(hinter.hints());
        assert!(matches!(round.calls[0].returned, Value::Str(_)));
        let second = round.calls[1].returned.clone();
        let review = hinter
            .review(Err(MockError::rejected_value(ValueType::Int, &second).into()), round)
            .expect("second pass retries");
        assert!(matches!(review, HintReview::Retry));
        assert_eq!(hinter.hints().get(&1), Some(&ValueType::Int));

        let review = hinter
            .review(Ok(Value::Unit), two_finds(hinter.hints()))
            .expect("third pass completes");
        assert!(matches!(review, HintReview::Complete(_)));
    }

    #[test]
    fn test_untraced_mismatch_prefers_unhinted_calls() {
        let mut hints = HintTable::new();
        hints.insert(1, ValueType::Int);
        let round = two_finds(&hints);
        assert_eq!(round.last_ambiguous_call(&hints), Some(0));
        hints.insert(0, ValueType::Str);
        assert_eq!(round.last_ambiguous_call(&hints), Some(1));
        assert_eq!(round.distinct_invocation_count(), 2);
    }

    #[test]
    fn test_unrelated_errors_propagate() {
        let mut hinter = AutoHinter::new();
        let err = hinter
            .review(
                Err(anyhow::anyhow!("boom")),
                ambiguous_round(&HintTable::new()),
            )
            .expect_err("propagates");
        assert!(matches!(err, MockError::BlockFailed(_)));

        let empty = RecordingRound::default();
        let err = hinter
            .review(mismatch(ValueType::Int), empty)
            .expect_err("no ambiguous call to hint");
        assert!(matches!(err, MockError::ShapeMismatch { .. }));
    }
}
