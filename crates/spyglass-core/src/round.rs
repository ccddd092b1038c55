//! Recording rounds.
//!
//! One round is one execution of the user's block. During a round every
//! registered matcher and every intercepted call is captured here, in order;
//! the [`crate::detector`] later correlates them.

use std::collections::HashSet;

use crate::hinter::HintTable;
use crate::invocation::{CallFrame, Invocation};
use crate::matcher::Matcher;
use crate::signature::SignatureGenerator;
use crate::value::{MethodDescriptor, ObjectId, ObjectRef, Value, ValueType};

/// A matcher registered through the side channel during a round.
#[derive(Debug, Clone)]
pub struct RegisteredMatcher {
    pub matcher: Matcher,
    /// Value handed back to the block in place of a real argument.
    pub signature: Value,
    /// Whether the signature can be told apart from other values of its type.
    pub distinguishable: bool,
    /// Index of the next call intercepted after registration.
    pub pending_for: usize,
}

/// An intercepted call together with the value the block received back.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub invocation: Invocation,
    pub returned: Value,
    /// The method's return shape is statically unknown (`ValueType::Generic`).
    pub ambiguous: bool,
}

/// Everything captured during one pass over the block.
#[derive(Debug, Clone, Default)]
pub struct RecordingRound {
    pub index: usize,
    pub calls: Vec<CapturedCall>,
    pub matchers: Vec<RegisteredMatcher>,
}

impl RecordingRound {
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    /// Number of distinct `(target, method)` pairs captured.
    pub fn distinct_call_count(&self) -> usize {
        self.calls
            .iter()
            .map(|call| (call.invocation.target.id(), &call.invocation.method))
            .collect::<HashSet<(ObjectId, &MethodDescriptor)>>()
            .len()
    }

    /// Number of calls that differ in target, method or arguments.
    pub fn distinct_invocation_count(&self) -> usize {
        let mut seen: Vec<&Invocation> = Vec::new();
        for call in &self.calls {
            let invocation = &call.invocation;
            let repeated = seen.iter().any(|other| {
                other.target == invocation.target
                    && other.method == invocation.method
                    && other.args == invocation.args
            });
            if !repeated {
                seen.push(invocation);
            }
        }
        seen.len()
    }

    /// Index of the call that returned the placeholder `id`.
    pub fn call_returning(&self, id: ObjectId) -> Option<usize> {
        self.calls
            .iter()
            .position(|call| call.returned.as_object().is_some_and(|object| object.id() == id))
    }

    /// Index of the most recent ambiguous call, preferring calls not in `hinted`.
    pub fn last_ambiguous_call(&self, hinted: &HintTable) -> Option<usize> {
        self.calls
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, call)| call.ambiguous)
            .find(|(idx, _)| !hinted.contains_key(idx))
            .or_else(|| self.calls.iter().enumerate().rev().find(|(_, call)| call.ambiguous))
            .map(|(idx, _)| idx)
    }
}

/// Accumulates one round.
pub struct RoundBuilder {
    round: RecordingRound,
    hints: HintTable,
}

impl RoundBuilder {
    /// Start a round with no prior state. `hints` fix the return shape of ambiguous calls.
    pub fn start(index: usize, hints: HintTable) -> Self {
        Self {
            round: RecordingRound {
                index,
                ..Default::default()
            },
            hints,
        }
    }

    pub fn index(&self) -> usize {
        self.round.index
    }

    /// Register a matcher and return the signature value the block should pass
    /// in its place.
    pub fn register_matcher(
        &mut self,
        generator: &mut SignatureGenerator,
        matcher: Matcher,
        ty: &ValueType,
    ) -> Value {
        let (signature, distinguishable) = match generator.signature_for(ty) {
            Ok(value) => (value, ty.is_distinguishable()),
            // Only the identity of a generic argument matters for correlation.
            Err(_) => (generator.signature_object(), true),
        };
        tracing::trace!(
            round = self.round.index,
            matcher = %matcher,
            signature = %signature,
            "registered matcher"
        );
        self.round.matchers.push(RegisteredMatcher {
            matcher,
            signature: signature.clone(),
            distinguishable,
            pending_for: self.round.calls.len(),
        });
        signature
    }

    /// Capture an intercepted call and return its recording-time result.
    pub fn capture_call(
        &mut self,
        generator: &mut SignatureGenerator,
        target: &ObjectRef,
        method: &MethodDescriptor,
        args: Vec<Value>,
        caller: Option<CallFrame>,
    ) -> Value {
        let index = self.round.calls.len();
        let ambiguous = method.returns == ValueType::Generic;
        let shape = self.hints.get(&index).unwrap_or(&method.returns);
        let returned = match generator.signature_for(shape) {
            Ok(value) => value,
            Err(_) => generator.placeholder(),
        };
        let invocation = Invocation::new(target.clone(), method.clone(), args, caller);
        tracing::trace!(
            round = self.round.index,
            call = index,
            invocation = %invocation,
            returned = %returned,
            "captured call"
        );
        self.round.calls.push(CapturedCall {
            invocation,
            returned: returned.clone(),
            ambiguous,
        });
        returned
    }

    pub fn call_count(&self) -> usize {
        self.round.call_count()
    }

    pub fn distinct_call_count(&self) -> usize {
        self.round.distinct_call_count()
    }

    pub fn finish(self) -> RecordingRound {
        self.round
    }
}
