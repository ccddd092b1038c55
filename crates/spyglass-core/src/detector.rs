//! Matcher detection and chained-call untangling.
//!
//! After all rounds of a block have run, each registered matcher must be tied
//! to exactly one argument slot. Within a round a matcher's candidate slots are
//! those holding its signature value (and belonging to a call made after the
//! matcher was registered). Across rounds only the slots that were candidates
//! every time survive, which rules out literals that happened to equal a
//! signature once and separates `bool` matchers from equal literals (their
//! signatures flip between rounds).
//!
//! Chained calls are found by identity: when the object returned by an earlier
//! call is the target (or an argument) of a later call, the earlier call is an
//! intermediate link that describes how to reach the mock actually being
//! stubbed or verified.

use std::collections::{BTreeSet, HashMap};

use crate::errors::{MockError, MockResult};
use crate::matcher::{InvocationMatcher, Matcher};
use crate::recorder::RecorderState;
use crate::round::{CapturedCall, RecordingRound};
use crate::value::{ObjectId, Value};

/// One resolved call of the block.
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub matcher: InvocationMatcher,
    /// Value the call returned during the last round.
    pub returned: Value,
    /// Call whose returned object is this call's target.
    pub chain_parent: Option<usize>,
    /// This call's result feeds a later call of the same block.
    pub intermediate: bool,
}

/// Resolved calls of a block, in capture order.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub calls: Vec<ResolvedCall>,
}

impl Resolution {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Calls that are not intermediate chain links.
    pub fn top_level(&self) -> impl Iterator<Item = &ResolvedCall> {
        self.calls.iter().filter(|call| !call.intermediate)
    }

    pub fn top_level_matchers(&self) -> Vec<InvocationMatcher> {
        self.top_level().map(|call| call.matcher.clone()).collect()
    }
}

/// Position of a value inside a round: call, argument slot, and vararg element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct SlotAddress {
    call: usize,
    slot: usize,
    element: Option<usize>,
}

impl SlotAddress {
    /// A whole vararg list and its elements cannot both be bound.
    fn overlaps(&self, other: &SlotAddress) -> bool {
        self.call == other.call
            && self.slot == other.slot
            && (self.element.is_none() || other.element.is_none() || self.element == other.element)
    }
}

/// How a call's target relates to the rest of the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetRole {
    Fixed(ObjectId),
    ReturnedBy(usize),
}

pub struct MatcherDetector;

impl MatcherDetector {
    /// Resolve completed rounds into invocation matchers.
    ///
    /// `state` is only used to label inconsistency errors.
    pub fn resolve(rounds: &[RecordingRound], state: RecorderState) -> MockResult<Resolution> {
        let Some(last) = rounds.last() else {
            return Ok(Resolution::default());
        };
        Self::check_consistency(rounds, state)?;
        let bindings = Self::bind_matchers(rounds)?;

        let mut returned_by: HashMap<ObjectId, usize> = HashMap::new();
        let mut calls: Vec<ResolvedCall> = Vec::with_capacity(last.calls.len());
        for (call_idx, call) in last.calls.iter().enumerate() {
            let args = Self::build_args(call_idx, call, last, &bindings);

            let chain_parent = returned_by.get(&call.invocation.target.id()).copied();
            let mut feeds: Vec<usize> = chain_parent.into_iter().collect();
            for arg in &call.invocation.args {
                if let Some(parent) = arg.as_object().and_then(|o| returned_by.get(&o.id())) {
                    feeds.push(*parent);
                }
            }
            for parent in feeds {
                calls[parent].intermediate = true;
            }

            if let Some(object) = call.returned.as_object() {
                returned_by.insert(object.id(), call_idx);
            }
            calls.push(ResolvedCall {
                matcher: InvocationMatcher::new(
                    call.invocation.target.clone(),
                    call.invocation.method.clone(),
                    args,
                ),
                returned: call.returned.clone(),
                chain_parent,
                intermediate: false,
            });
        }

        tracing::debug!(
            rounds = rounds.len(),
            calls = calls.len(),
            chained = calls.iter().filter(|c| c.intermediate).count(),
            "resolved recorded block"
        );
        Ok(Resolution { calls })
    }

    fn check_consistency(rounds: &[RecordingRound], state: RecorderState) -> MockResult<()> {
        let inconsistent = |reason: String| {
            Err(MockError::bad_sequence_because(
                "run_recorded_block",
                state,
                format!("block behaved differently between recording rounds: {reason}"),
            ))
        };
        let reference = &rounds[0];
        let reference_roles = Self::target_roles(reference);
        for round in &rounds[1..] {
            if round.calls.len() != reference.calls.len() {
                return inconsistent(format!(
                    "{} calls in round {}, {} in round {}",
                    reference.calls.len(),
                    reference.index,
                    round.calls.len(),
                    round.index
                ));
            }
            if round.matchers.len() != reference.matchers.len() {
                return inconsistent(format!(
                    "{} matchers in round {}, {} in round {}",
                    reference.matchers.len(),
                    reference.index,
                    round.matchers.len(),
                    round.index
                ));
            }
            for (idx, (a, b)) in reference.calls.iter().zip(&round.calls).enumerate() {
                if a.invocation.method != b.invocation.method {
                    return inconsistent(format!(
                        "call #{idx} was {} then {}",
                        a.invocation.method, b.invocation.method
                    ));
                }
            }
            for (idx, (a, b)) in reference.matchers.iter().zip(&round.matchers).enumerate() {
                if a.matcher.to_string() != b.matcher.to_string() {
                    return inconsistent(format!(
                        "matcher #{idx} was {} then {}",
                        a.matcher, b.matcher
                    ));
                }
            }
            if Self::target_roles(round) != reference_roles {
                return inconsistent("calls were made on different targets".to_string());
            }
        }
        Ok(())
    }

    fn target_roles(round: &RecordingRound) -> Vec<TargetRole> {
        let mut returned_by: HashMap<ObjectId, usize> = HashMap::new();
        let mut roles = Vec::with_capacity(round.calls.len());
        for (idx, call) in round.calls.iter().enumerate() {
            let target = call.invocation.target.id();
            roles.push(match returned_by.get(&target) {
                Some(parent) => TargetRole::ReturnedBy(*parent),
                None => TargetRole::Fixed(target),
            });
            if let Some(object) = call.returned.as_object() {
                returned_by.insert(object.id(), idx);
            }
        }
        roles
    }

    fn addresses(round: &RecordingRound) -> Vec<(SlotAddress, &Value)> {
        let mut out = Vec::new();
        for (call_idx, call) in round.calls.iter().enumerate() {
            let vararg_slot = call.invocation.method.vararg_slot();
            for (slot, arg) in call.invocation.args.iter().enumerate() {
                out.push((
                    SlotAddress {
                        call: call_idx,
                        slot,
                        element: None,
                    },
                    arg,
                ));
                if Some(slot) != vararg_slot {
                    continue;
                }
                if let Value::List(items) = arg {
                    for (element, item) in items.iter().enumerate() {
                        out.push((
                            SlotAddress {
                                call: call_idx,
                                slot,
                                element: Some(element),
                            },
                            item,
                        ));
                    }
                }
            }
        }
        out
    }

    /// Bind every registered matcher (by index) to one slot address.
    fn bind_matchers(rounds: &[RecordingRound]) -> MockResult<HashMap<SlotAddress, usize>> {
        let reference = &rounds[0];
        let per_round: Vec<Vec<(SlotAddress, &Value)>> =
            rounds.iter().map(Self::addresses).collect();

        let candidates = |matcher_idx: usize| -> BTreeSet<SlotAddress> {
            let mut surviving: Option<BTreeSet<SlotAddress>> = None;
            for (round, addresses) in rounds.iter().zip(&per_round) {
                let registered = &round.matchers[matcher_idx];
                let here: BTreeSet<SlotAddress> = addresses
                    .iter()
                    .filter(|(addr, value)| {
                        addr.call >= registered.pending_for && **value == registered.signature
                    })
                    .map(|(addr, _)| *addr)
                    .collect();
                surviving = Some(match surviving {
                    None => here,
                    Some(previous) => previous.intersection(&here).copied().collect(),
                });
            }
            surviving.unwrap_or_default()
        };

        // Distinguishable matchers first: their candidates are exact.
        let mut order: Vec<usize> = (0..reference.matchers.len()).collect();
        order.sort_by_key(|idx| (!reference.matchers[*idx].distinguishable, *idx));

        let mut bound: HashMap<SlotAddress, usize> = HashMap::new();
        let mut unresolved: Vec<usize> = Vec::new();
        for matcher_idx in order {
            let choice = candidates(matcher_idx)
                .into_iter()
                .find(|addr| bound.keys().all(|taken| !taken.overlaps(addr)));
            match choice {
                Some(addr) => {
                    bound.insert(addr, matcher_idx);
                }
                None => unresolved.push(matcher_idx),
            }
        }

        if !unresolved.is_empty() {
            unresolved.sort_unstable();
            let last = rounds.last().unwrap_or(reference);
            return Err(MockError::UnresolvedMatcher {
                matchers: unresolved
                    .into_iter()
                    .map(|idx| last.matchers[idx].matcher.to_string())
                    .collect(),
            });
        }
        Ok(bound)
    }

    fn build_args(
        call_idx: usize,
        call: &CapturedCall,
        round: &RecordingRound,
        bindings: &HashMap<SlotAddress, usize>,
    ) -> Vec<Matcher> {
        let bound_at = |slot: usize, element: Option<usize>| {
            bindings
                .get(&SlotAddress {
                    call: call_idx,
                    slot,
                    element,
                })
                .map(|idx| round.matchers[*idx].matcher.clone())
        };
        let vararg_slot = call.invocation.method.vararg_slot();

        call.invocation
            .args
            .iter()
            .enumerate()
            .map(|(slot, arg)| {
                if let Some(matcher) = bound_at(slot, None) {
                    return matcher;
                }
                match arg {
                    Value::List(items) if Some(slot) == vararg_slot => {
                        let elements: Vec<Matcher> = items
                            .iter()
                            .enumerate()
                            .map(|(element, item)| {
                                bound_at(slot, Some(element))
                                    .unwrap_or_else(|| Matcher::Eq(item.clone()))
                            })
                            .collect();
                        match elements.iter().find(|m| m.is_vararg_wildcard()) {
                            Some(wildcard) => wildcard.clone(),
                            None => Matcher::Varargs(elements),
                        }
                    }
                    literal => Matcher::Eq(literal.clone()),
                }
            })
            .collect()
    }
}
