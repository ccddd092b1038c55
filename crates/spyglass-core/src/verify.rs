//! Verification strategies and reports.
//!
//! A verifier receives the matchers recorded from a verification block and
//! the merged call log of every mock they reference (ordered by sequence
//! number, already filtered by window and excluded records). It never touches
//! a stub's answer table.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::invocation::Invocation;
use crate::matcher::InvocationMatcher;
use crate::value::ObjectId;

/// How recorded matchers relate to the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallOrder {
    /// Each matcher is counted independently.
    Unordered,
    /// Matchers appear in the log as a subsequence.
    Ordered,
    /// Matchers align one to one with the log.
    Sequence,
    /// Every call is accounted for by some matcher.
    All,
}

impl fmt::Display for CallOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallOrder::Unordered => "unordered",
            CallOrder::Ordered => "ordered",
            CallOrder::Sequence => "sequence",
            CallOrder::All => "all",
        };
        write!(f, "{name}")
    }
}

/// Half-open range of sequence numbers `[since, until)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallWindow {
    pub since: Option<u64>,
    pub until: Option<u64>,
}

impl CallWindow {
    pub fn contains(&self, sequence: u64) -> bool {
        self.since.map_or(true, |since| sequence >= since)
            && self.until.map_or(true, |until| sequence < until)
    }
}

/// Ordering mode, count bounds and timeout of one verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub order: CallOrder,
    pub inverse: bool,
    /// Lower bound on matching calls (unordered only).
    pub min: usize,
    /// Upper bound on matching calls (unordered only).
    pub max: Option<usize>,
    /// Exact count; overrides `min`/`max`.
    pub exact: Option<usize>,
    /// Keep polling until the verification passes or this elapses.
    pub timeout: Option<Duration>,
    pub window: CallWindow,
}

impl Default for VerificationRequest {
    fn default() -> Self {
        Self {
            order: CallOrder::Unordered,
            inverse: false,
            min: 1,
            max: None,
            exact: None,
            timeout: None,
            window: CallWindow::default(),
        }
    }
}

impl VerificationRequest {
    pub fn unordered() -> Self {
        Self::default()
    }

    pub fn ordered() -> Self {
        Self {
            order: CallOrder::Ordered,
            ..Self::default()
        }
    }

    pub fn sequence() -> Self {
        Self {
            order: CallOrder::Sequence,
            ..Self::default()
        }
    }

    pub fn all() -> Self {
        Self {
            order: CallOrder::All,
            ..Self::default()
        }
    }

    pub fn times(mut self, count: usize) -> Self {
        self.exact = Some(count);
        self
    }

    pub fn at_least(mut self, count: usize) -> Self {
        self.exact = None;
        self.min = count;
        self
    }

    pub fn at_most(mut self, count: usize) -> Self {
        self.exact = None;
        self.max = Some(count);
        self
    }

    pub fn inverse(mut self) -> Self {
        self.inverse = !self.inverse;
        self
    }

    pub fn within(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Only consider calls made at or after `mark`.
    pub fn since(mut self, mark: u64) -> Self {
        self.window.since = Some(mark);
        self
    }

    /// Only consider calls made before `mark`.
    pub fn until(mut self, mark: u64) -> Self {
        self.window.until = Some(mark);
        self
    }

    fn bounds_text(&self) -> String {
        match (self.exact, self.max) {
            (Some(exact), _) => format!("exactly {exact}"),
            (None, Some(max)) => format!("between {} and {max}", self.min),
            (None, None) => format!("at least {}", self.min),
        }
    }

    fn count_ok(&self, count: usize) -> bool {
        match self.exact {
            Some(exact) => count == exact,
            None => count >= self.min && self.max.map_or(true, |max| count <= max),
        }
    }
}

/// Result of running one verifier.
#[derive(Debug, Clone, Default)]
pub struct VerifierOutcome {
    pub passed: bool,
    pub reason: String,
    /// Sequence numbers of the calls the matchers accepted.
    pub matched: Vec<u64>,
}

impl VerifierOutcome {
    fn pass(matched: Vec<u64>) -> Self {
        Self {
            passed: true,
            reason: String::new(),
            matched,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
            matched: Vec::new(),
        }
    }

    /// Apply `inverse`: a passing verification fails and vice versa.
    fn inverted(self, inverse: bool, expected: &[InvocationMatcher]) -> Self {
        if !inverse {
            return self;
        }
        if self.passed {
            Self::fail(format!(
                "expected the calls not to match, but they did: {}",
                render_list(expected)
            ))
        } else {
            Self::pass(Vec::new())
        }
    }
}

pub trait Verifier {
    fn verify(
        &self,
        request: &VerificationRequest,
        matchers: &[InvocationMatcher],
        calls: &[Invocation],
    ) -> VerifierOutcome;
}

/// Pick the verifier for an ordering mode.
pub fn verifier_for(order: CallOrder) -> Box<dyn Verifier> {
    match order {
        CallOrder::Unordered => Box::new(UnorderedVerifier),
        CallOrder::Ordered => Box::new(OrderedVerifier),
        CallOrder::Sequence => Box::new(SequenceVerifier),
        CallOrder::All => Box::new(AllCallsVerifier),
    }
}

fn render_list(matchers: &[InvocationMatcher]) -> String {
    matchers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "time"
    } else {
        "times"
    }
}

// ==================== Strategies ====================

/// Counts matching calls per distinct matcher.
pub struct UnorderedVerifier;

impl Verifier for UnorderedVerifier {
    fn verify(
        &self,
        request: &VerificationRequest,
        matchers: &[InvocationMatcher],
        calls: &[Invocation],
    ) -> VerifierOutcome {
        let mut distinct: Vec<&InvocationMatcher> = Vec::new();
        for matcher in matchers {
            if !distinct.iter().any(|seen| seen.same_shape(matcher)) {
                distinct.push(matcher);
            }
        }

        let mut matched = Vec::new();
        let mut failures = Vec::new();
        for matcher in distinct {
            let hits: Vec<u64> = calls
                .iter()
                .filter(|call| matcher.matches(call))
                .map(|call| call.sequence)
                .collect();
            let count = hits.len();
            let ok = if matcher.is_not_called() {
                count == 0
            } else {
                request.count_ok(count)
            };
            if ok == request.inverse {
                failures.push(if request.inverse {
                    format!("{matcher} was called {count} {} but should not have been", plural(count))
                } else if matcher.is_not_called() {
                    format!("{matcher}: received {count} {}", if count == 1 { "call" } else { "calls" })
                } else {
                    format!(
                        "{matcher} was called {count} {}, expected {}",
                        plural(count),
                        request.bounds_text()
                    )
                });
            } else if !request.inverse {
                matched.extend(hits);
            }
        }

        if failures.is_empty() {
            VerifierOutcome::pass(matched)
        } else {
            VerifierOutcome::fail(failures.join("; "))
        }
    }
}

/// Greedy subsequence match: indices into `calls`, or the failure reason.
fn subsequence(matchers: &[InvocationMatcher], calls: &[Invocation]) -> Result<Vec<usize>, String> {
    let mut matched: Vec<usize> = Vec::with_capacity(matchers.len());
    let mut position = 0;
    for matcher in matchers {
        match calls[position..].iter().position(|call| matcher.matches(call)) {
            Some(offset) => {
                matched.push(position + offset);
                position += offset + 1;
            }
            None => {
                return Err(format!(
                    "calls are not in the verified order: no call matching {matcher} {}",
                    match matched.last() {
                        Some(&idx) => format!("after #{}", calls[idx].sequence),
                        None => "was made".to_string(),
                    }
                ));
            }
        }
    }
    Ok(matched)
}

/// Greedy subsequence match.
pub struct OrderedVerifier;

impl Verifier for OrderedVerifier {
    fn verify(
        &self,
        request: &VerificationRequest,
        matchers: &[InvocationMatcher],
        calls: &[Invocation],
    ) -> VerifierOutcome {
        let outcome = match subsequence(matchers, calls) {
            Ok(matched) => VerifierOutcome::pass(matched.iter().map(|&idx| calls[idx].sequence).collect()),
            Err(reason) => VerifierOutcome::fail(reason),
        };
        outcome.inverted(request.inverse, matchers)
    }
}

/// Ordered, with no unmatched call between the first and the last matched one.
///
/// Calls before or after the matched slice are ignored.
pub struct SequenceVerifier;

impl SequenceVerifier {
    /// First window of `calls` that the matchers accept position by position.
    fn aligned_window(matchers: &[InvocationMatcher], calls: &[Invocation]) -> Option<usize> {
        if matchers.len() > calls.len() {
            return None;
        }
        (0..=calls.len() - matchers.len()).find(|&start| {
            matchers
                .iter()
                .zip(&calls[start..])
                .all(|(matcher, call)| matcher.matches(call))
        })
    }
}

impl Verifier for SequenceVerifier {
    fn verify(
        &self,
        request: &VerificationRequest,
        matchers: &[InvocationMatcher],
        calls: &[Invocation],
    ) -> VerifierOutcome {
        let outcome = match Self::aligned_window(matchers, calls) {
            Some(start) => VerifierOutcome::pass(
                calls[start..start + matchers.len()]
                    .iter()
                    .map(|call| call.sequence)
                    .collect(),
            ),
            None => match subsequence(matchers, calls) {
                Err(reason) => VerifierOutcome::fail(reason),
                Ok(matched) => {
                    // A subsequence exists, so some call inside its slice is unmatched.
                    let first = matched.first().copied().unwrap_or(0);
                    let last = matched.last().copied().unwrap_or(0);
                    let intruder = (first..=last)
                        .find(|idx| !matched.contains(idx))
                        .map(|idx| format!("#{} {}", calls[idx].sequence, calls[idx]))
                        .unwrap_or_default();
                    VerifierOutcome::fail(format!(
                        "call {intruder} does not match the verified sequence between #{} and #{}",
                        calls[first].sequence, calls[last].sequence
                    ))
                }
            },
        };
        outcome.inverted(request.inverse, matchers)
    }
}

/// Every call is attributed to the first recorded matcher that accepts it.
pub struct AllCallsVerifier;

impl Verifier for AllCallsVerifier {
    fn verify(
        &self,
        request: &VerificationRequest,
        matchers: &[InvocationMatcher],
        calls: &[Invocation],
    ) -> VerifierOutcome {
        let mut used = vec![false; matchers.len()];
        let mut unaccounted = Vec::new();
        for call in calls {
            match matchers.iter().position(|matcher| matcher.matches(call)) {
                Some(idx) => used[idx] = true,
                None => unaccounted.push(format!("#{} {call}", call.sequence)),
            }
        }
        let unused: Vec<String> = matchers
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|(matcher, _)| matcher.to_string())
            .collect();

        let outcome = if !unaccounted.is_empty() {
            VerifierOutcome::fail(format!(
                "some calls were not matched: {}",
                unaccounted.join(", ")
            ))
        } else if !unused.is_empty() {
            VerifierOutcome::fail(format!("no call matched: {}", unused.join(", ")))
        } else {
            VerifierOutcome::pass(calls.iter().map(|call| call.sequence).collect())
        };
        outcome.inverted(request.inverse, matchers)
    }
}

// ==================== Reports ====================

/// One call as it appears in a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSummary {
    pub sequence: u64,
    pub call: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Invocation> for CallSummary {
    fn from(invocation: &Invocation) -> Self {
        Self {
            sequence: invocation.sequence,
            call: invocation.to_string(),
            timestamp: invocation.timestamp,
        }
    }
}

/// Outcome of a verification, with the expected matchers and the calls examined.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub order: CallOrder,
    pub inverse: bool,
    pub passed: bool,
    pub reason: String,
    pub expected: Vec<String>,
    pub actual: Vec<CallSummary>,
}

impl VerificationReport {
    pub fn new(
        request: &VerificationRequest,
        outcome: &VerifierOutcome,
        expected: &[InvocationMatcher],
        calls: &[Invocation],
    ) -> Self {
        Self {
            order: request.order,
            inverse: request.inverse,
            passed: outcome.passed,
            reason: outcome.reason.clone(),
            expected: expected.iter().map(ToString::to_string).collect(),
            actual: calls.iter().map(CallSummary::from).collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed {
            write!(f, "Verification passed")?;
        } else {
            write!(f, "Verification failed: {}", self.reason)?;
        }
        write!(f, "\n\nExpected:")?;
        for matcher in &self.expected {
            write!(f, "\n  {matcher}")?;
        }
        write!(f, "\n\nActual calls:")?;
        if self.actual.is_empty() {
            write!(f, "\n  (no calls)")?;
        }
        for call in &self.actual {
            write!(f, "\n  #{} {}", call.sequence, call.call)?;
        }
        Ok(())
    }
}

/// Targets referenced by a set of matchers, first appearance first.
pub fn referenced_targets(matchers: &[InvocationMatcher]) -> Vec<ObjectId> {
    let mut seen = HashSet::new();
    matchers
        .iter()
        .map(|matcher| matcher.target.id())
        .filter(|id| seen.insert(*id))
        .collect()
}
