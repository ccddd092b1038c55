//! Per-mock answer table and call log.
//!
//! Entries and log live behind one `RwLock`: appending a call and selecting
//! its answer happen under the write lock, verification and introspection
//! read a consistent snapshot. Answers themselves run after the lock is
//! released, so an answer may call back into the same mock.

use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;

use crate::answer::Answer;
use crate::invocation::Invocation;
use crate::matcher::InvocationMatcher;
use crate::value::{ObjectId, ObjectRef, Value};

/// How a mock behaves when no entry matches a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MockKind {
    /// Fails with `NoAnswerFound`.
    Strict,
    /// Returns a type-appropriate default; object returns get a relaxed child mock.
    Relaxed,
    /// Relaxed for `Unit` returns only.
    RelaxedUnit,
    /// Delegates to the original implementation.
    Spy,
}

impl MockKind {
    /// Kind given to child mocks created by chained stubbing.
    pub fn for_child(self) -> MockKind {
        match self {
            MockKind::Spy => MockKind::Strict,
            other => other,
        }
    }
}

impl fmt::Display for MockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MockKind::Strict => "strict",
            MockKind::Relaxed => "relaxed",
            MockKind::RelaxedUnit => "relaxed-unit",
            MockKind::Spy => "spy",
        };
        write!(f, "{name}")
    }
}

/// What [`Stub::clear`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearOptions {
    pub answers: bool,
    pub recorded_calls: bool,
    pub child_mocks: bool,
}

impl Default for ClearOptions {
    fn default() -> Self {
        Self {
            answers: true,
            recorded_calls: true,
            child_mocks: true,
        }
    }
}

impl ClearOptions {
    pub fn answers_only() -> Self {
        Self {
            answers: true,
            recorded_calls: false,
            child_mocks: false,
        }
    }

    pub fn recorded_calls_only() -> Self {
        Self {
            answers: false,
            recorded_calls: true,
            child_mocks: false,
        }
    }
}

#[derive(Debug, Clone)]
struct StubEntry {
    /// Unique within the stub; survives other entries being cleared.
    id: u64,
    matcher: InvocationMatcher,
    answer: Answer,
    hits: usize,
}

/// A logged call plus verification metadata.
#[derive(Debug, Clone)]
pub struct LoggedCall {
    pub invocation: Invocation,
    /// Accepted by a successful verification.
    pub verified: bool,
    /// Hidden from verification by `exclude_records`.
    pub excluded: bool,
}

/// Introspection view of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySnapshot {
    pub matcher: String,
    pub answer: &'static str,
    pub hits: usize,
}

#[derive(Debug, Default)]
struct StubState {
    entries: Vec<StubEntry>,
    next_entry: u64,
    log: Vec<LoggedCall>,
    children: Vec<ObjectId>,
}

/// Answer table, call log and child mocks of one mock instance.
#[derive(Debug)]
pub struct Stub {
    object: ObjectRef,
    kind: MockKind,
    parent: Option<ObjectId>,
    state: RwLock<StubState>,
}

impl Stub {
    pub fn new(object: ObjectRef, kind: MockKind, parent: Option<ObjectId>) -> Self {
        Self {
            object,
            kind,
            parent,
            state: RwLock::new(StubState::default()),
        }
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    pub fn kind(&self) -> MockKind {
        self.kind
    }

    pub fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Register an entry. Later entries take precedence over earlier ones.
    pub fn add_answer(&self, matcher: InvocationMatcher, answer: Answer) {
        tracing::debug!(
            target_object = %self.object,
            matcher = %matcher,
            answer = answer.kind(),
            "registered answer"
        );
        let mut state = self.state.write();
        let id = state.next_entry;
        state.next_entry += 1;
        state.entries.push(StubEntry {
            id,
            matcher,
            answer,
            hits: 0,
        });
    }

    /// Log the call (when `log` is set) and select the answer of the most
    /// recently registered matching entry. Captures happen for that entry only.
    ///
    /// Matchers run without the stub lock held, so predicates may call back
    /// into the same mock.
    pub fn resolve(&self, invocation: &Invocation, log: bool) -> Option<Answer> {
        if log {
            self.state.write().log.push(LoggedCall {
                invocation: invocation.clone(),
                verified: false,
                excluded: false,
            });
        }
        loop {
            let candidates: Vec<(u64, InvocationMatcher)> = self
                .state
                .read()
                .entries
                .iter()
                .rev()
                .map(|entry| (entry.id, entry.matcher.clone()))
                .collect();
            let (id, matcher) = candidates
                .into_iter()
                .find(|(_, matcher)| matcher.matches(invocation))?;

            let answer = {
                let mut state = self.state.write();
                let Some(entry) = state.entries.iter_mut().find(|entry| entry.id == id) else {
                    // Cleared while matching; look again.
                    continue;
                };
                let answer = entry.answer.select(entry.hits);
                entry.hits += 1;
                answer
            };
            matcher.capture(invocation);
            return Some(answer);
        }
    }

    /// Object returned by the most recent entry equal to `matcher` that answers
    /// with a constant object (a chain link's child mock).
    pub fn find_chain_child(&self, matcher: &InvocationMatcher) -> Option<ObjectRef> {
        self.state
            .read()
            .entries
            .iter()
            .rev()
            .find_map(|entry| match &entry.answer {
                Answer::Constant(Value::Object(child)) if entry.matcher.same_shape(matcher) => {
                    Some(child.clone())
                }
                _ => None,
            })
    }

    pub fn adopt_child(&self, child: ObjectId) {
        let mut state = self.state.write();
        if !state.children.contains(&child) {
            state.children.push(child);
        }
    }

    pub fn children(&self) -> Vec<ObjectId> {
        self.state.read().children.clone()
    }

    pub fn entries(&self) -> Vec<EntrySnapshot> {
        self.state
            .read()
            .entries
            .iter()
            .map(|entry| EntrySnapshot {
                matcher: entry.matcher.to_string(),
                answer: entry.answer.kind(),
                hits: entry.hits,
            })
            .collect()
    }

    /// Rendered matchers in registration order.
    pub fn registered_matchers(&self) -> Vec<String> {
        self.state
            .read()
            .entries
            .iter()
            .map(|entry| entry.matcher.to_string())
            .collect()
    }

    /// Entries no call has matched yet.
    pub fn unused_entries(&self) -> Vec<String> {
        self.state
            .read()
            .entries
            .iter()
            .filter(|entry| entry.hits == 0)
            .map(|entry| entry.matcher.to_string())
            .collect()
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<LoggedCall> {
        self.state.read().log.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.read().log.len()
    }

    pub fn mark_verified(&self, sequences: &[u64]) {
        let mut state = self.state.write();
        for call in state.log.iter_mut() {
            if sequences.contains(&call.invocation.sequence) {
                call.verified = true;
            }
        }
    }

    /// Hide calls accepted by `matcher` from verification. Returns how many were hidden.
    pub fn exclude(&self, matcher: &InvocationMatcher) -> usize {
        let visible: Vec<Invocation> = self
            .state
            .read()
            .log
            .iter()
            .filter(|call| !call.excluded)
            .map(|call| call.invocation.clone())
            .collect();
        let accepted: Vec<u64> = visible
            .iter()
            .filter(|invocation| matcher.matches(invocation))
            .map(|invocation| invocation.sequence)
            .collect();

        let mut state = self.state.write();
        let mut hidden = 0;
        for call in state.log.iter_mut() {
            if !call.excluded && accepted.contains(&call.invocation.sequence) {
                call.excluded = true;
                hidden += 1;
            }
        }
        hidden
    }

    /// Calls that are neither verified nor excluded.
    pub fn unverified_calls(&self) -> Vec<Invocation> {
        self.state
            .read()
            .log
            .iter()
            .filter(|call| !call.verified && !call.excluded)
            .map(|call| call.invocation.clone())
            .collect()
    }

    /// Reset parts of the stub. Returns the child mocks it no longer tracks.
    pub fn clear(&self, options: ClearOptions) -> Vec<ObjectId> {
        let mut state = self.state.write();
        if options.answers {
            state.entries.clear();
        }
        if options.recorded_calls {
            state.log.clear();
        }
        if options.child_mocks {
            std::mem::take(&mut state.children)
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{CaptureSlot, Matcher};
    use crate::value::{MethodDescriptor, ValueType};

    fn add() -> MethodDescriptor {
        MethodDescriptor::new("add", vec![ValueType::Int, ValueType::Int], ValueType::Int)
    }

    fn call(stub: &Stub, a: i32, b: i32) -> Invocation {
        Invocation::new(stub.object().clone(), add(), vec![Value::Int(a), Value::Int(b)], None)
    }

    #[test]
    fn test_most_recent_entry_wins() {
        let stub = Stub::new(ObjectRef::new("Calculator"), MockKind::Strict, None);
        let any = InvocationMatcher::new(stub.object().clone(), add(), vec![Matcher::Any, Matcher::Any]);
        stub.add_answer(any.clone(), Answer::constant(Value::Int(1)));
        stub.add_answer(any, Answer::constant(Value::Int(2)));

        let answer = stub.resolve(&call(&stub, 1, 1), true).expect("matched");
        assert!(matches!(answer, Answer::Constant(Value::Int(2))));
        let entries = stub.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].hits, 0);
        assert_eq!(entries[1].hits, 1);
        assert_eq!(stub.unused_entries().len(), 1);
        assert_eq!(stub.call_count(), 1);
    }

    #[test]
    fn test_unmatched_call_is_still_logged() {
        let stub = Stub::new(ObjectRef::new("Calculator"), MockKind::Strict, None);
        assert!(stub.resolve(&call(&stub, 1, 2), true).is_none());
        assert!(stub.resolve(&call(&stub, 1, 2), false).is_none());
        assert_eq!(stub.call_count(), 1);
    }

    #[test]
    fn test_capture_only_for_selected_entry() {
        let stub = Stub::new(ObjectRef::new("Calculator"), MockKind::Strict, None);
        let older = CaptureSlot::new();
        let newer = CaptureSlot::new();
        stub.add_answer(
            InvocationMatcher::new(stub.object().clone(), add(), vec![Matcher::capture(&older), Matcher::Any]),
            Answer::constant(Value::Int(0)),
        );
        stub.add_answer(
            InvocationMatcher::new(stub.object().clone(), add(), vec![Matcher::capture(&newer), Matcher::Any]),
            Answer::constant(Value::Int(0)),
        );
        stub.resolve(&call(&stub, 42, 0), true);
        assert_eq!(newer.captured(), Some(Value::Int(42)));
        assert!(!older.is_captured());
    }

    #[test]
    fn test_exclude_verify_and_clear() {
        let stub = Stub::new(ObjectRef::new("Calculator"), MockKind::Relaxed, None);
        let first = call(&stub, 1, 1);
        let second = call(&stub, 2, 2);
        stub.resolve(&first, true);
        stub.resolve(&second, true);

        let hidden = stub.exclude(&InvocationMatcher::exact(&first));
        assert_eq!(hidden, 1);
        assert_eq!(stub.unverified_calls().len(), 1);
        stub.mark_verified(&[second.sequence]);
        assert!(stub.unverified_calls().is_empty());

        stub.adopt_child(ObjectId(999_999));
        let released = stub.clear(ClearOptions::recorded_calls_only());
        assert!(released.is_empty());
        assert_eq!(stub.call_count(), 0);
        assert_eq!(stub.clear(ClearOptions::default()), vec![ObjectId(999_999)]);
    }

    #[test]
    fn test_predicates_may_reenter_the_stub() {
        let stub = std::sync::Arc::new(Stub::new(ObjectRef::new("Calculator"), MockKind::Strict, None));
        let handle = std::sync::Arc::downgrade(&stub);
        let after_first_call = Matcher::predicate("after first call", move |_| {
            handle.upgrade().is_some_and(|stub| stub.call_count() > 0)
        });
        let matcher = InvocationMatcher::new(
            stub.object().clone(),
            add(),
            vec![after_first_call, Matcher::Any],
        );
        stub.add_answer(matcher.clone(), Answer::constant(Value::Int(1)));

        assert!(stub.resolve(&call(&stub, 1, 2), true).is_some());
        assert_eq!(stub.entries()[0].hits, 1);
        assert_eq!(stub.exclude(&matcher), 1);
        assert!(stub.unverified_calls().is_empty());
    }
}
