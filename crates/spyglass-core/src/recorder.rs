//! Recording session state machine.
//!
//! A [`RecordingContext`] is the session handle that DSL call sites and proxy
//! types talk to. It owns the state of the current stubbing or verification
//! statement and routes intercepted calls either into the active recording
//! round or to the target's stub.
//!
//! ```text
//! Answering --begin_stubbing--> Stubbing --run_recorded_block--> StubbingAwaitingAnswer
//!     ^                                                                  |
//!     +-------------------------- attach_answer -------------------------+
//!     |
//!     +--begin_verification--> Verifying --run_recorded_block, finalize_verification--> Answering
//! ```
//!
//! Every failure leaving the context resets it to `Answering` first.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::answer::{Answer, OriginalCall};
use crate::config::EngineConfig;
use crate::detector::{MatcherDetector, Resolution, ResolvedCall};
use crate::errors::{MockError, MockResult};
use crate::hinter::{AutoHinter, HintReview, HintTable};
use crate::invocation::{current_sequence, CallFrame, Invocation};
use crate::matcher::{InvocationMatcher, Matcher};
use crate::registry::MockRegistry;
use crate::round::{RecordingRound, RoundBuilder};
use crate::signature::SignatureGenerator;
use crate::stub::{ClearOptions, MockKind, Stub};
use crate::value::{MethodDescriptor, ObjectId, ObjectRef, Value, ValueType};
use crate::verify::{
    referenced_targets, verifier_for, CallOrder, VerificationReport, VerificationRequest,
    VerifierOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecorderState {
    Answering,
    Stubbing,
    StubbingAwaitingAnswer,
    Verifying,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

struct Session {
    state: RecorderState,
    request: Option<VerificationRequest>,
    /// Set once the block of the current statement has been recorded.
    resolution: Option<Resolution>,
    /// `was_not_called` sentinels of the last recorded round.
    not_called: Vec<ObjectRef>,
    round: Option<RoundBuilder>,
    generator: SignatureGenerator,
}

impl Session {
    fn clear(&mut self) {
        self.state = RecorderState::Answering;
        self.request = None;
        self.resolution = None;
        self.not_called.clear();
        self.round = None;
    }
}

/// Blocks only matter for their calls; drop the result, keep the error.
fn erase<R, E: Into<anyhow::Error>>(result: Result<R, E>) -> anyhow::Result<Value> {
    result.map(|_| Value::Unit).map_err(Into::into)
}

/// Pops its frame from the call-context stack when dropped.
struct FrameGuard<'a> {
    frames: &'a RefCell<Vec<CallFrame>>,
}

impl<'a> FrameGuard<'a> {
    fn push(frames: &'a RefCell<Vec<CallFrame>>, frame: CallFrame) -> Self {
        frames.borrow_mut().push(frame);
        Self { frames }
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.frames.borrow_mut().pop();
    }
}

/// Per-thread recording session over a shared [`MockRegistry`].
pub struct RecordingContext {
    id: Uuid,
    registry: Arc<MockRegistry>,
    session: RefCell<Session>,
    /// Calls whose answers are currently running, innermost last.
    frames: RefCell<Vec<CallFrame>>,
}

impl RecordingContext {
    pub fn new(registry: Arc<MockRegistry>) -> Self {
        let generator = SignatureGenerator::new(registry.config().signature_seed);
        let id = Uuid::new_v4();
        tracing::debug!(session = %id, "created recording context");
        Self {
            id,
            registry,
            session: RefCell::new(Session {
                state: RecorderState::Answering,
                request: None,
                resolution: None,
                not_called: Vec::new(),
                round: None,
                generator,
            }),
            frames: RefCell::new(Vec::new()),
        }
    }

    /// Context over a fresh, private registry.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::new(MockRegistry::shared(config))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn registry(&self) -> &Arc<MockRegistry> {
        &self.registry
    }

    pub fn state(&self) -> RecorderState {
        self.session.borrow().state
    }

    /// Sequence number the next call will receive. Use with
    /// [`VerificationRequest::since`] to verify only later calls.
    pub fn mark(&self) -> u64 {
        current_sequence()
    }

    // ==================== Mocks ====================

    pub fn mock(&self, class: &str) -> ObjectRef {
        self.registry.create(class, MockKind::Strict)
    }

    pub fn relaxed_mock(&self, class: &str) -> ObjectRef {
        self.registry.create(class, MockKind::Relaxed)
    }

    pub fn relaxed_unit_mock(&self, class: &str) -> ObjectRef {
        self.registry.create(class, MockKind::RelaxedUnit)
    }

    pub fn spy(&self, class: &str) -> ObjectRef {
        self.registry.create(class, MockKind::Spy)
    }

    pub fn release(&self, object: &ObjectRef) -> MockResult<()> {
        self.registry.release(object.id())
    }

    pub fn stub(&self, object: &ObjectRef) -> MockResult<Arc<Stub>> {
        self.registry.get(object.id())
    }

    pub fn clear(&self, object: &ObjectRef, options: ClearOptions) -> MockResult<()> {
        let stub = self.registry.get(object.id())?;
        for child in stub.clear(options) {
            self.registry.release_quietly(child);
        }
        Ok(())
    }

    /// Registered matchers of `object` that no call has matched.
    pub fn unnecessary_stubs(&self, object: &ObjectRef) -> MockResult<Vec<String>> {
        Ok(self.registry.get(object.id())?.unused_entries())
    }

    // ==================== State machine ====================

    /// Reset the session to `Answering`, discarding any statement in progress.
    pub fn reset(&self) {
        self.session.borrow_mut().clear();
    }

    fn fail(&self, err: MockError) -> MockError {
        self.reset();
        tracing::debug!(session = %self.id, error = %err, "recording session reset");
        err
    }

    fn expect_state(&self, operation: &str, allowed: &[RecorderState]) -> MockResult<RecorderState> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(state)
        } else {
            Err(self.fail(MockError::bad_sequence(operation, state)))
        }
    }

    fn set_state(&self, state: RecorderState) {
        let mut session = self.session.borrow_mut();
        tracing::debug!(session = %self.id, from = %session.state, to = %state, "state transition");
        session.state = state;
    }

    pub fn begin_stubbing(&self) -> MockResult<()> {
        self.expect_state("begin_stubbing", &[RecorderState::Answering])?;
        self.set_state(RecorderState::Stubbing);
        Ok(())
    }

    pub fn begin_verification(&self, request: VerificationRequest) -> MockResult<()> {
        self.expect_state("begin_verification", &[RecorderState::Answering])?;
        self.session.borrow_mut().request = Some(request);
        self.set_state(RecorderState::Verifying);
        Ok(())
    }

    /// Run the block of the current statement for as many rounds as needed
    /// and resolve its matchers.
    pub fn run_recorded_block(
        &self,
        block: &mut dyn FnMut() -> anyhow::Result<Value>,
    ) -> MockResult<()> {
        let state = self.expect_state(
            "run_recorded_block",
            &[RecorderState::Stubbing, RecorderState::Verifying],
        )?;
        if self.session.borrow().resolution.is_some() {
            return Err(self.fail(MockError::bad_sequence_because(
                "run_recorded_block",
                state,
                "the block of this statement was already recorded",
            )));
        }

        let resolution = self
            .record_block(block, state)
            .map_err(|err| self.fail(err))?;
        let mut session = self.session.borrow_mut();
        session.resolution = Some(resolution);
        if state == RecorderState::Stubbing {
            tracing::debug!(session = %self.id, from = %state, to = %RecorderState::StubbingAwaitingAnswer, "state transition");
            session.state = RecorderState::StubbingAwaitingAnswer;
        }
        Ok(())
    }

    fn record_block(
        &self,
        block: &mut dyn FnMut() -> anyhow::Result<Value>,
        state: RecorderState,
    ) -> MockResult<Resolution> {
        let rounds = self.record_rounds(block, state)?;
        let resolution = MatcherDetector::resolve(&rounds, state)?;
        let has_sentinels = !self.session.borrow().not_called.is_empty();
        if resolution.is_empty() && !(has_sentinels && state == RecorderState::Verifying) {
            return Err(MockError::bad_sequence_because(
                "run_recorded_block",
                state,
                "no mock calls recorded inside the block",
            ));
        }
        tracing::debug!(
            session = %self.id,
            rounds = rounds.len(),
            calls = resolution.calls.len(),
            "recorded block"
        );
        Ok(resolution)
    }

    fn record_rounds(
        &self,
        block: &mut dyn FnMut() -> anyhow::Result<Value>,
        state: RecorderState,
    ) -> MockResult<Vec<RecordingRound>> {
        let config = self.registry.config();
        let mut hinter = AutoHinter::new();
        let mut rounds: Vec<RecordingRound> = Vec::new();
        let mut planned = config.min_rounds;

        while rounds.len() < planned {
            let index = rounds.len();
            hinter.start_round();
            let round = loop {
                self.start_round(index, hinter.hints().clone());
                let outcome = block();
                let Some(round) = self.session.borrow_mut().round.take().map(RoundBuilder::finish)
                else {
                    // A nested statement failed and reset the session mid-block.
                    return Err(match outcome {
                        Err(err) => MockError::from_block(err),
                        Ok(_) => MockError::bad_sequence_because(
                            "run_recorded_block",
                            state,
                            "the session was reset while the block was running",
                        ),
                    });
                };
                match hinter.review(outcome, round)? {
                    HintReview::Complete(round) => break round,
                    HintReview::Retry => continue,
                }
            };
            if index == 0 {
                planned = planned
                    .max(round.distinct_call_count())
                    .min(config.max_rounds);
            }
            rounds.push(round);
        }
        Ok(rounds)
    }

    fn start_round(&self, index: usize, hints: HintTable) {
        let mut session = self.session.borrow_mut();
        session.generator.start_round(index);
        session.not_called.clear();
        session.round = Some(RoundBuilder::start(index, hints));
    }

    /// Attach the answer of the current stubbing statement.
    pub fn attach_answer(&self, answer: Answer) -> MockResult<()> {
        self.expect_state("attach_answer", &[RecorderState::StubbingAwaitingAnswer])?;
        let resolution = self.session.borrow_mut().resolution.take();
        let Some(resolution) = resolution else {
            return Err(self.fail(MockError::bad_sequence(
                "attach_answer",
                RecorderState::StubbingAwaitingAnswer,
            )));
        };
        self.install(resolution, answer).map_err(|err| self.fail(err))?;
        self.set_state(RecorderState::Answering);
        Ok(())
    }

    /// Top-level calls get `answer`; each chain link gets a child mock, reused
    /// when an equal link was stubbed before.
    fn install(&self, resolution: Resolution, answer: Answer) -> MockResult<()> {
        let mut calls = resolution.calls;
        for idx in 0..calls.len() {
            let call = calls[idx].clone();
            let stub = self.registry.get(call.matcher.target.id())?;
            if !call.intermediate {
                stub.add_answer(call.matcher, answer.clone());
                continue;
            }
            let Some(recorded) = call.returned.as_object() else {
                continue;
            };
            let child = match stub.find_chain_child(&call.matcher) {
                Some(child) => child,
                None => {
                    let child = self.registry.create_child(&stub, recorded.class());
                    stub.add_answer(call.matcher, Answer::constant(Value::Object(child.clone())));
                    child
                }
            };
            for later in calls[idx + 1..].iter_mut() {
                later.matcher.substitute_object(recorded.id(), &child);
            }
        }
        Ok(())
    }

    /// Evaluate the current verification statement.
    ///
    /// Returns the passing report, or `VerificationFailed` carrying the failing one.
    pub fn finalize_verification(&self) -> MockResult<VerificationReport> {
        let (request, resolution, not_called) = self.take_verification("finalize_verification")?;
        let report = self.evaluate(&request, resolution, not_called)?;
        tracing::debug!(
            session = %self.id,
            order = %report.order,
            passed = report.passed,
            calls = report.actual.len(),
            "verification finished"
        );
        if report.passed {
            Ok(report)
        } else {
            Err(MockError::VerificationFailed {
                report: Box::new(report),
            })
        }
    }

    fn take_verification(
        &self,
        operation: &str,
    ) -> MockResult<(VerificationRequest, Resolution, Vec<ObjectRef>)> {
        let mut session = self.session.borrow_mut();
        let state = session.state;
        let resolution = session.resolution.take();
        match (state, resolution) {
            (RecorderState::Verifying, Some(resolution)) => {
                let request = session.request.take().unwrap_or_default();
                let not_called = std::mem::take(&mut session.not_called);
                session.clear();
                Ok((request, resolution, not_called))
            }
            _ => {
                drop(session);
                Err(self.fail(MockError::bad_sequence(operation, state)))
            }
        }
    }

    /// Point chained matchers at the child mocks that real calls returned.
    /// Returns recording objects no existing child stands for.
    fn link_existing_children(&self, calls: &mut [ResolvedCall]) -> HashSet<ObjectId> {
        let mut detached = HashSet::new();
        for idx in 0..calls.len() {
            if !calls[idx].intermediate {
                continue;
            }
            let Some(recorded) = calls[idx].returned.as_object().cloned() else {
                continue;
            };
            let child = self
                .registry
                .get(calls[idx].matcher.target.id())
                .ok()
                .and_then(|stub| stub.find_chain_child(&calls[idx].matcher));
            match child {
                Some(child) => {
                    for later in calls[idx + 1..].iter_mut() {
                        later.matcher.substitute_object(recorded.id(), &child);
                    }
                }
                None => {
                    detached.insert(recorded.id());
                }
            }
        }
        detached
    }

    fn evaluate(
        &self,
        request: &VerificationRequest,
        resolution: Resolution,
        not_called: Vec<ObjectRef>,
    ) -> MockResult<VerificationReport> {
        let mut calls = resolution.calls;
        let detached = self.link_existing_children(&mut calls);

        let sentinels: Vec<InvocationMatcher> =
            not_called.into_iter().map(InvocationMatcher::not_called).collect();
        let top_level: Vec<InvocationMatcher> = calls
            .iter()
            .filter(|call| !call.intermediate)
            .map(|call| call.matcher.clone())
            .collect();
        let all: Vec<InvocationMatcher> = calls.into_iter().map(|call| call.matcher).collect();

        let expected: Vec<InvocationMatcher> = match request.order {
            CallOrder::Unordered | CallOrder::Ordered => top_level,
            CallOrder::Sequence | CallOrder::All => all,
        };
        let referenced: Vec<InvocationMatcher> =
            expected.iter().chain(&sentinels).cloned().collect();
        let stubs = referenced_targets(&referenced)
            .into_iter()
            .filter(|id| !detached.contains(id))
            .map(|id| self.registry.get(id))
            .collect::<MockResult<Vec<_>>>()?;

        let poll = self.registry.config().verify_poll_interval;
        let deadline = request.timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let log = Self::merged_log(&stubs, request);
            let outcome = self.run_verifier(request, &expected, &sentinels, &log);
            let timed_out = deadline.map_or(true, |deadline| Instant::now() >= deadline);
            if outcome.passed || timed_out {
                if outcome.passed {
                    for stub in &stubs {
                        stub.mark_verified(&outcome.matched);
                    }
                }
                let shown: Vec<InvocationMatcher> =
                    expected.iter().chain(&sentinels).cloned().collect();
                return Ok(VerificationReport::new(request, &outcome, &shown, &log));
            }
            std::thread::sleep(poll);
        }
    }

    fn merged_log(stubs: &[Arc<Stub>], request: &VerificationRequest) -> Vec<Invocation> {
        let mut log: Vec<Invocation> = stubs
            .iter()
            .flat_map(|stub| stub.calls())
            .filter(|call| !call.excluded && request.window.contains(call.invocation.sequence))
            .map(|call| call.invocation)
            .collect();
        log.sort_by_key(|invocation| invocation.sequence);
        log
    }

    fn run_verifier(
        &self,
        request: &VerificationRequest,
        expected: &[InvocationMatcher],
        sentinels: &[InvocationMatcher],
        log: &[Invocation],
    ) -> VerifierOutcome {
        if request.order == CallOrder::Unordered {
            let matchers: Vec<InvocationMatcher> =
                expected.iter().chain(sentinels).cloned().collect();
            return verifier_for(request.order).verify(request, &matchers, log);
        }
        let outcome = verifier_for(request.order).verify(request, expected, log);
        if !outcome.passed || request.inverse {
            return outcome;
        }
        for sentinel in sentinels {
            let received = log.iter().filter(|call| sentinel.matches(call)).count();
            if received > 0 {
                return VerifierOutcome {
                    passed: false,
                    reason: format!("{sentinel}: received {received} {}", if received == 1 { "call" } else { "calls" }),
                    matched: Vec::new(),
                };
            }
        }
        outcome
    }

    // ==================== Side channel ====================

    /// Register a matcher for the slot the returned signature value will be passed to.
    pub fn register_matcher(&self, matcher: Matcher, ty: &ValueType) -> MockResult<Value> {
        let (signature, state) = {
            let mut session = self.session.borrow_mut();
            let session = &mut *session;
            let signature = session
                .round
                .as_mut()
                .map(|round| round.register_matcher(&mut session.generator, matcher, ty));
            (signature, session.state)
        };
        signature.ok_or_else(|| {
            self.fail(MockError::bad_sequence_because(
                "register_matcher",
                state,
                "matchers can only be used inside a recorded block",
            ))
        })
    }

    /// Record a `wasNot(Called)` sentinel for `object` in the running block.
    pub fn was_not_called(&self, object: &ObjectRef) -> MockResult<()> {
        let (recorded, state) = {
            let mut session = self.session.borrow_mut();
            let recording = session.round.is_some() && session.state == RecorderState::Verifying;
            if recording {
                session.not_called.push(object.clone());
            }
            (recording, session.state)
        };
        if recorded {
            Ok(())
        } else {
            Err(self.fail(MockError::bad_sequence_because(
                "was_not_called",
                state,
                "only allowed inside a verification block",
            )))
        }
    }

    // ==================== Interception ====================

    /// Entry point for proxies: record the call inside a running block,
    /// otherwise answer it from the target's stub.
    pub fn on_intercepted_call(
        &self,
        target: &ObjectRef,
        method: &MethodDescriptor,
        args: Vec<Value>,
        original: Option<&OriginalCall<'_>>,
    ) -> MockResult<Value> {
        {
            let mut session = self.session.borrow_mut();
            let session = &mut *session;
            if let Some(round) = session.round.as_mut() {
                let caller = self.frames.borrow().last().cloned();
                return Ok(round.capture_call(&mut session.generator, target, method, args, caller));
            }
        }
        self.answer_call(target, method, args, original)
    }

    fn answer_call(
        &self,
        target: &ObjectRef,
        method: &MethodDescriptor,
        args: Vec<Value>,
        original: Option<&OriginalCall<'_>>,
    ) -> MockResult<Value> {
        let stub = self.registry.get(target.id())?;
        let caller = self.frames.borrow().last().cloned();
        let invocation = Invocation::new(target.clone(), method.clone(), args, caller);
        let log = self.registry.config().record_self_calls || !invocation.is_self_call();
        let answer = stub.resolve(&invocation, log);
        let matched = answer.is_some();

        let _frame = FrameGuard::push(&self.frames, invocation.frame());
        let result = match answer {
            Some(answer) => answer.respond(&invocation, original),
            None => self.registry.fallback(&stub, &invocation, original),
        };
        tracing::debug!(
            session = %self.id,
            call = %invocation,
            sequence = invocation.sequence,
            matched,
            ok = result.is_ok(),
            "answered call"
        );
        result
    }

    // ==================== Convenience ====================

    /// Record a stubbing statement; finish it with one of the builder's answers.
    pub fn every<R, E>(
        &self,
        mut block: impl FnMut() -> Result<R, E>,
    ) -> MockResult<StubbingBuilder<'_>>
    where
        E: Into<anyhow::Error>,
    {
        self.begin_stubbing()?;
        self.run_recorded_block(&mut || erase(block()))?;
        Ok(StubbingBuilder { ctx: self })
    }

    /// Record and evaluate a verification statement.
    pub fn verify<R, E>(
        &self,
        request: VerificationRequest,
        mut block: impl FnMut() -> Result<R, E>,
    ) -> MockResult<VerificationReport>
    where
        E: Into<anyhow::Error>,
    {
        self.begin_verification(request)?;
        self.run_recorded_block(&mut || erase(block()))?;
        self.finalize_verification()
    }

    /// Hide the calls matched by the block from later verification.
    /// Returns how many logged calls were hidden.
    pub fn exclude_records<R, E>(&self, mut block: impl FnMut() -> Result<R, E>) -> MockResult<usize>
    where
        E: Into<anyhow::Error>,
    {
        self.begin_verification(VerificationRequest::default())?;
        self.run_recorded_block(&mut || erase(block()))?;
        let (_, resolution, _) = self.take_verification("exclude_records")?;

        let mut calls = resolution.calls;
        let detached = self.link_existing_children(&mut calls);
        let mut hidden = 0;
        for call in calls {
            if detached.contains(&call.matcher.target.id()) {
                continue;
            }
            hidden += self.registry.get(call.matcher.target.id())?.exclude(&call.matcher);
        }
        tracing::debug!(session = %self.id, hidden, "excluded records");
        Ok(hidden)
    }

    /// Fail unless every logged call of `objects` was accepted by a verification
    /// (or excluded).
    pub fn confirm_verified(&self, objects: &[&ObjectRef]) -> MockResult<()> {
        let mut unverified = Vec::new();
        for object in objects {
            unverified.extend(self.registry.get(object.id())?.unverified_calls());
        }
        if unverified.is_empty() {
            return Ok(());
        }
        unverified.sort_by_key(|invocation| invocation.sequence);
        let request = VerificationRequest::all();
        let outcome = VerifierOutcome {
            passed: false,
            reason: format!("{} calls were not verified", unverified.len()),
            matched: Vec::new(),
        };
        Err(MockError::VerificationFailed {
            report: Box::new(VerificationReport::new(&request, &outcome, &[], &unverified)),
        })
    }
}

impl fmt::Debug for RecordingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingContext")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("mocks", &self.registry.len())
            .finish()
    }
}

/// Pending stubbing statement. Dropping it without an answer discards the statement.
#[must_use = "a stubbing statement needs an answer"]
pub struct StubbingBuilder<'ctx> {
    ctx: &'ctx RecordingContext,
}

impl StubbingBuilder<'_> {
    pub fn answer(self, answer: Answer) -> MockResult<()> {
        self.ctx.attach_answer(answer)
    }

    pub fn returns(self, value: impl Into<Value>) -> MockResult<()> {
        self.answer(Answer::constant(value.into()))
    }

    /// One value per call; the last repeats.
    pub fn returns_many<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> MockResult<()> {
        self.answer(Answer::sequence(
            values.into_iter().map(|value| Answer::constant(value.into())),
        ))
    }

    pub fn throws(self, error: impl Into<anyhow::Error>) -> MockResult<()> {
        self.answer(Answer::throw(error))
    }

    pub fn answers(
        self,
        callback: impl Fn(&Invocation) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> MockResult<()> {
        self.answer(Answer::computed(callback))
    }

    pub fn answers_async(
        self,
        callback: impl Fn(&Invocation) -> futures::future::BoxFuture<'static, anyhow::Result<Value>>
            + Send
            + Sync
            + 'static,
    ) -> MockResult<()> {
        self.answer(Answer::computed_async(callback))
    }

    pub fn calls_original(self) -> MockResult<()> {
        self.answer(Answer::CallOriginal)
    }
}

impl Drop for StubbingBuilder<'_> {
    fn drop(&mut self) {
        if self.ctx.state() == RecorderState::StubbingAwaitingAnswer {
            tracing::warn!(session = %self.ctx.id, "stubbing statement dropped without an answer");
            self.ctx.reset();
        }
    }
}
