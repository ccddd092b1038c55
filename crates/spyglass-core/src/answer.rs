//! Answers: what a stubbed call does when it is matched.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::errors::{MockError, MockResult};
use crate::invocation::Invocation;
use crate::value::Value;

/// The real implementation behind a spied (or partially mocked) method.
///
/// Borrowed for the duration of one call, so it may capture the calling
/// thread's context.
pub type OriginalCall<'a> = dyn Fn(&[Value]) -> anyhow::Result<Value> + 'a;

pub type AnswerFn = Arc<dyn Fn(&Invocation) -> anyhow::Result<Value> + Send + Sync>;

pub type AsyncAnswerFn =
    Arc<dyn Fn(&Invocation) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

#[derive(Clone)]
pub enum Answer {
    Constant(Value),
    Throw(Arc<anyhow::Error>),
    CallOriginal,
    /// One answer per call; the last one repeats.
    Sequence(Vec<Answer>),
    Computed(AnswerFn),
    /// Driven to completion on the calling thread.
    ComputedAsync(AsyncAnswerFn),
}

impl Answer {
    pub fn constant(value: Value) -> Self {
        Answer::Constant(value)
    }

    pub fn throw(error: impl Into<anyhow::Error>) -> Self {
        Answer::Throw(Arc::new(error.into()))
    }

    /// Build a sequence. Nested sequences are flattened.
    pub fn sequence(answers: impl IntoIterator<Item = Answer>) -> Self {
        let mut flat = Vec::new();
        for answer in answers {
            match answer {
                Answer::Sequence(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        Answer::Sequence(flat)
    }

    pub fn computed(
        callback: impl Fn(&Invocation) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Answer::Computed(Arc::new(callback))
    }

    pub fn computed_async(
        callback: impl Fn(&Invocation) -> BoxFuture<'static, anyhow::Result<Value>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Answer::ComputedAsync(Arc::new(callback))
    }

    /// Short name used in stub introspection.
    pub fn kind(&self) -> &'static str {
        match self {
            Answer::Constant(_) => "constant",
            Answer::Throw(_) => "throw",
            Answer::CallOriginal => "call-original",
            Answer::Sequence(_) => "sequence",
            Answer::Computed(_) => "computed",
            Answer::ComputedAsync(_) => "computed-async",
        }
    }

    /// The answer to use for the `hit`-th matched call (0-based).
    pub(crate) fn select(&self, hit: usize) -> Answer {
        match self {
            Answer::Sequence(answers) => match answers.get(hit).or_else(|| answers.last()) {
                Some(answer) => answer.clone(),
                None => Answer::Constant(Value::Unit),
            },
            other => other.clone(),
        }
    }

    /// Produce the call's result. Never called with the stub lock held.
    pub fn respond(
        &self,
        invocation: &Invocation,
        original: Option<&OriginalCall<'_>>,
    ) -> MockResult<Value> {
        match self {
            Answer::Constant(value) => Ok(value.clone()),
            Answer::Throw(error) => Err(MockError::Thrown(Arc::clone(error))),
            Answer::CallOriginal => match original {
                Some(original) => original(&invocation.args).map_err(MockError::from_answer),
                None => Err(MockError::NoOriginal {
                    call: invocation.to_string(),
                }),
            },
            Answer::Sequence(_) => self.select(0).respond(invocation, original),
            Answer::Computed(callback) => callback(invocation).map_err(MockError::from_answer),
            Answer::ComputedAsync(callback) => {
                futures::executor::block_on(callback(invocation)).map_err(MockError::from_answer)
            }
        }
    }
}

impl fmt::Debug for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Constant(value) => write!(f, "Constant({value})"),
            Answer::Throw(error) => write!(f, "Throw({error})"),
            Answer::Sequence(answers) => f.debug_list().entries(answers).finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}
