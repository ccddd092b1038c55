//! Engine error types.
//!
//! Every failure the engine surfaces is a [`MockError`]. User-supplied closures
//! (recorded blocks, computed answers, original implementations) return
//! `anyhow::Result`; errors coming back from them are downcast so typed
//! variants survive the round trip.

use std::sync::Arc;

use crate::recorder::RecorderState;
use crate::value::{ObjectId, Value, ValueType};
use crate::verify::VerificationReport;

pub type MockResult<T> = Result<T, MockError>;

/// Structured engine errors.
#[derive(Debug, Clone)]
pub enum MockError {
    /// A DSL operation was invoked in a state that forbids it.
    /// The session is always reset to `Answering` before this escapes.
    BadRecordingSequence {
        /// Operation that was attempted (e.g. "attach_answer")
        operation: String,
        /// State the session was in
        state: RecorderState,
        /// Extra detail when the state alone does not explain the failure
        reason: Option<String>,
    },

    /// Matchers registered in a block that were never bound to an argument slot.
    UnresolvedMatcher {
        /// Rendered matchers, in registration order
        matchers: Vec<String>,
    },

    /// A real call matched no stub entry on a strict mock.
    NoAnswerFound {
        /// Rendered target object
        target: String,
        /// Rendered call
        call: String,
        /// Every registered matcher for the target, most recent last
        registered: Vec<String>,
    },

    /// Ordering or count mismatch during verification.
    VerificationFailed { report: Box<VerificationReport> },

    /// An ambiguous return position could not be resolved within the round budget.
    AutoHintExhausted {
        /// Index of the call within the block
        call_index: usize,
        /// Last shape the block asked for
        expected: ValueType,
        /// Passes spent on the round
        passes: usize,
    },

    /// A value did not have the shape its consumer expected.
    ///
    /// Inside a recorded block this is the signal the auto hinter acts on.
    ShapeMismatch {
        expected: ValueType,
        actual: String,
        /// Identity of the recording placeholder that was rejected, if any.
        placeholder: Option<ObjectId>,
    },

    /// The error configured by a throwing answer, or raised by a computed answer.
    Thrown(Arc<anyhow::Error>),

    /// A call-original answer reached a mock without an original implementation.
    NoOriginal { call: String },

    /// The handle was never allocated or has been released.
    UnknownMock { object: String },

    /// The recorded block failed with an error unrelated to the engine.
    BlockFailed(Arc<anyhow::Error>),
}

impl MockError {
    pub fn bad_sequence(operation: &str, state: RecorderState) -> Self {
        MockError::BadRecordingSequence {
            operation: operation.to_string(),
            state,
            reason: None,
        }
    }

    pub fn bad_sequence_because(
        operation: &str,
        state: RecorderState,
        reason: impl Into<String>,
    ) -> Self {
        MockError::BadRecordingSequence {
            operation: operation.to_string(),
            state,
            reason: Some(reason.into()),
        }
    }

    pub fn shape_mismatch(expected: ValueType, actual: impl Into<String>) -> Self {
        MockError::ShapeMismatch {
            expected,
            actual: actual.into(),
            placeholder: None,
        }
    }

    /// `value` could not be converted to `expected`. Remembers the value's
    /// identity when it is a recording placeholder.
    pub fn rejected_value(expected: ValueType, value: &Value) -> Self {
        MockError::ShapeMismatch {
            expected,
            actual: value.type_name(),
            placeholder: value
                .as_object()
                .filter(|object| object.is_placeholder())
                .map(|object| object.id()),
        }
    }

    /// Recover a `MockError` from a recorded block's error, wrapping anything else.
    pub fn from_block(err: anyhow::Error) -> Self {
        match err.downcast::<MockError>() {
            Ok(mock_error) => mock_error,
            Err(other) => MockError::BlockFailed(Arc::new(other)),
        }
    }

    /// Recover a `MockError` from an answer callback's error, wrapping anything else.
    pub fn from_answer(err: anyhow::Error) -> Self {
        match err.downcast::<MockError>() {
            Ok(mock_error) => mock_error,
            Err(other) => MockError::Thrown(Arc::new(other)),
        }
    }

    /// The verification report, for `VerificationFailed`.
    pub fn report(&self) -> Option<&VerificationReport> {
        match self {
            MockError::VerificationFailed { report } => Some(report.as_ref()),
            _ => None,
        }
    }
}

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockError::BadRecordingSequence {
                operation,
                state,
                reason,
            } => {
                write!(
                    f,
                    "BadRecordingSequence: `{}` is not allowed while {}",
                    operation, state
                )?;
                if let Some(reason) = reason {
                    write!(f, " ({})", reason)?;
                }
                Ok(())
            }
            MockError::UnresolvedMatcher { matchers } => write!(
                f,
                "UnresolvedMatcher: {} was registered but never passed as an argument of a mocked call",
                matchers.join(", ")
            ),
            MockError::NoAnswerFound {
                target,
                call,
                registered,
            } => {
                writeln!(f, "no answer found for: {}", call)?;
                write!(f, "registered matchers for {}:", target)?;
                if registered.is_empty() {
                    write!(f, "\n  <none>")?;
                }
                for matcher in registered {
                    write!(f, "\n  {}", matcher)?;
                }
                Ok(())
            }
            MockError::VerificationFailed { report } => write!(f, "{}", report),
            MockError::AutoHintExhausted {
                call_index,
                expected,
                passes,
            } => write!(
                f,
                "AutoHintExhausted: return type of call #{} still unresolved after {} passes (last expected {})",
                call_index, passes, expected
            ),
            MockError::ShapeMismatch {
                expected, actual, ..
            } => {
                write!(f, "ShapeMismatch: expected {}, got {}", expected, actual)
            }
            MockError::Thrown(err) => write!(f, "{}", err),
            MockError::NoOriginal { call } => {
                write!(f, "no original implementation to call for {}", call)
            }
            MockError::UnknownMock { object } => {
                write!(f, "unknown mock {} (never created or already released)", object)
            }
            MockError::BlockFailed(err) => write!(f, "recorded block failed: {:#}", err),
        }
    }
}

impl std::error::Error for MockError {}
