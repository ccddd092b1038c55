//! Call recording, stubbing and verification engine for dynamic test doubles.
//!
//! Proxy types forward every intercepted call to a [`RecordingContext`].
//! Inside a stubbing or verification block the context records calls instead
//! of answering them: the block runs for several rounds, matchers hand back
//! distinguishable signature values, and the [`detector`] ties each matcher to
//! the argument slot that received its signature. Outside a block, calls are
//! logged on the target's [`Stub`] and answered from its entries.
//!
//! # Example
//!
//! ```ignore
//! use spyglass_core::{EngineConfig, Matcher, RecordingContext, Value, ValueType};
//!
//! let ctx = RecordingContext::with_config(EngineConfig::from_env());
//! let calc = ctx.mock("Calculator");
//! ctx.every(|| {
//!     let a = ctx.register_matcher(Matcher::Any, &ValueType::Int)?;
//!     ctx.on_intercepted_call(&calc, &add, vec![a, Value::Int(7)], None)
//! })?
//! .returns(100)?;
//! ```

pub mod answer;
pub mod config;
pub mod detector;
pub mod errors;
pub mod hinter;
pub mod invocation;
pub mod matcher;
pub mod recorder;
pub mod registry;
pub mod round;
pub mod signature;
pub mod stub;
pub mod value;
pub mod verify;

pub use answer::{Answer, OriginalCall};
pub use config::EngineConfig;
pub use errors::{MockError, MockResult};
pub use invocation::{current_sequence, CallFrame, Invocation};
pub use matcher::{CaptureSlot, CompareOp, InvocationMatcher, Matcher};
pub use recorder::{RecorderState, RecordingContext, StubbingBuilder};
pub use registry::MockRegistry;
pub use stub::{ClearOptions, EntrySnapshot, LoggedCall, MockKind, Stub};
pub use value::{MethodDescriptor, ObjectId, ObjectRef, Value, ValueType};
pub use verify::{CallOrder, CallSummary, CallWindow, VerificationReport, VerificationRequest};
