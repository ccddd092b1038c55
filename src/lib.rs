//! Record-by-example mocks and spies.
//!
//! `spyglass` is the typed front end of [`spyglass_core`]: proxies wrap a
//! [`Mock`], matchers come from [`dsl`], and typed results come back through
//! [`FromValue`].
//!
//! ```ignore
//! use spyglass::prelude::*;
//!
//! let ctx = RecordingContext::with_config(EngineConfig::from_env());
//! let calc = Calculator::new(&ctx);
//! ctx.every(|| calc.add(any(&ctx)?, 7))?.returns(100)?;
//! assert_eq!(calc.add(1, 7)?, 100);
//! verify_count(&ctx, 1, || calc.add(1, 7))?;
//! ```

pub mod convert;
pub mod dsl;
mod macros;
pub mod mock;

pub use convert::{expect_object, FromValue};
pub use mock::Mock;
pub use spyglass_core::{
    Answer, CallOrder, CaptureSlot, ClearOptions, CompareOp, EngineConfig, Invocation, InvocationMatcher,
    Matcher, MethodDescriptor, MockError, MockKind, MockRegistry, MockResult, ObjectRef,
    OriginalCall, RecorderState, RecordingContext, Value, ValueType, VerificationReport,
    VerificationRequest,
};

pub mod prelude {
    pub use crate::args;
    pub use crate::dsl::*;
    pub use crate::{
        Answer, CaptureSlot, ClearOptions, CompareOp, EngineConfig, FromValue, Matcher, MethodDescriptor,
        Mock, MockError, MockRegistry, MockResult, ObjectRef, RecordingContext, Value, ValueType,
        VerificationRequest,
    };
}
