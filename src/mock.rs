//! Typed handle proxies build on.
//!
//! A proxy is an ordinary struct holding a [`Mock`]; each of its methods
//! describes itself with a [`MethodDescriptor`] and forwards through
//! [`Mock::call`]. The same code path serves recording, answering and spying.

use spyglass_core::{
    MethodDescriptor, MockResult, ObjectRef, OriginalCall, RecordingContext, Value, ValueType,
};

use crate::convert::{expect_object, FromValue};

#[derive(Clone)]
pub struct Mock<'ctx> {
    ctx: &'ctx RecordingContext,
    object: ObjectRef,
}

impl<'ctx> Mock<'ctx> {
    pub fn new(ctx: &'ctx RecordingContext, object: ObjectRef) -> Self {
        Self { ctx, object }
    }

    pub fn strict(ctx: &'ctx RecordingContext, class: &str) -> Self {
        Self::new(ctx, ctx.mock(class))
    }

    pub fn relaxed(ctx: &'ctx RecordingContext, class: &str) -> Self {
        Self::new(ctx, ctx.relaxed_mock(class))
    }

    pub fn relaxed_unit(ctx: &'ctx RecordingContext, class: &str) -> Self {
        Self::new(ctx, ctx.relaxed_unit_mock(class))
    }

    pub fn spy(ctx: &'ctx RecordingContext, class: &str) -> Self {
        Self::new(ctx, ctx.spy(class))
    }

    pub fn ctx(&self) -> &'ctx RecordingContext {
        self.ctx
    }

    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Forward a call without an original implementation.
    pub fn call<R: FromValue>(&self, method: &MethodDescriptor, args: Vec<Value>) -> MockResult<R> {
        let value = self.ctx.on_intercepted_call(&self.object, method, args, None)?;
        R::from_value(value)
    }

    /// Forward a call that spies and `calls_original` answers may delegate to `original`.
    pub fn call_with_original<R: FromValue>(
        &self,
        method: &MethodDescriptor,
        args: Vec<Value>,
        original: &OriginalCall<'_>,
    ) -> MockResult<R> {
        let value = self
            .ctx
            .on_intercepted_call(&self.object, method, args, Some(original))?;
        R::from_value(value)
    }

    /// Forward a call returning another mocked object and wrap the result.
    ///
    /// `class` is the expected class; for generic return positions this is
    /// what the auto hinter learns.
    pub fn call_object(
        &self,
        method: &MethodDescriptor,
        args: Vec<Value>,
        class: &str,
    ) -> MockResult<Mock<'ctx>> {
        let value = self.ctx.on_intercepted_call(&self.object, method, args, None)?;
        let object = match &method.returns {
            ValueType::Object(declared) if declared == class => match value {
                Value::Object(object) => object,
                other => expect_object(other, class)?,
            },
            _ => expect_object(value, class)?,
        };
        Ok(Mock::new(self.ctx, object))
    }
}

impl std::fmt::Debug for Mock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Mock({})", self.object)
    }
}
