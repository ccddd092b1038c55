//! Typed matchers and verification shorthands.
//!
//! Matchers must be called inside a recorded block, in argument position:
//!
//! ```ignore
//! ctx.every(|| calc.add(any(&ctx)?, eq(&ctx, 7)?))?.returns(100)?;
//! verify_count(&ctx, 2, || calc.add(gt(&ctx, 0)?, any(&ctx)?))?;
//! ```

use spyglass_core::{
    CaptureSlot, CompareOp, Matcher, MockResult, ObjectRef, RecordingContext, Value,
    VerificationReport, VerificationRequest,
};

use crate::convert::FromValue;

/// Register `matcher` for a slot of type `T` and return the value to pass there.
pub fn matcher<T: FromValue>(ctx: &RecordingContext, matcher: Matcher) -> MockResult<T> {
    T::from_value(ctx.register_matcher(matcher, &T::value_type())?)
}

pub fn any<T: FromValue>(ctx: &RecordingContext) -> MockResult<T> {
    matcher(ctx, Matcher::Any)
}

pub fn eq<T: FromValue>(ctx: &RecordingContext, value: T) -> MockResult<T> {
    matcher(ctx, Matcher::Eq(value.into()))
}

pub fn ne<T: FromValue>(ctx: &RecordingContext, value: T) -> MockResult<T> {
    matcher(ctx, Matcher::Eq(value.into()).negate())
}

/// Identity match on an object.
pub fn same(ctx: &RecordingContext, object: &ObjectRef) -> MockResult<ObjectRef> {
    let signature = ctx.register_matcher(
        Matcher::Same(object.clone()),
        &spyglass_core::ValueType::object(object.class()),
    )?;
    crate::convert::expect_object(signature, object.class())
}

fn compare<T: FromValue>(ctx: &RecordingContext, op: CompareOp, value: T) -> MockResult<T> {
    matcher(ctx, Matcher::Compare(op, value.into()))
}

pub fn lt<T: FromValue>(ctx: &RecordingContext, value: T) -> MockResult<T> {
    compare(ctx, CompareOp::Less, value)
}

pub fn le<T: FromValue>(ctx: &RecordingContext, value: T) -> MockResult<T> {
    compare(ctx, CompareOp::LessOrEqual, value)
}

pub fn gt<T: FromValue>(ctx: &RecordingContext, value: T) -> MockResult<T> {
    compare(ctx, CompareOp::Greater, value)
}

pub fn ge<T: FromValue>(ctx: &RecordingContext, value: T) -> MockResult<T> {
    compare(ctx, CompareOp::GreaterOrEqual, value)
}

/// Typed predicate. Values of another shape never match.
pub fn matching<T, F>(ctx: &RecordingContext, description: &str, predicate: F) -> MockResult<T>
where
    T: FromValue + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    let check = move |value: &Value| {
        T::from_value(value.clone())
            .map(|typed| predicate(&typed))
            .unwrap_or(false)
    };
    matcher(ctx, Matcher::predicate(description, check))
}

pub fn of_type<T: FromValue>(ctx: &RecordingContext) -> MockResult<T> {
    matcher(ctx, Matcher::OfType(T::value_type()))
}

pub fn is_null<T: FromValue>(ctx: &RecordingContext) -> MockResult<Option<T>> {
    matcher(ctx, Matcher::Null)
}

pub fn not_null<T: FromValue>(ctx: &RecordingContext) -> MockResult<Option<T>> {
    matcher(ctx, Matcher::NotNull)
}

/// Accept anything in the slot and record it in `slot`.
pub fn capture<T: FromValue>(ctx: &RecordingContext, slot: &CaptureSlot) -> MockResult<T> {
    matcher(ctx, Matcher::capture(slot))
}

/// Vararg wildcard. Pass the result as the only element of the vararg list.
pub fn any_vararg<T: FromValue>(ctx: &RecordingContext) -> MockResult<T> {
    matcher(ctx, Matcher::VarargAny)
}

/// Every vararg element must satisfy `inner`.
pub fn vararg_all<T: FromValue>(ctx: &RecordingContext, inner: Matcher) -> MockResult<T> {
    matcher(ctx, Matcher::VarargAll(Box::new(inner)))
}

// ==================== Verification ====================

pub fn verify<R, E>(ctx: &RecordingContext, block: impl FnMut() -> Result<R, E>) -> MockResult<VerificationReport>
where
    E: Into<anyhow::Error>,
{
    ctx.verify(VerificationRequest::unordered(), block)
}

pub fn verify_count<R, E>(
    ctx: &RecordingContext,
    times: usize,
    block: impl FnMut() -> Result<R, E>,
) -> MockResult<VerificationReport>
where
    E: Into<anyhow::Error>,
{
    ctx.verify(VerificationRequest::unordered().times(times), block)
}

pub fn verify_never<R, E>(ctx: &RecordingContext, block: impl FnMut() -> Result<R, E>) -> MockResult<VerificationReport>
where
    E: Into<anyhow::Error>,
{
    ctx.verify(VerificationRequest::unordered().times(0), block)
}

pub fn verify_order<R, E>(ctx: &RecordingContext, block: impl FnMut() -> Result<R, E>) -> MockResult<VerificationReport>
where
    E: Into<anyhow::Error>,
{
    ctx.verify(VerificationRequest::ordered(), block)
}

pub fn verify_sequence<R, E>(ctx: &RecordingContext, block: impl FnMut() -> Result<R, E>) -> MockResult<VerificationReport>
where
    E: Into<anyhow::Error>,
{
    ctx.verify(VerificationRequest::sequence(), block)
}

pub fn verify_all<R, E>(ctx: &RecordingContext, block: impl FnMut() -> Result<R, E>) -> MockResult<VerificationReport>
where
    E: Into<anyhow::Error>,
{
    ctx.verify(VerificationRequest::all(), block)
}
