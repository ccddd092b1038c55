//! Typed conversion out of dynamic values.
//!
//! A conversion failure is a [`MockError::ShapeMismatch`]. Inside a recorded
//! block that is exactly the signal the auto hinter needs when a placeholder
//! comes back from a call whose return shape was unknown.

use std::time::Duration;

use spyglass_core::{MockError, MockResult, ObjectRef, Value, ValueType};

/// A Rust type that can cross the proxy boundary.
pub trait FromValue: Into<Value> + Sized {
    /// Shape used when a matcher of this type needs a signature value.
    fn value_type() -> ValueType;

    fn from_value(value: Value) -> MockResult<Self>;
}

fn mismatch<T: FromValue>(value: &Value) -> MockError {
    MockError::rejected_value(T::value_type(), value)
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn value_type() -> ValueType {
                    ValueType::$variant
                }

                fn from_value(value: Value) -> MockResult<Self> {
                    match value {
                        Value::$variant(inner) => Ok(inner),
                        other => Err(mismatch::<Self>(&other)),
                    }
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    char => Char,
    String => Str,
    Duration => Duration,
}

impl FromValue for () {
    fn value_type() -> ValueType {
        ValueType::Unit
    }

    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Unit => Ok(()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromValue for Value {
    fn value_type() -> ValueType {
        ValueType::Generic
    }

    fn from_value(value: Value) -> MockResult<Self> {
        Ok(value)
    }
}

/// Any object. Placeholders are rejected so that ambiguous returns get hinted;
/// matcher signature objects are accepted.
impl FromValue for ObjectRef {
    fn value_type() -> ValueType {
        ValueType::Generic
    }

    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Object(object) if !object.is_placeholder() => Ok(object),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::list(T::value_type())
    }

    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn value_type() -> ValueType {
        T::value_type()
    }

    fn from_value(value: Value) -> MockResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Convert a call result into an object of `class`.
pub fn expect_object(value: Value, class: &str) -> MockResult<ObjectRef> {
    match value {
        Value::Object(object) if object.class() == class => Ok(object),
        other => Err(MockError::rejected_value(ValueType::object(class), &other)),
    }
}
