//! Captured calls.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::value::{MethodDescriptor, ObjectId, ObjectRef, Value};

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// The sequence number the next invocation will receive.
///
/// Used as a window mark: calls made after `current_sequence()` was read have
/// a sequence number `>=` the mark.
pub fn current_sequence() -> u64 {
    NEXT_SEQUENCE.load(Ordering::SeqCst)
}

fn next_sequence() -> u64 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

/// One entry of the call-context stack: the call whose answer is currently executing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallFrame {
    pub target: ObjectId,
    pub method: String,
}

/// An immutable, already-happened call.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub target: ObjectRef,
    pub method: MethodDescriptor,
    pub args: Vec<Value>,
    /// Process-wide, monotonically increasing.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// Frame of the call whose answer made this call, if any.
    pub caller: Option<CallFrame>,
}

impl Invocation {
    pub fn new(
        target: ObjectRef,
        method: MethodDescriptor,
        args: Vec<Value>,
        caller: Option<CallFrame>,
    ) -> Self {
        Self {
            target,
            method,
            args,
            sequence: next_sequence(),
            timestamp: Utc::now(),
            caller,
        }
    }

    /// A call made by the target on itself while answering another of its calls.
    pub fn is_self_call(&self) -> bool {
        self.caller
            .as_ref()
            .is_some_and(|frame| frame.target == self.target.id())
    }

    pub fn frame(&self) -> CallFrame {
        CallFrame {
            target: self.target.id(),
            method: self.method.name.clone(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}(", self.target, self.method.name)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueType;

    fn method() -> MethodDescriptor {
        MethodDescriptor::new("add", vec![ValueType::Int, ValueType::Int], ValueType::Int)
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let target = ObjectRef::new("Calculator");
        let first = Invocation::new(target.clone(), method(), vec![], None);
        let second = Invocation::new(target, method(), vec![], None);
        assert!(second.sequence > first.sequence);
        assert!(current_sequence() > second.sequence);
    }

    #[test]
    fn test_display_and_self_call() {
        let target = ObjectRef::new("Calculator");
        let frame = CallFrame {
            target: target.id(),
            method: "total".to_string(),
        };
        let inv = Invocation::new(
            target.clone(),
            method(),
            vec![Value::Int(1), Value::Int(2)],
            Some(frame),
        );
        assert!(inv.is_self_call());
        assert_eq!(inv.to_string(), format!("Calculator{}.add(1, 2)", target.id()));
    }
}
