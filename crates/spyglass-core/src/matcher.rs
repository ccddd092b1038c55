//! Argument matchers and invocation matchers.
//!
//! A [`Matcher`] stands in for one argument slot. An [`InvocationMatcher`]
//! combines a target identity, a method descriptor and one matcher per
//! parameter; it is what stub entries and verifiers test invocations against.
//!
//! The `Display` rendering of both types is part of the engine's stable output
//! (it appears verbatim in `NoAnswerFound` and `VerificationFailed` messages).

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::invocation::Invocation;
use crate::value::{MethodDescriptor, ObjectId, ObjectRef, Value, ValueType};

/// Comparison used by [`Matcher::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl CompareOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Less => ordering == Ordering::Less,
            CompareOp::LessOrEqual => ordering != Ordering::Greater,
            CompareOp::Greater => ordering == Ordering::Greater,
            CompareOp::GreaterOrEqual => ordering != Ordering::Less,
        }
    }

    fn name(self) -> &'static str {
        match self {
            CompareOp::Less => "lt",
            CompareOp::LessOrEqual => "le",
            CompareOp::Greater => "gt",
            CompareOp::GreaterOrEqual => "ge",
        }
    }
}

/// Shared slot filled by [`Matcher::Capture`] whenever its invocation matcher accepts a call.
#[derive(Debug, Clone, Default)]
pub struct CaptureSlot {
    values: Arc<Mutex<Vec<Value>>>,
}

impl CaptureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently captured value.
    pub fn captured(&self) -> Option<Value> {
        self.values.lock().last().cloned()
    }

    pub fn all(&self) -> Vec<Value> {
        self.values.lock().clone()
    }

    pub fn is_captured(&self) -> bool {
        !self.values.lock().is_empty()
    }

    pub fn clear(&self) {
        self.values.lock().clear();
    }

    fn push(&self, value: Value) {
        self.values.lock().push(value);
    }
}

pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Placeholder for one argument slot.
#[derive(Clone)]
pub enum Matcher {
    Any,
    Eq(Value),
    /// Identity match on an object reference.
    Same(ObjectRef),
    Compare(CompareOp, Value),
    Predicate {
        description: String,
        predicate: PredicateFn,
    },
    OfType(ValueType),
    Null,
    NotNull,
    Not(Box<Matcher>),
    And(Box<Matcher>, Box<Matcher>),
    Or(Box<Matcher>, Box<Matcher>),
    Capture {
        slot: CaptureSlot,
        inner: Box<Matcher>,
    },
    /// Vararg wildcard: any number of trailing arguments.
    VarargAny,
    /// Every trailing argument matches the inner matcher.
    VarargAll(Box<Matcher>),
    /// Trailing arguments match elementwise, with equal length.
    Varargs(Vec<Matcher>),
    /// Target-level sentinel: the mock received no calls at all.
    NotCalled,
}

impl Matcher {
    pub fn eq(value: Value) -> Self {
        Matcher::Eq(value)
    }

    pub fn predicate(
        description: impl Into<String>,
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        Matcher::Predicate {
            description: description.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn capture(slot: &CaptureSlot) -> Self {
        Matcher::Capture {
            slot: slot.clone(),
            inner: Box::new(Matcher::Any),
        }
    }

    pub fn negate(self) -> Self {
        Matcher::Not(Box::new(self))
    }

    pub fn and(self, other: Matcher) -> Self {
        Matcher::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Matcher) -> Self {
        Matcher::Or(Box::new(self), Box::new(other))
    }

    /// Matchers that stand for the whole vararg slot when they appear among its elements.
    pub fn is_vararg_wildcard(&self) -> bool {
        matches!(self, Matcher::VarargAny | Matcher::VarargAll(_))
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Eq(expected) => expected == value,
            Matcher::Same(object) => value.as_object() == Some(object),
            Matcher::Compare(op, expected) => value
                .compare(expected)
                .is_some_and(|ordering| op.holds(ordering)),
            Matcher::Predicate { predicate, .. } => (predicate.as_ref())(value),
            Matcher::OfType(ty) => !value.is_null() && ty.accepts(value),
            Matcher::Null => value.is_null(),
            Matcher::NotNull => !value.is_null(),
            Matcher::Not(inner) => !inner.matches(value),
            Matcher::And(left, right) => left.matches(value) && right.matches(value),
            Matcher::Or(left, right) => left.matches(value) || right.matches(value),
            Matcher::Capture { inner, .. } => inner.matches(value),
            Matcher::VarargAny => matches!(value, Value::List(_)),
            Matcher::VarargAll(inner) => match value {
                Value::List(items) => items.iter().all(|item| inner.matches(item)),
                _ => false,
            },
            Matcher::Varargs(elements) => match value {
                Value::List(items) => {
                    items.len() == elements.len()
                        && elements
                            .iter()
                            .zip(items)
                            .all(|(matcher, item)| matcher.matches(item))
                }
                _ => false,
            },
            Matcher::NotCalled => false,
        }
    }

    /// Record captured values. Only called once the whole invocation matcher accepted.
    pub fn capture_from(&self, value: &Value) {
        match self {
            Matcher::Capture { slot, inner } => {
                slot.push(value.clone());
                inner.capture_from(value);
            }
            Matcher::And(left, right) => {
                left.capture_from(value);
                right.capture_from(value);
            }
            Matcher::Or(left, right) => {
                if left.matches(value) {
                    left.capture_from(value);
                } else {
                    right.capture_from(value);
                }
            }
            Matcher::VarargAll(inner) => {
                if let Value::List(items) = value {
                    for item in items {
                        inner.capture_from(item);
                    }
                }
            }
            Matcher::Varargs(elements) => {
                if let Value::List(items) = value {
                    for (matcher, item) in elements.iter().zip(items) {
                        matcher.capture_from(item);
                    }
                }
            }
            _ => {}
        }
    }

    /// Replace references to a recording-time object with the real one.
    pub(crate) fn substitute_object(&mut self, from: ObjectId, to: &ObjectRef) {
        match self {
            Matcher::Eq(Value::Object(object)) | Matcher::Same(object) if object.id() == from => {
                *object = to.clone();
            }
            Matcher::Not(inner)
            | Matcher::Capture { inner, .. }
            | Matcher::VarargAll(inner) => inner.substitute_object(from, to),
            Matcher::And(left, right) | Matcher::Or(left, right) => {
                left.substitute_object(from, to);
                right.substitute_object(from, to);
            }
            Matcher::Varargs(elements) => {
                for element in elements {
                    element.substitute_object(from, to);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Any => write!(f, "any()"),
            Matcher::Eq(value) => write!(f, "eq({value})"),
            Matcher::Same(object) => write!(f, "refEq({object})"),
            Matcher::Compare(op, value) => write!(f, "{}({value})", op.name()),
            Matcher::Predicate { description, .. } => write!(f, "match({description})"),
            Matcher::OfType(ty) => write!(f, "ofType({ty})"),
            Matcher::Null => write!(f, "isNull()"),
            Matcher::NotNull => write!(f, "isNull(inverse=true)"),
            Matcher::Not(inner) => write!(f, "not({inner})"),
            Matcher::And(left, right) => write!(f, "and({left}, {right})"),
            Matcher::Or(left, right) => write!(f, "or({left}, {right})"),
            Matcher::Capture { inner, .. } => match inner.as_ref() {
                Matcher::Any => write!(f, "capture()"),
                other => write!(f, "capture({other})"),
            },
            Matcher::VarargAny => write!(f, "anyVararg()"),
            Matcher::VarargAll(inner) => write!(f, "varargAll({inner})"),
            Matcher::Varargs(elements) => {
                write!(f, "varargs(")?;
                for (idx, element) in elements.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
            Matcher::NotCalled => write!(f, "wasNot(Called)"),
        }
    }
}

/// Target identity + method + one matcher per parameter.
#[derive(Debug, Clone)]
pub struct InvocationMatcher {
    pub target: ObjectRef,
    pub method: MethodDescriptor,
    pub args: Vec<Matcher>,
}

impl InvocationMatcher {
    pub fn new(target: ObjectRef, method: MethodDescriptor, args: Vec<Matcher>) -> Self {
        Self {
            target,
            method,
            args,
        }
    }

    /// Exact-equality matcher for an already-happened call.
    pub fn exact(invocation: &Invocation) -> Self {
        Self::new(
            invocation.target.clone(),
            invocation.method.clone(),
            invocation.args.iter().cloned().map(Matcher::Eq).collect(),
        )
    }

    /// Sentinel asserting that `target` received no calls.
    pub fn not_called(target: ObjectRef) -> Self {
        Self::new(
            target,
            MethodDescriptor::new("*", Vec::new(), ValueType::Generic),
            vec![Matcher::NotCalled],
        )
    }

    pub fn is_not_called(&self) -> bool {
        matches!(self.args.as_slice(), [Matcher::NotCalled])
    }

    /// Whether this matcher accepts the invocation. The not-called sentinel
    /// accepts every call on its target.
    pub fn matches(&self, invocation: &Invocation) -> bool {
        if self.target != invocation.target {
            return false;
        }
        if self.is_not_called() {
            return true;
        }
        self.method == invocation.method
            && self.args.len() == invocation.args.len()
            && self
                .args
                .iter()
                .zip(&invocation.args)
                .all(|(matcher, value)| matcher.matches(value))
    }

    pub fn capture(&self, invocation: &Invocation) {
        for (matcher, value) in self.args.iter().zip(&invocation.args) {
            matcher.capture_from(value);
        }
    }

    /// Structural equality of two matchers, as rendered.
    pub fn same_shape(&self, other: &InvocationMatcher) -> bool {
        self.target == other.target
            && self.method == other.method
            && self.to_string() == other.to_string()
    }

    pub(crate) fn substitute_object(&mut self, from: ObjectId, to: &ObjectRef) {
        if self.target.id() == from {
            self.target = to.clone();
        }
        for matcher in &mut self.args {
            matcher.substitute_object(from, to);
        }
    }
}

impl fmt::Display for InvocationMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_not_called() {
            return write!(f, "{} wasNot Called", self.target);
        }
        write!(f, "{}.{}(", self.target, self.method.name)?;
        for (idx, matcher) in self.args.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{matcher}")?;
        }
        write!(f, ")")
    }
}
