//! Dynamic values crossing the proxy boundary.
//!
//! The proxy layer hands every intercepted call to the engine as a
//! [`MethodDescriptor`] plus a list of [`Value`]s. Values are compared
//! structurally, except objects which compare by identity ([`ObjectId`]).

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Class name used for placeholders returned from positions whose shape is unknown.
pub const PLACEHOLDER_CLASS: &str = "?";

/// Class name of signature objects handed out for object-typed matchers.
pub const SIGNATURE_OBJECT_CLASS: &str = "Signature";

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an object (mock, spy, child mock or signature object).
///
/// Mocks are allocated in the registry under their object id, so the id doubles
/// as the registry handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Allocate a fresh process-wide identity.
    pub fn next() -> Self {
        ObjectId(NEXT_OBJECT_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to an object instance: identity plus class name.
#[derive(Debug, Clone)]
pub struct ObjectRef {
    id: ObjectId,
    class: Arc<str>,
}

impl ObjectRef {
    /// Create a reference with a freshly allocated identity.
    pub fn new(class: impl AsRef<str>) -> Self {
        Self::with_id(ObjectId::next(), class)
    }

    pub fn with_id(id: ObjectId, class: impl AsRef<str>) -> Self {
        Self {
            id,
            class: Arc::from(class.as_ref()),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn is_placeholder(&self) -> bool {
        &*self.class == PLACEHOLDER_CLASS
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectRef {}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class, self.id)
    }
}

/// Static shape of a parameter or return position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Unit,
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Char,
    Str,
    Duration,
    List(Box<ValueType>),
    Object(String),
    /// Shape not statically known (e.g. a generic return type).
    Generic,
}

impl ValueType {
    pub fn object(class: impl Into<String>) -> Self {
        ValueType::Object(class.into())
    }

    pub fn list(element: ValueType) -> Self {
        ValueType::List(Box::new(element))
    }

    /// Whether two independently drawn signature values of this type can be told apart.
    pub fn is_distinguishable(&self) -> bool {
        !matches!(self, ValueType::Unit | ValueType::Bool)
    }

    /// Check that a value has this shape. `Null` is accepted for object and generic positions.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ValueType::Generic, _) => true,
            (ValueType::Unit, Value::Unit)
            | (ValueType::Bool, Value::Bool(_))
            | (ValueType::Byte, Value::Byte(_))
            | (ValueType::Short, Value::Short(_))
            | (ValueType::Int, Value::Int(_))
            | (ValueType::Long, Value::Long(_))
            | (ValueType::Float, Value::Float(_))
            | (ValueType::Double, Value::Double(_))
            | (ValueType::Char, Value::Char(_))
            | (ValueType::Str, Value::Str(_))
            | (ValueType::Duration, Value::Duration(_)) => true,
            (ValueType::List(element), Value::List(items)) => {
                items.iter().all(|item| element.accepts(item))
            }
            (ValueType::Object(class), Value::Object(object)) => object.class() == class,
            (ValueType::Object(_), Value::Null) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Unit => write!(f, "()"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Byte => write!(f, "i8"),
            ValueType::Short => write!(f, "i16"),
            ValueType::Int => write!(f, "i32"),
            ValueType::Long => write!(f, "i64"),
            ValueType::Float => write!(f, "f32"),
            ValueType::Double => write!(f, "f64"),
            ValueType::Char => write!(f, "char"),
            ValueType::Str => write!(f, "String"),
            ValueType::Duration => write!(f, "Duration"),
            ValueType::List(element) => write!(f, "List<{element}>"),
            ValueType::Object(class) => write!(f, "{class}"),
            ValueType::Generic => write!(f, "{PLACEHOLDER_CLASS}"),
        }
    }
}

/// A dynamic argument or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Str(String),
    Duration(Duration),
    List(Vec<Value>),
    Object(ObjectRef),
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Value::Str(value.into())
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Object(object) => object.class().to_string(),
            other => other.value_type().to_string(),
        }
    }

    /// Best-effort shape of this value. Lists take the shape of their first element.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Unit => ValueType::Unit,
            Value::Null => ValueType::Generic,
            Value::Bool(_) => ValueType::Bool,
            Value::Byte(_) => ValueType::Byte,
            Value::Short(_) => ValueType::Short,
            Value::Int(_) => ValueType::Int,
            Value::Long(_) => ValueType::Long,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::Char(_) => ValueType::Char,
            Value::Str(_) => ValueType::Str,
            Value::Duration(_) => ValueType::Duration,
            Value::List(items) => ValueType::list(
                items
                    .first()
                    .map(Value::value_type)
                    .unwrap_or(ValueType::Generic),
            ),
            Value::Object(object) => ValueType::object(object.class()),
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type-appropriate default used by relaxed mocks. Objects default to `Null`;
    /// relaxed mocks substitute a child mock for those themselves.
    pub fn default_for(ty: &ValueType) -> Value {
        match ty {
            ValueType::Unit => Value::Unit,
            ValueType::Bool => Value::Bool(false),
            ValueType::Byte => Value::Byte(0),
            ValueType::Short => Value::Short(0),
            ValueType::Int => Value::Int(0),
            ValueType::Long => Value::Long(0),
            ValueType::Float => Value::Float(0.0),
            ValueType::Double => Value::Double(0.0),
            ValueType::Char => Value::Char('\0'),
            ValueType::Str => Value::Str(String::new()),
            ValueType::Duration => Value::Duration(Duration::ZERO),
            ValueType::List(_) => Value::List(Vec::new()),
            ValueType::Object(_) | ValueType::Generic => Value::Null,
        }
    }

    /// Ordering between values of the same scalar kind; `None` across kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Byte(a), Value::Byte(b)) => Some(a.cmp(b)),
            (Value::Short(a), Value::Short(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Long(a), Value::Long(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Char(a), Value::Char(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v}f"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "{v:?}"),
            Value::Str(v) => write!(f, "{v:?}"),
            Value::Duration(v) => write!(f, "{v:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Object(object) => write!(f, "{object}"),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from_scalar! {
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
    ObjectRef => Object,
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Shape of an intercepted method: name, parameters and return position.
///
/// When `vararg` is set the last parameter collects the trailing arguments as
/// a single `Value::List`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<ValueType>,
    pub returns: ValueType,
    pub vararg: bool,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, params: Vec<ValueType>, returns: ValueType) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
            vararg: false,
        }
    }

    /// Mark the last parameter as a vararg collector.
    pub fn with_vararg(mut self) -> Self {
        self.vararg = !self.params.is_empty();
        self
    }

    /// Index of the vararg slot, if any.
    pub fn vararg_slot(&self) -> Option<usize> {
        if self.vararg {
            self.params.len().checked_sub(1)
        } else {
            None
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (idx, param) in self.params.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            if Some(idx) == self.vararg_slot() {
                write!(f, "vararg ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, "): {}", self.returns)
    }
}
