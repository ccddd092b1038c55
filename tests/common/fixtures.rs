//! Hand-written proxies used across the integration tests.
//!
//! Each proxy is what generated code would look like: one `MethodDescriptor`
//! per method and a body that forwards through [`Mock`]. Spied methods pass
//! their real implementation as the original.

use std::sync::Arc;
use std::time::Duration;

use spyglass::prelude::*;

/// Fixed seed so signature values are reproducible between runs.
pub const SIGNATURE_SEED: u64 = 0x5EED;

pub fn config() -> EngineConfig {
    EngineConfig::default().with_signature_seed(SIGNATURE_SEED)
}

/// Context over a private registry.
pub fn ctx() -> RecordingContext {
    RecordingContext::with_config(config())
}

/// Registry to share between per-thread contexts.
pub fn shared_registry() -> Arc<MockRegistry> {
    MockRegistry::shared(config())
}

/// Typed argument of an original implementation.
pub fn arg<T: FromValue>(args: &[Value], idx: usize) -> anyhow::Result<T> {
    let value = args
        .get(idx)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing argument #{}", idx))?;
    Ok(T::from_value(value)?)
}

pub mod methods {
    use spyglass::{MethodDescriptor, ValueType};

    pub fn add() -> MethodDescriptor {
        MethodDescriptor::new("add", vec![ValueType::Int, ValueType::Int], ValueType::Int)
    }

    pub fn toggle() -> MethodDescriptor {
        MethodDescriptor::new("toggle", vec![ValueType::Bool, ValueType::Bool], ValueType::Int)
    }

    pub fn sum() -> MethodDescriptor {
        MethodDescriptor::new(
            "sum",
            vec![ValueType::Str, ValueType::list(ValueType::Int)],
            ValueType::Int,
        )
        .with_vararg()
    }

    pub fn reset() -> MethodDescriptor {
        MethodDescriptor::new("reset", vec![], ValueType::Unit)
    }

    pub fn f() -> MethodDescriptor {
        MethodDescriptor::new("f", vec![ValueType::Int], ValueType::Unit)
    }

    pub fn g() -> MethodDescriptor {
        MethodDescriptor::new("g", vec![], ValueType::Unit)
    }

    pub fn child() -> MethodDescriptor {
        MethodDescriptor::new("child", vec![], ValueType::object("Child"))
    }

    pub fn named_child() -> MethodDescriptor {
        MethodDescriptor::new("namedChild", vec![ValueType::Str], ValueType::object("Child"))
    }

    pub fn grandchild() -> MethodDescriptor {
        MethodDescriptor::new("grandchild", vec![], ValueType::Int)
    }

    pub fn find() -> MethodDescriptor {
        MethodDescriptor::new("find", vec![ValueType::Long], ValueType::Generic)
    }

    pub fn store() -> MethodDescriptor {
        MethodDescriptor::new("store", vec![ValueType::Generic], ValueType::Int)
    }

    pub fn double() -> MethodDescriptor {
        MethodDescriptor::new("double", vec![ValueType::Int], ValueType::Int)
    }

    pub fn quadruple() -> MethodDescriptor {
        MethodDescriptor::new("quadruple", vec![ValueType::Int], ValueType::Int)
    }

    pub fn sleep() -> MethodDescriptor {
        MethodDescriptor::new("sleep", vec![ValueType::Duration], ValueType::Unit)
    }

    pub fn now() -> MethodDescriptor {
        MethodDescriptor::new("now", vec![], ValueType::Long)
    }
}

// ==================== Calculator ====================

pub struct Calculator<'ctx> {
    mock: Mock<'ctx>,
}

#[allow(dead_code)]
impl<'ctx> Calculator<'ctx> {
    pub fn new(ctx: &'ctx RecordingContext) -> Self {
        Self::from_mock(Mock::strict(ctx, "Calculator"))
    }

    pub fn relaxed(ctx: &'ctx RecordingContext) -> Self {
        Self::from_mock(Mock::relaxed(ctx, "Calculator"))
    }

    pub fn from_mock(mock: Mock<'ctx>) -> Self {
        Self { mock }
    }

    /// Same mock, seen through another context (e.g. on another thread).
    pub fn attach(ctx: &'ctx RecordingContext, object: ObjectRef) -> Self {
        Self::from_mock(Mock::new(ctx, object))
    }

    pub fn object(&self) -> &ObjectRef {
        self.mock.object()
    }

    pub fn add(&self, a: i32, b: i32) -> MockResult<i32> {
        self.mock.call(&methods::add(), args![a, b])
    }

    pub fn toggle(&self, flag: bool, other: bool) -> MockResult<i32> {
        self.mock.call(&methods::toggle(), args![flag, other])
    }

    pub fn sum(&self, label: &str, values: Vec<i32>) -> MockResult<i32> {
        self.mock.call(&methods::sum(), args![label, values])
    }

    pub fn reset(&self) -> MockResult<()> {
        self.mock.call(&methods::reset(), args![])
    }
}

// ==================== Service ====================

pub struct Service<'ctx> {
    mock: Mock<'ctx>,
}

#[allow(dead_code)]
impl<'ctx> Service<'ctx> {
    pub fn new(ctx: &'ctx RecordingContext) -> Self {
        Self {
            mock: Mock::relaxed_unit(ctx, "Service"),
        }
    }

    pub fn attach(ctx: &'ctx RecordingContext, object: ObjectRef) -> Self {
        Self {
            mock: Mock::new(ctx, object),
        }
    }

    pub fn object(&self) -> &ObjectRef {
        self.mock.object()
    }

    pub fn f(&self, x: i32) -> MockResult<()> {
        self.mock.call(&methods::f(), args![x])
    }

    pub fn g(&self) -> MockResult<()> {
        self.mock.call(&methods::g(), args![])
    }
}

// ==================== Root / Child ====================

pub struct Root<'ctx> {
    mock: Mock<'ctx>,
}

#[allow(dead_code)]
impl<'ctx> Root<'ctx> {
    pub fn new(ctx: &'ctx RecordingContext) -> Self {
        Self {
            mock: Mock::strict(ctx, "Root"),
        }
    }

    pub fn relaxed(ctx: &'ctx RecordingContext) -> Self {
        Self {
            mock: Mock::relaxed(ctx, "Root"),
        }
    }

    pub fn object(&self) -> &ObjectRef {
        self.mock.object()
    }

    pub fn child(&self) -> MockResult<Child<'ctx>> {
        let mock = self.mock.call_object(&methods::child(), args![], "Child")?;
        Ok(Child { mock })
    }

    pub fn named_child(&self, name: &str) -> MockResult<Child<'ctx>> {
        let mock = self
            .mock
            .call_object(&methods::named_child(), args![name], "Child")?;
        Ok(Child { mock })
    }
}

pub struct Child<'ctx> {
    mock: Mock<'ctx>,
}

#[allow(dead_code)]
impl<'ctx> Child<'ctx> {
    pub fn object(&self) -> &ObjectRef {
        self.mock.object()
    }

    pub fn grandchild(&self) -> MockResult<i32> {
        self.mock.call(&methods::grandchild(), args![])
    }
}

// ==================== Repo (generic returns) ====================

pub struct Repo<'ctx> {
    mock: Mock<'ctx>,
}

#[allow(dead_code)]
impl<'ctx> Repo<'ctx> {
    pub fn new(ctx: &'ctx RecordingContext) -> Self {
        Self {
            mock: Mock::strict(ctx, "Repo"),
        }
    }

    /// `find(id): T` with `T` erased at the proxy boundary.
    pub fn find<T: FromValue>(&self, id: i64) -> MockResult<T> {
        self.mock.call(&methods::find(), args![id])
    }

    /// `store(item): Int` taking any object.
    pub fn store(&self, item: ObjectRef) -> MockResult<i32> {
        self.mock.call(&methods::store(), args![item])
    }

    pub fn find_child(&self, id: i64) -> MockResult<Child<'ctx>> {
        let mock = self.mock.call_object(&methods::find(), args![id], "Child")?;
        Ok(Child { mock })
    }
}

// ==================== Counter (spied) ====================

pub struct Counter<'ctx> {
    mock: Mock<'ctx>,
}

#[allow(dead_code)]
impl<'ctx> Counter<'ctx> {
    pub fn spy(ctx: &'ctx RecordingContext) -> Self {
        Self {
            mock: Mock::spy(ctx, "Counter"),
        }
    }

    pub fn strict(ctx: &'ctx RecordingContext) -> Self {
        Self {
            mock: Mock::strict(ctx, "Counter"),
        }
    }

    pub fn object(&self) -> &ObjectRef {
        self.mock.object()
    }

    pub fn double(&self, x: i32) -> MockResult<i32> {
        let original = |args: &[Value]| -> anyhow::Result<Value> {
            let x: i32 = arg(args, 0)?;
            Ok(Value::Int(x * 2))
        };
        self.mock
            .call_with_original(&methods::double(), args![x], &original)
    }

    /// Real implementation calls `double` twice on the same object.
    pub fn quadruple(&self, x: i32) -> MockResult<i32> {
        let original = |args: &[Value]| -> anyhow::Result<Value> {
            let x: i32 = arg(args, 0)?;
            Ok(Value::Int(self.double(self.double(x)?)?))
        };
        self.mock
            .call_with_original(&methods::quadruple(), args![x], &original)
    }
}

// ==================== Clock ====================

pub struct Clock<'ctx> {
    mock: Mock<'ctx>,
}

#[allow(dead_code)]
impl<'ctx> Clock<'ctx> {
    pub fn relaxed_unit(ctx: &'ctx RecordingContext) -> Self {
        Self {
            mock: Mock::relaxed_unit(ctx, "Clock"),
        }
    }

    pub fn object(&self) -> &ObjectRef {
        self.mock.object()
    }

    pub fn sleep(&self, duration: Duration) -> MockResult<()> {
        self.mock.call(&methods::sleep(), args![duration])
    }

    pub fn now(&self) -> MockResult<i64> {
        self.mock.call(&methods::now(), args![])
    }
}
