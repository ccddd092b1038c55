//! Arena of stubs keyed by object id.
//!
//! A registry is shared (`Arc`) between every [`crate::RecordingContext`] of a
//! test, so mocks created on one thread can be called and verified from
//! another. Handles are plain [`ObjectId`]s; a released handle fails with
//! `UnknownMock` from then on.
//!
//! # Example
//!
//! ```ignore
//! use spyglass_core::{EngineConfig, MockKind, MockRegistry};
//!
//! let registry = MockRegistry::shared(EngineConfig::default());
//! let calc = registry.create("Calculator", MockKind::Strict);
//! assert!(registry.contains(calc.id()));
//! registry.release(calc.id())?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::answer::{Answer, OriginalCall};
use crate::config::EngineConfig;
use crate::errors::{MockError, MockResult};
use crate::invocation::Invocation;
use crate::matcher::InvocationMatcher;
use crate::stub::{MockKind, Stub};
use crate::value::{ObjectId, ObjectRef, Value, ValueType};

#[derive(Debug)]
pub struct MockRegistry {
    config: EngineConfig,
    stubs: RwLock<HashMap<ObjectId, Arc<Stub>>>,
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl MockRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            stubs: RwLock::new(HashMap::new()),
        }
    }

    pub fn shared(config: EngineConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ==================== Lifecycle ====================

    /// Allocate a mock of `class`.
    pub fn create(&self, class: &str, kind: MockKind) -> ObjectRef {
        let object = ObjectRef::new(class);
        self.insert(Stub::new(object.clone(), kind, None));
        tracing::debug!(mock = %object, kind = %kind, "created mock");
        object
    }

    /// Allocate a child mock tracked by `parent`; it is released with it.
    pub fn create_child(&self, parent: &Stub, class: &str) -> ObjectRef {
        let object = ObjectRef::new(class);
        let kind = parent.kind().for_child();
        self.insert(Stub::new(object.clone(), kind, Some(parent.object().id())));
        parent.adopt_child(object.id());
        tracing::debug!(mock = %object, parent = %parent.object(), kind = %kind, "created child mock");
        object
    }

    fn insert(&self, stub: Stub) {
        self.stubs.write().insert(stub.object().id(), Arc::new(stub));
    }

    pub fn get(&self, id: ObjectId) -> MockResult<Arc<Stub>> {
        self.stubs
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| MockError::UnknownMock {
                object: id.to_string(),
            })
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.stubs.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.stubs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.read().is_empty()
    }

    /// Release a mock and, recursively, the child mocks it tracks.
    pub fn release(&self, id: ObjectId) -> MockResult<()> {
        let stub = self
            .stubs
            .write()
            .remove(&id)
            .ok_or_else(|| MockError::UnknownMock {
                object: id.to_string(),
            })?;
        for child in stub.children() {
            self.release_quietly(child);
        }
        tracing::debug!(mock = %stub.object(), "released mock");
        Ok(())
    }

    /// Release handles that may already be gone (e.g. children shared by two clears).
    pub(crate) fn release_quietly(&self, id: ObjectId) {
        if self.release(id).is_err() {
            tracing::trace!(object = %id, "child mock already released");
        }
    }

    // ==================== Unmatched calls ====================

    /// Answer a call that matched no entry, according to the stub's kind.
    pub fn fallback(
        &self,
        stub: &Stub,
        invocation: &Invocation,
        original: Option<&OriginalCall<'_>>,
    ) -> MockResult<Value> {
        let returns = &invocation.method.returns;
        match stub.kind() {
            MockKind::Spy => Answer::CallOriginal.respond(invocation, original),
            MockKind::Relaxed => match returns {
                ValueType::Object(class) => Ok(Value::Object(self.relaxed_child(stub, invocation, class))),
                other => Ok(Value::default_for(other)),
            },
            MockKind::RelaxedUnit if *returns == ValueType::Unit => Ok(Value::Unit),
            MockKind::Strict | MockKind::RelaxedUnit => Err(MockError::NoAnswerFound {
                target: stub.object().to_string(),
                call: invocation.to_string(),
                registered: stub.registered_matchers(),
            }),
        }
    }

    /// Memoized child for an object-returning call on a relaxed mock.
    fn relaxed_child(&self, stub: &Stub, invocation: &Invocation, class: &str) -> ObjectRef {
        let matcher = InvocationMatcher::exact(invocation);
        if let Some(child) = stub.find_chain_child(&matcher) {
            return child;
        }
        let child = self.create_child(stub, class);
        // Counts as hit by the call that created it.
        stub.add_answer(matcher, Answer::constant(Value::Object(child.clone())));
        stub.resolve(invocation, false);
        child
    }
}
