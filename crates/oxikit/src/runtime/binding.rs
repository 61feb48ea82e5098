//! Variable bindings.
//!
//! A [`Binding`] names one variable of one object, so a consumer (a widget
//! showing a value, a timer updating a counter) can read and write it
//! without holding the object alive. The kind is fixed when the binding is
//! made; writes of another kind are rejected.

use crate::error::{Error, Result};
use crate::runtime::object::{Object, WeakObject};
use crate::runtime::variable::{VariableKind, VariableType, VariableValue};

/// A weak reference to one variable of one object.
#[derive(Debug, Clone)]
pub struct Binding {
    object: WeakObject,
    key: String,
    kind: VariableKind,
}

impl Binding {
    pub(crate) fn new(object: WeakObject, key: String, kind: VariableKind) -> Self {
        Self { object, key, kind }
    }

    /// Returns the bound variable name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the kind fixed at bind time.
    #[must_use]
    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    /// Returns the bound object if it is still alive.
    #[must_use]
    pub fn object(&self) -> Option<Object> {
        self.object.upgrade()
    }

    fn target(&self) -> Result<Object> {
        self.object
            .upgrade()
            .ok_or_else(|| Error::ObjectDestroyed(format!("<binding {}>", self.key)))
    }

    /// Reads the current value.
    ///
    /// # Errors
    ///
    /// - [`Error::ObjectDestroyed`] if the object is gone
    /// - [`Error::VariableNotFound`] if the variable was unset
    pub fn get(&self) -> Result<VariableValue> {
        self.target()?
            .value(&self.key)
            .ok_or_else(|| Error::VariableNotFound(self.key.clone()))
    }

    /// Reads the current value as `T`.
    ///
    /// # Errors
    ///
    /// As [`Binding::get`], plus [`Error::KindMismatch`].
    pub fn get_as<T: VariableType>(&self) -> Result<T> {
        self.target()?.get(&self.key)
    }

    /// Writes a new value of the bound kind.
    ///
    /// # Errors
    ///
    /// - [`Error::ObjectDestroyed`] if the object is gone
    /// - [`Error::KindMismatch`] if `value` is of another kind
    pub fn set(&self, value: impl Into<VariableValue>) -> Result<()> {
        let value = value.into();
        if value.kind() != self.kind {
            return Err(Error::KindMismatch {
                key: self.key.clone(),
                expected: self.kind,
                found: value.kind(),
            });
        }
        self.target()?.set(&self.key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Runtime;

    #[test]
    fn test_binding_reads_and_writes() {
        let rt = Runtime::new();
        let obj = rt.new_object("Object", "counter").unwrap();
        obj.set("count", 1_u32);

        let binding = obj.bind("count").unwrap();
        assert_eq!(binding.kind(), VariableKind::U32);
        binding.set(5_u32).unwrap();
        assert_eq!(obj.get::<u32>("count").unwrap(), 5);
        assert_eq!(binding.get_as::<u32>().unwrap(), 5);
        assert_eq!(binding.get().unwrap(), VariableValue::U32(5));
    }

    #[test]
    fn test_binding_keeps_kind() {
        let rt = Runtime::new();
        let obj = rt.new_object("Object", "counter").unwrap();
        obj.set("count", 1_u32);
        let binding = obj.bind("count").unwrap();

        let err = binding.set(-1_i32).unwrap_err();
        assert!(matches!(
            err,
            Error::KindMismatch { expected: VariableKind::U32, found: VariableKind::I32, .. }
        ));
        assert_eq!(obj.get::<u32>("count").unwrap(), 1);
    }

    #[test]
    fn test_binding_does_not_keep_object_alive() {
        let rt = Runtime::new();
        let obj = rt.new_object("Object", "short").unwrap();
        obj.set("x", true);
        let binding = obj.bind("x").unwrap();
        assert!(obj.bind("missing").is_err());

        drop(obj);
        assert!(binding.object().is_none());
        assert!(matches!(binding.get(), Err(Error::ObjectDestroyed(_))));
    }
}
