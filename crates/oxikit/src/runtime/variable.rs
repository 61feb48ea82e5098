//! Typed variables.
//!
//! A [`VariableValue`] is a closed tagged union over the scalar kinds, owned
//! strings, booleans and weak pointers. Objects store their properties as a
//! map of these; [`VariableList`] is the ordered, named list form.
//!
//! Ownership follows the kind:
//!
//! - `String` owns its buffer. Cloning a value (or duplicating a list)
//!   copies it.
//! - `Pointer` holds a [`Weak`] reference and never keeps its target alive.
//!
//! No conversion between kinds ever happens implicitly. Asking for an `i32`
//! when a `u8` is stored is a mismatch, not a widening.
//!
//! # Example
//!
//! ```rust
//! use oxikit::runtime::variable::{VariableKind, VariableValue};
//!
//! let value = VariableValue::from(42_i32);
//! assert_eq!(value.kind(), VariableKind::I32);
//! assert_eq!(value.get::<i32>(), Some(42));
//! assert_eq!(value.get::<i64>(), None);
//! ```

use crate::error::{Error, Result};
use oxikit_io::{DataSource, DataSourceExt};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// The kind tag of a [`VariableValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// `u8`
    U8,
    /// `i8`
    I8,
    /// `u16`
    U16,
    /// `i16`
    I16,
    /// `u32`
    U32,
    /// `i32`
    I32,
    /// `u64`
    U64,
    /// `i64`
    I64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `bool`
    Bool,
    /// Owned UTF-8 string
    String,
    /// Weak, untyped pointer
    Pointer,
}

impl VariableKind {
    /// All kinds, in tag order.
    pub const ALL: [VariableKind; 13] = [
        VariableKind::U8,
        VariableKind::I8,
        VariableKind::U16,
        VariableKind::I16,
        VariableKind::U32,
        VariableKind::I32,
        VariableKind::U64,
        VariableKind::I64,
        VariableKind::F32,
        VariableKind::F64,
        VariableKind::Bool,
        VariableKind::String,
        VariableKind::Pointer,
    ];

    /// Returns the archive tag for this kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            VariableKind::U8 => 1,
            VariableKind::I8 => 2,
            VariableKind::U16 => 3,
            VariableKind::I16 => 4,
            VariableKind::U32 => 5,
            VariableKind::I32 => 6,
            VariableKind::U64 => 7,
            VariableKind::I64 => 8,
            VariableKind::F32 => 9,
            VariableKind::F64 => 10,
            VariableKind::Bool => 11,
            VariableKind::String => 12,
            VariableKind::Pointer => 13,
        }
    }

    /// Decodes an archive tag.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Returns a short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            VariableKind::U8 => "u8",
            VariableKind::I8 => "i8",
            VariableKind::U16 => "u16",
            VariableKind::I16 => "i16",
            VariableKind::U32 => "u32",
            VariableKind::I32 => "i32",
            VariableKind::U64 => "u64",
            VariableKind::I64 => "i64",
            VariableKind::F32 => "f32",
            VariableKind::F64 => "f64",
            VariableKind::Bool => "bool",
            VariableKind::String => "string",
            VariableKind::Pointer => "pointer",
        }
    }

    /// Returns whether values of this kind are written to archives.
    ///
    /// Pointers are weak references into the running process and are not.
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        !matches!(self, VariableKind::Pointer)
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A weak, type-erased pointer.
///
/// Never keeps its target alive. Two pointers are equal when they refer to
/// the same allocation (or are both null).
#[derive(Clone, Default)]
pub struct Pointer(Option<Weak<dyn Any + Send + Sync>>);

impl Pointer {
    /// Returns a pointer to nothing.
    #[must_use]
    pub const fn null() -> Self {
        Pointer(None)
    }

    /// Returns a weak pointer to `target`.
    #[must_use]
    pub fn to<T: Any + Send + Sync>(target: &Arc<T>) -> Self {
        let weak = Arc::downgrade(target);
        let weak: Weak<dyn Any + Send + Sync> = weak;
        Pointer(Some(weak))
    }

    /// Wraps an existing weak reference.
    #[must_use]
    pub fn from_weak(weak: Weak<dyn Any + Send + Sync>) -> Self {
        Pointer(Some(weak))
    }

    /// Returns the target if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.0.as_ref()?.upgrade()
    }

    /// Returns the target as a `T` if it is alive and of that type.
    #[must_use]
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.upgrade()?.downcast::<T>().ok()
    }

    /// Returns whether the pointer is null or its target is gone.
    #[must_use]
    pub fn is_dangling(&self) -> bool {
        self.0.as_ref().is_none_or(|weak| weak.strong_count() == 0)
    }

    fn addr(&self) -> *const () {
        self.0
            .as_ref()
            .map_or(std::ptr::null(), |weak| weak.as_ptr().cast::<()>())
    }
}

impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_none() {
            write!(f, "Pointer(null)")
        } else {
            write!(f, "Pointer({:p})", self.addr())
        }
    }
}

/// A typed variable payload.
#[derive(Debug, Clone, PartialEq)]
pub enum VariableValue {
    /// `u8`
    U8(u8),
    /// `i8`
    I8(i8),
    /// `u16`
    U16(u16),
    /// `i16`
    I16(i16),
    /// `u32`
    U32(u32),
    /// `i32`
    I32(i32),
    /// `u64`
    U64(u64),
    /// `i64`
    I64(i64),
    /// `f32`
    F32(f32),
    /// `f64`
    F64(f64),
    /// `bool`
    Bool(bool),
    /// Owned string
    String(String),
    /// Weak pointer
    Pointer(Pointer),
}

impl VariableValue {
    /// Returns the kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> VariableKind {
        match self {
            VariableValue::U8(_) => VariableKind::U8,
            VariableValue::I8(_) => VariableKind::I8,
            VariableValue::U16(_) => VariableKind::U16,
            VariableValue::I16(_) => VariableKind::I16,
            VariableValue::U32(_) => VariableKind::U32,
            VariableValue::I32(_) => VariableKind::I32,
            VariableValue::U64(_) => VariableKind::U64,
            VariableValue::I64(_) => VariableKind::I64,
            VariableValue::F32(_) => VariableKind::F32,
            VariableValue::F64(_) => VariableKind::F64,
            VariableValue::Bool(_) => VariableKind::Bool,
            VariableValue::String(_) => VariableKind::String,
            VariableValue::Pointer(_) => VariableKind::Pointer,
        }
    }

    /// Returns the payload as `T` if the kinds match exactly.
    #[must_use]
    pub fn get<T: VariableType>(&self) -> Option<T> {
        T::from_value(self)
    }

    /// Returns the string payload, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VariableValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Writes the payload (without kind tag) to `ds`.
    ///
    /// Pointer payloads are empty.
    ///
    /// # Errors
    ///
    /// Any write error of the data source.
    pub fn encode(&self, ds: &mut dyn DataSource) -> Result<()> {
        match self {
            VariableValue::U8(v) => ds.write_u8(*v)?,
            VariableValue::I8(v) => ds.write_i8(*v)?,
            VariableValue::U16(v) => ds.write_u16(*v)?,
            VariableValue::I16(v) => ds.write_i16(*v)?,
            VariableValue::U32(v) => ds.write_u32(*v)?,
            VariableValue::I32(v) => ds.write_i32(*v)?,
            VariableValue::U64(v) => ds.write_u64(*v)?,
            VariableValue::I64(v) => ds.write_i64(*v)?,
            VariableValue::F32(v) => ds.write_f32(*v)?,
            VariableValue::F64(v) => ds.write_f64(*v)?,
            VariableValue::Bool(v) => ds.write_bool(*v)?,
            VariableValue::String(v) => ds.write_string(v)?,
            VariableValue::Pointer(_) => {}
        }
        Ok(())
    }

    /// Reads a payload of the given kind from `ds`.
    ///
    /// Pointers decode as null.
    ///
    /// # Errors
    ///
    /// Any read error of the data source.
    pub fn decode(kind: VariableKind, ds: &mut dyn DataSource) -> Result<Self> {
        Ok(match kind {
            VariableKind::U8 => VariableValue::U8(ds.read_u8()?),
            VariableKind::I8 => VariableValue::I8(ds.read_i8()?),
            VariableKind::U16 => VariableValue::U16(ds.read_u16()?),
            VariableKind::I16 => VariableValue::I16(ds.read_i16()?),
            VariableKind::U32 => VariableValue::U32(ds.read_u32()?),
            VariableKind::I32 => VariableValue::I32(ds.read_i32()?),
            VariableKind::U64 => VariableValue::U64(ds.read_u64()?),
            VariableKind::I64 => VariableValue::I64(ds.read_i64()?),
            VariableKind::F32 => VariableValue::F32(ds.read_f32()?),
            VariableKind::F64 => VariableValue::F64(ds.read_f64()?),
            VariableKind::Bool => VariableValue::Bool(ds.read_bool()?),
            VariableKind::String => VariableValue::String(ds.read_string()?),
            VariableKind::Pointer => VariableValue::Pointer(Pointer::null()),
        })
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableValue::U8(v) => write!(f, "{v}"),
            VariableValue::I8(v) => write!(f, "{v}"),
            VariableValue::U16(v) => write!(f, "{v}"),
            VariableValue::I16(v) => write!(f, "{v}"),
            VariableValue::U32(v) => write!(f, "{v}"),
            VariableValue::I32(v) => write!(f, "{v}"),
            VariableValue::U64(v) => write!(f, "{v}"),
            VariableValue::I64(v) => write!(f, "{v}"),
            VariableValue::F32(v) => write!(f, "{v}"),
            VariableValue::F64(v) => write!(f, "{v}"),
            VariableValue::Bool(v) => write!(f, "{v}"),
            VariableValue::String(v) => write!(f, "{v:?}"),
            VariableValue::Pointer(p) => write!(f, "{p:?}"),
        }
    }
}

/// A Rust type that maps onto exactly one [`VariableKind`].
pub trait VariableType: Sized {
    /// The kind this type is stored as.
    const KIND: VariableKind;

    /// Extracts `Self` from a value of the same kind.
    fn from_value(value: &VariableValue) -> Option<Self>;

    /// Wraps `self` into a value.
    fn into_value(self) -> VariableValue;
}

macro_rules! variable_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl VariableType for $ty {
                const KIND: VariableKind = VariableKind::$variant;

                fn from_value(value: &VariableValue) -> Option<Self> {
                    match value {
                        VariableValue::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }

                fn into_value(self) -> VariableValue {
                    VariableValue::$variant(self)
                }
            }

            impl From<$ty> for VariableValue {
                fn from(value: $ty) -> Self {
                    VariableValue::$variant(value)
                }
            }
        )*
    };
}

variable_type! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    bool => Bool,
    String => String,
    Pointer => Pointer,
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::String(value.to_string())
    }
}

/// A named variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Current value.
    pub value: VariableValue,
}

impl Variable {
    /// Creates a named variable.
    pub fn new(name: impl Into<String>, value: impl Into<VariableValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An ordered list of named variables.
///
/// Order is significant. Names are not required to be unique; lookups by
/// name return the first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableList {
    items: Vec<Variable>,
}

impl VariableList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the entries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.items.iter()
    }

    /// Appends an entry at the end.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<VariableValue>) {
        self.items.push(Variable::new(name, value));
    }

    /// Inserts an entry before position `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if `index > len`.
    pub fn insert(
        &mut self,
        index: usize,
        name: impl Into<String>,
        value: impl Into<VariableValue>,
    ) -> Result<()> {
        if index > self.items.len() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        self.items.insert(index, Variable::new(name, value));
        Ok(())
    }

    /// Removes and returns the entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfBounds`] if `index >= len`.
    pub fn remove(&mut self, index: usize) -> Result<Variable> {
        if index >= self.items.len() {
            return Err(Error::IndexOutOfBounds {
                index,
                len: self.items.len(),
            });
        }
        Ok(self.items.remove(index))
    }

    /// Returns the entry at `index`.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<&Variable> {
        self.items.get(index)
    }

    /// Returns the value of the first entry named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&VariableValue> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .map(|item| &item.value)
    }

    /// Returns a copy of the list.
    ///
    /// String payloads are copied into new buffers; pointer payloads stay
    /// weak references to the same targets.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        self.clone()
    }
}

impl<'a> IntoIterator for &'a VariableList {
    type Item = &'a Variable;
    type IntoIter = std::slice::Iter<'a, Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Variable> for VariableList {
    fn from_iter<I: IntoIterator<Item = Variable>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxikit_io::MemorySource;

    #[test]
    fn test_kind_tags_roundtrip() {
        for kind in VariableKind::ALL {
            assert_eq!(VariableKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(VariableKind::from_tag(0), None);
        assert_eq!(VariableKind::from_tag(200), None);
    }

    #[test]
    fn test_no_implicit_conversion() {
        let value = VariableValue::U8(7);
        assert_eq!(value.get::<u8>(), Some(7));
        assert_eq!(value.get::<u16>(), None);
        assert_eq!(value.get::<i8>(), None);
        assert_eq!(value.get::<f32>(), None);
    }

    #[test]
    fn test_string_value() {
        let value = VariableValue::from("label");
        assert_eq!(value.kind(), VariableKind::String);
        assert_eq!(value.as_str(), Some("label"));
        assert_eq!(value.get::<String>().as_deref(), Some("label"));
    }

    #[test]
    fn test_pointer_is_weak() {
        let target = Arc::new(5_u32);
        let ptr = Pointer::to(&target);
        assert_eq!(ptr.downcast::<u32>().as_deref(), Some(&5));
        assert!(ptr.downcast::<i64>().is_none());
        assert_eq!(Arc::strong_count(&target), 1);

        drop(target);
        assert!(ptr.is_dangling());
        assert!(ptr.upgrade().is_none());
    }

    #[test]
    fn test_pointer_equality() {
        let a = Arc::new(1_u8);
        let b = Arc::new(1_u8);
        assert_eq!(Pointer::to(&a), Pointer::to(&a));
        assert_ne!(Pointer::to(&a), Pointer::to(&b));
        assert_eq!(Pointer::null(), Pointer::default());
    }

    #[test]
    fn test_encode_decode_each_kind() {
        let values = vec![
            VariableValue::U8(1),
            VariableValue::I8(-1),
            VariableValue::U16(300),
            VariableValue::I16(-300),
            VariableValue::U32(70_000),
            VariableValue::I32(-70_000),
            VariableValue::U64(u64::MAX),
            VariableValue::I64(i64::MIN),
            VariableValue::F32(0.5),
            VariableValue::F64(-2.25),
            VariableValue::Bool(true),
            VariableValue::from("text"),
        ];
        let mut ds = MemorySource::new();
        ds.set_type_tags(true);
        for value in &values {
            value.encode(&mut ds).unwrap();
        }
        ds.rewind().unwrap();
        for value in &values {
            assert_eq!(&VariableValue::decode(value.kind(), &mut ds).unwrap(), value);
        }
    }

    #[test]
    fn test_list_operations() {
        let mut list = VariableList::new();
        list.append("a", 1_i32);
        list.append("c", 3_i32);
        list.insert(1, "b", 2_i32).unwrap();

        let names: Vec<_> = list.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);

        assert!(matches!(
            list.insert(9, "z", 0_i32),
            Err(Error::IndexOutOfBounds { index: 9, len: 3 })
        ));

        let removed = list.remove(0).unwrap();
        assert_eq!(removed.name, "a");
        assert_eq!(list.get("b"), Some(&VariableValue::I32(2)));
        assert!(matches!(
            list.remove(2),
            Err(Error::IndexOutOfBounds { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_duplicate_copies_strings() {
        let target = Arc::new(0_u8);
        let mut list = VariableList::new();
        list.append("title", "hello");
        list.append("target", Pointer::to(&target));

        let copy = list.duplicate();
        assert_eq!(copy, list);

        let original = list.get("title").and_then(VariableValue::as_str).unwrap();
        let duplicate = copy.get("title").and_then(VariableValue::as_str).unwrap();
        assert_eq!(original, duplicate);
        assert_ne!(original.as_ptr(), duplicate.as_ptr());

        // Pointers stay weak and shared.
        assert_eq!(Arc::strong_count(&target), 1);
        assert_eq!(copy.get("target"), list.get("target"));

        drop(list);
        assert_eq!(copy.get("title").and_then(VariableValue::as_str), Some("hello"));
    }
}
