//! Objects and the object tree.
//!
//! # Architecture
//!
//! Every object is an instance of one [`Class`]. Objects form a tree:
//!
//! - A parent owns its children. Children hold only a weak back-reference,
//!   so dropping or destroying a parent never leaks a cycle.
//! - Sibling names are unique. The parent keeps the set of its children's
//!   names, which makes the uniqueness check a single lookup.
//! - Each object carries a map of named [`VariableValue`]s, an optional
//!   typed instance payload and the list of timers it owns.
//!
//! [`Object`] is a cheap, clonable handle. Two handles are equal when they
//! refer to the same object.
//!
//! # Thread Safety
//!
//! Each object has its own lock. Operations that touch one object take only
//! that lock. Structural changes (attach, detach, rename) first take the
//! runtime's structure lock and then lock parent before child, so no two
//! threads can ever wait on each other's object locks. No lock is held
//! while a class hook runs.

use crate::error::{Error, Result, invariant_violation};
use crate::runtime::binding::Binding;
use crate::runtime::class::{Class, matches};
use crate::runtime::context::RuntimeInner;
use crate::runtime::timer::TimerId;
use crate::runtime::variable::{Pointer, Variable, VariableList, VariableType, VariableValue};
use crate::sync::lock;
use fxhash::{FxHashMap, FxHashSet};
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, trace};

/// Separator between names in an object path.
pub const PATH_SEPARATOR: char = '/';

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Returns the raw identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

pub(crate) struct ObjectInner {
    id: ObjectId,
    class: Arc<Class>,
    runtime: Weak<RuntimeInner>,
    pub(crate) state: Mutex<ObjectState>,
    instance: Mutex<Option<Box<dyn Any + Send>>>,
}

pub(crate) struct ObjectState {
    pub(crate) name: String,
    pub(crate) parent: Weak<ObjectInner>,
    pub(crate) children: Vec<Object>,
    pub(crate) child_names: FxHashSet<String>,
    pub(crate) variables: FxHashMap<String, VariableValue>,
    pub(crate) timers: Vec<TimerId>,
    pub(crate) destroyed: bool,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        self.class.release_instance();
    }
}

/// A handle to an object in the tree.
#[derive(Clone)]
pub struct Object {
    pub(crate) inner: Arc<ObjectInner>,
}

/// A non-owning handle to an object.
#[derive(Clone, Default)]
pub struct WeakObject(Weak<ObjectInner>);

impl WeakObject {
    /// Returns the object if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Object> {
        self.0.upgrade().map(|inner| Object { inner })
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(object) => write!(f, "WeakObject({object:?})"),
            None => f.write_str("WeakObject(<dropped>)"),
        }
    }
}

/// Checks that `name` can be used as an object name.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] for empty names and names containing
/// [`PATH_SEPARATOR`].
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(PATH_SEPARATOR) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Object {
    /// Constructs an unattached object and runs its `init` hooks, root
    /// class first.
    pub(crate) fn instantiate(runtime: Weak<RuntimeInner>, class: Arc<Class>, name: String) -> Self {
        let instance = class.new_instance();
        let id = ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed));
        let object = Object {
            inner: Arc::new(ObjectInner {
                id,
                class,
                runtime,
                state: Mutex::new(ObjectState {
                    name,
                    parent: Weak::new(),
                    children: Vec::new(),
                    child_names: FxHashSet::default(),
                    variables: FxHashMap::default(),
                    timers: Vec::new(),
                    destroyed: false,
                }),
                instance: Mutex::new(instance),
            }),
        };
        for class in object.inner.class.lineage() {
            class.hooks().init(&object);
        }
        trace!(id = id.0, class = object.hierarchy(), "created object");
        object
    }

    pub(crate) fn runtime(&self) -> Result<Arc<RuntimeInner>> {
        self.inner.runtime.upgrade().ok_or(Error::RuntimeGone)
    }

    pub(crate) fn state(&self) -> std::sync::MutexGuard<'_, ObjectState> {
        lock(&self.inner.state)
    }

    /// Returns the object identifier.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    /// Returns the object's name.
    #[must_use]
    pub fn name(&self) -> String {
        self.state().name.clone()
    }

    /// Returns the object's class.
    #[must_use]
    pub fn class(&self) -> &Arc<Class> {
        &self.inner.class
    }

    /// Returns the hierarchy path of the object's class.
    #[must_use]
    pub fn hierarchy(&self) -> &str {
        self.inner.class.hierarchy()
    }

    /// Returns whether the object's class path matches `pattern`.
    ///
    /// See [`matches`] for the pattern syntax.
    #[must_use]
    pub fn of_class(&self, pattern: &str) -> bool {
        matches(self.hierarchy(), pattern)
    }

    /// Returns whether the object's class is `class` or descends from it.
    #[must_use]
    pub fn is_a(&self, class: &Class) -> bool {
        self.inner.class.is_a(class)
    }

    /// Returns whether two handles refer to the same object.
    #[must_use]
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Arc::downgrade(&self.inner))
    }

    /// Returns a weak pointer to this object, for storing in a variable.
    #[must_use]
    pub fn to_pointer(&self) -> Pointer {
        Pointer::to(&self.inner)
    }

    /// Resolves a pointer created by [`Object::to_pointer`].
    #[must_use]
    pub fn from_pointer(pointer: &Pointer) -> Option<Object> {
        pointer.downcast::<ObjectInner>().map(|inner| Object { inner })
    }

    /// Returns whether the object has been destroyed.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    // ===================================================================
    // Tree
    // ===================================================================

    /// Returns the parent, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<Object> {
        self.state().parent.upgrade().map(|inner| Object { inner })
    }

    /// Returns whether the object has a parent.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state().parent.strong_count() > 0
    }

    /// Returns the children in attach order.
    #[must_use]
    pub fn children(&self) -> Vec<Object> {
        self.state().children.clone()
    }

    /// Returns the number of children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.state().children.len()
    }

    /// Returns the child named `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<Object> {
        let children = {
            let state = self.state();
            if !state.child_names.contains(name) {
                return None;
            }
            state.children.clone()
        };
        children.into_iter().find(|child| child.state().name == name)
    }

    /// Returns the topmost ancestor (the object itself if unattached).
    #[must_use]
    pub fn root(&self) -> Object {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Iterates over the ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = Object> {
        std::iter::successors(self.parent(), Object::parent)
    }

    /// Returns the path from the topmost ancestor to this object.
    ///
    /// The topmost ancestor itself is `"/"`. Resolving the path with
    /// [`Object::find`] from that ancestor yields this object again.
    #[must_use]
    pub fn path(&self) -> String {
        let mut names = Vec::new();
        let mut seen = FxHashSet::default();
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            if !seen.insert(current.id()) {
                // Unreachable while `attach` guards against cycles.
                invariant_violation(format_args!("object tree cycle through \"{}\"", current.name()));
            }
            names.push(current.name());
            current = parent;
        }
        if names.is_empty() {
            return PATH_SEPARATOR.to_string();
        }
        names.iter().rev().fold(String::new(), |mut path, name| {
            path.push(PATH_SEPARATOR);
            path.push_str(name);
            path
        })
    }

    /// Resolves a `/`-separated path relative to this object.
    ///
    /// Empty segments are ignored, so `"a/b"`, `"/a/b"` and `"a//b/"` are
    /// the same path, and `""` resolves to the object itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathNotFound`] naming the first segment with no
    /// matching child.
    pub fn find(&self, path: &str) -> Result<Object> {
        let mut current = self.clone();
        for segment in path.split(PATH_SEPARATOR).filter(|s| !s.is_empty()) {
            current = current.child(segment).ok_or_else(|| Error::PathNotFound {
                path: path.to_string(),
                segment: segment.to_string(),
            })?;
        }
        Ok(current)
    }

    /// Visits this object and its descendants depth-first, parents before
    /// children. `visit` receives each object and its depth below `self`.
    pub fn walk(&self, visit: &mut dyn FnMut(&Object, usize)) {
        self.walk_at(0, visit);
    }

    fn walk_at(&self, depth: usize, visit: &mut dyn FnMut(&Object, usize)) {
        visit(self, depth);
        for child in self.children() {
            child.walk_at(depth + 1, visit);
        }
    }

    /// Returns every descendant in depth-first order.
    #[must_use]
    pub fn descendants(&self) -> Vec<Object> {
        let mut found = Vec::new();
        self.walk(&mut |object, depth| {
            if depth > 0 {
                found.push(object.clone());
            }
        });
        found
    }

    /// Returns the first name `<prefix><n>` (n = 0, 1, ...) not used by a
    /// child.
    ///
    /// The name is not reserved; a concurrent attach may still take it.
    #[must_use]
    pub fn generate_name(&self, prefix: &str) -> String {
        let state = self.state();
        (0_u64..)
            .map(|n| format!("{prefix}{n}"))
            .find(|name| !state.child_names.contains(name))
            .unwrap_or_else(|| prefix.to_string())
    }

    /// Renames the object.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidName`] if `name` is not a valid name
    /// - [`Error::NameCollision`] if a sibling already uses `name`
    /// - [`Error::RuntimeGone`] if the runtime was dropped
    pub fn rename(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let runtime = self.runtime()?;
        let _structure = lock(&runtime.structure);

        match self.parent() {
            Some(parent) => {
                let mut parent_state = parent.state();
                let mut state = self.state();
                if state.name == name {
                    return Ok(());
                }
                if parent_state.child_names.contains(name) {
                    return Err(Error::NameCollision {
                        parent: parent_state.name.clone(),
                        name: name.to_string(),
                    });
                }
                parent_state.child_names.remove(&state.name);
                parent_state.child_names.insert(name.to_string());
                state.name = name.to_string();
            }
            None => self.state().name = name.to_string(),
        }
        Ok(())
    }

    /// Attaches `child` under this object.
    ///
    /// # Errors
    ///
    /// - [`Error::WouldCycle`] if `child` is this object or an ancestor
    /// - [`Error::AlreadyAttached`] if `child` has a parent
    /// - [`Error::NameCollision`] if a child with the same name exists
    /// - [`Error::ObjectDestroyed`] if either object was destroyed
    /// - [`Error::RuntimeGone`] if the runtime was dropped
    ///
    /// On error the tree is unchanged.
    pub fn attach(&self, child: &Object) -> Result<()> {
        let runtime = self.runtime()?;
        let _structure = lock(&runtime.structure);

        if self.ptr_eq(child) || self.ancestors().any(|a| a.ptr_eq(child)) {
            return Err(Error::WouldCycle {
                parent: self.name(),
                child: child.name(),
            });
        }

        let mut parent_state = self.state();
        if parent_state.destroyed {
            return Err(Error::ObjectDestroyed(parent_state.name.clone()));
        }
        let mut child_state = child.state();
        if child_state.destroyed {
            return Err(Error::ObjectDestroyed(child_state.name.clone()));
        }
        if child_state.parent.strong_count() > 0 {
            return Err(Error::AlreadyAttached(child_state.name.clone()));
        }
        if parent_state.child_names.contains(&child_state.name) {
            return Err(Error::NameCollision {
                parent: parent_state.name.clone(),
                name: child_state.name.clone(),
            });
        }

        parent_state.child_names.insert(child_state.name.clone());
        parent_state.children.push(child.clone());
        child_state.parent = Arc::downgrade(&self.inner);
        debug!(parent = %parent_state.name, child = %child_state.name, "attached");
        Ok(())
    }

    /// Detaches `child` and destroys its subtree.
    ///
    /// Destruction runs leaves first; each object's timers are cancelled
    /// (except those flagged to survive detach) and its `destroy` hooks
    /// run leaf class first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAChild`] if `child` is not a child of this
    /// object, or [`Error::RuntimeGone`].
    pub fn detach(&self, child: &Object) -> Result<()> {
        let child = self.unlink(child)?;
        child.destroy_subtree();
        Ok(())
    }

    /// Detaches `child` and hands it back intact.
    ///
    /// Timers in the subtree that are not flagged to survive detach are
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Same as [`Object::detach`].
    pub fn take_child(&self, child: &Object) -> Result<Object> {
        let child = self.unlink(child)?;
        child.cancel_detach_timers();
        Ok(child)
    }

    /// Destroys this object and its subtree, detaching it first if it has
    /// a parent. Destroying twice does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RuntimeGone`] if the object is attached and its
    /// runtime was dropped.
    pub fn destroy(&self) -> Result<()> {
        match self.parent() {
            Some(parent) => parent.detach(self),
            None => {
                self.destroy_subtree();
                Ok(())
            }
        }
    }

    fn unlink(&self, child: &Object) -> Result<Object> {
        let child_name = child.name();
        let runtime = self.runtime()?;
        let _structure = lock(&runtime.structure);

        let mut parent_state = self.state();
        let index = parent_state
            .children
            .iter()
            .position(|c| c.ptr_eq(child))
            .ok_or_else(|| Error::NotAChild {
                parent: parent_state.name.clone(),
                child: child_name,
            })?;
        let child = parent_state.children.remove(index);
        let mut child_state = child.state();
        parent_state.child_names.remove(&child_state.name);
        child_state.parent = Weak::new();
        debug!(parent = %parent_state.name, child = %child_state.name, "detached");
        drop(child_state);
        Ok(child)
    }

    pub(crate) fn destroy_subtree(&self) {
        let (children, timers) = {
            let mut state = self.state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.child_names.clear();
            (
                std::mem::take(&mut state.children),
                std::mem::take(&mut state.timers),
            )
        };

        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.timers.cancel_on_detach(&timers);
        }
        // The parent link goes only after the child is marked destroyed, so
        // the child can never be attached elsewhere mid-teardown.
        for child in children {
            child.destroy_subtree();
            child.state().parent = Weak::new();
        }
        for class in self.inner.class.ancestors() {
            class.hooks().destroy(self);
        }

        self.state().variables.clear();
        *lock(&self.inner.instance) = None;
        trace!(id = self.inner.id.0, class = self.hierarchy(), "destroyed object");
    }

    fn cancel_detach_timers(&self) {
        let Some(runtime) = self.inner.runtime.upgrade() else {
            return;
        };
        self.walk(&mut |object, _| {
            let owned = object.state().timers.clone();
            let cancelled = runtime.timers.cancel_on_detach(&owned);
            if !cancelled.is_empty() {
                object.state().timers.retain(|id| !cancelled.contains(id));
            }
        });
    }

    // ===================================================================
    // Variables
    // ===================================================================

    /// Sets a variable, replacing any previous value of any kind.
    ///
    /// Returns the previous value.
    pub fn set(&self, key: &str, value: impl Into<VariableValue>) -> Option<VariableValue> {
        self.state().variables.insert(key.to_string(), value.into())
    }

    /// Returns a copy of a variable's value.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<VariableValue> {
        self.state().variables.get(key).cloned()
    }

    /// Returns a variable as `T`.
    ///
    /// # Errors
    ///
    /// - [`Error::VariableNotFound`] if the variable does not exist
    /// - [`Error::KindMismatch`] if it holds a different kind
    pub fn get<T: VariableType>(&self, key: &str) -> Result<T> {
        let state = self.state();
        let value = state
            .variables
            .get(key)
            .ok_or_else(|| Error::VariableNotFound(key.to_string()))?;
        T::from_value(value).ok_or_else(|| Error::KindMismatch {
            key: key.to_string(),
            expected: T::KIND,
            found: value.kind(),
        })
    }

    /// Returns a variable as `T`, or `default` if it is missing or of
    /// another kind.
    #[must_use]
    pub fn get_or<T: VariableType>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Removes a variable, returning its value.
    pub fn unset(&self, key: &str) -> Option<VariableValue> {
        self.state().variables.remove(key)
    }

    /// Returns whether a variable exists.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.state().variables.contains_key(key)
    }

    /// Returns variable names in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.state().variables.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns a snapshot of all variables, sorted by name.
    #[must_use]
    pub fn variables(&self) -> VariableList {
        let mut vars: Vec<_> = self
            .state()
            .variables
            .iter()
            .map(|(key, value)| Variable::new(key.clone(), value.clone()))
            .collect();
        vars.sort_by(|a, b| a.name.cmp(&b.name));
        vars.into_iter().collect()
    }

    /// Binds an existing variable for later access.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VariableNotFound`] if the variable does not exist.
    pub fn bind(&self, key: &str) -> Result<Binding> {
        let kind = self
            .state()
            .variables
            .get(key)
            .map(VariableValue::kind)
            .ok_or_else(|| Error::VariableNotFound(key.to_string()))?;
        Ok(Binding::new(self.downgrade(), key.to_string(), kind))
    }

    // ===================================================================
    // Instance data and hooks
    // ===================================================================

    /// Runs `f` on the instance payload if it is a `T`.
    ///
    /// Returns `None` if the class has no payload of that type or the
    /// object was destroyed.
    pub fn with_instance<T: Any, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut instance = lock(&self.inner.instance);
        instance.as_mut()?.downcast_mut::<T>().map(f)
    }

    /// Runs the `reset` hooks, leaf class first.
    pub fn reset(&self) {
        for class in self.inner.class.ancestors() {
            class.hooks().reset(self);
        }
    }

    /// Builds an editor for this object using the most derived class that
    /// provides one.
    #[must_use]
    pub fn edit(&self) -> Option<Object> {
        self.inner
            .class
            .ancestors()
            .find_map(|class| class.hooks().edit(self))
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl Hash for Object {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.inner.id.0)
            .field("name", &self.name())
            .field("class", &self.hierarchy())
            .finish()
    }
}
