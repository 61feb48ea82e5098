//! Classes and hierarchy paths.
//!
//! A class is identified by its hierarchy path: the colon-separated names
//! of every class from a root down to itself, e.g.
//! `"Object:Widget:Box:Statusbar"`. The path of a class is always its
//! parent's path plus `:` plus its own short name, which the registry
//! enforces at registration.
//!
//! Behaviour is attached through [`ClassHooks`]. When an object is
//! created, loaded, saved or destroyed the hooks of every class in its
//! ancestry run in turn:
//!
//! | Hook      | Order          |
//! |-----------|----------------|
//! | `init`    | root to leaf   |
//! | `load`    | root to leaf   |
//! | `save`    | root to leaf   |
//! | `reset`   | leaf to root   |
//! | `destroy` | leaf to root   |
//!
//! "Is-a" checks come in two forms. [`Class::is_a`] walks the parent chain
//! by [`ClassId`] and never touches strings. [`matches`] compares paths with
//! wildcards and serves callers that only have a pattern string, such as
//! classes loaded from modules at runtime.

use crate::error::{Error, Result, invariant_violation};
use crate::runtime::object::Object;
use oxikit_io::{ArchiveVersion, DataSource};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Separator between names in a hierarchy path.
pub const HIERARCHY_SEPARATOR: char = ':';

/// Separator between a hierarchy path and its module list.
pub const MODULE_SEPARATOR: char = '@';

/// Process-unique identifier of a registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    /// Returns the raw identifier.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

/// Lifecycle hooks of a class.
///
/// Every method has an empty default. Hooks run with no runtime lock held,
/// so they may freely use the object, the tree and the timer wheel.
pub trait ClassHooks: Send + Sync + 'static {
    /// Initializes a freshly constructed object.
    fn init(&self, _object: &Object) {}

    /// Returns the object to a clean state before it is reloaded.
    fn reset(&self, _object: &Object) {}

    /// Releases class-specific resources of an object being destroyed.
    fn destroy(&self, _object: &Object) {}

    /// Reads class-specific data written by [`ClassHooks::save`].
    ///
    /// `version` is the class version found in the archive.
    ///
    /// # Errors
    ///
    /// Any error aborts the load of this object's subtree.
    fn load(
        &self,
        _object: &Object,
        _ds: &mut dyn DataSource,
        _version: ArchiveVersion,
    ) -> Result<()> {
        Ok(())
    }

    /// Writes class-specific data after the object's variables.
    ///
    /// # Errors
    ///
    /// Any error aborts the save.
    fn save(&self, _object: &Object, _ds: &mut dyn DataSource) -> Result<()> {
        Ok(())
    }

    /// Builds an interactive editor for the object, if the class has one.
    ///
    /// The editor is itself an object tree built from widget classes.
    fn edit(&self, _object: &Object) -> Option<Object> {
        None
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ClassHooks for NoHooks {}

type InstanceFactory = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Everything needed to register a class.
///
/// # Example
///
/// ```rust
/// use oxikit::{ClassSpec, Runtime};
///
/// #[derive(Default)]
/// struct Meter {
///     level: u32,
/// }
///
/// let rt = Runtime::new();
/// let class = rt
///     .register(ClassSpec::new("Object:Meter").version(1, 2).instance::<Meter>())
///     .unwrap();
/// assert_eq!(class.name(), "Meter");
/// assert_eq!(class.instance_size(), std::mem::size_of::<Meter>());
/// ```
pub struct ClassSpec {
    pub(crate) hierarchy: String,
    pub(crate) version: ArchiveVersion,
    pub(crate) instance_size: usize,
    pub(crate) factory: Option<InstanceFactory>,
    pub(crate) hooks: Arc<dyn ClassHooks>,
    pub(crate) module: Option<String>,
}

impl ClassSpec {
    /// Starts a spec for the class at `hierarchy`, version 1.0, no instance
    /// data and no hooks.
    pub fn new(hierarchy: impl Into<String>) -> Self {
        Self {
            hierarchy: hierarchy.into(),
            version: ArchiveVersion::new(1, 0),
            instance_size: 0,
            factory: None,
            hooks: Arc::new(NoHooks),
            module: None,
        }
    }

    /// Sets the archive version of the class.
    #[must_use]
    pub fn version(mut self, major: u32, minor: u32) -> Self {
        self.version = ArchiveVersion::new(major, minor);
        self
    }

    /// Gives every instance a `T::default()` payload.
    #[must_use]
    pub fn instance<T: Default + Send + 'static>(self) -> Self {
        self.instance_with(T::default)
    }

    /// Gives every instance a payload built by `make`.
    #[must_use]
    pub fn instance_with<T, F>(mut self, make: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.instance_size = std::mem::size_of::<T>();
        self.factory = Some(Box::new(move || Box::new(make()) as Box<dyn Any + Send>));
        self
    }

    /// Gives every instance an untyped payload of a declared size.
    ///
    /// For classes whose payload type is only known at runtime. The
    /// declared size is checked against every payload the factory builds.
    #[must_use]
    pub fn instance_raw<F>(mut self, size: usize, make: F) -> Self
    where
        F: Fn() -> Box<dyn Any + Send> + Send + Sync + 'static,
    {
        self.instance_size = size;
        self.factory = Some(Box::new(make));
        self
    }

    /// Sets the lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: impl ClassHooks) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Records the module the class was loaded from.
    #[must_use]
    pub(crate) fn module(mut self, name: impl Into<String>) -> Self {
        self.module = Some(name.into());
        self
    }

    /// Returns the hierarchy path this spec registers.
    #[must_use]
    pub fn hierarchy(&self) -> &str {
        &self.hierarchy
    }
}

impl fmt::Debug for ClassSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassSpec")
            .field("hierarchy", &self.hierarchy)
            .field("version", &self.version)
            .field("instance_size", &self.instance_size)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// A registered class.
///
/// Classes are immutable once registered and shared through [`Arc`]. Every
/// object keeps its class alive, and the registry refuses to unregister a
/// class that still has live instances.
pub struct Class {
    id: ClassId,
    hierarchy: String,
    parent: Option<Arc<Class>>,
    depth: usize,
    version: ArchiveVersion,
    instance_size: usize,
    factory: Option<InstanceFactory>,
    hooks: Arc<dyn ClassHooks>,
    module: Option<String>,
    instances: AtomicUsize,
}

impl Class {
    pub(crate) fn from_spec(id: ClassId, spec: ClassSpec, parent: Option<Arc<Class>>) -> Self {
        let depth = parent.as_ref().map_or(0, |p| p.depth + 1);
        Self {
            id,
            hierarchy: spec.hierarchy,
            parent,
            depth,
            version: spec.version,
            instance_size: spec.instance_size,
            factory: spec.factory,
            hooks: spec.hooks,
            module: spec.module,
            instances: AtomicUsize::new(0),
        }
    }

    /// Returns the class identifier.
    #[must_use]
    pub fn id(&self) -> ClassId {
        self.id
    }

    /// Returns the full hierarchy path.
    #[must_use]
    pub fn hierarchy(&self) -> &str {
        &self.hierarchy
    }

    /// Returns the short name (last path segment).
    #[must_use]
    pub fn name(&self) -> &str {
        short_name(&self.hierarchy)
    }

    /// Returns the parent class, or `None` for a root class.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Class>> {
        self.parent.as_ref()
    }

    /// Returns the number of ancestors (0 for a root class).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the archive version.
    #[must_use]
    pub fn version(&self) -> ArchiveVersion {
        self.version
    }

    /// Returns the size of the per-instance payload in bytes.
    #[must_use]
    pub fn instance_size(&self) -> usize {
        self.instance_size
    }

    /// Returns the module the class was loaded from, if any.
    #[must_use]
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Returns the number of live objects of exactly this class.
    #[must_use]
    pub fn live_instances(&self) -> usize {
        self.instances.load(Ordering::Acquire)
    }

    /// Iterates from this class up to its root.
    pub fn ancestors(&self) -> impl Iterator<Item = &Class> {
        std::iter::successors(Some(self), |class| class.parent.as_deref())
    }

    /// Returns the classes from the root down to this one.
    #[must_use]
    pub fn lineage(&self) -> Vec<&Class> {
        let mut lineage: Vec<&Class> = self.ancestors().collect();
        lineage.reverse();
        lineage
    }

    /// Returns whether this class is `other` or descends from it.
    #[must_use]
    pub fn is_a(&self, other: &Class) -> bool {
        // Ancestors sit at strictly smaller depths; skip the walk early.
        if other.depth > self.depth {
            return false;
        }
        self.ancestors().any(|class| class.id == other.id)
    }

    /// Returns whether this class's path matches `pattern`.
    ///
    /// See [`matches`].
    #[must_use]
    pub fn matches(&self, pattern: &str) -> bool {
        matches(&self.hierarchy, pattern)
    }

    pub(crate) fn hooks(&self) -> &dyn ClassHooks {
        self.hooks.as_ref()
    }

    /// Builds an instance payload and counts the new instance.
    pub(crate) fn new_instance(&self) -> Option<Box<dyn Any + Send>> {
        let payload = self.factory.as_ref().map(|make| make());
        if let Some(payload) = &payload {
            let actual = std::mem::size_of_val(payload.as_ref());
            if actual != self.instance_size {
                invariant_violation(format_args!(
                    "class \"{}\" declares instance size {} but built {}",
                    self.hierarchy, self.instance_size, actual
                ));
            }
        }
        self.instances.fetch_add(1, Ordering::AcqRel);
        payload
    }

    pub(crate) fn release_instance(&self) {
        self.instances.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Class {}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("hierarchy", &self.hierarchy)
            .field("version", &self.version)
            .field("instance_size", &self.instance_size)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Returns whether `hierarchy` matches `pattern`.
///
/// - `"*"` matches everything.
/// - `"X:*"` matches `X` itself and every path below it. Matching is
///   anchored at separators, so `"Widget:*"` matches `"Widget:Box"` but
///   not `"WidgetFoo"`.
/// - Anything else must equal the path exactly.
///
/// # Example
///
/// ```rust
/// use oxikit::runtime::class::matches;
///
/// assert!(matches("Widget:Box:Statusbar", "Widget:*"));
/// assert!(matches("Widget", "Widget:*"));
/// assert!(!matches("WidgetFoo", "Widget:*"));
/// assert!(matches("Widget:Box", "Widget:Box"));
/// assert!(matches("anything", "*"));
/// ```
#[must_use]
pub fn matches(hierarchy: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(":*") {
        Some(prefix) => hierarchy
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(HIERARCHY_SEPARATOR)),
        None => hierarchy == pattern,
    }
}

/// Returns the short name of a hierarchy path.
#[must_use]
pub fn short_name(hierarchy: &str) -> &str {
    hierarchy
        .rsplit_once(HIERARCHY_SEPARATOR)
        .map_or(hierarchy, |(_, name)| name)
}

/// Returns the parent path, or `None` for a root path.
#[must_use]
pub fn parent_hierarchy(hierarchy: &str) -> Option<&str> {
    hierarchy
        .rsplit_once(HIERARCHY_SEPARATOR)
        .map(|(parent, _)| parent)
}

/// Splits `"Path:To:Class@mod1,mod2"` into the path and its module names.
#[must_use]
pub fn split_modules(spec: &str) -> (&str, Vec<&str>) {
    match spec.split_once(MODULE_SEPARATOR) {
        Some((hierarchy, modules)) => (
            hierarchy,
            modules
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .collect(),
        ),
        None => (spec, Vec::new()),
    }
}

/// Checks that `hierarchy` is a well-formed path.
///
/// # Errors
///
/// Returns [`Error::InvalidHierarchy`] for empty paths or segments, and
/// for segments containing wildcards, module markers, path separators or
/// whitespace.
pub fn validate_hierarchy(hierarchy: &str) -> Result<()> {
    let invalid = |reason| Error::InvalidHierarchy {
        hierarchy: hierarchy.to_string(),
        reason,
    };
    if hierarchy.is_empty() {
        return Err(invalid("empty path"));
    }
    for segment in hierarchy.split(HIERARCHY_SEPARATOR) {
        if segment.is_empty() {
            return Err(invalid("empty segment"));
        }
        if segment
            .chars()
            .any(|c| c == '*' || c == MODULE_SEPARATOR || c == '/' || c.is_whitespace())
        {
            return Err(invalid("segment contains a reserved character"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(id: u32, hierarchy: &str, parent: Option<Arc<Class>>) -> Arc<Class> {
        Arc::new(Class::from_spec(ClassId(id), ClassSpec::new(hierarchy), parent))
    }

    #[test]
    fn test_matches_wildcards() {
        assert!(matches("Widget:Box:Statusbar", "Widget:*"));
        assert!(matches("Widget:Box:Statusbar", "Widget:Box:*"));
        assert!(matches("Widget", "Widget:*"));
        assert!(!matches("WidgetFoo", "Widget:*"));
        assert!(!matches("Widget:BoxFoo", "Widget:Box:*"));
        assert!(!matches("Object:Widget", "Widget:*"));
        assert!(matches("", "*"));
    }

    #[test]
    fn test_matches_exact() {
        assert!(matches("Widget:Box", "Widget:Box"));
        assert!(!matches("Widget:Box:Statusbar", "Widget:Box"));
        assert!(!matches("Widget", "Widget:Box"));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(short_name("Object:Widget:Box"), "Box");
        assert_eq!(short_name("Object"), "Object");
        assert_eq!(parent_hierarchy("Object:Widget:Box"), Some("Object:Widget"));
        assert_eq!(parent_hierarchy("Object"), None);
    }

    #[test]
    fn test_split_modules() {
        assert_eq!(split_modules("Object:Gauge"), ("Object:Gauge", vec![]));
        assert_eq!(
            split_modules("Object:Gauge@gauge, extras"),
            ("Object:Gauge", vec!["gauge", "extras"])
        );
    }

    #[test]
    fn test_validate_hierarchy() {
        assert!(validate_hierarchy("Object:Widget").is_ok());
        for bad in ["", ":", "Object:", ":Widget", "Object::Box", "Widget:*", "A b", "A/b", "A@m"] {
            assert!(
                matches!(validate_hierarchy(bad), Err(Error::InvalidHierarchy { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_is_a_by_ancestry() {
        let object = class(1, "Object", None);
        let widget = class(2, "Object:Widget", Some(object.clone()));
        let button = class(3, "Object:Widget:Button", Some(widget.clone()));
        let timer = class(4, "Object:Timer", Some(object.clone()));

        assert!(button.is_a(&widget));
        assert!(button.is_a(&object));
        assert!(button.is_a(&button));
        assert!(!widget.is_a(&button));
        assert!(!button.is_a(&timer));
        assert_eq!(button.depth(), 2);
    }

    #[test]
    fn test_lineage_order() {
        let object = class(1, "Object", None);
        let widget = class(2, "Object:Widget", Some(object));
        let names: Vec<_> = widget.lineage().iter().map(|c| c.name()).collect();
        assert_eq!(names, ["Object", "Widget"]);
    }

    #[test]
    fn test_instance_payload_counts() {
        let spec = ClassSpec::new("Counter").instance::<u64>();
        let counter = class_from(spec);
        assert_eq!(counter.instance_size(), 8);

        let payload = counter.new_instance().unwrap();
        assert!(payload.downcast_ref::<u64>().is_some());
        assert_eq!(counter.live_instances(), 1);
        counter.release_instance();
        assert_eq!(counter.live_instances(), 0);
    }

    #[test]
    #[should_panic(expected = "declares instance size 2 but built 8")]
    fn test_instance_size_mismatch_is_fatal() {
        let spec = ClassSpec::new("Broken").instance_raw(2, || Box::new(0_u64));
        let _ = class_from(spec).new_instance();
    }

    fn class_from(spec: ClassSpec) -> Class {
        Class::from_spec(ClassId(99), spec, None)
    }
}
