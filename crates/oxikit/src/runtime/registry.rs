//! The class registry.
//!
//! # Architecture
//!
//! The registry maps hierarchy paths to [`Class`]es. A registry is owned by
//! its [`Runtime`](crate::Runtime); there is no process-wide instance, so
//! independent runtimes (and tests) never share classes.
//!
//! - Root classes have single-segment paths. `"Object"` is registered by
//!   every runtime; others may be added.
//! - A class with path `"A:B:C"` can only be registered once `"A:B"` is.
//!   This makes inheritance cycles unrepresentable.
//! - Unknown classes can be loaded on demand from modules, see
//!   [`ClassRegistry::lookup_or_load`].
//!
//! # Thread Safety
//!
//! The class table sits behind an `RwLock`, so lookups run concurrently.
//! The lock is never held while a module loads or a hook runs.

use crate::error::{Error, Result};
use crate::runtime::class::{
    Class, ClassId, ClassSpec, matches, parent_hierarchy, short_name, split_modules,
    validate_hierarchy,
};
use crate::runtime::module::{ManifestLoader, ModuleLoader, validate_module_name};
use crate::sync::{read, write};
use fxhash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Path of the root class every runtime registers.
pub const ROOT_CLASS: &str = "Object";

/// Registry of classes known to a runtime.
pub struct ClassRegistry {
    classes: RwLock<FxHashMap<String, Arc<Class>>>,
    next_id: AtomicU32,
    search_path: RwLock<Vec<PathBuf>>,
    loaders: RwLock<Vec<Arc<dyn ModuleLoader>>>,
    // Module name to the hierarchy it provided.
    loaded: RwLock<FxHashMap<String, String>>,
}

impl ClassRegistry {
    /// Creates a registry holding only the `"Object"` root class, with the
    /// manifest loader installed.
    #[must_use]
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        let object = Arc::new(Class::from_spec(ClassId(0), ClassSpec::new(ROOT_CLASS), None));
        let mut classes = FxHashMap::default();
        classes.insert(ROOT_CLASS.to_string(), object);

        Self {
            classes: RwLock::new(classes),
            next_id: AtomicU32::new(1),
            search_path: RwLock::new(search_path),
            loaders: RwLock::new(vec![Arc::new(ManifestLoader)]),
            loaded: RwLock::new(FxHashMap::default()),
        }
    }

    /// Registers a class.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHierarchy`] if the path is malformed
    /// - [`Error::DuplicateHierarchy`] if the path is taken
    /// - [`Error::ParentNotRegistered`] if the parent path is unknown
    pub fn register(&self, spec: ClassSpec) -> Result<Arc<Class>> {
        validate_hierarchy(&spec.hierarchy)?;

        let mut classes = write(&self.classes);
        if classes.contains_key(&spec.hierarchy) {
            return Err(Error::DuplicateHierarchy(spec.hierarchy));
        }
        let parent = match parent_hierarchy(&spec.hierarchy) {
            Some(parent) => Some(classes.get(parent).cloned().ok_or_else(|| {
                Error::ParentNotRegistered {
                    hierarchy: spec.hierarchy.clone(),
                    parent: parent.to_string(),
                }
            })?),
            None => None,
        };

        let id = ClassId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let class = Arc::new(Class::from_spec(id, spec, parent));
        classes.insert(class.hierarchy().to_string(), class.clone());
        info!(
            hierarchy = class.hierarchy(),
            id = id.as_u32(),
            version = %class.version(),
            module = class.module(),
            "registered class"
        );
        Ok(class)
    }

    /// Removes a class.
    ///
    /// # Errors
    ///
    /// - [`Error::ClassNotFound`] if nothing is registered at `hierarchy`
    /// - [`Error::ClassInUse`] if the class has subclasses or live instances
    pub fn unregister(&self, hierarchy: &str) -> Result<Arc<Class>> {
        let mut classes = write(&self.classes);
        let class = classes
            .get(hierarchy)
            .ok_or_else(|| Error::ClassNotFound(hierarchy.to_string()))?;

        let in_use = |reason: String| Error::ClassInUse {
            hierarchy: hierarchy.to_string(),
            reason,
        };
        let subclasses = classes
            .values()
            .filter(|c| c.parent().is_some_and(|p| p.id() == class.id()))
            .count();
        if subclasses > 0 {
            return Err(in_use(format!("{subclasses} subclass(es) registered")));
        }
        let live = class.live_instances();
        if live > 0 {
            return Err(in_use(format!("{live} live instance(s)")));
        }

        let class = classes
            .remove(hierarchy)
            .ok_or_else(|| Error::ClassNotFound(hierarchy.to_string()))?;
        drop(classes);

        if let Some(module) = class.module() {
            write(&self.loaded).remove(module);
        }
        info!(hierarchy, "unregistered class");
        Ok(class)
    }

    /// Looks up a class by exact path.
    #[must_use]
    pub fn lookup(&self, hierarchy: &str) -> Option<Arc<Class>> {
        read(&self.classes).get(hierarchy).cloned()
    }

    /// Resolves a class spec of the form `"Path:To:Class@mod1,mod2"`.
    ///
    /// A registered class is returned directly. Otherwise each listed
    /// module is loaded in order until the class appears. Without a module
    /// list, the short name of the class is tried as the module name, so
    /// `"Object:Gauge"` looks for a module named `Gauge`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ClassNotFound`] if no module provides the class,
    /// or the first module error encountered.
    pub fn lookup_or_load(&self, spec: &str) -> Result<Arc<Class>> {
        let (hierarchy, mut modules) = split_modules(spec);
        if let Some(class) = self.lookup(hierarchy) {
            return Ok(class);
        }
        if modules.is_empty() {
            modules.push(short_name(hierarchy));
        }

        for module in modules {
            match self.load_dynamic(module) {
                Ok(class) if class.hierarchy() == hierarchy => return Ok(class),
                Ok(class) => {
                    debug!(
                        module,
                        provided = class.hierarchy(),
                        wanted = hierarchy,
                        "module provides another class"
                    );
                }
                Err(Error::ModuleNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
            if let Some(class) = self.lookup(hierarchy) {
                return Ok(class);
            }
        }
        Err(Error::ClassNotFound(hierarchy.to_string()))
    }

    /// Loads a module and registers the class it provides.
    ///
    /// Loading a module twice returns the class registered the first time.
    ///
    /// # Errors
    ///
    /// - [`Error::ModuleNotFound`] if no loader knows the module
    /// - [`Error::ModuleInvalid`] if the module is broken
    /// - any registration error for the class it provides
    pub fn load_dynamic(&self, module: &str) -> Result<Arc<Class>> {
        validate_module_name(module)?;

        let already = read(&self.loaded).get(module).cloned();
        if let Some(class) = already.and_then(|h| self.lookup(&h)) {
            return Ok(class);
        }

        let search_path = self.module_paths();
        let loaders = read(&self.loaders).clone();
        for loader in &loaders {
            if let Some(spec) = loader.load(module, &search_path)? {
                let spec = if spec.module.is_some() { spec } else { spec.module(module) };
                let class = self.register(spec)?;
                write(&self.loaded).insert(module.to_string(), class.hierarchy().to_string());
                return Ok(class);
            }
        }
        warn!(module, searched = search_path.len(), "module not found");
        Err(Error::ModuleNotFound {
            name: module.to_string(),
            searched: search_path.len(),
        })
    }

    /// Adds a module loader, consulted after those already installed.
    pub fn add_loader(&self, loader: impl ModuleLoader + 'static) {
        write(&self.loaders).push(Arc::new(loader));
    }

    /// Appends a directory to the module search path.
    ///
    /// Adding a directory that is already present does nothing.
    pub fn add_module_path(&self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        let mut paths = write(&self.search_path);
        if !paths.contains(&dir) {
            debug!(dir = %dir.display(), "added module path");
            paths.push(dir);
        }
    }

    /// Removes a directory from the module search path.
    ///
    /// Returns whether it was present.
    pub fn remove_module_path(&self, dir: &Path) -> bool {
        let mut paths = write(&self.search_path);
        let before = paths.len();
        paths.retain(|p| p != dir);
        before != paths.len()
    }

    /// Returns the module search path.
    #[must_use]
    pub fn module_paths(&self) -> Vec<PathBuf> {
        read(&self.search_path).clone()
    }

    /// Returns every registered class, sorted by path.
    #[must_use]
    pub fn classes(&self) -> Vec<Arc<Class>> {
        let mut all: Vec<_> = read(&self.classes).values().cloned().collect();
        all.sort_by(|a, b| a.hierarchy().cmp(b.hierarchy()));
        all
    }

    /// Returns every registered class whose path matches `pattern`, sorted
    /// by path.
    #[must_use]
    pub fn subclasses(&self, pattern: &str) -> Vec<Arc<Class>> {
        let mut found: Vec<_> = read(&self.classes)
            .values()
            .filter(|c| c.matches(pattern))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.hierarchy().cmp(b.hierarchy()));
        found
    }

    /// Returns whether `hierarchy` matches `pattern`. See [`matches`].
    #[must_use]
    pub fn matches(&self, hierarchy: &str, pattern: &str) -> bool {
        matches(hierarchy, pattern)
    }

    /// Returns the number of registered classes.
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.classes).len()
    }

    /// Returns whether the registry is empty.
    ///
    /// Never true for a runtime's registry, which always holds `"Object"`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        read(&self.classes).is_empty()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("classes", &self.len())
            .field("search_path", &self.module_paths())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_class_preregistered() {
        let registry = ClassRegistry::default();
        let object = registry.lookup(ROOT_CLASS).unwrap();
        assert!(object.parent().is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_links_parent() {
        let registry = ClassRegistry::default();
        let widget = registry.register(ClassSpec::new("Object:Widget")).unwrap();
        let button = registry.register(ClassSpec::new("Object:Widget:Button")).unwrap();

        assert_eq!(button.parent().unwrap().id(), widget.id());
        assert!(button.is_a(&registry.lookup("Object").unwrap()));
        assert_ne!(widget.id(), button.id());
    }

    #[test]
    fn test_register_rejects_duplicates_and_orphans() {
        let registry = ClassRegistry::default();
        registry.register(ClassSpec::new("Object:Widget")).unwrap();

        let dup = registry.register(ClassSpec::new("Object:Widget"));
        assert!(matches!(dup, Err(Error::DuplicateHierarchy(h)) if h == "Object:Widget"));

        let orphan = registry.register(ClassSpec::new("Object:Missing:Child"));
        assert!(matches!(
            orphan,
            Err(Error::ParentNotRegistered { parent, .. }) if parent == "Object:Missing"
        ));
    }

    #[test]
    fn test_second_root_class() {
        let registry = ClassRegistry::default();
        let root = registry.register(ClassSpec::new("Resource")).unwrap();
        assert!(root.parent().is_none());
        assert_eq!(registry.subclasses("Resource:*").len(), 1);
    }

    #[test]
    fn test_unregister_guards() {
        let registry = ClassRegistry::default();
        registry.register(ClassSpec::new("Object:Widget")).unwrap();
        registry.register(ClassSpec::new("Object:Widget:Button")).unwrap();

        assert!(matches!(
            registry.unregister("Object:Widget"),
            Err(Error::ClassInUse { .. })
        ));
        registry.unregister("Object:Widget:Button").unwrap();
        registry.unregister("Object:Widget").unwrap();
        assert!(registry.lookup("Object:Widget").is_none());
        assert!(matches!(
            registry.unregister("Object:Widget"),
            Err(Error::ClassNotFound(_))
        ));
    }

    #[test]
    fn test_subclasses_sorted() {
        let registry = ClassRegistry::default();
        for h in ["Object:Widget", "Object:Widget:Label", "Object:Widget:Box", "Object:Timer"] {
            registry.register(ClassSpec::new(h)).unwrap();
        }
        let names: Vec<_> = registry
            .subclasses("Object:Widget:*")
            .iter()
            .map(|c| c.hierarchy().to_string())
            .collect();
        assert_eq!(names, ["Object:Widget", "Object:Widget:Box", "Object:Widget:Label"]);
        assert_eq!(registry.classes().len(), 5);
    }

    #[test]
    fn test_module_paths() {
        let registry = ClassRegistry::default();
        registry.add_module_path("/opt/a");
        registry.add_module_path("/opt/b");
        registry.add_module_path("/opt/a");
        assert_eq!(registry.module_paths().len(), 2);
        assert!(registry.remove_module_path(Path::new("/opt/a")));
        assert!(!registry.remove_module_path(Path::new("/opt/a")));
        assert_eq!(registry.module_paths(), [PathBuf::from("/opt/b")]);
    }

    #[test]
    fn test_lookup_or_load_unknown() {
        let registry = ClassRegistry::default();
        let err = registry.lookup_or_load("Object:Nowhere@nomod").unwrap_err();
        assert!(matches!(err, Error::ClassNotFound(h) if h == "Object:Nowhere"));
    }

    struct FixedLoader;

    impl ModuleLoader for FixedLoader {
        fn load(&self, name: &str, _search_path: &[PathBuf]) -> Result<Option<ClassSpec>> {
            Ok((name == "fixed").then(|| ClassSpec::new("Object:Fixed").version(3, 1)))
        }
    }

    #[test]
    fn test_custom_loader() {
        let registry = ClassRegistry::default();
        registry.add_loader(FixedLoader);

        let class = registry.lookup_or_load("Object:Fixed@other,fixed").unwrap();
        assert_eq!(class.version().major, 3);
        assert_eq!(class.module(), Some("fixed"));

        // Loaded once; a second load returns the same class.
        let again = registry.load_dynamic("fixed").unwrap();
        assert_eq!(again.id(), class.id());
    }
}
