//! The runtime context.
//!
//! A [`Runtime`] owns everything that would otherwise be process-wide: the
//! class registry, the timer wheel, the lock serializing tree changes and
//! the root of the object tree. Objects keep a weak reference to the
//! runtime that created them.
//!
//! Dropping the last [`Runtime`] handle destroys the tree under the root,
//! running `destroy` hooks leaves first.

use crate::config::RuntimeConfig;
use crate::error::{Result, invariant_violation};
use crate::runtime::class::{Class, ClassSpec};
use crate::runtime::object::{Object, validate_name};
use crate::runtime::registry::{ClassRegistry, ROOT_CLASS};
use crate::runtime::timer::{TimerAction, TimerEvent, TimerHandle, TimerWheel};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Name of the root object of every runtime.
pub const ROOT_NAME: &str = "root";

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) registry: ClassRegistry,
    pub(crate) timers: TimerWheel,
    pub(crate) structure: Mutex<()>,
    root: Object,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.root.destroy_subtree();
    }
}

/// Handle to a runtime. Cloning shares the same runtime.
///
/// # Example
///
/// ```rust
/// use oxikit::{ClassSpec, Runtime};
///
/// let rt = Runtime::new();
/// rt.register(ClassSpec::new("Object:Window")).unwrap();
///
/// let win = rt.new_object("Object:Window", "main").unwrap();
/// rt.root().attach(&win).unwrap();
/// assert_eq!(rt.find("/main").unwrap(), win);
/// ```
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a runtime.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = ClassRegistry::new(config.module_paths.clone());
        let Some(object_class) = registry.lookup(ROOT_CLASS) else {
            invariant_violation(format_args!("registry lacks the \"{ROOT_CLASS}\" class"));
        };
        let inner = Arc::new_cyclic(|weak| RuntimeInner {
            root: Object::instantiate(weak.clone(), object_class, ROOT_NAME.to_string()),
            config,
            registry,
            timers: TimerWheel::new(),
            structure: Mutex::new(()),
        });
        debug!(
            module_paths = inner.config.module_paths.len(),
            policy = ?inner.config.load_policy,
            "runtime created"
        );
        Self { inner }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Returns the class registry.
    #[must_use]
    pub fn registry(&self) -> &ClassRegistry {
        &self.inner.registry
    }

    /// Returns the timer wheel.
    #[must_use]
    pub fn timers(&self) -> &TimerWheel {
        &self.inner.timers
    }

    /// Returns the root object.
    #[must_use]
    pub fn root(&self) -> Object {
        self.inner.root.clone()
    }

    /// Registers a class. See [`ClassRegistry::register`].
    ///
    /// # Errors
    ///
    /// Any registration error.
    pub fn register(&self, spec: ClassSpec) -> Result<Arc<Class>> {
        self.inner.registry.register(spec)
    }

    /// Creates an unattached object.
    ///
    /// `class_spec` is resolved with [`ClassRegistry::lookup_or_load`], so
    /// it may name modules (`"Object:Gauge@gauge"`).
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidName`](crate::Error::InvalidName) for a bad name
    /// - any class resolution error
    pub fn new_object(&self, class_spec: &str, name: &str) -> Result<Object> {
        validate_name(name)?;
        let class = self.inner.registry.lookup_or_load(class_spec)?;
        Ok(self.instantiate(class, name))
    }

    /// Creates an unattached object of an already resolved class.
    #[must_use]
    pub fn instantiate(&self, class: Arc<Class>, name: &str) -> Object {
        Object::instantiate(Arc::downgrade(&self.inner), class, name.to_string())
    }

    /// Resolves a path from the root. See [`Object::find`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::PathNotFound`](crate::Error::PathNotFound).
    pub fn find(&self, path: &str) -> Result<Object> {
        self.inner.root.find(path)
    }

    /// Arms a timer. See [`TimerWheel::arm`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectDestroyed`](crate::Error::ObjectDestroyed)
    /// if `owner` was destroyed.
    pub fn arm<F>(&self, owner: &Object, interval: u32, callback: F) -> Result<TimerHandle>
    where
        F: FnMut(&TimerEvent) -> TimerAction + Send + 'static,
    {
        self.inner.timers.arm(owner, interval, callback)
    }

    /// Cancels a timer. See [`TimerWheel::cancel`].
    pub fn cancel(&self, timer: TimerHandle) -> bool {
        self.inner.timers.cancel(timer)
    }

    /// Fires due timers. See [`TimerWheel::process_expired`].
    pub fn process_expired(&self, now: u32) -> usize {
        self.inner.timers.process_expired(now)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("timers", &self.inner.timers)
            .finish()
    }
}
