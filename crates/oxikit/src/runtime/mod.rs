//! Core runtime implementation.
//!
//! # Modules
//!
//! - [`variable`]: typed values, variable lists
//! - [`class`]: classes, hooks, hierarchy paths and matching
//! - [`registry`]: the class registry
//! - [`module`]: runtime-loaded class modules
//! - [`object`]: objects and the object tree
//! - [`binding`]: weak bindings to single variables
//! - [`timer`]: object-owned timers
//! - [`archive`]: saving and loading object trees
//! - [`context`]: the [`Runtime`] tying it together

pub mod archive;
pub mod binding;
pub mod class;
pub mod context;
pub mod module;
pub mod object;
pub mod registry;
pub mod timer;
pub mod variable;

pub use archive::{ARCHIVE_MAGIC, ARCHIVE_VERSION, LoadPolicy, LoadReport, SkippedChild};
pub use binding::Binding;
pub use class::{Class, ClassHooks, ClassId, ClassSpec, NoHooks, matches};
pub use context::Runtime;
pub use module::{ManifestLoader, ModuleLoader};
pub use object::{Object, ObjectId, WeakObject};
pub use registry::{ClassRegistry, ROOT_CLASS};
pub use timer::{TimerAction, TimerEvent, TimerHandle, TimerId, TimerOptions, TimerWheel};
pub use variable::{Pointer, Variable, VariableKind, VariableList, VariableType, VariableValue};
