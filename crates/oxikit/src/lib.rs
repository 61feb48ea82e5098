//! `OxiKit`: object/class runtime for a widget toolkit
//!
//! `OxiKit` is the core a toolkit's widgets and drivers are built on. It
//! provides:
//!
//! - **Class Registry** with colon-separated hierarchy paths, wildcard
//!   matching and classes loaded from modules at runtime
//! - **Object Tree** with unique sibling names, path lookup and ordered
//!   leaf-first destruction
//! - **Typed Variables** for object properties and external bindings
//! - **Persistence** of whole subtrees in a versioned, byte-order-aware
//!   archive format (see [`oxikit_io`])
//! - **Timers** owned by objects and driven by an external event loop
//!
//! # Architecture
//!
//! All shared state hangs off a [`Runtime`]. There are no process-wide
//! registries: a runtime owns its class registry, its timer wheel and the
//! root of its object tree, and objects refer back to it weakly.
//!
//! # Example
//!
//! ```rust
//! use oxikit::{ClassSpec, MemorySource, Runtime, TimerAction};
//! use oxikit_io::DataSourceExt;
//!
//! let rt = Runtime::new();
//! rt.register(ClassSpec::new("Object:Counter").version(1, 0)).unwrap();
//!
//! let counter = rt.new_object("Object:Counter", "clicks").unwrap();
//! counter.set("value", 0_u32);
//! rt.root().attach(&counter).unwrap();
//!
//! rt.arm(&counter, 5, |event| {
//!     let owner = event.owner.as_ref().unwrap();
//!     owner.set("value", owner.get_or("value", 0_u32) + 1);
//!     TimerAction::Repeat
//! })
//! .unwrap();
//! rt.process_expired(5);
//! rt.process_expired(10);
//!
//! let mut ds = MemorySource::new();
//! counter.save(&mut ds).unwrap();
//! ds.rewind().unwrap();
//! let (copy, _) = rt.load_object(&mut ds).unwrap();
//! assert_eq!(copy.get::<u32>("value").unwrap(), 2);
//! ```

pub mod config;
pub mod error;
pub mod runtime;
mod sync;

// Re-export commonly used types
pub use config::RuntimeConfig;
pub use error::{Error, Result, clear_last_error, last_error};
pub use oxikit_io::{ArchiveVersion, ByteOrder, DataSource, FileSource, MemorySource};
pub use runtime::{
    Binding, Class, ClassHooks, ClassId, ClassRegistry, ClassSpec, LoadPolicy, LoadReport,
    ManifestLoader, ModuleLoader, NoHooks, Object, ObjectId, Pointer, Runtime, SkippedChild,
    TimerAction, TimerEvent, TimerHandle, TimerId, TimerOptions, TimerWheel, Variable,
    VariableKind, VariableList, VariableType, VariableValue, WeakObject,
};
