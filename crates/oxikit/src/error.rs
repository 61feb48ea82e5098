//! Error types for the `OxiKit` runtime.
//!
//! Failures fall into four groups:
//!
//! - **Structural**: name collisions, missing path segments, attach cycles,
//!   unknown classes. Always recoverable.
//! - **Format**: bad magic, major-version mismatch, oversized strings. These
//!   arrive wrapped in [`Error::Archive`] and stop the load of a subtree.
//! - **Resource**: file I/O, also via [`Error::Archive`].
//! - **Invariant violations**: never returned. They go through
//!   [`invariant_violation`], which logs and panics.
//!
//! Every public operation returns [`Result`]. [`last_error`] is a
//! compatibility shim for callers that still poll a per-thread message.

use crate::runtime::variable::VariableKind;
use std::cell::RefCell;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the `OxiKit` runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// A hierarchy path is syntactically invalid.
    #[error("invalid hierarchy \"{hierarchy}\": {reason}")]
    InvalidHierarchy {
        /// The offending path.
        hierarchy: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A class with this hierarchy path is already registered.
    #[error("class \"{0}\" is already registered")]
    DuplicateHierarchy(String),

    /// A class was registered before its parent.
    #[error("parent \"{parent}\" of class \"{hierarchy}\" is not registered")]
    ParentNotRegistered {
        /// Path of the class being registered.
        hierarchy: String,
        /// Path of the missing parent.
        parent: String,
    },

    /// No class is registered under this path.
    #[error("class \"{0}\" not found")]
    ClassNotFound(String),

    /// A class cannot be unregistered while something still depends on it.
    #[error("class \"{hierarchy}\" is in use: {reason}")]
    ClassInUse {
        /// Path of the class.
        hierarchy: String,
        /// What still depends on it.
        reason: String,
    },

    /// No search directory contains the requested module.
    #[error("module \"{name}\" not found ({searched} directories searched)")]
    ModuleNotFound {
        /// Module name.
        name: String,
        /// Number of directories consulted.
        searched: usize,
    },

    /// A module was found but could not be loaded.
    #[error("module \"{name}\" at {}: {reason}", path.display())]
    ModuleInvalid {
        /// Module name.
        name: String,
        /// Location of the module.
        path: PathBuf,
        /// Why loading failed.
        reason: String,
    },

    /// An object name is empty or contains the path separator.
    #[error("invalid object name \"{0}\"")]
    InvalidName(String),

    /// A sibling already uses this name.
    #[error("\"{parent}\" already has a child named \"{name}\"")]
    NameCollision {
        /// Name of the parent object.
        parent: String,
        /// Colliding child name.
        name: String,
    },

    /// A path segment did not resolve to a child.
    #[error("path \"{path}\" not found: no child \"{segment}\"")]
    PathNotFound {
        /// The full path that was resolved.
        path: String,
        /// First segment that failed.
        segment: String,
    },

    /// The object is not a child of the given parent.
    #[error("\"{child}\" is not a child of \"{parent}\"")]
    NotAChild {
        /// Name of the parent object.
        parent: String,
        /// Name of the object.
        child: String,
    },

    /// The object already has a parent.
    #[error("\"{0}\" is already attached")]
    AlreadyAttached(String),

    /// Attaching would make an object its own ancestor.
    #[error("attaching \"{child}\" under \"{parent}\" would create a cycle")]
    WouldCycle {
        /// Name of the intended parent.
        parent: String,
        /// Name of the object being attached.
        child: String,
    },

    /// The object has been destroyed.
    #[error("object \"{0}\" has been destroyed")]
    ObjectDestroyed(String),

    /// No variable with this name exists.
    #[error("variable \"{0}\" not found")]
    VariableNotFound(String),

    /// A variable holds a different kind than requested.
    #[error("variable \"{key}\" is {found}, not {expected}")]
    KindMismatch {
        /// Variable name.
        key: String,
        /// Kind the caller asked for.
        expected: VariableKind,
        /// Kind actually stored.
        found: VariableKind,
    },

    /// An archive names a variable kind this runtime does not know.
    #[error("variable \"{key}\" has unknown kind tag {tag}")]
    UnknownVariableKind {
        /// Variable name.
        key: String,
        /// Tag found in the archive.
        tag: u8,
    },

    /// A list index is out of range.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Current list length.
        len: usize,
    },

    /// An archive holds a different class than the object loading it.
    #[error("archive holds class \"{found}\", expected \"{expected}\"")]
    ClassMismatch {
        /// Class of the receiving object.
        expected: String,
        /// Class recorded in the archive.
        found: String,
    },

    /// A length-prefixed archive section does not fit its `u32` prefix.
    #[error("archive section of {0} bytes exceeds the u32 length prefix")]
    SectionTooLarge(u64),

    /// The runtime that created an object no longer exists.
    #[error("runtime has been dropped")]
    RuntimeGone,

    /// A class lifecycle hook reported a failure.
    #[error("class hook failed: {0}")]
    Hook(String),

    /// The data source layer failed.
    #[error(transparent)]
    Archive(#[from] oxikit_io::Error),
}

/// Result type for `OxiKit` runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

impl Error {
    /// Records this error's message as the calling thread's last error and
    /// returns it unchanged.
    ///
    /// Intended for `map_err(Error::record)` at API boundaries.
    #[must_use]
    pub fn record(self) -> Self {
        let message = self.to_string();
        LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(message));
        self
    }
}

/// Returns the message of the last error recorded on this thread.
#[must_use]
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Clears the calling thread's last error.
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// Reports a broken internal invariant and aborts the current thread.
///
/// Continuing after one of these risks corrupting the object tree, so it is
/// not surfaced as a [`Result`].
#[cold]
#[track_caller]
pub fn invariant_violation(args: fmt::Arguments<'_>) -> ! {
    tracing::error!(violation = %args, "runtime invariant violated");
    #[cfg(feature = "invariant_backtrace")]
    {
        let trace = backtrace::Backtrace::new();
        tracing::error!("backtrace:\n{trace:?}");
    }
    panic!("invariant violation: {args}");
}
