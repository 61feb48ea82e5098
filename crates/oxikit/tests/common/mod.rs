// Shared helpers for oxikit integration tests.

#![allow(dead_code)]

use oxikit::{ClassSpec, Object, Runtime};
use std::sync::{Arc, Mutex};

/// Shared event log for hooks and timer callbacks.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

/// Creates a runtime with a small widget hierarchy registered:
///
/// ```text
/// Object
/// └── Object:Widget
///     ├── Object:Widget:Box
///     └── Object:Widget:Label
/// ```
pub fn widget_runtime() -> Runtime {
    let rt = Runtime::new();
    for hierarchy in ["Object:Widget", "Object:Widget:Box", "Object:Widget:Label"] {
        rt.register(ClassSpec::new(hierarchy)).unwrap();
    }
    rt
}

/// Creates an object and attaches it under `parent`.
pub fn spawn(rt: &Runtime, parent: &Object, class: &str, name: &str) -> Object {
    let object = rt.new_object(class, name).unwrap();
    parent.attach(&object).unwrap();
    object
}
