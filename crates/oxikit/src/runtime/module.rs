//! Runtime-loadable class modules.
//!
//! A module supplies one class that was not compiled into the program. The
//! registry asks its loaders in order; the first loader that recognizes the
//! module name wins.
//!
//! The built-in [`ManifestLoader`] reads `<dir>/<module>.json` from each
//! search directory:
//!
//! ```json
//! {
//!     "hierarchy": "Object:Gauge",
//!     "version": [1, 2],
//!     "variables": [
//!         { "name": "min", "value": { "i32": 0 } },
//!         { "name": "label", "value": { "string": "fuel" } }
//!     ]
//! }
//! ```
//!
//! Manifest classes carry no instance payload. Their `init` hook seeds the
//! declared variables on every new instance.

use crate::error::{Error, Result};
use crate::runtime::class::{ClassHooks, ClassSpec};
use crate::runtime::object::Object;
use crate::runtime::variable::{Variable, VariableList, VariableValue};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Source of runtime-loaded classes.
pub trait ModuleLoader: Send + Sync {
    /// Looks for `name` in the search directories.
    ///
    /// Returns `Ok(None)` if this loader does not know the module, letting
    /// the next loader try.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleInvalid`] if the module exists but is broken.
    fn load(&self, name: &str, search_path: &[PathBuf]) -> Result<Option<ClassSpec>>;
}

/// Loads classes from JSON manifests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestLoader;

impl ManifestLoader {
    /// File extension of manifests.
    pub const EXTENSION: &'static str = "json";

    /// Parses a manifest file into a class spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModuleInvalid`] if the file cannot be read or
    /// parsed.
    pub fn load_file(name: &str, path: &Path) -> Result<ClassSpec> {
        let invalid = |reason: String| Error::ModuleInvalid {
            name: name.to_string(),
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let manifest: Manifest = serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;

        let defaults: VariableList = manifest
            .variables
            .into_iter()
            .map(|var| Variable::new(var.name, var.value))
            .collect();
        debug!(
            module = name,
            hierarchy = %manifest.hierarchy,
            variables = defaults.len(),
            "parsed module manifest"
        );

        Ok(ClassSpec::new(manifest.hierarchy)
            .version(manifest.version.0, manifest.version.1)
            .hooks(ManifestHooks { defaults })
            .module(name))
    }
}

impl ModuleLoader for ManifestLoader {
    fn load(&self, name: &str, search_path: &[PathBuf]) -> Result<Option<ClassSpec>> {
        for dir in search_path {
            let path = dir.join(format!("{name}.{}", Self::EXTENSION));
            trace!(module = name, path = %path.display(), "probing");
            if path.is_file() {
                return Self::load_file(name, &path).map(Some);
            }
        }
        Ok(None)
    }
}

/// Checks that a module name cannot escape its search directory.
pub(crate) fn validate_module_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains(char::is_whitespace);
    if bad {
        return Err(Error::ModuleInvalid {
            name: name.to_string(),
            path: PathBuf::new(),
            reason: "invalid module name".to_string(),
        });
    }
    Ok(())
}

struct ManifestHooks {
    defaults: VariableList,
}

impl ClassHooks for ManifestHooks {
    fn init(&self, object: &Object) {
        for var in &self.defaults {
            object.set(&var.name, var.value.clone());
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    hierarchy: String,
    #[serde(default = "default_version")]
    version: (u32, u32),
    #[serde(default)]
    variables: Vec<ManifestVariable>,
}

fn default_version() -> (u32, u32) {
    (1, 0)
}

#[derive(Debug, Deserialize)]
struct ManifestVariable {
    name: String,
    value: ManifestValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ManifestValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
}

impl From<ManifestValue> for VariableValue {
    fn from(value: ManifestValue) -> Self {
        match value {
            ManifestValue::U8(v) => VariableValue::U8(v),
            ManifestValue::I8(v) => VariableValue::I8(v),
            ManifestValue::U16(v) => VariableValue::U16(v),
            ManifestValue::I16(v) => VariableValue::I16(v),
            ManifestValue::U32(v) => VariableValue::U32(v),
            ManifestValue::I32(v) => VariableValue::I32(v),
            ManifestValue::U64(v) => VariableValue::U64(v),
            ManifestValue::I64(v) => VariableValue::I64(v),
            ManifestValue::F32(v) => VariableValue::F32(v),
            ManifestValue::F64(v) => VariableValue::F64(v),
            ManifestValue::Bool(v) => VariableValue::Bool(v),
            ManifestValue::String(v) => VariableValue::String(v),
        }
    }
}
