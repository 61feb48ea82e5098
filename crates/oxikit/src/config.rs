//! Runtime configuration.

use crate::runtime::archive::LoadPolicy;
use oxikit_io::{ByteOrder, StreamSettings};
use std::env;
use std::path::PathBuf;

/// Environment variable holding the initial module search path, in the
/// platform's path-list syntax.
pub const ENV_MODULE_PATH: &str = "OXIKIT_MODULE_PATH";

/// Environment variable enabling debug type tags (`1`/`true` or `0`/`false`).
pub const ENV_TYPE_TAGS: &str = "OXIKIT_TYPE_TAGS";

/// Settings fixed when a [`Runtime`](crate::Runtime) is created.
///
/// # Example
///
/// ```rust
/// use oxikit::{ByteOrder, LoadPolicy, Runtime, RuntimeConfig};
///
/// let config = RuntimeConfig::default()
///     .with_module_path("/usr/share/oxikit/modules")
///     .with_load_policy(LoadPolicy::BestEffort)
///     .with_byte_order(ByteOrder::Little);
/// let rt = Runtime::with_config(config);
/// assert_eq!(rt.registry().module_paths().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Initial module search path.
    pub module_paths: Vec<PathBuf>,
    /// Policy used by `load` calls that do not name one.
    pub load_policy: LoadPolicy,
    /// Whether files written and read by the runtime carry type tags.
    pub type_tags: bool,
    /// Byte order of files written and read by the runtime.
    pub byte_order: ByteOrder,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            module_paths: Vec::new(),
            load_policy: LoadPolicy::default(),
            type_tags: false,
            byte_order: ByteOrder::Big,
        }
    }
}

impl RuntimeConfig {
    /// Builds a configuration from the defaults and the environment.
    ///
    /// Reads [`ENV_MODULE_PATH`] and [`ENV_TYPE_TAGS`]. Unset or
    /// unparsable variables leave the default in place.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(paths) = env::var_os(ENV_MODULE_PATH) {
            config.module_paths = env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
        }
        if let Some(tags) = env::var(ENV_TYPE_TAGS).ok().and_then(|v| parse_flag(&v)) {
            config.type_tags = tags;
        }
        config
    }

    /// Appends a module search directory.
    #[must_use]
    pub fn with_module_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.module_paths.push(dir.into());
        self
    }

    /// Sets the default load policy.
    #[must_use]
    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Enables or disables type tags in runtime-managed files.
    #[must_use]
    pub fn with_type_tags(mut self, enabled: bool) -> Self {
        self.type_tags = enabled;
        self
    }

    /// Sets the byte order of runtime-managed files.
    #[must_use]
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    /// Returns the stream settings for runtime-managed files.
    #[must_use]
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            byte_order: self.byte_order,
            type_tags: self.type_tags,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
