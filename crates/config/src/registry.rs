//! Target registry
//!
//! Maps a type name (`"file"`, `"console"`, ...) to a factory that builds a
//! target from its declaration. The registry is assembled once at startup;
//! there is no runtime discovery.
//!
//! ```ignore
//! let registry = TargetRegistry::builder()
//!     .with_builtin_targets()
//!     .register("audit", |settings| {
//!         let config: AuditSettings = settings.parse()?;
//!         Ok(Arc::new(AuditTarget::new(settings.name(), config)) as Arc<dyn Target>)
//!     })
//!     .build();
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scribe_pipeline::Target;
use serde::de::DeserializeOwned;

use crate::builtin;
use crate::error::{ConfigError, Result};

/// Builds one target from its settings
pub type TargetFactory = Arc<dyn Fn(&TargetSettings<'_>) -> Result<Arc<dyn Target>> + Send + Sync>;

/// Everything a factory gets to see about a declaration
#[derive(Debug, Clone, Copy)]
pub struct TargetSettings<'a> {
    name: &'a str,
    type_name: &'a str,
    table: &'a toml::Table,
    base_dir: &'a Path,
}

impl<'a> TargetSettings<'a> {
    pub fn new(name: &'a str, type_name: &'a str, table: &'a toml::Table, base_dir: &'a Path) -> Self {
        Self {
            name,
            type_name,
            table,
            base_dir,
        }
    }

    /// Target name as declared
    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn type_name(&self) -> &'a str {
        self.type_name
    }

    /// Raw type-specific keys
    pub fn table(&self) -> &'a toml::Table {
        self.table
    }

    /// Directory relative paths are resolved against
    pub fn base_dir(&self) -> &'a Path {
        self.base_dir
    }

    /// Deserialize the type-specific keys into a settings struct
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        toml::Value::Table(self.table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| {
                ConfigError::invalid_value("target", self.name, "settings", e.message())
            })
    }

    /// Resolve a configured path against the declaring file's directory
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

/// Type name to factory mapping
#[derive(Clone, Default)]
pub struct TargetRegistry {
    factories: HashMap<String, TargetFactory>,
}

impl TargetRegistry {
    pub fn builder() -> TargetRegistryBuilder {
        TargetRegistryBuilder::default()
    }

    /// Registry with only the built-in targets
    pub fn builtin() -> Self {
        Self::builder().with_builtin_targets().build()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build a target with the factory registered for its type
    pub fn create(&self, settings: &TargetSettings<'_>) -> Result<Arc<dyn Target>> {
        let factory = self
            .factories
            .get(settings.type_name())
            .ok_or_else(|| ConfigError::unknown_target_type(settings.name(), settings.type_name()))?;
        factory(settings)
    }
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

/// Builder for [`TargetRegistry`]
#[derive(Default)]
pub struct TargetRegistryBuilder {
    factories: HashMap<String, TargetFactory>,
}

impl TargetRegistryBuilder {
    /// Register a factory; a later registration for the same name replaces
    /// the earlier one
    pub fn register<F>(mut self, type_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&TargetSettings<'_>) -> Result<Arc<dyn Target>> + Send + Sync + 'static,
    {
        self.factories.insert(type_name.into(), Arc::new(factory));
        self
    }

    /// Register `file`, `console`, `memory` and `null`
    pub fn with_builtin_targets(self) -> Self {
        self.register("file", builtin::file)
            .register("console", builtin::console)
            .register("memory", builtin::memory)
            .register("null", builtin::null)
    }

    pub fn build(self) -> TargetRegistry {
        TargetRegistry {
            factories: self.factories,
        }
    }
}
