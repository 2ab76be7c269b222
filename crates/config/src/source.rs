//! Configuration sources
//!
//! A [`ConfigSource`] produces a [`LoadedConfig`]: ordered rules, the
//! targets they write to, and the files the configuration was read from.
//! Turning that into a live [`RouteGraph`] is the same for every source.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use scribe_pipeline::{
    DispatchPipeline, PipelineContext, RouteGraph, RoutingRule, RoutingTable, StageConfig, Target,
};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::logging::LogConfig;
use crate::model::ConfigDocument;
use crate::registry::{TargetRegistry, TargetSettings};

// =============================================================================
// WatchSet
// =============================================================================

/// Files a configuration depends on
///
/// Paths are normalized on insert so change notifications match regardless
/// of how the path was spelled. Each path keeps the fingerprint it had when
/// it was read, so a change made before anyone polls it is still noticed.
#[derive(Debug, Clone, Default)]
pub struct WatchSet {
    paths: Vec<PathBuf>,
    /// Parallel to `paths`
    baselines: Vec<Option<Fingerprint>>,
}

impl WatchSet {
    pub fn new(paths: impl IntoIterator<Item = impl AsRef<Path>>) -> Self {
        let mut set = Self::default();
        for path in paths {
            set.insert(path);
        }
        set
    }

    /// Add a path, baselined as it is now; duplicates are ignored
    pub fn insert(&mut self, path: impl AsRef<Path>) -> bool {
        let baseline = fingerprint(path.as_ref());
        self.insert_read(path, baseline)
    }

    /// Add a path with the fingerprint taken when it was read
    pub(crate) fn insert_read(
        &mut self,
        path: impl AsRef<Path>,
        baseline: Option<Fingerprint>,
    ) -> bool {
        let path = normalize(path.as_ref());
        if self.paths.contains(&path) {
            return false;
        }
        self.paths.push(path);
        self.baselines.push(baseline);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        let path = normalize(path);
        self.paths.contains(&path)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Paths with their baselines; `None` means the file did not exist
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&PathBuf, Option<Fingerprint>)> {
        self.paths.iter().zip(self.baselines.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl PartialEq for WatchSet {
    fn eq(&self, other: &Self) -> bool {
        self.paths == other.paths
    }
}

impl Eq for WatchSet {}

/// What a file looked like when last examined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

pub(crate) fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let metadata = fs::metadata(path).ok()?;
    Some(Fingerprint {
        modified: metadata.modified().ok(),
        len: metadata.len(),
    })
}

/// Canonical form of `path`, falling back to the canonical parent for files
/// that do not exist (yet, or any more)
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    // `a/missing/../b` cannot be canonicalized as spelled
    let path = collapse_dots(path);
    if let Ok(canonical) = fs::canonicalize(&path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            match fs::canonicalize(parent) {
                Ok(parent) => parent.join(name),
                Err(_) => path.to_path_buf(),
            }
        }
        _ => path.to_path_buf(),
    }
}

/// Drop `.` and resolve `..` against the preceding component, without
/// touching the filesystem
fn collapse_dots(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

// =============================================================================
// LoadedConfig
// =============================================================================

/// A target plus the stages wrapped around it
pub struct TargetDecl {
    pub target: Arc<dyn Target>,
    /// Outermost first
    pub stages: Vec<StageConfig>,
}

impl TargetDecl {
    pub fn new(target: Arc<dyn Target>) -> Self {
        Self {
            target,
            stages: Vec::new(),
        }
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn name(&self) -> &str {
        self.target.name()
    }
}

impl std::fmt::Debug for TargetDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetDecl")
            .field("name", &self.name())
            .field("stages", &self.stages)
            .finish()
    }
}

/// Parsed configuration, not yet live
#[derive(Debug, Default)]
pub struct LoadedConfig {
    /// Evaluated in order
    pub rules: Vec<RoutingRule>,
    /// Registered in order, so the first declared target gets id 0
    pub targets: Vec<TargetDecl>,
    pub case_sensitive: bool,
    pub watch_set: WatchSet,
    pub log: LogConfig,
}

impl LoadedConfig {
    pub fn new() -> Self {
        Self {
            case_sensitive: true,
            ..Default::default()
        }
    }

    pub fn with_rule(mut self, rule: RoutingRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_target(mut self, target: TargetDecl) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_watch_set(mut self, watch_set: WatchSet) -> Self {
        self.watch_set = watch_set;
        self
    }

    /// No rules and no targets: applying it unloads logging
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.targets.is_empty()
    }

    /// Compile the rules and wrap every target in its pipeline
    ///
    /// On failure every target already built is closed.
    pub fn build_graph(self, context: &PipelineContext) -> Result<RouteGraph> {
        let table = match compile(self.rules, &self.targets, self.case_sensitive) {
            Ok(table) => table,
            Err(e) => {
                close_all(&self.targets);
                return Err(e);
            }
        };

        let mut pipelines: Vec<DispatchPipeline> = Vec::with_capacity(self.targets.len());
        let mut remaining = self.targets.into_iter();
        while let Some(decl) = remaining.next() {
            let target = Arc::clone(&decl.target);
            let built = decl
                .stages
                .into_iter()
                .fold(DispatchPipeline::builder(decl.target), |b, stage| b.stage(stage))
                .build(context);
            match built {
                Ok(pipeline) => pipelines.push(pipeline),
                Err(e) => {
                    for pipeline in &pipelines {
                        pipeline.shutdown(Duration::ZERO);
                    }
                    target.close();
                    close_all(&remaining.collect::<Vec<_>>());
                    return Err(e.into());
                }
            }
        }

        Ok(RouteGraph::new(table, pipelines)?)
    }
}

fn compile(
    rules: Vec<RoutingRule>,
    targets: &[TargetDecl],
    case_sensitive: bool,
) -> Result<RoutingTable> {
    let mut builder = RoutingTable::builder();
    builder.case_sensitive(case_sensitive);
    for decl in targets {
        builder.register_target(decl.name())?;
    }
    for rule in rules {
        builder.add_rule(rule);
    }
    Ok(builder.build()?)
}

// =============================================================================
// Sources
// =============================================================================

/// Where configuration comes from
pub trait ConfigSource: Send + Sync {
    /// Read and validate the configuration, building fresh targets
    fn load(&self) -> Result<LoadedConfig>;

    /// Short description for diagnostics
    fn describe(&self) -> String {
        "configuration".to_string()
    }
}

/// Configuration built in code
///
/// The closure runs on every reload and must build fresh targets each time,
/// since the graph it replaces closes its own.
pub struct FnConfigSource<F> {
    build: F,
}

impl<F> FnConfigSource<F>
where
    F: Fn() -> Result<LoadedConfig> + Send + Sync,
{
    pub fn new(build: F) -> Self {
        Self { build }
    }
}

impl<F> ConfigSource for FnConfigSource<F>
where
    F: Fn() -> Result<LoadedConfig> + Send + Sync,
{
    fn load(&self) -> Result<LoadedConfig> {
        (self.build)()
    }

    fn describe(&self) -> String {
        "programmatic configuration".to_string()
    }
}

/// TOML file with optional `include` files
#[derive(Debug, Clone)]
pub struct TomlConfigSource {
    path: PathBuf,
    registry: Arc<TargetRegistry>,
}

impl TomlConfigSource {
    pub fn new(path: impl Into<PathBuf>, registry: Arc<TargetRegistry>) -> Self {
        Self {
            path: path.into(),
            registry,
        }
    }

    /// Source using only the built-in target types
    pub fn with_builtin_targets(path: impl Into<PathBuf>) -> Self {
        Self::new(path, Arc::new(TargetRegistry::builtin()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(path: &Path) -> Result<ConfigDocument> {
        let display = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::io(&display, e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::parse(display, e))
    }

    /// Read `path` and its includes depth-first; a file already visited is
    /// skipped, so include cycles terminate
    fn collect(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        out: &mut Vec<(PathBuf, Option<Fingerprint>, ConfigDocument)>,
    ) -> Result<()> {
        let key = normalize(path);
        if !visited.insert(key) {
            debug!(path = %path.display(), "config file already included, skipping");
            return Ok(());
        }

        // Taken before reading: an edit racing the read costs one extra reload
        let baseline = fingerprint(path);
        let document = Self::read_document(path)?;
        let base = base_dir(path);
        let includes: Vec<PathBuf> = document.include.iter().map(|i| base.join(i)).collect();
        out.push((path.to_path_buf(), baseline, document));

        for include in includes {
            Self::collect(&include, visited, out)?;
        }
        Ok(())
    }
}

fn base_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl ConfigSource for TomlConfigSource {
    fn load(&self) -> Result<LoadedConfig> {
        let mut documents = Vec::new();
        Self::collect(&self.path, &mut HashSet::new(), &mut documents)?;

        let mut loaded = LoadedConfig::new();
        let mut declared = HashSet::new();
        for (index, (path, baseline, document)) in documents.into_iter().enumerate() {
            loaded.watch_set.insert_read(&path, baseline);
            if index == 0 {
                loaded.case_sensitive = document.case_sensitive;
                loaded.log = document.log.clone();
            }

            // Map order is unspecified; sort so target ids are stable
            let mut targets: Vec<_> = document.targets.iter().collect();
            targets.sort_by(|a, b| a.0.cmp(b.0));

            let base = base_dir(&path);
            for (name, config) in targets {
                if !config.enabled {
                    debug!(target_name = %name, "target disabled, skipping");
                    continue;
                }
                if !declared.insert(name.clone()) {
                    close_all(&loaded.targets);
                    return Err(ConfigError::duplicate_target(name));
                }
                let settings = TargetSettings::new(
                    name,
                    config.resolved_type(name),
                    &config.settings,
                    &base,
                );
                let target = match self.registry.create(&settings) {
                    Ok(target) => target,
                    Err(e) => {
                        close_all(&loaded.targets);
                        return Err(e);
                    }
                };
                loaded.targets.push(TargetDecl {
                    target,
                    stages: config.stage_configs(),
                });
            }

            loaded.rules.extend(
                document
                    .rules
                    .iter()
                    .filter(|rule| rule.enabled)
                    .map(|rule| rule.to_rule()),
            );
        }

        debug!(
            path = %self.path.display(),
            files = loaded.watch_set.len(),
            targets = loaded.targets.len(),
            rules = loaded.rules.len(),
            "configuration loaded"
        );
        Ok(loaded)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn close_all(targets: &[TargetDecl]) {
    for decl in targets {
        decl.target.close();
    }
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
