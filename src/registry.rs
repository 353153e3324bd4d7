//! Template Registry - Lazy Loading and Caching
//!
//! Two sources of templates:
//! - native entries registered in-process (the built-in catalog), used as is;
//! - modules behind a loader (for example a manifest file on disk), which are
//!   validated and compiled on first `load` and cached by id from then on.
//!
//! The cache is append-only. Sources are registered through `&mut self`;
//! loading only needs `&self`, so a populated registry can be shared.
//! An id cannot be registered again once it has been loaded.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::compiler::{compile, CompileError, CompiledTemplateProgram};
use crate::schema::{ParameterSet, SchemaError};
use crate::templates::{DrawProcedure, TemplateDefinition, TemplateId, TemplateMetadata};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Template not found: {0}")]
    NotFound(TemplateId),

    #[error("Malformed template module '{id}': {reason}")]
    Malformed { id: TemplateId, reason: String },

    #[error("Template '{id}' requires engine {required}, running {current}")]
    Incompatible {
        id: TemplateId,
        required: semver::Version,
        current: semver::Version,
    },

    #[error("Failed to compile template '{id}': {source}")]
    Compilation {
        id: TemplateId,
        #[source]
        source: CompileError,
    },

    #[error("Failed to read template '{id}': {message}")]
    Io { id: TemplateId, message: String },
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("Template '{0}' is already loaded and cannot be replaced")]
    AlreadyLoaded(TemplateId),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl LoadError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    fn malformed(id: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

/// Engine version that template modules are checked against.
pub fn engine_version() -> semver::Version {
    semver::Version::new(
        env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
        env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
        env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
    )
}

/// What a template module exports. Each field is checked before compiling.
#[derive(Debug, Clone, Default)]
pub struct TemplateModule {
    pub parameters: Option<Value>,
    pub metadata: Option<Value>,
    pub draw: Option<DrawProcedure>,
}

type ModuleLoaderFn = dyn Fn(&str) -> Result<TemplateModule, LoadError> + Send + Sync;

/// Produces a module on demand. Not called until the id is first loaded.
#[derive(Clone)]
pub struct ModuleLoader(Arc<ModuleLoaderFn>);

impl ModuleLoader {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<TemplateModule, LoadError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Loader for an already-built module.
    pub fn from_module(module: TemplateModule) -> Self {
        Self::new(move |_| Ok(module.clone()))
    }

    fn load(&self, id: &str) -> Result<TemplateModule, LoadError> {
        (self.0)(id)
    }
}

impl fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ModuleLoader(..)")
    }
}

/// Named draw procedures that manifests refer to by their `draw` field.
#[derive(Debug, Clone, Default)]
pub struct ProcedureTable {
    procedures: HashMap<String, DrawProcedure>,
}

impl ProcedureTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, procedure: DrawProcedure) -> Self {
        self.insert(name, procedure);
        self
    }

    pub fn insert(&mut self, name: &str, procedure: DrawProcedure) {
        self.procedures.insert(name.to_string(), procedure);
    }

    pub fn get(&self, name: &str) -> Option<&DrawProcedure> {
        self.procedures.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.procedures.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// A template ready to execute.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    pub definition: Arc<TemplateDefinition>,
    pub procedure: DrawProcedure,
    /// Present for compiled modules, absent for native entries.
    pub program: Option<Arc<CompiledTemplateProgram>>,
}

#[derive(Debug, Clone)]
enum Source {
    Native(Arc<LoadedTemplate>),
    Module(ModuleLoader),
}

#[derive(Debug, Default)]
pub struct TemplateRegistry {
    sources: HashMap<TemplateId, Source>,
    cache: RwLock<HashMap<TemplateId, Arc<LoadedTemplate>>>,
    compilations: AtomicUsize,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bare callable. It gets placeholder metadata and no parameters.
    pub fn register_native(&mut self, id: &str, draw: DrawProcedure) -> Result<(), RegisterError> {
        let metadata = TemplateMetadata::for_id(id);
        let definition = TemplateDefinition::new(id, metadata, ParameterSet::new(), draw)?;
        self.register_definition(definition)
    }

    /// Register a fully described native template. No compilation happens.
    pub fn register_definition(
        &mut self,
        definition: TemplateDefinition,
    ) -> Result<(), RegisterError> {
        let id = definition.id().to_string();
        self.ensure_replaceable(&id)?;
        let loaded = LoadedTemplate {
            procedure: definition.draw().clone(),
            definition: Arc::new(definition),
            program: None,
        };
        self.sources.insert(id, Source::Native(Arc::new(loaded)));
        Ok(())
    }

    /// Register a lazily loaded module. Nothing is read until `load`.
    pub fn register_module(&mut self, id: &str, loader: ModuleLoader) -> Result<(), RegisterError> {
        self.ensure_replaceable(id)?;
        self.sources.insert(id.to_string(), Source::Module(loader));
        Ok(())
    }

    /// Register every `*.json` manifest in `dir` as a lazy module keyed by
    /// file stem. Returns how many were registered.
    pub fn scan_manifest_dir(
        &mut self,
        dir: &Path,
        procedures: Arc<ProcedureTable>,
    ) -> io::Result<usize> {
        let mut count = 0;
        if !dir.exists() {
            warn!(dir = %dir.display(), "template directory does not exist");
            return Ok(0);
        }
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.extension().map_or(false, |e| e == "json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if let Err(e) = self.register_module(&id, manifest_loader(path, procedures.clone())) {
                warn!(template = %id, error = %e, "skipping template manifest");
                continue;
            }
            count += 1;
        }
        info!(dir = %dir.display(), count, "registered template manifests");
        Ok(count)
    }

    /// Executable for `id`, loading and compiling on first use.
    pub fn load(&self, id: &str) -> Result<Arc<LoadedTemplate>, LoadError> {
        if let Some(hit) = self.cached(id) {
            debug!(template = id, "template cache hit");
            return Ok(hit);
        }

        let loaded = match self.sources.get(id) {
            None => return Err(LoadError::NotFound(id.to_string())),
            Some(Source::Native(loaded)) => loaded.clone(),
            Some(Source::Module(loader)) => {
                let module = loader.load(id)?;
                let loaded = Arc::new(self.build(id, module)?);
                info!(template = id, "template module loaded");
                loaded
            }
        };

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // First writer wins on a race; a duplicate compile is discarded.
        Ok(cache.entry(id.to_string()).or_insert(loaded).clone())
    }

    /// Whether `id` is known to either source. Never triggers a load.
    pub fn is_registered(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// All registered ids, sorted.
    pub fn list_ids(&self) -> Vec<TemplateId> {
        let mut ids: Vec<TemplateId> = self.sources.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Compiled program of a module already loaded.
    pub fn program(&self, id: &str) -> Option<Arc<CompiledTemplateProgram>> {
        self.cached(id).and_then(|loaded| loaded.program.clone())
    }

    /// Program text for inspection. Compiles native entries on the side
    /// without caching or counting the result.
    pub fn inspect(&self, id: &str) -> Result<Arc<CompiledTemplateProgram>, LoadError> {
        let loaded = self.load(id)?;
        match &loaded.program {
            Some(program) => Ok(program.clone()),
            None => compile(&loaded.definition)
                .map(|compiled| compiled.program)
                .map_err(|source| LoadError::Compilation { id: id.to_string(), source }),
        }
    }

    /// Number of module compilations performed. Cache hits do not count.
    pub fn compilation_count(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    fn cached(&self, id: &str) -> Option<Arc<LoadedTemplate>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache.get(id).cloned()
    }

    /// Unloaded ids may be replaced; loaded ones are fixed for the
    /// lifetime of the registry.
    fn ensure_replaceable(&mut self, id: &str) -> Result<(), RegisterError> {
        let cache = self.cache.get_mut().unwrap_or_else(PoisonError::into_inner);
        if cache.contains_key(id) {
            return Err(RegisterError::AlreadyLoaded(id.to_string()));
        }
        Ok(())
    }

    fn build(&self, id: &str, module: TemplateModule) -> Result<LoadedTemplate, LoadError> {
        let parameters = module
            .parameters
            .ok_or_else(|| LoadError::malformed(id, "missing `parameters` export"))?;
        let metadata = module
            .metadata
            .ok_or_else(|| LoadError::malformed(id, "missing `metadata` export"))?;
        let draw = module
            .draw
            .ok_or_else(|| LoadError::malformed(id, "missing `draw` export"))?;

        if !parameters.is_object() {
            return Err(LoadError::malformed(id, "`parameters` must be an object"));
        }
        let parameters = ParameterSet::deserialize(parameters)
            .map_err(|e| LoadError::malformed(id, format!("invalid `parameters`: {}", e)))?;
        let metadata = TemplateMetadata::deserialize(metadata)
            .map_err(|e| LoadError::malformed(id, format!("invalid `metadata`: {}", e)))?;

        if let Some(required) = &metadata.engine_min_version {
            let current = engine_version();
            if *required > current {
                return Err(LoadError::Incompatible {
                    id: id.to_string(),
                    required: required.clone(),
                    current,
                });
            }
        }

        let definition = TemplateDefinition::new(id, metadata, parameters, draw)
            .map_err(|e| LoadError::Compilation {
                id: id.to_string(),
                source: e.into(),
            })?;
        let compiled = compile(&definition).map_err(|source| LoadError::Compilation {
            id: id.to_string(),
            source,
        })?;
        self.compilations.fetch_add(1, Ordering::Relaxed);

        Ok(LoadedTemplate {
            definition: Arc::new(definition),
            procedure: compiled.procedure,
            program: Some(compiled.program),
        })
    }
}

/// Loader for one manifest file:
/// `{ "metadata": {..}, "parameters": {..}, "draw": "<procedure>" }`.
pub fn manifest_loader(path: PathBuf, procedures: Arc<ProcedureTable>) -> ModuleLoader {
    ModuleLoader::new(move |id| {
        let content = fs::read_to_string(&path).map_err(|e| LoadError::Io {
            id: id.to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;
        let mut manifest: Map<String, Value> = serde_json::from_str(&content)
            .map_err(|e| LoadError::malformed(id, format!("invalid JSON: {}", e)))?;

        let draw = match manifest.remove("draw") {
            None => None,
            Some(Value::String(name)) => Some(
                procedures
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| {
                        LoadError::malformed(id, format!("unknown draw procedure '{}'", name))
                    })?,
            ),
            Some(_) => return Err(LoadError::malformed(id, "`draw` must name a procedure")),
        };

        Ok(TemplateModule {
            parameters: manifest.remove("parameters"),
            metadata: manifest.remove("metadata"),
            draw,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn noop() -> DrawProcedure {
        DrawProcedure::new(|_, _, _, _, _| Ok(()))
    }

    fn module() -> TemplateModule {
        TemplateModule {
            parameters: Some(json!({
                "size": { "type": "slider", "default": 10, "min": 0, "max": 20 }
            })),
            metadata: Some(json!({ "name": "Square", "description": "A square" })),
            draw: Some(noop()),
        }
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = TemplateRegistry::new();
        let err = registry.load("nope").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Template not found: nope");
    }

    #[test]
    fn test_native_entries_skip_compilation() {
        let mut registry = TemplateRegistry::new();
        registry.register_native("dot", noop()).unwrap();
        let loaded = registry.load("dot").unwrap();
        assert!(loaded.program.is_none());
        assert_eq!(loaded.definition.metadata().name, "Dot");
        assert_eq!(registry.compilation_count(), 0);
    }

    #[test]
    fn test_module_loaded_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registry = TemplateRegistry::new();
        registry.register_module(
            "square",
            ModuleLoader::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(module())
            }),
        )
        .unwrap();

        assert!(registry.is_registered("square"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let first = registry.load("square").unwrap();
        let second = registry.load("square").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.compilation_count(), 1);
        assert!(registry.program("square").is_some());
    }

    #[test]
    fn test_missing_export_is_malformed() {
        let mut registry = TemplateRegistry::new();
        let mut broken = module();
        broken.draw = None;
        registry.register_module("broken", ModuleLoader::from_module(broken)).unwrap();
        match registry.load("broken") {
            Err(LoadError::Malformed { reason, .. }) => assert!(reason.contains("draw")),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert_eq!(registry.compilation_count(), 0);
    }

    #[test]
    fn test_bad_default_is_compilation_error() {
        let mut registry = TemplateRegistry::new();
        let mut bad = module();
        bad.parameters = Some(json!({
            "size": { "type": "slider", "default": 50, "min": 0, "max": 20 }
        }));
        registry.register_module("bad", ModuleLoader::from_module(bad)).unwrap();
        assert!(matches!(registry.load("bad"), Err(LoadError::Compilation { .. })));
    }

    #[test]
    fn test_engine_min_version_checked() {
        let mut registry = TemplateRegistry::new();
        let mut future = module();
        future.metadata = Some(json!({
            "name": "F",
            "description": "",
            "engineMinVersion": "99.0.0"
        }));
        registry.register_module("future", ModuleLoader::from_module(future)).unwrap();
        assert!(matches!(registry.load("future"), Err(LoadError::Incompatible { .. })));
    }

    #[test]
    fn test_list_ids_covers_both_sources() {
        let mut registry = TemplateRegistry::new();
        registry.register_native("b", noop()).unwrap();
        registry.register_module("a", ModuleLoader::from_module(module())).unwrap();
        assert_eq!(registry.list_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_loaded_ids_cannot_be_replaced() {
        let mut registry = TemplateRegistry::new();
        registry.register_module("square", ModuleLoader::from_module(module())).unwrap();
        registry.register_native("square", noop()).unwrap();
        registry.register_module("square", ModuleLoader::from_module(module())).unwrap();

        let first = registry.load("square").unwrap();
        assert!(matches!(
            registry.register_native("square", noop()),
            Err(RegisterError::AlreadyLoaded(id)) if id == "square"
        ));
        assert!(matches!(
            registry.register_module("square", ModuleLoader::from_module(module())),
            Err(RegisterError::AlreadyLoaded(_))
        ));
        assert!(Arc::ptr_eq(&first, &registry.load("square").unwrap()));
        assert!(first.program.is_some());
        assert_eq!(registry.compilation_count(), 1);
    }

    #[test]
    fn test_scan_skips_loaded_ids() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = json!({
            "metadata": { "name": "Square", "description": "" },
            "parameters": {},
            "draw": "noop"
        });
        fs::write(dir.path().join("square.json"), manifest.to_string()).unwrap();
        fs::write(dir.path().join("dot.json"), manifest.to_string()).unwrap();
        let procedures = Arc::new(ProcedureTable::new().with("noop", noop()));

        let mut registry = TemplateRegistry::new();
        registry.register_native("square", noop()).unwrap();
        registry.load("square").unwrap();
        assert_eq!(registry.scan_manifest_dir(dir.path(), procedures).unwrap(), 1);
        assert!(registry.load("square").unwrap().program.is_none());
        assert!(registry.load("dot").unwrap().program.is_some());
    }

    #[test]
    fn test_inspect_native_does_not_count() {
        let mut registry = TemplateRegistry::new();
        registry.register_native("dot", noop()).unwrap();
        let program = registry.inspect("dot").unwrap();
        assert!(program.text.contains("const PARAMETERS"));
        assert_eq!(registry.compilation_count(), 0);
        assert!(registry.program("dot").is_none());
    }
}
