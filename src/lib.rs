//! Reflow Core - Template Parameter & Execution Engine
//!
//! # Render Rules
//! 1. Layers Resolve By Precedence (content > custom > style > core > root > preset)
//! 2. The Legacy Bag Only Fills Gaps
//! 3. Reserved Parameters Belong To The Engine
//! 4. Compile Once Per Template, Never Per Frame
//! 5. Load Failures Never Touch The Surface
//! 6. Draw Failures Never Escape The Sandbox

pub mod schema;
pub mod visibility;
pub mod resolver;
pub mod surface;
pub mod helpers;
pub mod templates;
pub mod compiler;
pub mod registry;
pub mod sandbox;
pub mod config;
pub mod engine;
pub mod catalog;
pub mod presets;
pub mod hashing;

pub use schema::{
    common_parameter, common_parameters, generate_defaults, reserved_parameters, validate,
    ParameterDefinition, ParameterKind, ParameterSet, SchemaError, ValidationOutcome,
};
pub use visibility::{is_visible, VisibilityRule};
pub use resolver::{flatten, resolve, Layer, ParameterGroups, ResolvedParameters};
pub use surface::{DrawCommand, Paint, RecordingSurface, Surface};
pub use templates::{DrawError, DrawProcedure, TemplateDefinition, TemplateId, TemplateMetadata};
pub use compiler::{compile, CompileError, CompiledTemplate, CompiledTemplateProgram};
pub use registry::{
    LoadError, LoadedTemplate, ModuleLoader, ProcedureTable, RegisterError, TemplateModule,
    TemplateRegistry,
};
pub use sandbox::{ExecutionResult, Sandbox};
pub use config::{ConfigError, EngineConfig, SandboxConfig};
pub use engine::{Engine, EngineError, ParameterReport};
pub use presets::{PresetError, PresetRegistry, TemplatePreset};
pub use hashing::{canonical_json, compute_parameters_hash, compute_program_fingerprint};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
