//! Reflow CLI - Bridge interface for template hosts
//!
//! Commands: templates, presets, inspect, validate, render
//! Outputs JSON to stdout, logs to stderr
//! Returns 2 when a template fails to draw, 1 on any other failure

use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use reflow_core::{compute_parameters_hash, Engine, EngineConfig, ParameterGroups, RecordingSurface};

#[derive(Parser)]
#[command(name = "reflow-cli")]
#[command(about = "Reflow CLI - Template Parameter & Execution Engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to engine config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of template manifests, overrides the config
    #[arg(short, long)]
    templates_dir: Option<PathBuf>,

    /// Directory of preset files, overrides the config
    #[arg(long)]
    presets_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available templates
    Templates,

    /// List presets, optionally for one template
    Presets {
        /// Template ID
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Print the compiled program of a template
    Inspect {
        /// Template ID
        #[arg(short, long)]
        template: String,
    },

    /// Validate parameter values and report visibility
    Validate {
        /// Template ID
        #[arg(short, long)]
        template: String,

        /// JSON payload (parameter groups)
        #[arg(short, long)]
        payload: String,
    },

    /// Render a template to SVG
    Render {
        /// Template ID
        #[arg(short, long)]
        template: String,

        /// JSON payload (parameter groups)
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Preset applied beneath the payload
        #[arg(long)]
        preset: Option<String>,

        /// Animation time in seconds
        #[arg(long, default_value_t = 0.0)]
        time: f64,

        #[arg(long, default_value_t = 512.0)]
        width: f64,

        #[arg(long, default_value_t = 512.0)]
        height: f64,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reflow_core=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(c) => c,
            Err(e) => return fail(json!({ "error": e.to_string() })),
        },
        None => EngineConfig::default(),
    };
    if cli.templates_dir.is_some() {
        config.templates_dir = cli.templates_dir.clone();
    }
    if cli.presets_dir.is_some() {
        config.presets_dir = cli.presets_dir.clone();
    }

    let engine = match Engine::from_config(config) {
        Ok(e) => e,
        Err(e) => return fail(json!({ "error": format!("Failed to load templates: {}", e) })),
    };

    match cli.command {
        Commands::Templates => {
            let templates: Vec<_> = engine
                .registry()
                .list_ids()
                .into_iter()
                .map(|id| match engine.registry().load(&id) {
                    Ok(loaded) => json!({
                        "id": id,
                        "metadata": loaded.definition.metadata(),
                        "compiled": loaded.program.is_some(),
                    }),
                    Err(e) => json!({ "id": id, "error": e.to_string() }),
                })
                .collect();
            print_json(&json!(templates));
            ExitCode::SUCCESS
        }

        Commands::Presets { template } => {
            let presets = match &template {
                Some(id) => match engine.presets_for(id) {
                    Ok(p) => p,
                    Err(e) => return fail(json!({ "error": e.to_string() })),
                },
                None => engine.presets().iter().collect(),
            };
            print_json(&json!(presets));
            ExitCode::SUCCESS
        }

        Commands::Inspect { template } => match engine.registry().inspect(&template) {
            Ok(program) => {
                print_json(&json!(program.as_ref()));
                ExitCode::SUCCESS
            }
            Err(e) => fail(json!({ "error": e.to_string() })),
        },

        Commands::Validate { template, payload } => {
            let groups = match parse_groups(&payload) {
                Ok(g) => g,
                Err(e) => return fail(json!({ "valid": false, "error": e })),
            };
            match engine.describe_parameters(&template, &groups) {
                Ok(reports) => {
                    let valid = reports.iter().all(|r| r.valid);
                    print_json(&json!({ "valid": valid, "parameters": reports }));
                    if valid {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(2)
                    }
                }
                Err(e) => fail(json!({ "valid": false, "error": e.to_string() })),
            }
        }

        Commands::Render {
            template,
            payload,
            preset,
            time,
            width,
            height,
        } => {
            let mut groups = match parse_groups(&payload) {
                Ok(g) => g,
                Err(e) => return fail(json!({ "success": false, "error": e })),
            };
            if let Some(preset) = &preset {
                groups = match engine.apply_preset(&template, preset, &groups) {
                    Ok(g) => g,
                    Err(e) => return fail(json!({ "success": false, "error": e.to_string() })),
                };
            }
            let parameters_hash = engine
                .resolve(&template, &groups)
                .ok()
                .and_then(|params| compute_parameters_hash(&params).ok());

            let mut surface = RecordingSurface::new(width, height);
            let rendered = engine
                .generate_visualization(&mut surface, &template, &groups, time, width, height);
            match rendered {
                Ok(result) => {
                    print_json(&json!({
                        "success": result.success,
                        "error": result.error,
                        "parametersHash": parameters_hash,
                        "svg": STANDARD.encode(surface.to_svg()),
                    }));
                    if result.success {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(2)
                    }
                }
                Err(e) => fail(json!({ "success": false, "error": e.to_string() })),
            }
        }
    }
}

fn parse_groups(payload: &str) -> Result<ParameterGroups, String> {
    serde_json::from_str(payload).map_err(|e| format!("Invalid payload: {}", e))
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => println!(r#"{{"error": "{}"}}"#, e),
    }
}

fn fail(value: serde_json::Value) -> ExitCode {
    print_json(&value);
    ExitCode::FAILURE
}
