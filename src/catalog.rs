//! Built-in Catalog
//!
//! Native templates registered without compilation. Their draw procedures
//! are also exposed by name so manifests on disk can reuse them, and each
//! ships a few presets.

use serde_json::{json, Map, Value};
use std::f64::consts::{PI, SQRT_2};

use crate::helpers::{
    apply_background, apply_fill, apply_stroke, bounds_from_points, polygon_points, Bounds, Point,
};
use crate::presets::{PresetError, PresetRegistry, TemplatePreset};
use crate::registry::{ProcedureTable, RegisterError, TemplateRegistry};
use crate::resolver::ResolvedParameters;
use crate::schema::{categories, common_parameter, ParameterDefinition, ParameterSet, SchemaError};
use crate::surface::{Paint, Surface, TextAlign, TextBaseline};
use crate::templates::{DrawError, DrawProcedure, TemplateDefinition, TemplateMetadata};
use crate::visibility::VisibilityRule;

pub const MINIMAL_SHAPE: &str = "minimal-shape";
pub const AUDIO_BARS: &str = "audio-bars";

pub fn register_builtin(registry: &mut TemplateRegistry) -> Result<(), RegisterError> {
    registry.register_definition(minimal_shape()?)?;
    registry.register_definition(audio_bars()?)?;
    Ok(())
}

pub fn register_builtin_presets(presets: &mut PresetRegistry) -> Result<(), PresetError> {
    for preset in builtin_presets() {
        presets.register(preset)?;
    }
    Ok(())
}

pub fn builtin_presets() -> Vec<TemplatePreset> {
    vec![
        TemplatePreset::new(
            "perfect-circle",
            "Perfect Circle",
            MINIMAL_SHAPE,
            values(json!({ "shape": "circle", "size": 70, "rotation": 0 })),
        )
        .description("Simple filled circle")
        .tags(["simple", "geometric"]),
        TemplatePreset::new(
            "rotated-square",
            "Diamond",
            MINIMAL_SHAPE,
            values(json!({ "shape": "square", "size": 60, "rotation": 45 })),
        )
        .description("Square rotated 45 degrees")
        .tags(["dynamic", "geometric"]),
        TemplatePreset::new(
            "calm-bars",
            "Calm Bars",
            AUDIO_BARS,
            values(json!({ "barCount": 16, "barGap": 4, "amplitude": 0.5, "animationSpeed": 0.5 })),
        )
        .description("Few wide bars moving slowly")
        .tags(["simple", "slow"]),
        TemplatePreset::new(
            "mirrored-spectrum",
            "Mirrored Spectrum",
            AUDIO_BARS,
            values(json!({ "barCount": 64, "barGap": 1, "mirror": true, "animationSpeed": 2 })),
        )
        .tags(["dense", "symmetric"]),
    ]
}

fn values(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// A shared definition by key.
fn common(key: &str) -> Result<ParameterDefinition, SchemaError> {
    common_parameter(key).ok_or_else(|| SchemaError::InvalidDefinition {
        key: key.to_string(),
        message: "not a common parameter".to_string(),
    })
}

pub fn builtin_procedures() -> ProcedureTable {
    ProcedureTable::new()
        .with(MINIMAL_SHAPE, DrawProcedure::new(draw_minimal_shape))
        .with(AUDIO_BARS, DrawProcedure::new(draw_audio_bars))
}

fn minimal_shape() -> Result<TemplateDefinition, SchemaError> {
    let parameters = ParameterSet::new()
        .with(
            "shape",
            ParameterDefinition::select(
                "square",
                [("square", "Square"), ("circle", "Circle"), ("diamond", "Diamond")],
            )
            .category(categories::GEOMETRY),
        )
        .with(
            "size",
            ParameterDefinition::slider(50.0, 10.0, 100.0)
                .step(1.0)
                .unit("%")
                .description("Shape size relative to the shorter canvas side")
                .category(categories::GEOMETRY),
        )
        .with("rotation", common("rotation")?)
        .with(
            "rotationSpeed",
            ParameterDefinition::slider(0.0, 0.0, 360.0)
                .step(5.0)
                .unit("°/s")
                .category(categories::ANIMATION),
        );

    TemplateDefinition::new(
        MINIMAL_SHAPE,
        TemplateMetadata::new("Minimal Shape", "A single centered shape with optional rotation")
            .category("geometric")
            .tags(["shape", "minimal"]),
        parameters,
        DrawProcedure::new(draw_minimal_shape),
    )
}

fn draw_minimal_shape(
    surface: &mut dyn Surface,
    width: f64,
    height: f64,
    params: &ResolvedParameters,
    time: f64,
) -> Result<(), DrawError> {
    apply_background(surface, width, height, params);

    let side = params.number_or("size", 50.0).clamp(10.0, 100.0) / 100.0 * width.min(height);
    let degrees = params.number_or("rotation", 0.0) + params.number_or("rotationSpeed", 0.0) * time;
    let rotation = degrees.to_radians();
    let (cx, cy) = (width / 2.0, height / 2.0);

    surface.begin_path();
    let bounds = match params.str_or("shape", "square") {
        "circle" => {
            surface.arc(cx, cy, side / 2.0, 0.0, 2.0 * PI);
            Bounds::from_rect(cx - side / 2.0, cy - side / 2.0, side, side)
        }
        "square" => {
            let corners = polygon_points(cx, cy, side / 2.0 * SQRT_2, 4, rotation + PI / 4.0);
            trace_polygon(surface, &corners)
        }
        "diamond" => trace_polygon(surface, &polygon_points(cx, cy, side / 2.0, 4, rotation)),
        other => {
            return Err(DrawError::InvalidParameter {
                key: "shape".to_string(),
                message: format!("unknown shape '{}'", other),
            })
        }
    };
    surface.close_path();

    apply_fill(surface, &bounds, params);
    apply_stroke(surface, params);
    Ok(())
}

fn trace_polygon(surface: &mut dyn Surface, points: &[Point]) -> Bounds {
    if let Some((first, rest)) = points.split_first() {
        surface.move_to(first.x, first.y);
        for p in rest {
            surface.line_to(p.x, p.y);
        }
    }
    bounds_from_points(points)
}

fn audio_bars() -> Result<TemplateDefinition, SchemaError> {
    let parameters = ParameterSet::new()
        .with(
            "barCount",
            ParameterDefinition::slider(32.0, 4.0, 128.0).step(1.0).category(categories::GEOMETRY),
        )
        .with(
            "barGap",
            ParameterDefinition::slider(2.0, 0.0, 20.0)
                .step(1.0)
                .unit("px")
                .category(categories::GEOMETRY),
        )
        .with(
            "amplitude",
            ParameterDefinition::slider(0.8, 0.1, 1.0).step(0.05).category(categories::ANIMATION),
        )
        .with("animationSpeed", common("animationSpeed")?)
        .with(
            "mirror",
            ParameterDefinition::toggle(false)
                .description("Grow bars from the vertical center")
                .category(categories::GEOMETRY),
        )
        .with(
            "showCaption",
            ParameterDefinition::toggle(false).category(categories::TYPOGRAPHY),
        )
        .with(
            "caption",
            ParameterDefinition::text("")
                .max_length(40)
                .category(categories::TYPOGRAPHY)
                .when(VisibilityRule::equals("showCaption", true)),
        )
        .with(
            "textColor",
            ParameterDefinition::color("#111827")
                .category(categories::TYPOGRAPHY)
                .when(VisibilityRule::equals("showCaption", true)),
        );

    TemplateDefinition::new(
        AUDIO_BARS,
        TemplateMetadata::new("Audio Bars", "Equalizer bars animated over time")
            .category("audio")
            .tags(["audio", "animated"]),
        parameters,
        DrawProcedure::new(draw_audio_bars),
    )
}

fn draw_audio_bars(
    surface: &mut dyn Surface,
    width: f64,
    height: f64,
    params: &ResolvedParameters,
    time: f64,
) -> Result<(), DrawError> {
    apply_background(surface, width, height, params);

    let count = params.number_or("barCount", 32.0).clamp(1.0, 256.0) as usize;
    let gap = params.number_or("barGap", 2.0).max(0.0);
    let amplitude = params.number_or("amplitude", 0.8).clamp(0.0, 1.0);
    let speed = params.number_or("animationSpeed", 1.0);
    let mirror = params.bool_or("mirror", false);
    let bar_width = ((width - gap * (count as f64 - 1.0)) / count as f64).max(1.0);

    surface.begin_path();
    for i in 0..count {
        let phase = i as f64 * 0.45;
        let t = time * speed;
        let swing = 0.6 + 0.4 * (t * 1.3 + phase * 2.1).cos();
        let level = 0.5 + 0.5 * (t * 2.0 + phase).sin() * swing;
        let bar_height = (level * amplitude * height).max(2.0);
        let x = i as f64 * (bar_width + gap);
        let y = if mirror { (height - bar_height) / 2.0 } else { height - bar_height };
        surface.rect(x, y, bar_width, bar_height);
    }
    let bounds = Bounds::from_rect(0.0, 0.0, width, height);
    apply_fill(surface, &bounds, params);
    apply_stroke(surface, params);

    let caption = params.str_or("caption", "");
    if params.bool_or("showCaption", false) && !caption.is_empty() {
        surface.set_fill_style(Paint::color(params.str_or("textColor", "#111827")));
        surface.set_font("14px sans-serif");
        surface.set_text_align(TextAlign::Center);
        surface.set_text_baseline(TextBaseline::Top);
        surface.fill_text(caption, width / 2.0, 8.0);
    }
    Ok(())
}
