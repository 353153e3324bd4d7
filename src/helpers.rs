//! Shared Helpers - Universal Background/Fill/Stroke
//!
//! Routines any draw procedure may call to honor the reserved parameters.
//! The helper namespace is registered once per process; the compiler lists
//! it in every compiled program.

use serde::Serialize;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tracing::info;

use crate::resolver::ResolvedParameters;
use crate::schema::reserved_default;
use crate::surface::{LineCap, LineJoin, LinearGradient, Paint, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub width: f64,
    pub height: f64,
    pub center_x: f64,
    pub center_y: f64,
}

impl Bounds {
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            min_x: x,
            max_x: x + width,
            min_y: y,
            max_y: y + height,
            width,
            height,
            center_x: x + width / 2.0,
            center_y: y + height / 2.0,
        }
    }
}

/// Axis-aligned bounds of a point set. All zeros for an empty set.
pub fn bounds_from_points(points: &[Point]) -> Bounds {
    let Some(first) = points.first() else {
        return Bounds::default();
    };
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }
    Bounds::from_rect(min_x, min_y, max_x - min_x, max_y - min_y)
}

/// Resolved string value, falling back to the reserved table's default.
fn text(params: &ResolvedParameters, key: &str) -> String {
    match params.str(key) {
        Some(s) => s.to_string(),
        None => reserved_default(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
    }
}

/// Resolved number, falling back to the reserved table's default.
fn number(params: &ResolvedParameters, key: &str) -> f64 {
    params
        .number(key)
        .or_else(|| reserved_default(key).and_then(|v| v.as_f64()))
        .unwrap_or(0.0)
}

/// Paint the background per `backgroundType`: transparent, solid, or gradient.
pub fn apply_background(
    surface: &mut dyn Surface,
    width: f64,
    height: f64,
    params: &ResolvedParameters,
) {
    let kind = text(params, "backgroundType");
    if kind == "transparent" {
        return;
    }

    surface.save();
    surface.set_global_alpha(number(params, "backgroundOpacity"));
    if kind == "gradient" {
        let direction = number(params, "backgroundGradientDirection").to_radians();
        let (cx, cy) = (width / 2.0, height / 2.0);
        let (dx, dy) = (direction.cos() * width / 2.0, direction.sin() * height / 2.0);
        let gradient = LinearGradient::new(cx - dx, cy - dy, cx + dx, cy + dy)
            .stop(0.0, &text(params, "backgroundGradientStart"))
            .stop(1.0, &text(params, "backgroundGradientEnd"));
        surface.set_fill_style(Paint::LinearGradient(gradient));
    } else {
        surface.set_fill_style(Paint::color(&text(params, "backgroundColor")));
    }
    surface.fill_rect(0.0, 0.0, width, height);
    surface.restore();
}

/// Fill the current path per `fillType`, with gradients spanning `bounds`.
pub fn apply_fill(surface: &mut dyn Surface, bounds: &Bounds, params: &ResolvedParameters) {
    let kind = text(params, "fillType");
    if kind == "none" {
        return;
    }

    surface.save();
    surface.set_global_alpha(number(params, "fillOpacity"));
    if kind == "gradient" {
        let direction = number(params, "fillGradientDirection").to_radians();
        let (dx, dy) = (
            direction.cos() * bounds.width / 2.0,
            direction.sin() * bounds.height / 2.0,
        );
        let gradient = LinearGradient::new(
            bounds.center_x - dx,
            bounds.center_y - dy,
            bounds.center_x + dx,
            bounds.center_y + dy,
        )
        .stop(0.0, &text(params, "fillGradientStart"))
        .stop(1.0, &text(params, "fillGradientEnd"));
        surface.set_fill_style(Paint::LinearGradient(gradient));
    } else {
        surface.set_fill_style(Paint::color(&text(params, "fillColor")));
    }
    surface.fill();
    surface.restore();
}

/// Stroke the current path per `strokeType`: solid, dashed, or dotted.
///
/// Dashes use `strokeDashSize`/`strokeGapSize`. Dots default to the line
/// width for both unless those sizes are supplied.
pub fn apply_stroke(surface: &mut dyn Surface, params: &ResolvedParameters) {
    let kind = text(params, "strokeType");
    if kind == "none" {
        return;
    }
    let width = number(params, "strokeWidth");

    surface.save();
    surface.set_global_alpha(number(params, "strokeOpacity"));
    surface.set_stroke_style(Paint::color(&text(params, "strokeColor")));
    surface.set_line_width(width);
    surface.set_line_cap(LineCap::Round);
    surface.set_line_join(LineJoin::Round);
    match kind.as_str() {
        "dashed" => surface.set_line_dash(&[
            number(params, "strokeDashSize"),
            number(params, "strokeGapSize"),
        ]),
        "dotted" => surface.set_line_dash(&[
            params.number("strokeDashSize").unwrap_or(width),
            params.number("strokeGapSize").unwrap_or(width),
        ]),
        _ => surface.set_line_dash(&[]),
    }
    surface.stroke();
    surface.restore();
}

/// `#rrggbb` plus alpha in [0, 1] as `#rrggbbaa`. Other inputs pass through.
pub fn color_with_alpha(hex: &str, alpha: f64) -> String {
    match hex.strip_prefix('#') {
        Some(digits) if digits.len() == 6 && digits.chars().all(|c| c.is_ascii_hexdigit()) => {
            let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
            format!("#{}{:02x}", digits, a)
        }
        _ => hex.to_string(),
    }
}

/// Regular polygon vertices around a center, first vertex pointing up.
pub fn polygon_points(cx: f64, cy: f64, radius: f64, sides: usize, rotation: f64) -> Vec<Point> {
    (0..sides)
        .map(|i| {
            let angle = rotation - PI / 2.0 + (i as f64) * 2.0 * PI / sides as f64;
            Point::new(cx + radius * angle.cos(), cy + radius * angle.sin())
        })
        .collect()
}

// --- Helper namespace ---

#[derive(Debug, Clone, Serialize)]
pub struct HelperInfo {
    pub name: &'static str,
    pub signature: &'static str,
    pub summary: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HelperNamespace {
    pub helpers: Vec<HelperInfo>,
}

impl HelperNamespace {
    fn builtin() -> Self {
        Self {
            helpers: vec![
                HelperInfo {
                    name: "applyUniversalBackground",
                    signature: "(surface, width, height, params)",
                    summary: "paints transparent / solid / gradient background",
                },
                HelperInfo {
                    name: "applyUniversalFill",
                    signature: "(surface, bounds, params)",
                    summary: "fills the current path with none / solid / gradient",
                },
                HelperInfo {
                    name: "applyUniversalStroke",
                    signature: "(surface, params)",
                    summary: "strokes the current path solid / dashed / dotted",
                },
                HelperInfo {
                    name: "getBoundsFromPoints",
                    signature: "(points)",
                    summary: "min/max, size and center of a point set",
                },
            ],
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.helpers.iter().map(|h| h.name)
    }
}

static HELPERS_INITIALIZED: AtomicBool = AtomicBool::new(false);
static NAMESPACE: OnceLock<HelperNamespace> = OnceLock::new();

/// One-time registration of the helper namespace. Returns `true` only for
/// the call that performed it.
pub fn initialize() -> bool {
    if HELPERS_INITIALIZED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return false;
    }
    info!(helpers = namespace().helpers.len(), "shared helper namespace registered");
    true
}

pub fn is_initialized() -> bool {
    HELPERS_INITIALIZED.load(Ordering::Acquire)
}

/// The helper listing. Reading it does not count as initialization.
pub fn namespace() -> &'static HelperNamespace {
    NAMESPACE.get_or_init(HelperNamespace::builtin)
}
