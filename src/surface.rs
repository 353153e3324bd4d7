//! Drawing Surfaces
//!
//! `Surface` is the 2D-canvas-like context a draw procedure issues commands
//! against. `RecordingSurface` keeps the resolved commands and renders them
//! as SVG, which is what the CLI and the tests inspect.

use serde::Serialize;
use std::f64::consts::PI;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Paint {
    Color(String),
    LinearGradient(LinearGradient),
}

impl Paint {
    pub fn color(css: &str) -> Self {
        Self::Color(css.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinearGradient {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub stops: Vec<(f64, String)>,
}

impl LinearGradient {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1, stops: vec![] }
    }

    pub fn stop(mut self, offset: f64, color: &str) -> Self {
        self.stops.push((offset, color.to_string()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextBaseline {
    Alphabetic,
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    Miter,
    Round,
    Bevel,
}

/// 2D drawing context. Angles are radians, y grows downward.
pub trait Surface {
    fn save(&mut self);
    fn restore(&mut self);
    /// Drop all drawn content and reset the drawing state to defaults.
    fn reset(&mut self);

    fn set_fill_style(&mut self, paint: Paint);
    fn set_stroke_style(&mut self, paint: Paint);
    fn set_global_alpha(&mut self, alpha: f64);
    fn set_line_width(&mut self, width: f64);
    fn set_line_dash(&mut self, segments: &[f64]);
    fn set_line_cap(&mut self, cap: LineCap);
    fn set_line_join(&mut self, join: LineJoin);
    fn set_font(&mut self, font: &str);
    fn set_text_align(&mut self, align: TextAlign);
    fn set_text_baseline(&mut self, baseline: TextBaseline);

    fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64);
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64);

    fn begin_path(&mut self);
    fn move_to(&mut self, x: f64, y: f64);
    fn line_to(&mut self, x: f64, y: f64);
    fn arc(&mut self, cx: f64, cy: f64, radius: f64, start: f64, end: f64);
    fn rect(&mut self, x: f64, y: f64, width: f64, height: f64);
    fn close_path(&mut self);
    fn fill(&mut self);
    fn stroke(&mut self);

    fn fill_text(&mut self, text: &str, x: f64, y: f64);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PathSegment {
    MoveTo { x: f64, y: f64 },
    LineTo { x: f64, y: f64 },
    Arc { cx: f64, cy: f64, radius: f64, start: f64, end: f64 },
    Rect { x: f64, y: f64, width: f64, height: f64 },
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrokeStyle {
    pub paint: Paint,
    pub width: f64,
    pub dash: Vec<f64>,
    pub cap: LineCap,
    pub join: LineJoin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    pub font: String,
    pub align: TextAlign,
    pub baseline: TextBaseline,
}

/// A drawing operation with the state it was issued under.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DrawCommand {
    ClearRect { x: f64, y: f64, width: f64, height: f64 },
    FillRect { x: f64, y: f64, width: f64, height: f64, paint: Paint, alpha: f64 },
    FillPath { path: Vec<PathSegment>, paint: Paint, alpha: f64 },
    StrokePath { path: Vec<PathSegment>, style: StrokeStyle, alpha: f64 },
    FillText { text: String, x: f64, y: f64, paint: Paint, alpha: f64, style: TextStyle },
}

#[derive(Debug, Clone)]
struct DrawState {
    fill: Paint,
    stroke: Paint,
    alpha: f64,
    line_width: f64,
    dash: Vec<f64>,
    cap: LineCap,
    join: LineJoin,
    font: String,
    align: TextAlign,
    baseline: TextBaseline,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            fill: Paint::color("#000000"),
            stroke: Paint::color("#000000"),
            alpha: 1.0,
            line_width: 1.0,
            dash: vec![],
            cap: LineCap::Butt,
            join: LineJoin::Miter,
            font: "10px sans-serif".to_string(),
            align: TextAlign::Left,
            baseline: TextBaseline::Alphabetic,
        }
    }
}

/// Records every command; a clear covering the whole surface drops what came before.
#[derive(Debug, Clone)]
pub struct RecordingSurface {
    width: f64,
    height: f64,
    commands: Vec<DrawCommand>,
    state: DrawState,
    stack: Vec<DrawState>,
    path: Vec<PathSegment>,
}

impl RecordingSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            commands: vec![],
            state: DrawState::default(),
            stack: vec![],
            path: vec![],
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn is_blank(&self) -> bool {
        self.commands.is_empty()
    }

    /// Render the recording as a standalone SVG document.
    pub fn to_svg(&self) -> String {
        let mut defs = String::new();
        let mut body = String::new();
        let mut gradients = 0usize;

        let mut paint_ref = |paint: &Paint, defs: &mut String| -> String {
            match paint {
                Paint::Color(c) => escape_xml(c),
                Paint::LinearGradient(g) => {
                    gradients += 1;
                    let id = format!("g{}", gradients);
                    let _ = write!(
                        defs,
                        concat!(
                            r#"<linearGradient id="{}" gradientUnits="userSpaceOnUse" "#,
                            r#"x1="{}" y1="{}" x2="{}" y2="{}">"#
                        ),
                        id,
                        fmt_num(g.x0),
                        fmt_num(g.y0),
                        fmt_num(g.x1),
                        fmt_num(g.y1)
                    );
                    for (offset, color) in &g.stops {
                        let _ = write!(
                            defs,
                            r#"<stop offset="{}" stop-color="{}"/>"#,
                            fmt_num(*offset),
                            escape_xml(color)
                        );
                    }
                    defs.push_str("</linearGradient>");
                    format!("url(#{})", id)
                }
            }
        };

        for command in &self.commands {
            match command {
                DrawCommand::ClearRect { x, y, width, height } => {
                    let _ = write!(
                        body,
                        concat!(
                            r#"<rect x="{}" y="{}" width="{}" height="{}" "#,
                            r##"fill="#ffffff" fill-opacity="0"/>"##
                        ),
                        fmt_num(*x),
                        fmt_num(*y),
                        fmt_num(*width),
                        fmt_num(*height)
                    );
                }
                DrawCommand::FillRect { x, y, width, height, paint, alpha } => {
                    let fill = paint_ref(paint, &mut defs);
                    let _ = write!(
                        body,
                        r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"{}/>"#,
                        fmt_num(*x),
                        fmt_num(*y),
                        fmt_num(*width),
                        fmt_num(*height),
                        fill,
                        opacity_attr(*alpha)
                    );
                }
                DrawCommand::FillPath { path, paint, alpha } => {
                    let fill = paint_ref(paint, &mut defs);
                    let _ = write!(
                        body,
                        r#"<path d="{}" fill="{}"{}/>"#,
                        path_data(path),
                        fill,
                        opacity_attr(*alpha)
                    );
                }
                DrawCommand::StrokePath { path, style, alpha } => {
                    let stroke = paint_ref(&style.paint, &mut defs);
                    let dash = if style.dash.is_empty() {
                        String::new()
                    } else {
                        let parts: Vec<String> = style.dash.iter().map(|d| fmt_num(*d)).collect();
                        format!(r#" stroke-dasharray="{}""#, parts.join(" "))
                    };
                    let _ = write!(
                        body,
                        concat!(
                            r#"<path d="{}" fill="none" stroke="{}" stroke-width="{}" "#,
                            r#"stroke-linecap="{}" stroke-linejoin="{}"{}{}/>"#
                        ),
                        path_data(path),
                        stroke,
                        fmt_num(style.width),
                        cap_name(style.cap),
                        join_name(style.join),
                        dash,
                        opacity_attr(*alpha)
                    );
                }
                DrawCommand::FillText { text, x, y, paint, alpha, style } => {
                    let fill = paint_ref(paint, &mut defs);
                    let anchor = match style.align {
                        TextAlign::Left => "start",
                        TextAlign::Center => "middle",
                        TextAlign::Right => "end",
                    };
                    let baseline = match style.baseline {
                        TextBaseline::Alphabetic => "alphabetic",
                        TextBaseline::Top => "hanging",
                        TextBaseline::Middle => "middle",
                        TextBaseline::Bottom => "text-after-edge",
                    };
                    let _ = write!(
                        body,
                        concat!(
                            r#"<text x="{}" y="{}" fill="{}" style="font: {}" "#,
                            r#"text-anchor="{}" dominant-baseline="{}"{}>{}</text>"#
                        ),
                        fmt_num(*x),
                        fmt_num(*y),
                        fill,
                        escape_xml(&style.font),
                        anchor,
                        baseline,
                        opacity_attr(*alpha),
                        escape_xml(text)
                    );
                }
            }
        }

        let defs = if defs.is_empty() { defs } else { format!("<defs>{}</defs>", defs) };
        format!(
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" "#,
                r#"width="{w}" height="{h}" viewBox="0 0 {w} {h}">{}{}</svg>"#
            ),
            defs,
            body,
            w = fmt_num(self.width),
            h = fmt_num(self.height)
        )
    }

    fn covers_surface(&self, x: f64, y: f64, width: f64, height: f64) -> bool {
        x <= 0.0 && y <= 0.0 && x + width >= self.width && y + height >= self.height
    }
}

impl Surface for RecordingSurface {
    fn save(&mut self) {
        self.stack.push(self.state.clone());
    }

    fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    fn reset(&mut self) {
        self.commands.clear();
        self.stack.clear();
        self.path.clear();
        self.state = DrawState::default();
    }

    fn set_fill_style(&mut self, paint: Paint) {
        self.state.fill = paint;
    }

    fn set_stroke_style(&mut self, paint: Paint) {
        self.state.stroke = paint;
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        if alpha.is_finite() {
            self.state.alpha = alpha.clamp(0.0, 1.0);
        }
    }

    fn set_line_width(&mut self, width: f64) {
        if width.is_finite() && width > 0.0 {
            self.state.line_width = width;
        }
    }

    fn set_line_dash(&mut self, segments: &[f64]) {
        if segments.iter().all(|s| s.is_finite() && *s >= 0.0) {
            self.state.dash = segments.to_vec();
        }
    }

    fn set_line_cap(&mut self, cap: LineCap) {
        self.state.cap = cap;
    }

    fn set_line_join(&mut self, join: LineJoin) {
        self.state.join = join;
    }

    fn set_font(&mut self, font: &str) {
        self.state.font = font.to_string();
    }

    fn set_text_align(&mut self, align: TextAlign) {
        self.state.align = align;
    }

    fn set_text_baseline(&mut self, baseline: TextBaseline) {
        self.state.baseline = baseline;
    }

    fn clear_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        if self.covers_surface(x, y, width, height) {
            self.commands.clear();
        } else {
            self.commands.push(DrawCommand::ClearRect { x, y, width, height });
        }
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.commands.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            paint: self.state.fill.clone(),
            alpha: self.state.alpha,
        });
    }

    fn begin_path(&mut self) {
        self.path.clear();
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.path.push(PathSegment::MoveTo { x, y });
    }

    fn line_to(&mut self, x: f64, y: f64) {
        self.path.push(PathSegment::LineTo { x, y });
    }

    fn arc(&mut self, cx: f64, cy: f64, radius: f64, start: f64, end: f64) {
        self.path.push(PathSegment::Arc { cx, cy, radius, start, end });
    }

    fn rect(&mut self, x: f64, y: f64, width: f64, height: f64) {
        self.path.push(PathSegment::Rect { x, y, width, height });
    }

    fn close_path(&mut self) {
        self.path.push(PathSegment::Close);
    }

    fn fill(&mut self) {
        if self.path.is_empty() {
            return;
        }
        self.commands.push(DrawCommand::FillPath {
            path: self.path.clone(),
            paint: self.state.fill.clone(),
            alpha: self.state.alpha,
        });
    }

    fn stroke(&mut self) {
        if self.path.is_empty() {
            return;
        }
        self.commands.push(DrawCommand::StrokePath {
            path: self.path.clone(),
            style: StrokeStyle {
                paint: self.state.stroke.clone(),
                width: self.state.line_width,
                dash: self.state.dash.clone(),
                cap: self.state.cap,
                join: self.state.join,
            },
            alpha: self.state.alpha,
        });
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        self.commands.push(DrawCommand::FillText {
            text: text.to_string(),
            x,
            y,
            paint: self.state.fill.clone(),
            alpha: self.state.alpha,
            style: TextStyle {
                font: self.state.font.clone(),
                align: self.state.align,
                baseline: self.state.baseline,
            },
        });
    }
}

fn path_data(path: &[PathSegment]) -> String {
    let mut d = String::new();
    let mut has_point = false;
    for segment in path {
        match segment {
            PathSegment::MoveTo { x, y } => {
                let _ = write!(d, "M{} {} ", fmt_num(*x), fmt_num(*y));
                has_point = true;
            }
            PathSegment::LineTo { x, y } => {
                let op = if has_point { 'L' } else { 'M' };
                let _ = write!(d, "{}{} {} ", op, fmt_num(*x), fmt_num(*y));
                has_point = true;
            }
            PathSegment::Arc { cx, cy, radius, start, end } => {
                let (sx, sy) = (cx + radius * start.cos(), cy + radius * start.sin());
                let op = if has_point { 'L' } else { 'M' };
                let _ = write!(d, "{}{} {} ", op, fmt_num(sx), fmt_num(sy));
                let sweep = end - start;
                if sweep.abs() >= 2.0 * PI {
                    // Full circle: two half arcs back to the start point.
                    let (mx, my) = (cx - radius * start.cos(), cy - radius * start.sin());
                    let flag = if sweep > 0.0 { 1 } else { 0 };
                    let r = fmt_num(*radius);
                    let _ = write!(
                        d,
                        "A{r} {r} 0 1 {flag} {} {} A{r} {r} 0 1 {flag} {} {} ",
                        fmt_num(mx),
                        fmt_num(my),
                        fmt_num(sx),
                        fmt_num(sy)
                    );
                } else if sweep != 0.0 {
                    let (ex, ey) = (cx + radius * end.cos(), cy + radius * end.sin());
                    let large = if sweep.abs() > PI { 1 } else { 0 };
                    let flag = if sweep > 0.0 { 1 } else { 0 };
                    let r = fmt_num(*radius);
                    let _ = write!(d, "A{r} {r} 0 {large} {flag} {} {} ", fmt_num(ex), fmt_num(ey));
                }
                has_point = true;
            }
            PathSegment::Rect { x, y, width, height } => {
                let _ = write!(
                    d,
                    "M{} {} h{} v{} h{} Z ",
                    fmt_num(*x),
                    fmt_num(*y),
                    fmt_num(*width),
                    fmt_num(*height),
                    fmt_num(-width)
                );
                has_point = true;
            }
            PathSegment::Close => d.push_str("Z "),
        }
    }
    d.trim_end().to_string()
}

fn opacity_attr(alpha: f64) -> String {
    if alpha >= 1.0 {
        String::new()
    } else {
        format!(r#" opacity="{}""#, fmt_num(alpha))
    }
}

fn cap_name(cap: LineCap) -> &'static str {
    match cap {
        LineCap::Butt => "butt",
        LineCap::Round => "round",
        LineCap::Square => "square",
    }
}

fn join_name(join: LineJoin) -> &'static str {
    match join {
        LineJoin::Miter => "miter",
        LineJoin::Round => "round",
        LineJoin::Bevel => "bevel",
    }
}

/// Compact number formatting: integers without a fraction, otherwise up to 3 decimals.
pub fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let s = format!("{:.3}", n);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_captures_state() {
        let mut s = RecordingSurface::new(100.0, 100.0);
        s.save();
        s.set_fill_style(Paint::color("#ff0000"));
        s.set_global_alpha(0.5);
        s.fill_rect(0.0, 0.0, 10.0, 10.0);
        s.restore();
        s.fill_rect(0.0, 0.0, 5.0, 5.0);

        assert_eq!(
            s.commands()[0],
            DrawCommand::FillRect {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                paint: Paint::color("#ff0000"),
                alpha: 0.5,
            }
        );
        match &s.commands()[1] {
            DrawCommand::FillRect { paint, alpha, .. } => {
                assert_eq!(paint, &Paint::color("#000000"));
                assert_eq!(*alpha, 1.0);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_full_clear_drops_history() {
        let mut s = RecordingSurface::new(50.0, 40.0);
        s.fill_rect(1.0, 1.0, 2.0, 2.0);
        s.clear_rect(5.0, 5.0, 1.0, 1.0);
        assert_eq!(s.commands().len(), 2);
        s.clear_rect(0.0, 0.0, 50.0, 40.0);
        assert!(s.is_blank());
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut s = RecordingSurface::new(10.0, 10.0);
        s.set_global_alpha(0.2);
        s.save();
        s.fill_rect(0.0, 0.0, 1.0, 1.0);
        s.reset();
        assert!(s.is_blank());
        s.fill_rect(0.0, 0.0, 1.0, 1.0);
        assert!(matches!(s.commands()[0], DrawCommand::FillRect { alpha, .. } if alpha == 1.0));
    }

    #[test]
    fn test_empty_path_is_not_recorded() {
        let mut s = RecordingSurface::new(10.0, 10.0);
        s.begin_path();
        s.fill();
        s.stroke();
        assert!(s.is_blank());
    }

    #[test]
    fn test_svg_output() {
        let mut s = RecordingSurface::new(20.0, 10.0);
        let gradient = LinearGradient::new(0.0, 0.0, 20.0, 0.0).stop(0.0, "#fff").stop(1.0, "#000");
        s.set_fill_style(Paint::LinearGradient(gradient));
        s.fill_rect(0.0, 0.0, 20.0, 10.0);
        s.begin_path();
        s.arc(10.0, 5.0, 2.0, 0.0, 2.0 * PI);
        s.set_line_dash(&[3.0, 2.0]);
        s.stroke();
        s.set_text_align(TextAlign::Center);
        s.fill_text("a < b", 10.0, 5.0);

        let svg = s.to_svg();
        assert!(svg.starts_with(concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" "#,
            r#"width="20" height="10""#
        )));
        assert!(svg.contains(r#"<linearGradient id="g1""#));
        assert!(svg.contains(r#"fill="url(#g1)""#));
        assert!(svg.contains(r#"stroke-dasharray="3 2""#));
        assert!(svg.contains("a &lt; b"));
        assert!(svg.contains(r#"text-anchor="middle""#));
    }

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(10.0), "10");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(1.0 / 3.0), "0.333");
        assert_eq!(fmt_num(-2.0), "-2");
    }
}
