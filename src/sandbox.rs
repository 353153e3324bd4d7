//! Execution Sandbox
//!
//! Runs a draw procedure against a surface. Any failure, returned or
//! panicked, is replaced by the error rendering and reported as a value.
//! A surface that panics while the error state is drawn is reset and left
//! as is; the failure is still reported.

use serde::Serialize;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

use crate::config::SandboxConfig;
use crate::resolver::ResolvedParameters;
use crate::surface::{Paint, Surface, TextAlign, TextBaseline};
use crate::templates::DrawProcedure;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn execute(
        &self,
        procedure: &DrawProcedure,
        surface: &mut dyn Surface,
        width: f64,
        height: f64,
        params: &ResolvedParameters,
        time: f64,
    ) -> ExecutionResult {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            procedure.call(surface, width, height, params, time)
        }));
        let message = match outcome {
            Ok(Ok(())) => return ExecutionResult::ok(),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        warn!(error = %message, "template execution failed");

        let rendered = catch_unwind(AssertUnwindSafe(|| {
            self.render_error(surface, width, height, &message)
        }));
        if let Err(payload) = rendered {
            warn!(
                error = %panic_message(payload.as_ref()),
                "surface failed while drawing the error state"
            );
            let _ = catch_unwind(AssertUnwindSafe(|| surface.reset()));
        }
        ExecutionResult::failed(message)
    }

    /// Replace whatever is on the surface with the error state: a solid fill
    /// and two centered lines, the title then the message.
    pub fn render_error(&self, surface: &mut dyn Surface, width: f64, height: f64, message: &str) {
        let c = &self.config;
        surface.reset();
        surface.clear_rect(0.0, 0.0, width, height);
        surface.set_fill_style(Paint::color(&c.error_background));
        surface.fill_rect(0.0, 0.0, width, height);

        surface.set_fill_style(Paint::color(&c.error_foreground));
        surface.set_text_align(TextAlign::Center);
        surface.set_text_baseline(TextBaseline::Middle);
        surface.set_font(&c.title_font);
        surface.fill_text(&c.error_title, width / 2.0, height / 2.0);
        surface.set_font(&c.message_font);
        surface.fill_text(message, width / 2.0, height / 2.0 + c.line_offset);
    }
}

/// Run with the default error appearance.
pub fn execute(
    procedure: &DrawProcedure,
    surface: &mut dyn Surface,
    width: f64,
    height: f64,
    params: &ResolvedParameters,
    time: f64,
) -> ExecutionResult {
    Sandbox::default().execute(procedure, surface, width, height, params, time)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Template panicked".to_string()
    }
}
