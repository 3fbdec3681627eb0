//! Painting configuration
//!
//! Every numeric and boolean knob of a painting run lives here. Config files are
//! JSON; any field left out falls back to its default.

use serde::{Deserialize, Serialize};

use std::path::Path;
use std::time::Duration;

use crate::compositor::Shading;
use crate::error::{PaintError, Result};
use crate::mutation::VectorField;
use crate::progress::DropPolicy;
use crate::schedule::RecordScheduleConfig;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PainterConfig {
    /// Shorter side of the target, in pixels, during optimization
    pub computation_size: u32,
    /// Longer side of the rendered output image
    pub output_size: u32,
    /// Stroke opacity percentage (1-100)
    pub opacity: u8,
    /// Number of strokes to paint
    pub num_strokes: usize,
    /// Search iterations for the first strokes
    pub min_iterations: usize,
    /// Search iterations for the last stroke
    pub max_iterations: usize,
    /// Width of freshly proposed strokes, in computation pixels
    pub initial_stroke_width: f32,
    /// Whether mutation may resize strokes
    pub allow_scaling: bool,
    /// Consecutive failed mutations tolerated before giving up on a stroke
    pub fail_threshold: usize,
    pub allow_early_termination: bool,
    /// Tint strokes by their texture's intensity instead of painting a flat color
    pub shade_with_texture: bool,
    /// Which committed strokes produce a progress frame
    pub record_schedule: RecordScheduleConfig,
    /// Upper bound on intermediate (mid-search) frames per second; 0 disables them
    pub intermediate_fps: u32,
    /// Chance that a rate-allowed intermediate frame is actually recorded
    pub intermediate_probability: f64,
    /// Frames buffered between the painter and the progress sink
    pub progress_capacity: usize,
    /// What a full progress channel does with a new frame
    pub progress_policy: DropPolicy,
    /// How long to wait for worker threads at shutdown
    pub worker_timeout_ms: u64,
    /// RNG seed; `None` draws one from the OS
    pub seed: Option<u64>,
    /// Per-frame field centers for batch painting, in computation pixels
    pub field_centers: Vec<(f32, f32)>,
    /// Rotation bias; code only, never (de)serialized
    #[serde(skip)]
    pub vector_field: Option<VectorField>,
}

impl Default for PainterConfig {
    fn default() -> Self {
        Self {
            computation_size: 200,
            output_size: 1200,
            opacity: 100,
            num_strokes: 500,
            min_iterations: 50,
            max_iterations: 500,
            initial_stroke_width: 30.0,
            allow_scaling: true,
            fail_threshold: 100,
            allow_early_termination: true,
            shade_with_texture: false,
            record_schedule: RecordScheduleConfig::default(),
            intermediate_fps: 20,
            intermediate_probability: 0.8,
            progress_capacity: 64,
            progress_policy: DropPolicy::default(),
            worker_timeout_ms: 30_000,
            seed: None,
            field_centers: Vec::new(),
            vector_field: None,
        }
    }
}

impl PainterConfig {
    /// Check every constraint, reporting all violations at once
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.computation_size <= 10 {
            errors.push(format!(
                "computation_size must be greater than 10 (got {})",
                self.computation_size
            ));
        }
        if self.output_size == 0 {
            errors.push("output_size must be positive".to_string());
        }
        if !(1..=100).contains(&self.opacity) {
            errors.push(format!("opacity must be between 1 and 100 (got {})", self.opacity));
        }
        if self.num_strokes == 0 {
            errors.push("num_strokes must be positive".to_string());
        }
        if self.min_iterations == 0 {
            errors.push("min_iterations must be positive".to_string());
        }
        if self.max_iterations < self.min_iterations {
            errors.push(format!(
                "max_iterations ({}) must be at least min_iterations ({})",
                self.max_iterations, self.min_iterations
            ));
        }
        if !(self.initial_stroke_width > 0.0) {
            errors.push("initial_stroke_width must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.intermediate_probability) {
            errors.push("intermediate_probability must be between 0 and 1".to_string());
        }
        if self.progress_capacity == 0 {
            errors.push("progress_capacity must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PaintError::InvalidConfig(errors))
        }
    }

    pub fn shading(&self) -> Shading {
        Shading::from_flag(self.shade_with_texture)
    }

    /// Opacity as the alpha every stroke is blended with
    pub fn stroke_alpha(&self) -> f32 {
        self.opacity as f32 / 100.0
    }

    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    /// The vector field for a given batch frame
    ///
    /// Re-centered on `field_centers[frame]` when that entry exists, otherwise the
    /// configured field unchanged.
    pub fn field_for_frame(&self, frame: usize) -> Option<VectorField> {
        let field = self.vector_field.as_ref()?;
        Some(match self.field_centers.get(frame) {
            Some(&center) => field.with_center(center),
            None => field.clone(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
