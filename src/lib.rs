// Library root for the stroke painter
//
// This file is the entry point for the library crate (stroke_painter).
// Modules are listed leaf-first: each one only uses modules declared above it.

// Shared types
pub mod error;
pub mod config;

// Buffers and geometry
pub mod geometry;
pub mod canvas;
pub mod texture;

// Drawing and scoring a single stroke
pub mod compositor;
pub mod scorer;

// Searching for a good stroke
pub mod mutation;
pub mod schedule;
pub mod hill_climber;

// Everything around the stroke loop
pub mod output;
pub mod sinks;
pub mod progress;
pub mod painter;
pub mod batch;

// Re-export commonly used types at the library root for convenience
// This allows users to write:
//   use stroke_painter::Painter;
// instead of:
//   use stroke_painter::painter::Painter;
pub use batch::{paint_batch, BatchFrame, FrameResult};
pub use canvas::{load_target, prepare_target, Canvas};
pub use config::PainterConfig;
pub use error::{PaintError, Result};
pub use geometry::{Rectangle, ScanlineTable};
pub use mutation::VectorField;
pub use output::{OutputCompositor, ShapeJob};
pub use painter::{OutputMode, PaintOutcome, Painter, StopHandle, StrokeReport};
pub use progress::{progress_channel, DropPolicy, ProgressRecorder, ProgressSender, Pushed};
pub use schedule::{iterations_for, RecordSchedule, RecordScheduleConfig};
pub use sinks::{CollectingSink, FrameSink, GifSink};
pub use texture::{load_textures, TextureMask, TextureSet};
