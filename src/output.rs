// High-resolution re-rendering of accepted strokes
//
// Optimization runs on a small working canvas. Every committed stroke is also
// queued here and redrawn at output resolution, either on a dedicated worker
// thread (the default) or synchronously inside the caller.

use log::{debug, warn};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::canvas::Canvas;
use crate::compositor::{composite, Shading, TexturePlacement};
use crate::error::{panic_message, PaintError, Result};
use crate::geometry::{polygon_to_rect, rectangle_to_polygon, scale_polygon, scan_polygon, Rectangle};
use crate::texture::TextureSet;

/// An accepted stroke, as handed to the output compositor
///
/// Expressed in working-canvas coordinates; the compositor does the scaling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeJob {
    pub rect: Rectangle,
    pub texture_id: usize,
    pub rgb: [f32; 3],
}

/// What travels down the job channel
#[derive(Debug)]
pub enum OutputMessage {
    Job(ShapeJob),
    /// Sentinel: no more jobs, send back the finished canvas
    Finish,
}

/// Output size whose longer side is `longer_side`, keeping the working aspect ratio
///
/// Returns `(height, width, factor)` where `factor` maps working pixels to output pixels.
pub fn output_dimensions(working_h: u32, working_w: u32, longer_side: u32) -> (u32, u32, f32) {
    let longest = working_h.max(working_w).max(1);
    let factor = longer_side as f32 / longest as f32;
    let h = ((working_h as f32 * factor).round() as u32).max(1);
    let w = ((working_w as f32 * factor).round() as u32).max(1);
    (h, w, factor)
}

/// The output canvas plus everything needed to draw onto it
///
/// Owned by exactly one party: the worker thread in threaded mode, the
/// [`OutputCompositor`] itself in inline mode.
struct OutputRenderer {
    canvas: Canvas,
    textures: TextureSet,
    factor: f32,
    shading: Shading,
    alpha: f32,
}

impl OutputRenderer {
    fn new(textures: TextureSet, target: &Canvas, longer_side: u32, shading: Shading, alpha: f32) -> Self {
        let (h, w, factor) = output_dimensions(target.height(), target.width(), longer_side);
        Self {
            canvas: Canvas::with_color(h, w, target.average_rgb()),
            textures,
            factor,
            shading,
            alpha,
        }
    }

    fn render(&mut self, job: &ShapeJob) -> Result<()> {
        let mask = self.textures.get(job.texture_id)?;

        // Scale the integer polygon, then recover the rectangle at output size so
        // the texture mapping matches the scaled footprint
        let polygon = scale_polygon(&rectangle_to_polygon(job.rect), self.factor);
        let rect = polygon_to_rect(&polygon);
        let table = scan_polygon(&polygon, self.canvas.height(), self.canvas.width());

        let texture = TexturePlacement::new(mask, rect, self.shading);
        composite(&mut self.canvas, &table, job.rgb, self.alpha, Some(&texture));
        Ok(())
    }
}

/// Drain jobs until the `Finish` sentinel (or a disconnected sender)
fn run_worker(jobs: Receiver<OutputMessage>, mut renderer: OutputRenderer) -> Result<Canvas> {
    let mut rendered = 0usize;
    for message in jobs.iter() {
        match message {
            OutputMessage::Job(job) => {
                renderer.render(&job)?;
                rendered += 1;
            }
            OutputMessage::Finish => break,
        }
    }
    debug!("Output compositor rendered {} strokes", rendered);
    Ok(renderer.canvas)
}

enum Mode {
    Threaded {
        jobs: Sender<OutputMessage>,
        result: Receiver<Result<Canvas>>,
        handle: JoinHandle<()>,
    },
    Inline(OutputRenderer),
}

/// Re-renders accepted strokes at output resolution
///
/// **Rust Concept: Ownership across threads**
/// In threaded mode the output canvas is *moved* into the worker closure.
/// The main loop can't touch it, even by accident. Jobs go in over one channel
/// and the finished canvas comes back over another.
pub struct OutputCompositor {
    mode: Mode,
    size: (u32, u32),
}

impl OutputCompositor {
    /// Start a worker thread that renders jobs in submission order
    ///
    /// Strokes are drawn with the same `shading` and opacity (`alpha`) they were
    /// scored with on the working canvas.
    pub fn spawn(
        textures: TextureSet,
        target: &Canvas,
        longer_side: u32,
        shading: Shading,
        alpha: f32,
    ) -> Result<Self> {
        let renderer = OutputRenderer::new(textures, target, longer_side, shading, alpha);
        let size = (renderer.canvas.height(), renderer.canvas.width());
        let (jobs_tx, jobs_rx) = mpsc::channel();
        let (result_tx, result_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("output-compositor".to_owned())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| run_worker(jobs_rx, renderer)))
                    .unwrap_or_else(|payload| Err(PaintError::WorkerPanicked(panic_message(payload))));
                // The receiver is gone only if the owner gave up waiting
                let _ = result_tx.send(result);
            })?;

        Ok(Self {
            mode: Mode::Threaded {
                jobs: jobs_tx,
                result: result_rx,
                handle,
            },
            size,
        })
    }

    /// Render every job synchronously as it is enqueued
    pub fn inline(
        textures: TextureSet,
        target: &Canvas,
        longer_side: u32,
        shading: Shading,
        alpha: f32,
    ) -> Self {
        let renderer = OutputRenderer::new(textures, target, longer_side, shading, alpha);
        let size = (renderer.canvas.height(), renderer.canvas.width());
        Self {
            mode: Mode::Inline(renderer),
            size,
        }
    }

    /// `(height, width)` of the output canvas
    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Queue (or, inline, immediately render) one accepted stroke
    pub fn enqueue(&mut self, job: ShapeJob) -> Result<()> {
        match &mut self.mode {
            Mode::Threaded { jobs, .. } => jobs
                .send(OutputMessage::Job(job))
                .map_err(|_| PaintError::ChannelClosed("output job")),
            Mode::Inline(renderer) => renderer.render(&job),
        }
    }

    /// Stop accepting jobs and return the finished output canvas
    ///
    /// In threaded mode this waits at most `timeout` for the worker to drain its
    /// queue. A worker that misses the deadline is detached (threads cannot be
    /// killed) and reported as [`PaintError::WorkerTimeout`].
    pub fn finish(self, timeout: Duration) -> Result<Canvas> {
        match self.mode {
            Mode::Inline(renderer) => Ok(renderer.canvas),
            Mode::Threaded {
                jobs,
                result,
                handle,
            } => {
                // A failed send means the worker already exited; its result is
                // still waiting on the reply channel
                let _ = jobs.send(OutputMessage::Finish);

                match result.recv_timeout(timeout) {
                    Ok(canvas) => {
                        let _ = handle.join();
                        canvas
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        warn!("Output compositor missed its {:?} deadline, detaching", timeout);
                        drop(handle);
                        Err(PaintError::WorkerTimeout("output compositor"))
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        let _ = handle.join();
                        Err(PaintError::ChannelClosed("output result"))
                    }
                }
            }
        }
    }
}
