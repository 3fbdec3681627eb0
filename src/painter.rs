// The painting driver
//
// Strokes are strictly sequential: each one is optimized against the canvas as
// left by all previous strokes, committed, and only then does the next begin.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::canvas::Canvas;
use crate::compositor::{composite, Shading, TexturePlacement};
use crate::config::PainterConfig;
use crate::error::{PaintError, Result};
use crate::hill_climber::{ClimbParams, HillClimber};
use crate::mutation::VectorField;
use crate::output::{OutputCompositor, ShapeJob};
use crate::progress::ProgressSender;
use crate::schedule::{iterations_for, RecordSchedule};
use crate::scorer::Placement;
use crate::texture::{TextureMask, TextureSet};

/// Cooperative cancellation flag
///
/// Cloned handles share one flag. The driver checks it once per stroke, so a
/// stop request takes effect as soon as the current stroke is committed.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-stroke summary handed to the observer callback
#[derive(Clone, Debug)]
pub struct StrokeReport {
    pub index: usize,
    pub total: usize,
    pub texture_id: usize,
    pub fitness: f32,
    pub iterations: usize,
    pub converged: bool,
    /// False when no candidate covered enough pixels to be scored
    pub committed: bool,
}

/// Everything a finished painting produced
#[derive(Clone, Debug)]
pub struct PaintOutcome {
    /// Working-resolution canvas
    pub canvas: Canvas,
    /// Output-resolution canvas
    pub output: Canvas,
    /// Committed strokes, in painting order
    pub strokes: Vec<ShapeJob>,
    /// True if a stop request ended the painting before the last stroke
    pub stopped_early: bool,
}

/// Where the output compositor runs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Dedicated worker thread
    Worker,
    /// Synchronously in the painting thread
    Inline,
}

/// Build the RNG for a run: seeded when asked, from OS entropy otherwise
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Rate-limited, probabilistic previews of the stroke being optimized
struct IntermediateFrames {
    min_interval: Option<Duration>,
    probability: f64,
    last: Option<Instant>,
    rng: StdRng,
}

impl IntermediateFrames {
    fn new(fps: u32, probability: f64, rng: StdRng) -> Self {
        Self {
            min_interval: (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64)),
            probability,
            last: None,
            rng,
        }
    }

    fn offer(
        &mut self,
        canvas: &Canvas,
        placement: &Placement,
        mask: &TextureMask,
        shading: Shading,
        alpha: f32,
        progress: &ProgressSender,
    ) {
        let Some(min_interval) = self.min_interval else {
            return;
        };

        let now = Instant::now();
        if matches!(self.last, Some(last) if now.duration_since(last) < min_interval) {
            return;
        }
        self.last = Some(now);

        if !self.rng.gen_bool(self.probability) {
            return;
        }

        // Draw the candidate onto a throwaway copy; the real canvas is untouched
        let mut preview = canvas.clone();
        let texture = TexturePlacement::new(mask, placement.rect, shading);
        composite(&mut preview, &placement.table, placement.avg_rgb, alpha, Some(&texture));
        progress.push(preview);
    }
}

/// Paints a target with textured strokes
pub struct Painter {
    config: PainterConfig,
    textures: TextureSet,
    stop: StopHandle,
}

impl Painter {
    /// Validate the configuration and take ownership of the textures
    ///
    /// Fails before any work is done if the config is invalid or no textures
    /// were supplied.
    pub fn new(config: PainterConfig, textures: TextureSet) -> Result<Self> {
        config.validate()?;
        if textures.is_empty() {
            return Err(PaintError::NoTextures);
        }
        Ok(Self {
            config,
            textures,
            stop: StopHandle::new(),
        })
    }

    pub fn config(&self) -> &PainterConfig {
        &self.config
    }

    /// A handle that can stop this painter from another thread
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Paint `target` with every texture and the configured vector field
    ///
    /// # Arguments
    /// * `target` - Image to approximate, at computation resolution
    /// * `progress` - Optional channel for progress frames; closed when done
    /// * `observer` - Called after every stroke
    pub fn paint<F>(
        &self,
        target: &Canvas,
        progress: Option<ProgressSender>,
        observer: F,
    ) -> Result<PaintOutcome>
    where
        F: FnMut(&StrokeReport),
    {
        let texture_ids: Vec<usize> = (0..self.textures.len()).collect();
        let mut rng = make_rng(self.config.seed);
        self.paint_frame(
            target,
            &texture_ids,
            self.config.vector_field.as_ref(),
            OutputMode::Worker,
            progress,
            &mut rng,
            observer,
        )
    }

    /// Paint one frame with an explicit texture subset, field and output mode
    #[allow(clippy::too_many_arguments)]
    pub fn paint_frame<R, F>(
        &self,
        target: &Canvas,
        texture_ids: &[usize],
        field: Option<&VectorField>,
        mode: OutputMode,
        progress: Option<ProgressSender>,
        rng: &mut R,
        mut observer: F,
    ) -> Result<PaintOutcome>
    where
        R: Rng,
        F: FnMut(&StrokeReport),
    {
        if target.width() == 0 || target.height() == 0 {
            return Err(PaintError::EmptyTarget {
                width: target.width(),
                height: target.height(),
            });
        }
        if texture_ids.is_empty() {
            return Err(PaintError::NoTextures);
        }
        self.textures.check_ids(texture_ids)?;

        let config = &self.config;
        let total = config.num_strokes;
        let shading = config.shading();
        let alpha = config.stroke_alpha();
        let schedule = RecordSchedule::from_config(&config.record_schedule, total);

        let mut canvas = Canvas::with_color(target.height(), target.width(), target.average_rgb());
        let mut output = match mode {
            OutputMode::Worker => OutputCompositor::spawn(
                self.textures.clone(),
                target,
                config.output_size,
                shading,
                alpha,
            )?,
            OutputMode::Inline => OutputCompositor::inline(
                self.textures.clone(),
                target,
                config.output_size,
                shading,
                alpha,
            ),
        };
        let mut previews = IntermediateFrames::new(
            config.intermediate_fps,
            config.intermediate_probability,
            StdRng::seed_from_u64(rng.gen()),
        );

        info!(
            "Painting {}x{} target with {} strokes (output {}x{})",
            target.width(),
            target.height(),
            total,
            output.size().1,
            output.size().0
        );

        let mut strokes = Vec::with_capacity(total);
        let mut stopped_early = false;

        for index in 0..total {
            if self.stop.is_stopped() {
                info!("Stop requested, finishing after {} strokes", index);
                stopped_early = true;
                break;
            }

            let texture_id = *texture_ids.choose(rng).ok_or(PaintError::NoTextures)?;
            let mask = self.textures.get(texture_id)?;

            let climber = HillClimber {
                target,
                canvas: &canvas,
                mask,
                field,
                params: ClimbParams {
                    iterations: iterations_for(
                        index,
                        total,
                        config.min_iterations,
                        config.max_iterations,
                    ),
                    fail_threshold: config.fail_threshold,
                    allow_early_termination: config.allow_early_termination,
                    allow_scaling: config.allow_scaling,
                    initial_width: config.initial_stroke_width,
                    shading,
                    alpha,
                },
            };
            let outcome = climber.climb(rng, |placement| {
                if let Some(progress) = &progress {
                    previews.offer(&canvas, placement, mask, shading, alpha, progress);
                }
            });

            // Commit exactly once, with the table and color the winner was scored with
            let best = &outcome.placement;
            let committed = best.is_scored();
            if committed {
                let texture = TexturePlacement::new(mask, best.rect, shading);
                composite(&mut canvas, &best.table, best.avg_rgb, alpha, Some(&texture));

                let job = ShapeJob {
                    rect: best.rect,
                    texture_id,
                    rgb: best.avg_rgb,
                };
                output.enqueue(job)?;
                strokes.push(job);
            }

            if let Some(progress) = &progress {
                if schedule.should_record(index) {
                    progress.push(canvas.clone());
                }
            }

            debug!(
                "Stroke {}/{}: fitness {:.4} after {} iterations{}",
                index + 1,
                total,
                outcome.fitness(),
                outcome.iterations,
                if outcome.converged { " (converged)" } else { "" }
            );

            observer(&StrokeReport {
                index,
                total,
                texture_id,
                fitness: outcome.fitness(),
                iterations: outcome.iterations,
                converged: outcome.converged,
                committed,
            });
        }

        let output = output.finish(config.worker_timeout())?;

        if let Some(progress) = progress {
            if let Err(e) = progress.close(config.worker_timeout()) {
                warn!("Could not close progress channel: {}", e);
            }
        }

        info!("Painted {} strokes", strokes.len());

        Ok(PaintOutcome {
            canvas,
            output,
            strokes,
            stopped_early,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{progress_channel, DropPolicy, ProgressRecorder};
    use crate::schedule::RecordScheduleConfig;
    use crate::sinks::CollectingSink;

    fn small_config() -> PainterConfig {
        PainterConfig {
            computation_size: 20,
            output_size: 40,
            num_strokes: 6,
            min_iterations: 10,
            max_iterations: 30,
            initial_stroke_width: 6.0,
            intermediate_fps: 0,
            seed: Some(42),
            record_schedule: RecordScheduleConfig::EveryStroke,
            ..PainterConfig::default()
        }
    }

    fn textures() -> TextureSet {
        TextureSet::new(vec![TextureMask::solid(4, 4), TextureMask::solid(8, 4)]).unwrap()
    }

    fn half_and_half() -> Canvas {
        let mut target = Canvas::with_color(20, 20, [1.0, 1.0, 1.0]);
        for y in 0..20 {
            for x in 0..10 {
                target.set_pixel(x, y, [0.0, 0.0, 0.0, 1.0]);
            }
        }
        target
    }

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = PainterConfig {
            num_strokes: 0,
            ..small_config()
        };
        assert!(matches!(
            Painter::new(config, textures()),
            Err(PaintError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_paint_reports_every_stroke() {
        let painter = Painter::new(small_config(), textures()).unwrap();
        let mut reports = Vec::new();
        let outcome = painter
            .paint(&half_and_half(), None, |r| reports.push(r.clone()))
            .unwrap();

        assert_eq!(reports.len(), 6);
        assert!(reports.iter().enumerate().all(|(i, r)| r.index == i && r.total == 6));
        assert!(!outcome.stopped_early);
        assert_eq!(
            outcome.strokes.len(),
            reports.iter().filter(|r| r.committed).count()
        );
        assert_eq!((outcome.output.height(), outcome.output.width()), (40, 40));
    }

    #[test]
    fn test_painting_reduces_error() {
        let target = half_and_half();
        let painter = Painter::new(small_config(), textures()).unwrap();
        let outcome = painter.paint(&target, None, |_| {}).unwrap();

        let error = |canvas: &Canvas| -> f32 {
            canvas
                .data()
                .iter()
                .zip(target.data())
                .map(|(a, b)| (a - b) * (a - b))
                .sum()
        };
        let start = Canvas::with_color(20, 20, target.average_rgb());
        assert!(error(&outcome.canvas) < error(&start));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let target = half_and_half();
        let a = Painter::new(small_config(), textures())
            .unwrap()
            .paint(&target, None, |_| {})
            .unwrap();
        let b = Painter::new(small_config(), textures())
            .unwrap()
            .paint(&target, None, |_| {})
            .unwrap();
        assert_eq!(a.strokes, b.strokes);
        assert_eq!(a.canvas, b.canvas);
    }

    #[test]
    fn test_stop_before_start_paints_nothing() {
        let painter = Painter::new(small_config(), textures()).unwrap();
        painter.stop_handle().stop();

        let outcome = painter.paint(&half_and_half(), None, |_| {}).unwrap();
        assert!(outcome.stopped_early);
        assert!(outcome.strokes.is_empty());
    }

    #[test]
    fn test_stop_from_observer() {
        let painter = Painter::new(small_config(), textures()).unwrap();
        let stop = painter.stop_handle();
        let mut seen = 0;

        let outcome = painter
            .paint(&half_and_half(), None, |r| {
                seen += 1;
                if r.index == 1 {
                    stop.stop();
                }
            })
            .unwrap();

        assert_eq!(seen, 2);
        assert!(outcome.stopped_early);
        assert!(outcome.strokes.len() <= 2);
    }

    #[test]
    fn test_progress_frames_follow_schedule() {
        let (tx, rx) = progress_channel(64, DropPolicy::DropNewest);
        let sink = CollectingSink::new();
        let recorder = ProgressRecorder::spawn(rx, sink.clone()).unwrap();

        let painter = Painter::new(small_config(), textures()).unwrap();
        let outcome = painter.paint(&half_and_half(), Some(tx), |_| {}).unwrap();

        assert_eq!(recorder.join(Duration::from_secs(10)).unwrap(), 6);
        let frames = sink.frames();
        assert_eq!(frames.last(), Some(&outcome.canvas));
    }

    #[test]
    fn test_unknown_texture_subset_is_rejected() {
        let painter = Painter::new(small_config(), textures()).unwrap();
        let result = painter.paint_frame(
            &half_and_half(),
            &[0, 4],
            None,
            OutputMode::Inline,
            None,
            &mut make_rng(Some(1)),
            |_| {},
        );
        assert!(matches!(result, Err(PaintError::UnknownTexture(4))));
    }

    #[test]
    fn test_empty_target_is_rejected() {
        let painter = Painter::new(small_config(), textures()).unwrap();
        for (h, w) in [(0, 0), (0, 12), (12, 0)] {
            let result = painter.paint(&Canvas::with_color(h, w, [0.5; 3]), None, |_| {});
            assert!(
                matches!(result, Err(PaintError::EmptyTarget { width, height }) if (height, width) == (h, w)),
                "{}x{} target was accepted",
                w,
                h
            );
        }
    }

    #[test]
    fn test_faint_strokes_keep_target_colors() {
        // Red left half, green right half: every sampled color mixes the two
        let mut target = Canvas::with_color(20, 20, [0.0, 1.0, 0.0]);
        for y in 0..20 {
            for x in 0..10 {
                target.set_pixel(x, y, [1.0, 0.0, 0.0, 1.0]);
            }
        }
        let config = PainterConfig {
            opacity: 15,
            ..small_config()
        };

        let outcome = Painter::new(config, textures())
            .unwrap()
            .paint(&target, None, |_| {})
            .unwrap();

        assert!(!outcome.strokes.is_empty());
        for stroke in &outcome.strokes {
            let [r, g, b] = stroke.rgb;
            assert!((r + g - 1.0).abs() < 1e-4, "stroke color {:?} is not from the target", stroke.rgb);
            assert!(b.abs() < 1e-6);
        }
    }

    #[test]
    fn test_opacity_changes_the_painting() {
        let paint = |opacity| {
            let config = PainterConfig {
                opacity,
                ..small_config()
            };
            Painter::new(config, textures())
                .unwrap()
                .paint(&half_and_half(), None, |_| {})
                .unwrap()
        };
        let faint = paint(10);
        let opaque = paint(100);

        assert_ne!(faint.canvas, opaque.canvas);

        // Each faint stroke moves a pixel at most 10% of the way to its color,
        // so after n strokes no channel strays more than 1 - 0.9^n from the start
        let start = half_and_half().average_rgb();
        let bound = 1.0 - 0.9f32.powi(faint.strokes.len() as i32) + 1e-4;
        for px in faint.canvas.data().chunks(4) {
            for c in 0..3 {
                assert!((px[c] - start[c]).abs() <= bound, "{:?} strayed past {}", px, bound);
            }
        }
    }
}
