// Parallel painting of independent frames (e.g. the frames of an animated target)

use log::{error, info};
use rayon::prelude::*;

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::canvas::Canvas;
use crate::config::PainterConfig;
use crate::error::{panic_message, PaintError, Result};
use crate::painter::{make_rng, OutputMode, PaintOutcome, Painter};
use crate::texture::TextureSet;

/// One frame of a batch
#[derive(Clone, Debug)]
pub struct BatchFrame {
    pub target: Canvas,
    /// Textures this frame may paint with
    pub texture_ids: Vec<usize>,
    /// Re-centers the configured vector field for this frame only
    pub field_center: Option<(f32, f32)>,
}

impl BatchFrame {
    /// A frame that may use every texture in a set of `texture_count`
    pub fn with_all_textures(target: Canvas, texture_count: usize) -> Self {
        Self {
            target,
            texture_ids: (0..texture_count).collect(),
            field_center: None,
        }
    }
}

pub type FrameResult = Result<PaintOutcome>;

/// Paint every frame in parallel on the rayon pool
///
/// Each frame owns its canvas and output buffer; frames share only the
/// read-only textures. Results come back in input order. A failing frame
/// (bad texture id, panic, ...) yields an `Err` in its own slot and never
/// affects its siblings.
///
/// When the config has a vector field, frame `i` uses it re-centered on the
/// frame's own `field_center`, else on `config.field_centers[i]` if present.
/// With a seed, frame `i` is seeded with `seed + i` so batches are reproducible.
pub fn paint_batch(frames: Vec<BatchFrame>, textures: &TextureSet, config: &PainterConfig) -> Vec<FrameResult> {
    info!("Painting batch of {} frames", frames.len());

    // `into_par_iter().enumerate()` keeps each frame paired with its index,
    // and `collect` preserves input order
    let results: Vec<FrameResult> = frames
        .into_par_iter()
        .enumerate()
        .map(|(index, frame)| {
            catch_unwind(AssertUnwindSafe(|| paint_one(index, &frame, textures, config)))
                .unwrap_or_else(|payload| Err(PaintError::WorkerPanicked(panic_message(payload))))
        })
        .collect();

    for (index, result) in results.iter().enumerate() {
        if let Err(e) = result {
            error!("Frame {} failed: {}", index, e);
        }
    }

    results
}

fn paint_one(
    index: usize,
    frame: &BatchFrame,
    textures: &TextureSet,
    config: &PainterConfig,
) -> FrameResult {
    let painter = Painter::new(config.clone(), textures.clone())?;
    let field = match frame.field_center {
        Some(center) => config.vector_field.as_ref().map(|f| f.with_center(center)),
        None => config.field_for_frame(index),
    };
    let mut rng = make_rng(config.seed.map(|seed| seed.wrapping_add(index as u64)));

    painter.paint_frame(
        &frame.target,
        &frame.texture_ids,
        field.as_ref(),
        OutputMode::Inline,
        None,
        &mut rng,
        |_| {},
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::TextureMask;

    fn config() -> PainterConfig {
        PainterConfig {
            computation_size: 20,
            output_size: 20,
            num_strokes: 3,
            min_iterations: 5,
            max_iterations: 10,
            initial_stroke_width: 4.0,
            intermediate_fps: 0,
            seed: Some(3),
            ..PainterConfig::default()
        }
    }

    #[test]
    fn test_bad_frame_does_not_affect_siblings() {
        let textures = TextureSet::new(vec![TextureMask::solid(4, 4)]).unwrap();
        let target = Canvas::with_color(10, 10, [0.2, 0.6, 0.4]);

        let mut frames: Vec<BatchFrame> = (0..4)
            .map(|_| BatchFrame::with_all_textures(target.clone(), textures.len()))
            .collect();
        frames[1].texture_ids = vec![7];

        let results = paint_batch(frames, &textures, &config());

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(PaintError::UnknownTexture(7))));
        assert!(results[2].is_ok());
        assert!(results[3].is_ok());
        assert_eq!(results[0].as_ref().unwrap().canvas.width(), 10);
    }

    #[test]
    fn test_invalid_config_fails_every_frame() {
        let textures = TextureSet::new(vec![TextureMask::solid(4, 4)]).unwrap();
        let frames = vec![
            BatchFrame::with_all_textures(Canvas::with_color(10, 10, [0.0; 3]), 1),
            BatchFrame::with_all_textures(Canvas::with_color(10, 10, [1.0; 3]), 1),
        ];
        let bad = PainterConfig {
            opacity: 0,
            ..config()
        };

        let results = paint_batch(frames, &textures, &bad);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(PaintError::InvalidConfig(_)))));
    }

    #[test]
    fn test_frames_use_their_own_field_center() {
        use crate::mutation::VectorField;

        let textures = TextureSet::new(vec![TextureMask::solid(4, 4)]).unwrap();
        let frames = (0..2)
            .map(|_| BatchFrame::with_all_textures(Canvas::with_color(12, 12, [0.5; 3]), 1))
            .collect();
        let config = PainterConfig {
            vector_field: Some(VectorField::radial_sink((0.0, 0.0))),
            field_centers: vec![(2.0, 2.0), (9.0, 9.0)],
            ..config()
        };

        let results = paint_batch(frames, &textures, &config);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_frame_center_matches_config_center() {
        use crate::mutation::VectorField;

        let textures = TextureSet::new(vec![TextureMask::solid(4, 4)]).unwrap();
        let target = Canvas::with_color(12, 12, [0.1, 0.7, 0.3]);
        let config = PainterConfig {
            vector_field: Some(VectorField::swirl((0.0, 0.0))),
            ..config()
        };

        // Same center given two ways, same seed: identical paintings
        let from_frame = BatchFrame {
            field_center: Some((4.0, 5.0)),
            ..BatchFrame::with_all_textures(target.clone(), 1)
        };
        let from_config = PainterConfig {
            field_centers: vec![(4.0, 5.0)],
            ..config.clone()
        };

        let a = paint_batch(vec![from_frame], &textures, &config);
        let b = paint_batch(
            vec![BatchFrame::with_all_textures(target, 1)],
            &textures,
            &from_config,
        );
        assert_eq!(a[0].as_ref().unwrap().strokes, b[0].as_ref().unwrap().strokes);
    }
}
