use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;

/// Search budget for one stroke
///
/// Early strokes are broad and cheap to place; later strokes refine detail and
/// get more iterations. The budget grows linearly with the stroke index up to
/// `max_iter`, but never drops below `min_iter`:
///
/// `max(floor((i + 1) / total * max_iter), min_iter)`
///
/// The result is non-decreasing in `stroke_index` and equals `max_iter` for the
/// last stroke (as long as `max_iter >= min_iter`).
pub fn iterations_for(stroke_index: usize, total: usize, min_iter: usize, max_iter: usize) -> usize {
    if total == 0 {
        return min_iter;
    }
    // Integer arithmetic gives the floor exactly
    let scaled = (stroke_index + 1).saturating_mul(max_iter) / total;
    scaled.max(min_iter)
}

/// Which strokes get a progress frame recorded, as stored in config files
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordScheduleConfig {
    /// Record after every stroke
    EveryStroke,
    /// Never record committed strokes (intermediate frames may still be recorded)
    Never,
    /// `frames` samples concentrated toward the start: `(i / (n-1))^power`
    PowerLaw { frames: usize, power: f64 },
    /// `frames` samples on an exponential curve: `(e^{2t} - 1) / (e^2 - 1)`
    Exponential { frames: usize },
}

impl Default for RecordScheduleConfig {
    fn default() -> Self {
        RecordScheduleConfig::PowerLaw {
            frames: 40,
            power: 2.5,
        }
    }
}

/// Precomputed set of stroke indices at which a progress frame is recorded
///
/// Built once per painting from the total stroke count and handed to the driver.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordSchedule {
    Every,
    At(BTreeSet<usize>),
}

impl RecordSchedule {
    pub fn every_stroke() -> Self {
        RecordSchedule::Every
    }

    pub fn never() -> Self {
        RecordSchedule::At(BTreeSet::new())
    }

    /// `frames` positions spread over `0..total` with density falling off as a power law
    pub fn power_law(total: usize, frames: usize, power: f64) -> Self {
        Self::from_curve(total, frames, |t| t.powf(power))
    }

    /// `frames` positions spread over `0..total` on an exponential curve
    pub fn exponential(total: usize, frames: usize) -> Self {
        let max = 2f64.exp() - 1.0;
        Self::from_curve(total, frames, |t| ((2.0 * t).exp() - 1.0) / max)
    }

    /// Sample `curve` (mapping `[0, 1]` onto `[0, 1]`) at `frames` evenly spaced points
    fn from_curve(total: usize, frames: usize, curve: impl Fn(f64) -> f64) -> Self {
        if total == 0 || frames == 0 {
            return Self::never();
        }

        let last = (total - 1) as f64;
        let positions = (0..frames)
            .map(|i| {
                let t = if frames > 1 {
                    i as f64 / (frames - 1) as f64
                } else {
                    0.0
                };
                // Truncation, like taking the integer part of the position
                ((curve(t) * last) as usize).min(total - 1)
            })
            .collect();

        RecordSchedule::At(positions)
    }

    pub fn from_config(config: &RecordScheduleConfig, total: usize) -> Self {
        match *config {
            RecordScheduleConfig::EveryStroke => Self::every_stroke(),
            RecordScheduleConfig::Never => Self::never(),
            RecordScheduleConfig::PowerLaw { frames, power } => Self::power_law(total, frames, power),
            RecordScheduleConfig::Exponential { frames } => Self::exponential(total, frames),
        }
    }

    /// Whether stroke `index` should be recorded
    pub fn should_record(&self, index: usize) -> bool {
        match self {
            RecordSchedule::Every => true,
            RecordSchedule::At(positions) => positions.contains(&index),
        }
    }
}
