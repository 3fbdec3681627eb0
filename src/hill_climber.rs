// Per-stroke hill climbing
//
// One stroke is optimized in isolation: start from a random rectangle, then keep
// proposing single-property mutations and accept only strict improvements.

use rand::Rng;

use crate::canvas::Canvas;
use crate::compositor::Shading;
use crate::geometry::Rectangle;
use crate::mutation::{mutate, random_rect, VectorField};
use crate::scorer::{score, Placement};
use crate::texture::TextureMask;

/// Knobs for one stroke's search
#[derive(Clone, Copy, Debug)]
pub struct ClimbParams {
    /// Iteration budget (see [`crate::schedule::iterations_for`])
    pub iterations: usize,
    pub fail_threshold: usize,
    pub allow_early_termination: bool,
    pub allow_scaling: bool,
    pub initial_width: f32,
    pub shading: Shading,
    /// Stroke opacity in `[0, 1]`
    pub alpha: f32,
}

/// Result of optimizing a single stroke
#[derive(Clone, Debug)]
pub struct StrokeOutcome {
    /// Best placement found, with the table and color to commit it with
    pub placement: Placement,
    /// Iterations actually run
    pub iterations: usize,
    /// True when the search stopped early after too many failures in a row
    pub converged: bool,
    /// Best fitness after initialization and after every accepted improvement
    pub best_history: Vec<f32>,
}

impl StrokeOutcome {
    pub fn fitness(&self) -> f32 {
        self.placement.fitness
    }

    pub fn rgb(&self) -> [f32; 3] {
        self.placement.avg_rgb
    }
}

/// Where a climb is in its lifecycle
///
/// **Rust Concept: Enums as state machines**
/// Each variant owns exactly the data that is valid in that state. There is no
/// "best placement" field to forget to initialize before `Init` has run: the
/// compiler won't let `Searching` exist without one.
enum ClimbState {
    Init,
    Searching {
        best: Placement,
        iteration: usize,
        fail_count: usize,
    },
    Done {
        best: Placement,
        iterations: usize,
        converged: bool,
    },
}

/// Everything a climb reads; nothing in here is ever mutated
pub struct HillClimber<'a> {
    pub target: &'a Canvas,
    pub canvas: &'a Canvas,
    pub mask: &'a TextureMask,
    pub field: Option<&'a VectorField>,
    pub params: ClimbParams,
}

impl<'a> HillClimber<'a> {
    /// Run the search to completion
    ///
    /// `on_improvement` sees every new best placement as it is accepted, which
    /// is how the driver renders intermediate progress frames.
    pub fn climb<R, F>(&self, rng: &mut R, mut on_improvement: F) -> StrokeOutcome
    where
        R: Rng,
        F: FnMut(&Placement),
    {
        let (h, w) = (self.canvas.height(), self.canvas.width());
        let mut history = Vec::new();
        let mut state = ClimbState::Init;

        loop {
            state = match state {
                ClimbState::Init => {
                    let rect = random_rect(
                        h,
                        w,
                        self.mask.height(),
                        self.mask.width(),
                        self.field,
                        self.params.initial_width,
                        rng,
                    );
                    let best = self.score(rect);
                    history.push(best.fitness);

                    ClimbState::Searching {
                        best,
                        iteration: 0,
                        fail_count: 0,
                    }
                }

                ClimbState::Searching {
                    best,
                    iteration,
                    fail_count,
                } => {
                    let gave_up = self.params.allow_early_termination
                        && fail_count > self.params.fail_threshold;

                    if gave_up || iteration >= self.params.iterations {
                        ClimbState::Done {
                            best,
                            iterations: iteration,
                            converged: gave_up,
                        }
                    } else {
                        let candidate = mutate(
                            best.rect,
                            h,
                            w,
                            self.field,
                            self.params.allow_scaling,
                            rng,
                        );
                        let scored = self.score(candidate);

                        // Strictly better only: ties keep the incumbent
                        if scored.fitness > best.fitness {
                            on_improvement(&scored);
                            history.push(scored.fitness);
                            ClimbState::Searching {
                                best: scored,
                                iteration: iteration + 1,
                                fail_count: 0,
                            }
                        } else {
                            ClimbState::Searching {
                                best,
                                iteration: iteration + 1,
                                fail_count: fail_count + 1,
                            }
                        }
                    }
                }

                ClimbState::Done {
                    best,
                    iterations,
                    converged,
                } => {
                    return StrokeOutcome {
                        placement: best,
                        iterations,
                        converged,
                        best_history: history,
                    };
                }
            };
        }
    }

    fn score(&self, rect: Rectangle) -> Placement {
        score(
            rect,
            self.target,
            self.mask,
            self.canvas,
            self.params.shading,
            self.params.alpha,
        )
    }
}
