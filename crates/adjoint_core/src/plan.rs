//! Window and chunk arithmetic shared by stores, primals and the driver.

/// Iteration layout of one reversal run.
///
/// `steps` is the total iteration count of the primal; `window` is the
/// per-worker replay window. The run is tiled into `chunks()` windows,
/// numbered `1..=chunks()` from the start of the simulation; chunk `i`
/// covers `[window_start(i), window_end(i))`, with the last chunk clipped
/// to `steps`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunPlan {
    steps: u64,
    window: u64,
}

impl RunPlan {
    /// Creates a plan for `steps` iterations tiled into `window`-sized
    /// chunks.
    pub fn new(steps: u64, window: u64) -> Self {
        debug_assert!(window >= 1);
        Self { steps, window }
    }

    /// Total iteration count.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Per-worker replay window.
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Number of chunks tiling `[0, steps)`.
    pub fn chunks(&self) -> u64 {
        self.steps.div_ceil(self.window)
    }

    /// First iteration of chunk `i` (1-based).
    pub fn window_start(&self, i: u64) -> u64 {
        (i - 1) * self.window
    }

    /// Exclusive last iteration of chunk `i` (1-based).
    pub fn window_end(&self, i: u64) -> u64 {
        (i * self.window).min(self.steps)
    }
}
