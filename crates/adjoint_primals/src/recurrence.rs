//! The sine-cube recurrence, the engine's end-to-end acceptance primal.

use adjoint_core::{AdScalar, Checkpoint, Primal, RunPlan, Tape};

/// `x1 <- sin(x1)^3 + x0`, iterated `plan.steps()` times over the state
/// `[x0, x1]`; iteration 0 seeds `x1` from `x0`.
///
/// `x0` stays constant, so the adjoint of `x0` accumulates one term per
/// iteration while the workspace of a recorded window stays at three slots.
#[derive(Clone, Copy, Debug)]
pub struct SineRecurrence {
    plan: RunPlan,
}

impl SineRecurrence {
    /// State slot count.
    pub const STATE: usize = 2;

    /// Creates the recurrence over the given iteration layout.
    pub fn new(plan: RunPlan) -> Self {
        Self { plan }
    }

    /// Iteration layout.
    pub fn plan(&self) -> RunPlan {
        self.plan
    }

    fn step<S: AdScalar>(state: &mut [S], i: u64) {
        if i == 0 {
            let x0 = state[0];
            state[1].assign(x0);
            return;
        }
        let u = state[1].sin();
        let x0 = state[0];
        state[1].assign(u.powi(3) + x0);
    }

    fn replay<S: AdScalar>(&self, state: &mut [S], from: u64, to: u64) {
        let end = if to == 0 { self.plan.steps() } else { to };
        for i in from..end {
            Self::step(state, i);
        }
    }
}

impl Primal for SineRecurrence {
    fn run(&self, state: &mut [f64]) {
        self.replay(state, 0, self.plan.steps());
    }

    fn record(&self, checkpoint: &Checkpoint, tape: &Tape) {
        let (mut state, from, to) = checkpoint.start_on(tape);
        self.replay(&mut state, from, to);
    }

    fn sweep(&self, checkpoint: &Checkpoint, emit: &mut dyn FnMut(Checkpoint)) {
        let (mut state, from, to) = checkpoint.start();
        let end = if to == 0 { self.plan.steps() } else { to };
        let window = self.plan.window();
        for i in from..end {
            if i % window == 0 {
                let bound = (i + window).min(self.plan.steps());
                emit(Checkpoint::with_range(state.clone(), i, bound));
            }
            Self::step(&mut state, i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adjoint_core::Active;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_run_matches_manual_iteration() {
        let primal = SineRecurrence::new(RunPlan::new(5, 2));
        let mut state = vec![1.0, 0.0];
        primal.run(&mut state);

        let mut x1 = 1.0f64;
        for _ in 1..5 {
            x1 = x1.sin().powi(3) + 1.0;
        }
        assert_eq!(state, vec![1.0, x1]);
    }

    #[test]
    fn test_sweep_emits_one_checkpoint_per_window() {
        let primal = SineRecurrence::new(RunPlan::new(10, 4));
        let start = Checkpoint::with_range(vec![1.0, 0.0], 0, 10);
        let mut emitted = Vec::new();
        primal.sweep(&start, &mut |c| emitted.push(c));

        let ranges: Vec<(u64, u64)> = emitted.iter().map(|c| (c.from(), c.to())).collect();
        assert_eq!(ranges, vec![(0, 4), (4, 8), (8, 10)]);
    }

    #[test]
    fn test_sweep_state_matches_plain_replay() {
        let primal = SineRecurrence::new(RunPlan::new(10, 4));
        let start = Checkpoint::with_range(vec![1.0, 0.0], 0, 10);
        let mut emitted = Vec::new();
        primal.sweep(&start, &mut |c| emitted.push(c));

        let eight = SineRecurrence::new(RunPlan::new(8, 4));
        let mut state = vec![1.0, 0.0];
        eight.run(&mut state);
        assert_eq!(emitted[2].state(), state.as_slice());
    }

    #[test]
    fn test_record_registers_state_and_stays_bounded() {
        let primal = SineRecurrence::new(RunPlan::new(100, 10));
        let tape = Tape::new();
        let window = Checkpoint::with_range(vec![1.0, 0.5], 10, 20);
        primal.record(&window, &tape);
        assert_eq!(tape.num_inputs(), 2);
        assert!(tape.ram() <= 4);
    }

    #[test]
    fn test_recorded_window_gradient_matches_finite_difference() {
        let plan = RunPlan::new(8, 8);
        let primal = SineRecurrence::new(plan);
        let tape = Tape::new();
        let window = Checkpoint::with_range(vec![1.0, 0.0], 0, 8);
        primal.record(&window, &tape);

        let mut adjoints = vec![0.0; tape.ram()];
        adjoints[1] = 1.0;
        tape.interpret(&mut adjoints);

        let h = 1e-7;
        let mut up = vec![1.0, 0.0 + h];
        let mut down = vec![1.0, 0.0 - h];
        primal.run(&mut up);
        primal.run(&mut down);
        // Iteration 0 overwrites x1, so its adjoint is flushed into x0 and
        // the finite difference in x1 is zero.
        assert_eq!(up[1], down[1]);
        assert_eq!(adjoints[1], 0.0);

        let mut up = vec![1.0 + h, 0.0];
        let mut down = vec![1.0 - h, 0.0];
        primal.run(&mut up);
        primal.run(&mut down);
        let fd = (up[1] - down[1]) / (2.0 * h);
        assert_abs_diff_eq!(adjoints[0], fd, epsilon = 1e-5);
    }

    #[test]
    fn test_active_and_plain_replays_agree() {
        let plan = RunPlan::new(6, 3);
        let primal = SineRecurrence::new(plan);

        let mut plain = vec![0.3, 0.7];
        primal.run(&mut plain);

        let tape = Tape::new();
        let window = Checkpoint::with_range(vec![0.3, 0.7], 0, 6);
        let (mut state, from, to) = window.start_on(&tape);
        let _ = (from, to);
        primal.replay(&mut state, 0, 6);
        let values: Vec<f64> = state.iter().map(Active::value).collect();
        assert_eq!(values, plain);
    }
}
