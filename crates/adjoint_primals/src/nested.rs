//! A nested sine recurrence with a final combining step.

use adjoint_core::{AdScalar, Checkpoint, Primal, RunPlan, Tape};

/// Iterates `acc <- x + sin(acc)` over the state `[x, y, acc]`, with
/// `acc` seeded from `sin(y)` at iteration 0 and the product `acc * y`
/// folded back into `x` once the replay reaches the final iteration.
///
/// The final step runs only when a window's bound touches `plan.steps()`,
/// so it is recorded by the last chunk alone.
#[derive(Clone, Copy, Debug)]
pub struct NestedSine {
    plan: RunPlan,
}

impl NestedSine {
    /// State slot count.
    pub const STATE: usize = 3;

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
            let seed = state[1].sin();
            state[2].assign(seed);
        }
        let x = state[0];
        let s = state[2].sin();
        state[2].assign(x + s);
    }

    fn finish<S: AdScalar>(state: &mut [S]) {
        let y = state[2] * state[1];
        state[0].assign(y);
    }

    fn replay<S: AdScalar>(&self, state: &mut [S], from: u64, to: u64) {
        let end = if to == 0 { self.plan.steps() } else { to };
        for i in from..end {
            Self::step(state, i);
        }
        if end == self.plan.steps() {
            Self::finish(state);
        }
    }
}

impl Primal for NestedSine {
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
        if end == self.plan.steps() {
            Self::finish(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn reference(x: f64, y: f64, steps: u64) -> f64 {
        let mut acc = y.sin();
        for _ in 0..steps {
            acc = x + acc.sin();
        }
        acc * y
    }

    #[test]
    fn test_run_matches_reference() {
        let primal = NestedSine::new(RunPlan::new(7, 3));
        let mut state = vec![0.4, 1.1, 0.0];
        primal.run(&mut state);
        assert_eq!(state[0], reference(0.4, 1.1, 7));
    }

    #[test]
    fn test_final_step_only_on_the_last_window() {
        let primal = NestedSine::new(RunPlan::new(6, 3));

        // Interior window: no combining step.
        let tape = Tape::new();
        let interior = Checkpoint::with_range(vec![0.4, 1.1, 0.9], 0, 3);
        primal.record(&interior, &tape);

        let mut state = vec![0.4, 1.1, 0.9];
        let (from, to) = (0, 3);
        for i in from..to {
            NestedSine::step(&mut state, i);
        }
        let (sweep_state, _, _) = interior.start();
        assert_eq!(sweep_state, vec![0.4, 1.1, 0.9]);
        assert_ne!(state[2], 0.9);
        assert_eq!(state[0], 0.4);

        // Last window: x is overwritten by the product.
        let mut last = vec![0.4, 1.1, state[2]];
        let window = Checkpoint::with_range(last.clone(), 3, 6);
        let mut emitted = Vec::new();
        primal.sweep(&window, &mut |c| emitted.push(c));
        for i in 3..6 {
            NestedSine::step(&mut last, i);
        }
        NestedSine::finish(&mut last);
        assert_eq!(last[0], reference(0.4, 1.1, 6));
        assert_eq!(emitted.len(), 1);
        assert_eq!((emitted[0].from(), emitted[0].to()), (3, 6));
    }

    #[test]
    fn test_recorded_gradient_matches_finite_difference() {
        let plan = RunPlan::new(5, 5);
        let primal = NestedSine::new(plan);
        let tape = Tape::new();
        let window = Checkpoint::with_range(vec![0.4, 1.1, 0.0], 0, 5);
        primal.record(&window, &tape);

        let mut adjoints = vec![0.0; tape.ram()];
        adjoints[0] = 1.0;
        tape.interpret(&mut adjoints);

        let h = 1e-7;
        for slot in 0..2 {
            let mut up = vec![0.4, 1.1, 0.0];
            let mut down = up.clone();
            up[slot] += h;
            down[slot] -= h;
            primal.run(&mut up);
            primal.run(&mut down);
            let fd = (up[0] - down[0]) / (2.0 * h);
            assert_abs_diff_eq!(adjoints[slot], fd, epsilon = 1e-5);
        }
    }
}
