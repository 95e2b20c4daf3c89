//! Descending-turn synchronisation for ordered pipeline stages.

use std::sync::{Condvar, Mutex, PoisonError};

use thiserror::Error;

/// The ordered stage was abandoned after a failure in another worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("ordered stage aborted by an earlier failure")]
pub struct Poisoned;

/// Outcome of a fallible ordered section.
#[derive(Debug, Error)]
pub enum TurnError<E: std::error::Error> {
    /// The stage was poisoned before this turn came up.
    #[error("ordered stage aborted by an earlier failure")]
    Poisoned,
    /// This turn's own work failed; the stage is now poisoned.
    #[error(transparent)]
    Failed(E),
}

struct TurnState<T> {
    turn: u64,
    poisoned: bool,
    inner: T,
}

/// A turn token guarding shared state.
///
/// Workers call [`enter`](Self::enter) with strictly descending turn
/// numbers; each call blocks until the token reaches its turn, runs the
/// closure with exclusive access to the guarded state, then passes the
/// token to the next lower turn. Deadlock freedom relies on the caller
/// claiming turns in the same descending order they are entered.
///
/// A failed turn (or an explicit [`poison`](Self::poison)) marks the stage
/// poisoned: every blocked and future entrant unblocks with an error, so
/// one failure aborts the whole ordered stage instead of stranding it.
pub struct Turnstile<T> {
    state: Mutex<TurnState<T>>,
    turns: Condvar,
}

impl<T> Turnstile<T> {
    /// Creates a turnstile whose first admitted turn is `turn`.
    pub fn new(turn: u64, inner: T) -> Self {
        Self {
            state: Mutex::new(TurnState {
                turn,
                poisoned: false,
                inner,
            }),
            turns: Condvar::new(),
        }
    }

    /// Waits for `turn`, then runs `f` with exclusive access to the state.
    pub fn enter<R>(&self, turn: u64, f: impl FnOnce(&mut T) -> R) -> Result<R, Poisoned> {
        let mut st = self.wait_for(turn)?;
        let out = f(&mut st.inner);
        st.turn = st.turn.saturating_sub(1);
        self.turns.notify_all();
        Ok(out)
    }

    /// Like [`enter`](Self::enter), but a failing closure poisons the
    /// stage instead of passing the token on.
    pub fn try_enter<R, E: std::error::Error>(
        &self,
        turn: u64,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Result<R, TurnError<E>> {
        let mut st = self.wait_for(turn).map_err(|_| TurnError::Poisoned)?;
        match f(&mut st.inner) {
            Ok(out) => {
                st.turn = st.turn.saturating_sub(1);
                self.turns.notify_all();
                Ok(out)
            }
            Err(e) => {
                st.poisoned = true;
                self.turns.notify_all();
                Err(TurnError::Failed(e))
            }
        }
    }

    /// Poisons the stage, waking every blocked entrant with an error.
    pub fn poison(&self) {
        let mut st = self.lock();
        st.poisoned = true;
        self.turns.notify_all();
    }

    /// Resets the first admitted turn. Callers must be quiescent.
    pub fn set_turn(&mut self, turn: u64) {
        let st = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        st.turn = turn;
        st.poisoned = false;
    }

    /// Exclusive access to the guarded state.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .inner
    }

    /// Consumes the turnstile, returning the guarded state.
    pub fn into_inner(self) -> T {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .inner
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TurnState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_for(&self, turn: u64) -> Result<std::sync::MutexGuard<'_, TurnState<T>>, Poisoned> {
        let mut st = self.lock();
        while st.turn != turn && !st.poisoned {
            st = self
                .turns
                .wait(st)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if st.poisoned {
            return Err(Poisoned);
        }
        Ok(st)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_turns_are_granted_in_descending_order() {
        let turnstile = Turnstile::new(3, Vec::new());

        thread::scope(|s| {
            for turn in 1..=3u64 {
                let turnstile = &turnstile;
                s.spawn(move || {
                    // Lower turns arriving first must wait their turn.
                    if turn == 3 {
                        thread::sleep(Duration::from_millis(50));
                    }
                    turnstile
                        .enter(turn, |log: &mut Vec<u64>| log.push(turn))
                        .unwrap();
                });
            }
        });

        // Pushes happen inside the ordered closure, so the guarded log is
        // the grant order.
        assert_eq!(turnstile.into_inner(), vec![3, 2, 1]);
    }

    #[test]
    fn test_failed_turn_poisons_waiters() {
        let turnstile = Turnstile::new(2, ());

        thread::scope(|s| {
            let waiter = s.spawn(|| turnstile.enter(1, |_| ()));
            thread::sleep(Duration::from_millis(20));
            let failed = turnstile.try_enter(2, |_| Err::<(), Boom>(Boom));
            assert!(matches!(failed, Err(TurnError::Failed(Boom))));
            assert_eq!(waiter.join().unwrap(), Err(Poisoned));
        });
    }

    #[test]
    fn test_explicit_poison_rejects_future_entrants() {
        let turnstile = Turnstile::new(1, ());
        turnstile.poison();
        assert_eq!(turnstile.enter(1, |_| ()), Err(Poisoned));
    }

    #[test]
    fn test_set_turn_reuses_the_stage() {
        let mut turnstile = Turnstile::new(0, 0u32);
        turnstile.poison();
        turnstile.set_turn(1);
        *turnstile.get_mut() = 7;
        assert_eq!(turnstile.enter(1, |v| *v), Ok(7));
    }
}
