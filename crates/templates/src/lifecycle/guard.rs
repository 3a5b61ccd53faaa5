use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use super::AlreadyClosed;

type Cleanup = Box<dyn FnOnce() + Send + Sync>;

enum State {
    Open(Cleanup),
    Closed,
}

/// Reader/writer guard around a one-time cleanup action.
///
/// Closing from inside [`run`](Self::run) on the same guard deadlocks.
pub struct LifecycleGuard {
    state: RwLock<State>,
}

/// Shared access to an open guard. The guard cannot close while this exists.
pub struct SharedAccess<'a> {
    _state: RwLockReadGuard<'a, State>,
}

impl LifecycleGuard {
    pub fn new(cleanup: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            state: RwLock::new(State::Open(Box::new(cleanup))),
        }
    }

    /// Guard with nothing to clean up; only the open/closed state is tracked.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Take shared access, failing if the guard has been closed.
    pub fn acquire(&self) -> Result<SharedAccess<'_>, AlreadyClosed> {
        // A panic inside the cleanup poisons the lock after the state already
        // flipped to Closed, so the inner value is still accurate.
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match *state {
            State::Open(_) => Ok(SharedAccess { _state: state }),
            State::Closed => Err(AlreadyClosed),
        }
    }

    /// Run `op` under shared access. Access is released even if `op` panics.
    pub fn run<R>(&self, op: impl FnOnce() -> R) -> Result<R, AlreadyClosed> {
        let _access = self.acquire()?;
        Ok(op())
    }

    /// Close the guard, running the cleanup once.
    ///
    /// Blocks until in-flight [`run`](Self::run) calls finish. Returns `true`
    /// if this call performed the close, `false` if it was already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, State::Closed) {
            State::Open(cleanup) => {
                cleanup();
                true
            }
            State::Closed => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            *self.state.read().unwrap_or_else(PoisonError::into_inner),
            State::Closed
        )
    }
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let State::Open(cleanup) = std::mem::replace(state, State::Closed) {
            cleanup();
        }
    }
}

impl fmt::Debug for LifecycleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleGuard")
            .field("closed", &self.is_closed())
            .finish()
    }
}
