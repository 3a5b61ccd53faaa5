//! Single-shot disposal guarded against concurrent use.
//!
//! A [`LifecycleGuard`] owns a cleanup action. Any number of threads may use
//! the guarded resource at once through [`LifecycleGuard::run`]; closing takes
//! exclusive access, so the cleanup never overlaps an in-flight use and runs
//! at most once. Uses after a close fail immediately with [`AlreadyClosed`].

mod guard;


pub use self::guard::{LifecycleGuard, SharedAccess};

/// The guarded resource has been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("resource has already been closed")]
pub struct AlreadyClosed;

/// Run `op` while holding shared access on every guard.
///
/// Guards are acquired in slice order and released in reverse. When one of
/// them is already closed, everything acquired so far is released and `op`
/// is never called. A guard listed twice is only acquired once.
pub fn run_all<R>(guards: &[&LifecycleGuard], op: impl FnOnce() -> R) -> Result<R, AlreadyClosed> {
    let mut held = HeldAccess {
        accesses: Vec::with_capacity(guards.len()),
    };
    for (i, guard) in guards.iter().enumerate() {
        if guards[..i].iter().any(|g| std::ptr::eq(*g, *guard)) {
            continue;
        }
        held.accesses.push(guard.acquire()?);
    }
    let out = op();
    drop(held);
    Ok(out)
}

/// Releases shared accesses newest first.
struct HeldAccess<'a> {
    accesses: Vec<SharedAccess<'a>>,
}

impl Drop for HeldAccess<'_> {
    fn drop(&mut self) {
        while let Some(access) = self.accesses.pop() {
            drop(access);
        }
    }
}
