use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const IDLE: u64 = 0;

#[derive(Debug, Default)]
struct GuardState {
    /// Id of the run holding the guard, `IDLE` when none.
    active: AtomicU64,
    next_id: AtomicU64,
}

/// Process-wide "deployment in progress" flag.
///
/// Acquisition is a single compare-and-swap, so two concurrent starts can
/// never both succeed.
#[derive(Debug, Clone, Default)]
pub struct DeploymentGuard {
    state: Arc<GuardState>,
}

impl DeploymentGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when another run already holds the guard.
    pub fn try_acquire(&self) -> Option<GuardPermit> {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.state
            .active
            .compare_exchange(IDLE, id, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GuardPermit {
                state: Arc::clone(&self.state),
                id,
                released: false,
            })
    }

    pub fn in_progress(&self) -> bool {
        self.state.active.load(Ordering::Acquire) != IDLE
    }

    /// Clear the flag no matter who holds it. Does not touch the running task.
    pub fn force_reset(&self) {
        let previous = self.state.active.swap(IDLE, Ordering::AcqRel);
        if previous != IDLE {
            tracing::warn!(run_id = previous, "Deployment guard force-cleared");
        }
    }
}

/// Ownership of the guard for one run. Released explicitly or on drop.
#[derive(Debug)]
pub struct GuardPermit {
    state: Arc<GuardState>,
    id: u64,
    released: bool,
}

impl GuardPermit {
    pub fn run_id(&self) -> u64 {
        self.id
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // a reset followed by a newer run must not be cleared by this one
        let _ = self.state.active.compare_exchange(
            self.id,
            IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

impl Drop for GuardPermit {
    fn drop(&mut self) {
        self.release_inner();
    }
}
