//! Cancellation and deadline primitives shared by every suspension point named
//! in `spec.md` §5: `sendAndReceive`, `executeWithTimeout`, pipeline handler
//! cancellation.
//!
//! # Why
//! Every blocking operation in this system accepts an absolute deadline
//! derived from the timeout manager and must observe cooperative
//! cancellation. Rather than let each component invent its own flavor of
//! "has this been cancelled / how much time is left", both live here as the
//! one shared vocabulary.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cheaply-clonable cancellation flag. Setting it is a relaxed store;
/// handlers check it at natural suspension points (loop heads, `await`
/// points) rather than being preempted, matching the cooperative model in
/// §4.7/§5.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// An absolute deadline, or none. Carried by value everywhere (it's a single
/// `Instant` under the hood) so there is never a question of whose lifetime
/// it borrows from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(duration: Duration) -> Self {
        Self(Instant::now().checked_add(duration))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// `true` once `Instant::now()` has passed the deadline. A `none()`
    /// deadline never expires.
    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }

    /// Remaining time until the deadline, `None` when there is no deadline,
    /// and `Duration::ZERO` (never negative) once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }
}

/// The per-call bundle threaded through suspension points: a correlation id
/// for log correlation, a cancellation flag, and a deadline. Analogous to the
/// three-tuple "cancel/deadline/budget" view used throughout this codebase's
/// lineage, trimmed to the two primitives an at-most-once, single-process
/// system actually needs — there is no budget/backpressure-token generality
/// here because nothing downstream consumes it.
#[derive(Clone, Debug)]
pub struct CallContext {
    correlation_id: String,
    cancellation: Cancellation,
    deadline: Deadline,
}

impl CallContext {
    pub fn new(correlation_id: impl Into<String>, deadline: Deadline) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            cancellation: Cancellation::new(),
            deadline,
        }
    }

    pub fn with_timeout(correlation_id: impl Into<String>, timeout: Duration) -> Self {
        Self::new(correlation_id, Deadline::after(timeout))
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_none_never_expires() {
        assert!(!Deadline::none().is_expired());
        assert_eq!(Deadline::none().remaining(), None);
    }

    #[test]
    fn deadline_after_zero_is_immediately_expired() {
        let deadline = Deadline::after(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(1));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn cancellation_is_shared_across_clones() {
        let token = Cancellation::new();
        let cloned = token.clone();
        assert!(!cloned.is_cancelled());
        token.cancel();
        assert!(cloned.is_cancelled());
    }
}
