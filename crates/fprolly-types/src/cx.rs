//! Capability context (`Cx`).
//!
//! A capability-passing context object threaded through every
//! operation that can touch the node store. It carries:
//!
//! - a shared cancellation flag, observed at `checkpoint()` calls
//! - a [`Budget`] for deadline/priority propagation
//! - child contexts that inherit cancellation from their parent
//!
//! Cursor navigation is synchronous; the context is how callers bound
//! it. A store implementation is expected to call [`Cx::checkpoint`]
//! before blocking work so that a cancelled read surfaces as an error
//! instead of running to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Reason for cancellation, ordered from weakest to strongest.
///
/// Multiple cancel requests are monotone: the strongest reason wins
/// and the recorded reason can never get weaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CancelReason {
    Timeout = 0,
    UserInterrupt = 1,
    RegionClose = 2,
    Abort = 3,
}

/// Resource budget propagated with a context.
///
/// Budgets form a meet-semilattice: constraints tighten by `min`
/// (deadline) while priority propagates by `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub deadline: Option<Duration>,
    pub priority: u8,
}

impl Budget {
    /// No constraints (identity for [`Self::meet`]).
    pub const INFINITE: Self = Self {
        deadline: None,
        priority: 0,
    };

    #[must_use]
    pub const fn with_deadline(self, deadline: Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    #[must_use]
    pub const fn with_priority(self, priority: u8) -> Self {
        Self { priority, ..self }
    }

    /// Meet (tighten) two budgets.
    #[must_use]
    pub fn meet(self, other: Self) -> Self {
        Self {
            deadline: match (self.deadline, other.deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            },
            priority: self.priority.max(other.priority),
        }
    }
}

/// Error returned by [`Cx::checkpoint`] when cancellation has been
/// observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelError {
    reason: Option<CancelReason>,
}

impl CancelError {
    /// The strongest cancellation reason recorded at observation time.
    #[must_use]
    pub const fn reason(&self) -> Option<CancelReason> {
        self.reason
    }
}

impl std::fmt::Display for CancelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.reason {
            Some(reason) => write!(f, "operation cancelled: {reason:?}"),
            None => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for CancelError {}

#[derive(Debug)]
struct CxInner {
    cancel_requested: AtomicBool,
    cancel_reason: Mutex<Option<CancelReason>>,
    children: Mutex<Vec<Arc<CxInner>>>,
}

impl CxInner {
    fn new() -> Self {
        Self {
            cancel_requested: AtomicBool::new(false),
            cancel_reason: Mutex::new(None),
            children: Mutex::new(Vec::new()),
        }
    }
}

/// Propagate cancellation to a `CxInner` node and all its descendants.
///
/// Each node's lock is released before recursing into children to
/// avoid lock-ordering issues.
fn propagate_cancel(inner: &CxInner, reason: CancelReason) {
    // Set atomic flag (fast path for checkpoint).
    inner.cancel_requested.store(true, Ordering::Release);

    // Monotone reason update.
    {
        let mut r = inner
            .cancel_reason
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match *r {
            Some(existing) if existing >= reason => {}
            _ => *r = Some(reason),
        }
    }

    // Collect children (release lock before recursing).
    let children: Vec<Arc<CxInner>> = {
        let guard = inner
            .children
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.clone()
    };
    for child in &children {
        propagate_cancel(child, reason);
    }
}

/// Capability context passed through all store-touching operations.
#[derive(Debug)]
pub struct Cx {
    inner: Arc<CxInner>,
    budget: Budget,
}

impl Clone for Cx {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            budget: self.budget,
        }
    }
}

impl Default for Cx {
    fn default() -> Self {
        Self::new()
    }
}

impl Cx {
    #[must_use]
    pub fn new() -> Self {
        Self::with_budget(Budget::INFINITE)
    }

    #[must_use]
    pub fn with_budget(budget: Budget) -> Self {
        Self {
            inner: Arc::new(CxInner::new()),
            budget,
        }
    }

    #[must_use]
    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Returns a view of this context with a tighter effective budget.
    ///
    /// The effective budget is computed as `self.budget.meet(child)`,
    /// so the child cannot loosen its parent's constraints.
    #[must_use]
    pub fn scope_with_budget(&self, child: Budget) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            budget: self.budget.meet(child),
        }
    }

    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.inner.cancel_requested.load(Ordering::Acquire)
    }

    /// Request cancellation with the default reason (`UserInterrupt`).
    pub fn cancel(&self) {
        self.cancel_with_reason(CancelReason::UserInterrupt);
    }

    /// Request cancellation with an explicit reason.
    ///
    /// The strongest reason wins; weaker reasons are ignored once a
    /// stronger one has been set. Cancellation propagates to all
    /// descendant contexts.
    pub fn cancel_with_reason(&self, reason: CancelReason) {
        propagate_cancel(&self.inner, reason);
    }

    /// The strongest cancellation reason set so far, if any.
    #[must_use]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        *self
            .inner
            .cancel_reason
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Check for cancellation at a yield point.
    ///
    /// The not-cancelled fast path is a single atomic load.
    pub fn checkpoint(&self) -> Result<(), CancelError> {
        if !self.inner.cancel_requested.load(Ordering::Acquire) {
            return Ok(());
        }
        Err(CancelError {
            reason: self.cancel_reason(),
        })
    }

    /// Create a child context that shares the parent's budget but has
    /// independent cancellation state. Cancelling the parent
    /// propagates to this child; cancelling the child does not reach
    /// the parent.
    #[must_use]
    pub fn create_child(&self) -> Self {
        let child = Self::with_budget(self.budget);
        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            children.push(Arc::clone(&child.inner));
        }
        if self.is_cancel_requested() {
            // Parent was cancelled before the child registered.
            if let Some(reason) = self.cancel_reason() {
                propagate_cancel(&child.inner, reason);
            }
        }
        child
    }
}
