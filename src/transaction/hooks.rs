// ============================================================================
// Transaction Hooks
// ============================================================================
//
// Hooks are opaque callbacks registered by user code to run after a
// transaction (or savepoint) concludes. The deferral manager stores and hands
// them back; invoking them is always the host engine's job.
//
// ============================================================================

use std::sync::Arc;

/// Outcome a hook is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    AfterCommit,
    AfterRollback,
}

impl HookEvent {
    /// Event matching the way a level concluded
    pub fn for_outcome(committed: bool) -> Self {
        if committed {
            HookEvent::AfterCommit
        } else {
            HookEvent::AfterRollback
        }
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookEvent::AfterCommit => write!(f, "after_commit"),
            HookEvent::AfterRollback => write!(f, "after_rollback"),
        }
    }
}

/// Which boundary a hook was registered against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookScope {
    /// Fire when the whole transaction concludes
    Transaction,
    /// Fire when the nearest enclosing savepoint concludes
    Savepoint,
}

/// A zero-argument callback
///
/// Cloning a hook is cheap and yields a handle to the same callback, which is
/// what lets retrieval hand out a list without draining the bucket.
#[derive(Clone)]
pub struct Hook {
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl Hook {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Invoke the callback
    pub fn call(&self) {
        (self.callback)()
    }

    /// Whether both handles point at the same callback
    pub fn same_as(&self, other: &Hook) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.callback), Arc::as_ptr(&other.callback))
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hook({:p})", Arc::as_ptr(&self.callback))
    }
}

/// Hooks owned by one forcing level, kept in registration order per event
#[derive(Debug, Clone, Default)]
pub struct HookBucket {
    after_commit: Vec<Hook>,
    after_rollback: Vec<Hook>,
}

impl HookBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: HookEvent, hook: Hook) {
        match event {
            HookEvent::AfterCommit => self.after_commit.push(hook),
            HookEvent::AfterRollback => self.after_rollback.push(hook),
        }
    }

    pub fn hooks(&self, event: HookEvent) -> &[Hook] {
        match event {
            HookEvent::AfterCommit => &self.after_commit,
            HookEvent::AfterRollback => &self.after_rollback,
        }
    }

    /// Total number of hooks across both events
    pub fn len(&self) -> usize {
        self.after_commit.len() + self.after_rollback.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
