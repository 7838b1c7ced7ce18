// ============================================================================
// Transaction Context
// ============================================================================
//
// Per-connection nesting state. Every open level (outermost transaction or
// savepoint) is one entry on the stack, holding its force flag and, when the
// flag is truthy, the bucket of hooks deferred to that level.
//
// Keeping flag and bucket in one struct means the force stack and the bucket
// stack can never drift apart in length.
//
// ============================================================================

use super::{ForceFlag, HookBucket};

/// One open nesting level
#[derive(Debug, Clone)]
pub struct Level {
    force: ForceFlag,
    bucket: Option<HookBucket>,
}

impl Level {
    /// Create a level; a bucket exists iff `force` is truthy
    pub fn new(force: ForceFlag) -> Self {
        Self {
            force,
            bucket: force.is_truthy().then(HookBucket::new),
        }
    }

    pub fn force(&self) -> ForceFlag {
        self.force
    }

    pub fn bucket(&self) -> Option<&HookBucket> {
        self.bucket.as_ref()
    }

    pub fn bucket_mut(&mut self) -> Option<&mut HookBucket> {
        self.bucket.as_mut()
    }

    pub fn into_bucket(self) -> Option<HookBucket> {
        self.bucket
    }
}

/// Nesting stack of a single connection
///
/// # Thread Safety
/// A context belongs to exactly one connection and is only touched by
/// whoever currently holds that connection.
#[derive(Debug, Clone, Default)]
pub struct TransactionContext {
    levels: Vec<Level>,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth (0 when idle)
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn push(&mut self, force: ForceFlag) {
        self.levels.push(Level::new(force));
    }

    pub fn pop(&mut self) -> Option<Level> {
        self.levels.pop()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Innermost open level
    pub fn top(&self) -> Option<&Level> {
        self.levels.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Level> {
        self.levels.last_mut()
    }

    /// Outermost open level
    pub fn outermost(&self) -> Option<&Level> {
        self.levels.first()
    }

    /// Force flag of the innermost level
    pub fn top_force(&self) -> Option<ForceFlag> {
        self.top().map(Level::force)
    }

    /// Innermost level that owns a bucket, which need not be the top level
    pub fn innermost_bucket(&self) -> Option<&HookBucket> {
        self.levels.iter().rev().find_map(Level::bucket)
    }

    pub fn innermost_bucket_mut(&mut self) -> Option<&mut HookBucket> {
        self.levels.iter_mut().rev().find_map(Level::bucket_mut)
    }

    /// Force flags from outermost to innermost
    pub fn force_stack(&self) -> impl Iterator<Item = ForceFlag> + '_ {
        self.levels.iter().map(Level::force)
    }

    /// Number of levels that currently own a bucket
    pub fn open_buckets(&self) -> usize {
        self.levels.iter().filter(|level| level.bucket.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Hook, HookEvent};

    #[test]
    fn test_bucket_exists_only_for_truthy_levels() {
        assert!(Level::new(ForceFlag::False).bucket().is_none());
        assert!(Level::new(ForceFlag::True).bucket().is_some());
        assert!(Level::new(ForceFlag::Nested).bucket().is_some());
    }

    #[test]
    fn test_push_pop_is_lifo() {
        let mut ctx = TransactionContext::new();
        ctx.push(ForceFlag::Nested);
        ctx.push(ForceFlag::False);
        ctx.push(ForceFlag::True);

        assert_eq!(ctx.depth(), 3);
        assert_eq!(ctx.open_buckets(), 2);
        assert_eq!(ctx.outermost().map(|l| l.force()), Some(ForceFlag::Nested));
        assert_eq!(
            ctx.force_stack().collect::<Vec<_>>(),
            vec![ForceFlag::Nested, ForceFlag::False, ForceFlag::True]
        );

        assert_eq!(ctx.pop().map(|l| l.force()), Some(ForceFlag::True));
        assert_eq!(ctx.top_force(), Some(ForceFlag::False));
        ctx.pop();
        ctx.pop();
        assert!(ctx.is_empty());
        assert!(ctx.pop().is_none());
        assert!(ctx.top().is_none());
    }

    #[test]
    fn test_innermost_bucket_skips_unforced_levels() {
        let mut ctx = TransactionContext::new();
        ctx.push(ForceFlag::True);
        ctx.push(ForceFlag::False);

        let hook = Hook::new(|| {});
        ctx.innermost_bucket_mut()
            .unwrap()
            .push(HookEvent::AfterCommit, hook.clone());

        let level = ctx.pop().unwrap();
        assert!(level.into_bucket().is_none());
        let outer = ctx.pop().unwrap().into_bucket().unwrap();
        assert!(outer.hooks(HookEvent::AfterCommit)[0].same_as(&hook));
    }
}
