// ============================================================================
// Hook Deferral Manager
// ============================================================================

use super::{
    DeferralConfig, ForceFlag, Hook, HookBucket, HookEvent, HookScope, HostHooks,
    TransactionContext,
};
use crate::connection::ConnectionId;
use crate::core::{HookError, Result};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Decides, per nesting level, whether commit/rollback hooks fire at that
/// level or wait for an ancestor to conclude.
///
/// The host engine drives it at four points of every level's life:
///
/// ```text
/// begin_level ──> register_hook* ──> retrieve_hooks_to_fire ──> end_level
/// ```
///
/// State is kept per connection and created on the first `begin_level`.
/// Nothing here is synchronized; the host must not drive the same
/// connection from two callers at once.
#[derive(Debug, Default)]
pub struct HookDeferralManager {
    contexts: HashMap<ConnectionId, TransactionContext>,
    config: DeferralConfig,
}

impl HookDeferralManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DeferralConfig) -> Self {
        Self {
            contexts: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &DeferralConfig {
        &self.config
    }

    /// Open a new nesting level on `conn`
    ///
    /// The effective flag is `explicit` when given; otherwise the child of a
    /// `nested` level is forced, and anything else falls back to the
    /// configured default.
    pub fn begin_level(
        &mut self,
        conn: ConnectionId,
        explicit: Option<ForceFlag>,
        is_outermost: bool,
    ) {
        let ctx = self.contexts.entry(conn).or_default();

        if is_outermost && !ctx.is_empty() {
            warn!(
                conn = %conn,
                stale_depth = ctx.depth(),
                "outermost transaction began over unbalanced levels, discarding them"
            );
            ctx.clear();
        }

        let inherited = if is_outermost {
            None
        } else {
            ctx.top_force()
                .and_then(|parent| self.config.inherited_from(parent))
        };
        let force = explicit
            .or(inherited)
            .unwrap_or(self.config.default_force);

        ctx.push(force);
        trace!(
            conn = %conn,
            depth = ctx.depth(),
            force = %force,
            explicit = explicit.is_some(),
            "level opened"
        );
    }

    /// Register a hook, deferring it into the innermost bucket when one owns it
    pub fn register_hook<H>(
        &mut self,
        host: &mut H,
        conn: ConnectionId,
        event: HookEvent,
        hook: Hook,
        scope: HookScope,
    ) -> Result<()>
    where
        H: HostHooks + ?Sized,
    {
        let deferred = match scope {
            HookScope::Transaction => true,
            HookScope::Savepoint => self.is_forcing(conn) && host.in_savepoint(conn),
        };

        if deferred {
            if let Some(bucket) = self
                .contexts
                .get_mut(&conn)
                .and_then(TransactionContext::innermost_bucket_mut)
            {
                bucket.push(event, hook);
                trace!(conn = %conn, event = %event, ?scope, "hook deferred into bucket");
                return Ok(());
            }
        }

        trace!(conn = %conn, event = %event, ?scope, "hook passed through to host");
        match scope {
            HookScope::Transaction => host.add_transaction_hook(conn, event, hook),
            HookScope::Savepoint => host.add_savepoint_hook(conn, event, hook),
        }
    }

    /// Hooks that should fire for `event` as the current level concludes
    ///
    /// Does not drain anything; the bucket goes away in `end_level`.
    pub fn retrieve_hooks_to_fire<H>(
        &self,
        host: &H,
        conn: ConnectionId,
        event: HookEvent,
    ) -> Vec<Hook>
    where
        H: HostHooks + ?Sized,
    {
        if self.is_forcing(conn) && host.in_savepoint(conn) {
            let hooks = self
                .contexts
                .get(&conn)
                .and_then(TransactionContext::top)
                .and_then(|level| level.bucket())
                .map(|bucket| bucket.hooks(event).to_vec())
                .unwrap_or_default();
            debug!(
                "Firing {} {} hooks from forced savepoint bucket on {}",
                hooks.len(),
                event,
                conn
            );
            return hooks;
        }

        host.transaction_hooks(conn, event)
    }

    /// Close the innermost level on `conn`
    ///
    /// # Errors
    /// `StateError` when the connection has no open level. State is left
    /// untouched in that case.
    pub fn end_level(&mut self, conn: ConnectionId) -> Result<()> {
        let ctx = self
            .contexts
            .get_mut(&conn)
            .filter(|ctx| !ctx.is_empty())
            .ok_or_else(|| {
                HookError::StateError(format!("Cannot end level: {} has no open level", conn))
            })?;

        let depth = ctx.depth();
        if let Some(level) = ctx.pop() {
            let force = level.force();
            if let Some(bucket) = level.into_bucket().filter(|b| !b.is_empty()) {
                debug!(
                    "Discarding bucket of {} hooks at depth {} on {}",
                    bucket.len(),
                    depth,
                    conn
                );
            }
            trace!(conn = %conn, depth, force = %force, "level closed");
        }

        Ok(())
    }

    /// Forget a connection's state, typically when the connection closes
    ///
    /// Returns the number of levels that were still open.
    pub fn release(&mut self, conn: ConnectionId) -> usize {
        let open = self
            .contexts
            .remove(&conn)
            .map(|ctx| ctx.depth())
            .unwrap_or(0);
        if open > 0 {
            warn!("Released {} with {} open levels", conn, open);
        }
        open
    }

    /// Current nesting depth of `conn`
    pub fn depth(&self, conn: ConnectionId) -> usize {
        self.contexts.get(&conn).map_or(0, TransactionContext::depth)
    }

    /// Force flag of the innermost open level
    pub fn current_force(&self, conn: ConnectionId) -> Option<ForceFlag> {
        self.contexts.get(&conn).and_then(TransactionContext::top_force)
    }

    /// Whether the innermost open level has a truthy force flag
    pub fn is_forcing(&self, conn: ConnectionId) -> bool {
        self.current_force(conn).is_some_and(|force| force.is_truthy())
    }

    /// Bucket that transaction-scoped registrations currently land in
    pub fn innermost_bucket(&self, conn: ConnectionId) -> Option<&HookBucket> {
        self.contexts
            .get(&conn)
            .and_then(TransactionContext::innermost_bucket)
    }

    /// Bucket of the outermost level, present when that level is forced
    pub fn outermost_bucket(&self, conn: ConnectionId) -> Option<&HookBucket> {
        self.contexts
            .get(&conn)
            .and_then(TransactionContext::outermost)
            .and_then(|level| level.bucket())
    }

    pub fn context(&self, conn: ConnectionId) -> Option<&TransactionContext> {
        self.contexts.get(&conn)
    }

    /// Number of connections with tracked state
    pub fn open_connections(&self) -> usize {
        self.contexts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Host that rejects every pass-through call
    struct NoHost {
        in_savepoint: bool,
    }

    impl HostHooks for NoHost {
        fn in_savepoint(&self, _conn: ConnectionId) -> bool {
            self.in_savepoint
        }

        fn add_transaction_hook(&mut self, _: ConnectionId, _: HookEvent, _: Hook) -> Result<()> {
            Err(HookError::ExecutionError("unexpected pass-through".into()))
        }

        fn add_savepoint_hook(&mut self, _: ConnectionId, _: HookEvent, _: Hook) -> Result<()> {
            Err(HookError::ExecutionError("unexpected pass-through".into()))
        }

        fn transaction_hooks(&self, _: ConnectionId, _: HookEvent) -> Vec<Hook> {
            Vec::new()
        }
    }

    #[test]
    fn test_explicit_flag_is_used_verbatim() {
        let mut manager = HookDeferralManager::new();
        let conn = ConnectionId(1);

        manager.begin_level(conn, Some(ForceFlag::Nested), true);
        manager.begin_level(conn, Some(ForceFlag::False), false);

        assert_eq!(manager.current_force(conn), Some(ForceFlag::False));
        assert_eq!(manager.context(conn).unwrap().open_buckets(), 1);
    }

    #[test]
    fn test_nested_seeds_one_hop() {
        let mut manager = HookDeferralManager::new();
        let conn = ConnectionId(1);

        manager.begin_level(conn, Some(ForceFlag::Nested), true);
        manager.begin_level(conn, None, false);
        assert_eq!(manager.current_force(conn), Some(ForceFlag::True));

        manager.begin_level(conn, None, false);
        assert_eq!(manager.current_force(conn), Some(ForceFlag::False));
    }

    #[test]
    fn test_cascade_nested_config() {
        let config = DeferralConfig::new().cascade_nested(true);
        let mut manager = HookDeferralManager::with_config(config);
        let conn = ConnectionId(1);

        manager.begin_level(conn, Some(ForceFlag::Nested), true);
        manager.begin_level(conn, None, false);
        manager.begin_level(conn, None, false);
        assert_eq!(manager.current_force(conn), Some(ForceFlag::Nested));
    }

    #[test]
    fn test_outermost_does_not_inherit() {
        let mut manager = HookDeferralManager::new();
        let conn = ConnectionId(1);

        manager.begin_level(conn, Some(ForceFlag::Nested), true);
        manager.end_level(conn).unwrap();
        manager.begin_level(conn, None, true);
        assert_eq!(manager.current_force(conn), Some(ForceFlag::False));
    }

    #[test]
    fn test_default_force_config() {
        let config = DeferralConfig::new().default_force(ForceFlag::True);
        let mut manager = HookDeferralManager::with_config(config);
        let conn = ConnectionId(1);

        manager.begin_level(conn, None, true);
        assert!(manager.is_forcing(conn));
        assert!(manager.innermost_bucket(conn).is_some());
    }

    #[test]
    fn test_default_force_applies_at_every_uninherited_level() {
        let config = DeferralConfig::new().default_force(ForceFlag::Nested);
        let mut manager = HookDeferralManager::with_config(config);
        let conn = ConnectionId(1);

        manager.begin_level(conn, None, true);
        manager.begin_level(conn, None, false);
        manager.begin_level(conn, None, false);

        assert_eq!(
            manager.context(conn).unwrap().force_stack().collect::<Vec<_>>(),
            vec![ForceFlag::Nested, ForceFlag::True, ForceFlag::Nested]
        );
    }

    #[test]
    fn test_outermost_begin_discards_stale_levels() {
        let mut manager = HookDeferralManager::new();
        let conn = ConnectionId(1);

        manager.begin_level(conn, Some(ForceFlag::True), true);
        manager.begin_level(conn, None, false);
        manager.begin_level(conn, None, true);

        assert_eq!(manager.depth(conn), 1);
    }

    #[test]
    fn test_retrieve_does_not_drain() {
        let mut manager = HookDeferralManager::new();
        let mut host = NoHost { in_savepoint: true };
        let conn = ConnectionId(1);
        let hook = Hook::new(|| {});

        manager.begin_level(conn, Some(ForceFlag::True), false);
        manager
            .register_hook(&mut host, conn, HookEvent::AfterRollback, hook.clone(), HookScope::Savepoint)
            .unwrap();

        let first = manager.retrieve_hooks_to_fire(&host, conn, HookEvent::AfterRollback);
        let second = manager.retrieve_hooks_to_fire(&host, conn, HookEvent::AfterRollback);
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!(second[0].same_as(&hook));
        assert!(manager.retrieve_hooks_to_fire(&host, conn, HookEvent::AfterCommit).is_empty());
    }

    #[test]
    fn test_end_level_underflow() {
        let mut manager = HookDeferralManager::new();
        let conn = ConnectionId(1);

        assert!(matches!(manager.end_level(conn), Err(HookError::StateError(_))));
        assert_eq!(manager.open_connections(), 0);

        manager.begin_level(conn, None, true);
        manager.end_level(conn).unwrap();
        assert!(matches!(manager.end_level(conn), Err(HookError::StateError(_))));
        assert_eq!(manager.depth(conn), 0);
    }

    #[test]
    fn test_release() {
        let mut manager = HookDeferralManager::new();
        let conn = ConnectionId(1);

        manager.begin_level(conn, Some(ForceFlag::True), true);
        manager.begin_level(conn, None, false);

        assert_eq!(manager.release(conn), 2);
        assert_eq!(manager.release(conn), 0);
        assert!(manager.context(conn).is_none());
    }

    #[test]
    fn test_connections_are_isolated() {
        let mut manager = HookDeferralManager::new();
        let a = ConnectionId(1);
        let b = ConnectionId(2);

        manager.begin_level(a, Some(ForceFlag::Nested), true);
        manager.begin_level(b, None, false);

        assert_eq!(manager.current_force(b), Some(ForceFlag::False));
        assert_eq!(manager.open_connections(), 2);
    }
}
