use crate::connection::ConnectionId;
use crate::core::{HookError, Result};
use crate::transaction::{Hook, HookEvent, HostHooks};
use std::collections::HashMap;

/// Host-side state of one open level
#[derive(Debug, Default)]
pub(crate) struct HostLevel {
    pub(crate) savepoint: Option<String>,
    after_commit: Vec<Hook>,
    after_rollback: Vec<Hook>,
}

impl HostLevel {
    fn new(savepoint: Option<String>) -> Self {
        Self {
            savepoint,
            ..Self::default()
        }
    }

    fn hooks(&self, event: HookEvent) -> &[Hook] {
        match event {
            HookEvent::AfterCommit => &self.after_commit,
            HookEvent::AfterRollback => &self.after_rollback,
        }
    }

    pub(crate) fn take_hooks(&mut self, event: HookEvent) -> Vec<Hook> {
        std::mem::take(self.hooks_mut(event))
    }

    fn hooks_mut(&mut self, event: HookEvent) -> &mut Vec<Hook> {
        match event {
            HookEvent::AfterCommit => &mut self.after_commit,
            HookEvent::AfterRollback => &mut self.after_rollback,
        }
    }
}

/// Non-deferred hook handling of the reference engine
///
/// Transaction hooks wait for the outermost transaction. Savepoint hooks wait
/// for their savepoint: releasing it hands them to the enclosing level,
/// rolling it back runs its rollback hooks and drops the rest.
#[derive(Debug, Default)]
pub struct DefaultHooks {
    levels: HashMap<ConnectionId, Vec<HostLevel>>,
}

impl DefaultHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self, conn: ConnectionId) -> usize {
        self.levels.get(&conn).map_or(0, Vec::len)
    }

    pub(crate) fn push_level(&mut self, conn: ConnectionId, savepoint: Option<String>) {
        self.levels
            .entry(conn)
            .or_default()
            .push(HostLevel::new(savepoint));
    }

    pub(crate) fn pop_level(&mut self, conn: ConnectionId) -> Option<HostLevel> {
        self.levels.get_mut(&conn).and_then(Vec::pop)
    }

    /// Hand a released savepoint's pending hooks to the enclosing level
    pub(crate) fn release_savepoint(&mut self, conn: ConnectionId, mut level: HostLevel) {
        if let Some(parent) = self.levels.get_mut(&conn).and_then(|stack| stack.last_mut()) {
            parent.after_commit.append(&mut level.after_commit);
            parent.after_rollback.append(&mut level.after_rollback);
        }
    }

    pub(crate) fn remove(&mut self, conn: ConnectionId) {
        self.levels.remove(&conn);
    }

    fn no_transaction(conn: ConnectionId) -> HookError {
        HookError::ExecutionError(format!("No active transaction on {}", conn))
    }
}

impl HostHooks for DefaultHooks {
    fn in_savepoint(&self, conn: ConnectionId) -> bool {
        self.depth(conn) > 1
    }

    fn add_transaction_hook(
        &mut self,
        conn: ConnectionId,
        event: HookEvent,
        hook: Hook,
    ) -> Result<()> {
        let outermost = self
            .levels
            .get_mut(&conn)
            .and_then(|stack| stack.first_mut())
            .ok_or_else(|| Self::no_transaction(conn))?;
        outermost.hooks_mut(event).push(hook);
        Ok(())
    }

    fn add_savepoint_hook(
        &mut self,
        conn: ConnectionId,
        event: HookEvent,
        hook: Hook,
    ) -> Result<()> {
        let current = self
            .levels
            .get_mut(&conn)
            .and_then(|stack| stack.last_mut())
            .ok_or_else(|| Self::no_transaction(conn))?;
        current.hooks_mut(event).push(hook);
        Ok(())
    }

    fn transaction_hooks(&self, conn: ConnectionId, event: HookEvent) -> Vec<Hook> {
        self.levels
            .get(&conn)
            .and_then(|stack| stack.last())
            .map(|level| level.hooks(event).to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_hook_attaches_to_outermost() {
        let mut host = DefaultHooks::new();
        let conn = ConnectionId(1);
        host.push_level(conn, None);
        host.push_level(conn, Some("sp_1".into()));

        host.add_transaction_hook(conn, HookEvent::AfterCommit, Hook::new(|| {}))
            .unwrap();

        assert!(host.in_savepoint(conn));
        assert!(host.transaction_hooks(conn, HookEvent::AfterCommit).is_empty());
        host.pop_level(conn);
        assert_eq!(host.transaction_hooks(conn, HookEvent::AfterCommit).len(), 1);
    }

    #[test]
    fn test_released_savepoint_hands_hooks_up() {
        let mut host = DefaultHooks::new();
        let conn = ConnectionId(1);
        host.push_level(conn, None);
        host.push_level(conn, Some("sp_1".into()));
        host.add_savepoint_hook(conn, HookEvent::AfterCommit, Hook::new(|| {}))
            .unwrap();
        host.add_savepoint_hook(conn, HookEvent::AfterRollback, Hook::new(|| {}))
            .unwrap();

        let level = host.pop_level(conn).unwrap();
        host.release_savepoint(conn, level);
        assert_eq!(host.transaction_hooks(conn, HookEvent::AfterCommit).len(), 1);
        assert_eq!(host.transaction_hooks(conn, HookEvent::AfterRollback).len(), 1);
    }

    #[test]
    fn test_rolled_back_savepoint_keeps_hooks_to_itself() {
        let mut host = DefaultHooks::new();
        let conn = ConnectionId(1);
        host.push_level(conn, None);
        host.push_level(conn, Some("sp_1".into()));
        host.add_savepoint_hook(conn, HookEvent::AfterCommit, Hook::new(|| {}))
            .unwrap();
        host.add_savepoint_hook(conn, HookEvent::AfterRollback, Hook::new(|| {}))
            .unwrap();

        let mut level = host.pop_level(conn).unwrap();
        assert_eq!(level.take_hooks(HookEvent::AfterRollback).len(), 1);
        assert!(level.take_hooks(HookEvent::AfterRollback).is_empty());
        assert!(host.transaction_hooks(conn, HookEvent::AfterCommit).is_empty());
    }

    #[test]
    fn test_registration_without_transaction_fails() {
        let mut host = DefaultHooks::new();
        let conn = ConnectionId(1);

        assert!(matches!(
            host.add_transaction_hook(conn, HookEvent::AfterCommit, Hook::new(|| {})),
            Err(HookError::ExecutionError(_))
        ));
        assert!(!host.in_savepoint(conn));
    }
}
