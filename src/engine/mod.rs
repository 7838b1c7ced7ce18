// ============================================================================
// Reference Transaction Engine
// ============================================================================
//
// A minimal host that drives HookDeferralManager the way a database client's
// transaction engine does. It issues no real SQL; the statements it would
// send are recorded per connection so callers can inspect them.
//
// Conclusion order for every level:
//   retrieve hooks -> COMMIT/RELEASE (or ROLLBACK) -> end level -> run hooks
//
// ============================================================================

pub mod default_hooks;

pub use default_hooks::DefaultHooks;

use default_hooks::HostLevel;

use crate::connection::ConnectionId;
use crate::core::{HookError, Result};
use crate::transaction::{
    DeferralConfig, ForceFlag, Hook, HookDeferralManager, HookEvent, HookScope, HostHooks,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Options for opening a transaction level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Open a savepoint when a transaction is already active
    pub savepoint: bool,

    /// Explicit force flag for the new level
    pub force_hooks: Option<ForceFlag>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn savepoint(mut self) -> Self {
        self.savepoint = true;
        self
    }

    pub fn force_hooks(mut self, force: impl Into<ForceFlag>) -> Self {
        self.force_hooks = Some(force.into());
        self
    }
}

/// In-memory transaction engine with hook deferral
///
/// # Examples
///
/// ```
/// use force_hooks::{ConnectionId, ForceFlag, Hook, TransactionEngine, TransactionOptions};
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// # fn main() -> force_hooks::Result<()> {
/// let mut engine = TransactionEngine::new();
/// let conn = ConnectionId::next();
/// let fired = Arc::new(AtomicBool::new(false));
///
/// engine.begin(conn, TransactionOptions::new())?;
/// engine.begin(conn, TransactionOptions::new().savepoint().force_hooks(ForceFlag::True))?;
/// let flag = Arc::clone(&fired);
/// engine.after_commit(conn, Hook::new(move || flag.store(true, Ordering::SeqCst)))?;
/// engine.commit(conn)?;
///
/// // Released savepoint already ran its hook
/// assert!(fired.load(Ordering::SeqCst));
/// engine.commit(conn)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct TransactionEngine {
    hooks: DefaultHooks,
    deferral: HookDeferralManager,
    statements: HashMap<ConnectionId, Vec<String>>,
}

impl TransactionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DeferralConfig) -> Self {
        Self {
            deferral: HookDeferralManager::with_config(config),
            ..Self::default()
        }
    }

    /// Begin a transaction, or a savepoint inside the active one
    pub fn begin(&mut self, conn: ConnectionId, opts: TransactionOptions) -> Result<()> {
        let depth = self.hooks.depth(conn);
        if depth > 0 && !opts.savepoint {
            return Err(HookError::ExecutionError(format!(
                "Transaction already active on {}; open a savepoint instead",
                conn
            )));
        }

        let is_outermost = depth == 0;
        self.deferral.begin_level(conn, opts.force_hooks, is_outermost);

        if is_outermost {
            self.record(conn, "BEGIN".to_string());
            self.hooks.push_level(conn, None);
        } else {
            let name = format!("sp_{}", depth);
            self.record(conn, format!("SAVEPOINT \"{}\"", name));
            self.hooks.push_level(conn, Some(name));
        }
        Ok(())
    }

    /// Commit the current level
    pub fn commit(&mut self, conn: ConnectionId) -> Result<()> {
        self.finish(conn, true)
    }

    /// Roll back the current level
    pub fn rollback(&mut self, conn: ConnectionId) -> Result<()> {
        self.finish(conn, false)
    }

    fn finish(&mut self, conn: ConnectionId, committed: bool) -> Result<()> {
        if self.hooks.depth(conn) == 0 {
            return Err(HookError::ExecutionError(format!(
                "No active transaction on {}",
                conn
            )));
        }

        let event = HookEvent::for_outcome(committed);
        let forced_savepoint = self.deferral.is_forcing(conn) && self.hooks.in_savepoint(conn);
        let retrieved = self.deferral.retrieve_hooks_to_fire(&self.hooks, conn, event);

        let level = self.hooks.pop_level(conn).ok_or_else(|| {
            HookError::StateError(format!("Host lost track of levels on {}", conn))
        })?;

        let to_fire = match level.savepoint.clone() {
            None => {
                self.record(conn, if committed { "COMMIT" } else { "ROLLBACK" }.to_string());
                retrieved
            }
            Some(name) => {
                let sql = if committed {
                    format!("RELEASE SAVEPOINT \"{}\"", name)
                } else {
                    format!("ROLLBACK TO SAVEPOINT \"{}\"", name)
                };
                self.record(conn, sql);
                self.conclude_savepoint(conn, level, committed, forced_savepoint, retrieved)
            }
        };

        self.deferral.end_level(conn)?;

        debug!("Running {} {} hooks on {}", to_fire.len(), event, conn);
        for hook in &to_fire {
            hook.call();
        }
        Ok(())
    }

    /// Hooks to run now for a savepoint that just concluded
    ///
    /// `retrieved` holds the bucket when the savepoint was forced, and the
    /// savepoint's own default list otherwise.
    fn conclude_savepoint(
        &mut self,
        conn: ConnectionId,
        mut level: HostLevel,
        committed: bool,
        forced: bool,
        retrieved: Vec<Hook>,
    ) -> Vec<Hook> {
        match (committed, forced) {
            (true, true) => {
                self.hooks.release_savepoint(conn, level);
                retrieved
            }
            // Released without forcing: its after-commit hooks wait for the parent.
            (true, false) => {
                self.hooks.release_savepoint(conn, level);
                Vec::new()
            }
            (false, true) => {
                let mut to_fire = retrieved;
                to_fire.extend(level.take_hooks(HookEvent::AfterRollback));
                to_fire
            }
            (false, false) => retrieved,
        }
    }

    /// Register a hook against the current transaction or savepoint
    ///
    /// Outside any transaction an after-commit hook runs immediately and an
    /// after-rollback hook is dropped.
    pub fn add_hook(
        &mut self,
        conn: ConnectionId,
        event: HookEvent,
        scope: HookScope,
        hook: Hook,
    ) -> Result<()> {
        if self.hooks.depth(conn) == 0 {
            if event == HookEvent::AfterCommit {
                hook.call();
            }
            return Ok(());
        }

        let before = self.outermost_bucket_len(conn, event);
        self.deferral
            .register_hook(&mut self.hooks, conn, event, hook.clone(), scope)?;

        // Retrieval never reads the outermost bucket, so hooks deferred into it
        // join the outermost default list in registration order.
        if self.outermost_bucket_len(conn, event) > before {
            self.hooks.add_transaction_hook(conn, event, hook)?;
        }
        Ok(())
    }

    fn outermost_bucket_len(&self, conn: ConnectionId, event: HookEvent) -> usize {
        self.deferral
            .outermost_bucket(conn)
            .map_or(0, |bucket| bucket.hooks(event).len())
    }

    pub fn after_commit(&mut self, conn: ConnectionId, hook: Hook) -> Result<()> {
        self.add_hook(conn, HookEvent::AfterCommit, HookScope::Transaction, hook)
    }

    pub fn after_rollback(&mut self, conn: ConnectionId, hook: Hook) -> Result<()> {
        self.add_hook(conn, HookEvent::AfterRollback, HookScope::Transaction, hook)
    }

    /// Run `f` inside a new level, committing on `Ok` and rolling back on `Err`
    pub fn transaction<T, F>(
        &mut self,
        conn: ConnectionId,
        opts: TransactionOptions,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.begin(conn, opts)?;
        match f(self) {
            Ok(value) => {
                self.commit(conn)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(conn) {
                    warn!(conn = %conn, error = %rollback_err, "rollback after failure also failed");
                }
                Err(err)
            }
        }
    }

    /// Roll back everything still open and forget the connection
    pub fn disconnect(&mut self, conn: ConnectionId) -> Result<()> {
        while self.hooks.depth(conn) > 0 {
            self.rollback(conn)?;
        }
        self.hooks.remove(conn);
        self.deferral.release(conn);
        self.statements.remove(&conn);
        Ok(())
    }

    pub fn depth(&self, conn: ConnectionId) -> usize {
        self.hooks.depth(conn)
    }

    pub fn in_transaction(&self, conn: ConnectionId) -> bool {
        self.depth(conn) > 0
    }

    pub fn in_savepoint(&self, conn: ConnectionId) -> bool {
        self.hooks.in_savepoint(conn)
    }

    /// Statements issued on `conn`, oldest first
    pub fn statements(&self, conn: ConnectionId) -> &[String] {
        self.statements
            .get(&conn)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn deferral(&self) -> &HookDeferralManager {
        &self.deferral
    }

    fn record(&mut self, conn: ConnectionId, sql: String) {
        self.statements.entry(conn).or_default().push(sql);
    }
}
