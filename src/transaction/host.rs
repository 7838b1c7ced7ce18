use super::{Hook, HookEvent};
use crate::connection::ConnectionId;
use crate::core::Result;

/// Default hook handling supplied by the host transaction engine
///
/// The deferral manager calls into this whenever deferral is not in effect
/// for a connection, so hooks keep the host's usual firing behavior.
pub trait HostHooks {
    /// Whether the connection is currently inside a savepoint
    ///
    /// Only meaningful while at least one level is open.
    fn in_savepoint(&self, conn: ConnectionId) -> bool;

    /// Register a hook tied to the whole transaction
    fn add_transaction_hook(&mut self, conn: ConnectionId, event: HookEvent, hook: Hook)
    -> Result<()>;

    /// Register a hook tied to the nearest savepoint
    fn add_savepoint_hook(&mut self, conn: ConnectionId, event: HookEvent, hook: Hook)
    -> Result<()>;

    /// Hooks the host would fire for `event` at the level now concluding
    fn transaction_hooks(&self, conn: ConnectionId, event: HookEvent) -> Vec<Hook>;
}
