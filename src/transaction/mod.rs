// ============================================================================
// Transaction Hook Deferral Module
// ============================================================================
//
// Tracks, per connection, a stack of nesting levels (outermost transaction
// plus savepoints) and decides whether commit/rollback hooks registered at a
// level fire when that level concludes or follow the host's default path.
//
// Design Patterns Used:
// - Strategy: the host's default hook handling plugs in through HostHooks
// - Stack discipline: levels are strictly LIFO, flag and bucket travel together
//
// ============================================================================

pub mod config;
pub mod force;
pub mod hooks;
pub mod host;
pub mod manager;
pub mod state;

pub use config::DeferralConfig;
pub use force::ForceFlag;
pub use hooks::{Hook, HookBucket, HookEvent, HookScope};
pub use host::HostHooks;
pub use manager::HookDeferralManager;
pub use state::{Level, TransactionContext};
