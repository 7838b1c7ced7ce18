// ============================================================================
// force-hooks Library
// ============================================================================
//
// Nested-transaction hook deferral for database clients. A host transaction
// engine drives HookDeferralManager at every level begin, hook registration,
// level conclusion and level end; the manager decides which hooks fire at a
// savepoint boundary and which keep the host's default behavior.
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod engine;
pub mod transaction;

pub use connection::ConnectionId;
pub use crate::core::{HookError, Result};
pub use engine::{DefaultHooks, TransactionEngine, TransactionOptions};
pub use transaction::{
    DeferralConfig, ForceFlag, Hook, HookBucket, HookDeferralManager, HookEvent, HookScope,
    HostHooks, Level, TransactionContext,
};
