//! Shared cross-platform state types.

/// Sync cycle state reported by the sync engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Synced,
    Error,
}
