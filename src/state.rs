use crate::registry::PresenceRegistry;
use crate::session::RecoveryTracker;

/// Shared application state passed to all handlers via axum State extractor.
///
/// The registry and the recovery tracker are the only state shared across
/// connections; both are cheaply cloneable handles over concurrent maps.
#[derive(Clone)]
pub struct AppState {
    /// Live username -> connections directory.
    pub registry: PresenceRegistry,
    /// Reconnection-recovery window bookkeeping.
    pub recovery: RecoveryTracker,
}

impl AppState {
    pub fn new(recovery_window_secs: u64) -> Self {
        Self {
            registry: PresenceRegistry::new(),
            recovery: RecoveryTracker::new(recovery_window_secs),
        }
    }
}
