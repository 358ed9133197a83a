//! Application state

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use companion_config::Settings;
use companion_emergency::EmergencyDispatcher;
use companion_orchestrator::Orchestrator;

/// Shared state across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub orchestrator: Arc<Orchestrator>,
    /// Separate dispatcher wired to simulated adapters for `test-emergency`
    pub dry_run_emergency: EmergencyDispatcher,
    /// Set by `drain`: new utterances are refused, in-flight work finishes
    pub draining: Arc<AtomicBool>,
    /// True when a gateway was unreachable at startup and its adapter was
    /// replaced by the simulated one
    pub degraded: bool,
}

impl AppState {
    pub fn new(
        config: Settings,
        orchestrator: Arc<Orchestrator>,
        dry_run_emergency: EmergencyDispatcher,
        degraded: bool,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            dry_run_emergency,
            draining: Arc::new(AtomicBool::new(false)),
            degraded,
        }
    }
}
