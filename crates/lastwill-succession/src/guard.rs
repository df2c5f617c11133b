//! Activity guard: turns wallet transactions into heartbeats.

use crate::custody::TransactionGuard;
use crate::module::SuccessionModule;
use crate::types::Address;
use std::sync::Arc;

/// Relay installed as the wallet's transaction guard.
///
/// Holds no state of its own. Every transaction the wallet executes,
/// including configuration calls into the module, becomes one heartbeat.
#[derive(Clone)]
pub struct ActivityGuard {
    module: Arc<SuccessionModule>,
}

impl ActivityGuard {
    pub fn new(module: Arc<SuccessionModule>) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &Arc<SuccessionModule> {
        &self.module
    }
}

impl TransactionGuard for ActivityGuard {
    fn on_transaction(&self, wallet: &Address) {
        self.module.heartbeat(wallet);
    }
}
