//! Hub registry: every hub instance created during setup, in creation
//! order, plus the addresses they were finally reached at.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use brickhub_domain::error::{BrickError, ConfigurationError};

use crate::hub::Hub;

/// Process-wide list of hubs. Sealed once setup returns.
#[derive(Debug, Default)]
pub struct HubRegistry {
    hubs: Mutex<Vec<Arc<Hub>>>,
    reachable: Mutex<HashMap<String, Arc<Hub>>>,
    sealed: AtomicBool,
}

impl HubRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hub.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::RegistrySealed`] once setup is over.
    pub fn register(&self, hub: Arc<Hub>) -> Result<(), BrickError> {
        if self.is_sealed() {
            return Err(ConfigurationError::RegistrySealed(hub.name().to_owned()).into());
        }
        self.hubs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hub);
        Ok(())
    }

    /// Snapshot of every registered hub in creation order.
    #[must_use]
    pub fn hubs(&self) -> Vec<Arc<Hub>> {
        self.hubs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Remember that `hub` answered at `address`.
    pub fn mark_reachable(&self, address: &str, hub: &Arc<Hub>) {
        self.reachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.to_owned(), Arc::clone(hub));
    }

    #[must_use]
    pub fn by_address(&self, address: &str) -> Option<Arc<Hub>> {
        self.reachable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }
}
