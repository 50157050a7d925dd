//! Attachment registry: the ordered peripheral declarations of a hub type.
//!
//! Declarations are collected while a [`HubType`](crate::hub::HubType) is
//! built and checked once per hub instance, before anything touches the
//! radio. Checking happens in declaration order so the first mistake is the
//! one reported.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use brickhub_domain::error::{BrickError, ConfigurationError};
use brickhub_domain::peripheral::PeripheralSpec;
use brickhub_domain::port::Port;

use crate::hub::{ChangeHandler, Hub};
use crate::peripheral::Peripheral;
use crate::signal::{Handler, SignalBus};

/// Ordered peripheral declarations.
#[derive(Debug, Clone, Default)]
pub struct AttachRegistry {
    specs: Vec<PeripheralSpec>,
}

impl AttachRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, spec: PeripheralSpec) {
        self.specs.push(spec);
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeripheralSpec> {
        self.specs.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Check every declaration against the hub type's change handlers.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found: a duplicated name, a
    /// port claimed twice, or a sensing peripheral without a change handler.
    pub fn validate(
        &self,
        hub_type: &str,
        handlers: &HashMap<String, ChangeHandler>,
    ) -> Result<(), BrickError> {
        let mut names = HashSet::new();
        let mut ports: HashMap<Port, &str> = HashMap::new();

        for spec in &self.specs {
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigurationError::DuplicatePeripheral(spec.name.clone()).into());
            }
            if let Some(first) = ports.insert(spec.port, spec.name.as_str()) {
                return Err(ConfigurationError::PortInUse {
                    port: spec.port,
                    first: first.to_owned(),
                    second: spec.name.clone(),
                }
                .into());
            }
            if spec.has_sensing() && !handlers.contains_key(&spec.name) {
                return Err(ConfigurationError::MissingChangeHandler {
                    hub: hub_type.to_owned(),
                    peripheral: spec.name.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Create one live peripheral per declaration, owned by `hub`.
    pub(crate) fn instantiate(&self, hub: &Weak<Hub>, bus: &SignalBus) -> Vec<Arc<Peripheral>> {
        self.specs
            .iter()
            .map(|spec| Arc::new(Peripheral::new(spec.clone(), hub.clone(), bus.clone())))
            .collect()
    }
}

/// Route every peripheral's `change` signal to the hub's handler for it.
pub(crate) fn wire_change_handlers(
    hub: &Arc<Hub>,
    handlers: &HashMap<String, ChangeHandler>,
) -> Result<(), BrickError> {
    for peripheral in hub.peripherals() {
        let Some(handler) = handlers.get(peripheral.name()) else {
            continue;
        };
        let handler = Arc::clone(handler);
        let owner = Arc::downgrade(hub);
        peripheral.connect(
            "change",
            Handler::suspending(move |_, event| {
                let handler = Arc::clone(&handler);
                let owner = owner.clone();
                async move {
                    if let Some(hub) = owner.upgrade() {
                        handler(hub, event).await;
                    }
                }
            }),
        )?;
    }
    Ok(())
}
