//! Live peripherals: a [`PeripheralSpec`] bound to one hub instance.
//!
//! A peripheral keeps the last value seen for each sensing capability and
//! knows how to ask the hub for updates once it is attached.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use brickhub_domain::capability::Capability;
use brickhub_domain::error::{BrickError, ConfigurationError};
use brickhub_domain::event::{CommandKind, DecodedEvent, EventKind, SensorValue};
use brickhub_domain::id::TaskId;
use brickhub_domain::peripheral::{PeripheralKind, PeripheralSpec};
use brickhub_domain::port::Port;

use crate::hub::Hub;
use crate::signal::{Handler, SignalBus, SignalSender, Signals};
use crate::task::TaskBase;

/// Signals every peripheral declares.
pub const PERIPHERAL_SIGNALS: &[&str] = &["attach", "detach", "change"];

/// LWP3 hub property id of the hub button.
const BUTTON_PROPERTY: u8 = 0x02;
/// Hub property operation: enable updates.
const ENABLE_UPDATES: u8 = 0x02;
/// Port output startup/completion flags: execute immediately, request feedback.
const OUTPUT_FLAGS: u8 = 0x11;
const START_POWER: u8 = 0x01;
const WRITE_DIRECT_MODE_DATA: u8 = 0x51;

#[derive(Debug, Default)]
struct PeripheralState {
    attached: bool,
    values: HashMap<Capability, SensorValue>,
}

/// A sensor or motor attached to a hub.
pub struct Peripheral {
    base: TaskBase,
    spec: PeripheralSpec,
    hub: Weak<Hub>,
    state: Mutex<PeripheralState>,
}

impl Peripheral {
    pub(crate) fn new(spec: PeripheralSpec, hub: Weak<Hub>, bus: SignalBus) -> Self {
        let inherited = Signals::declare(PERIPHERAL_SIGNALS);
        let signals = spec
            .sensing()
            .fold(Signals::default(), |signals, cap| signals.with(cap.change_signal()))
            .inherit(&inherited);
        Self {
            base: TaskBase::new(spec.name.clone(), signals, bus),
            spec,
            hub,
            state: Mutex::new(PeripheralState::default()),
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.base.id()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[must_use]
    pub fn kind(&self) -> PeripheralKind {
        self.spec.kind
    }

    #[must_use]
    pub fn port(&self) -> Port {
        self.spec.port
    }

    #[must_use]
    pub fn spec(&self) -> &PeripheralSpec {
        &self.spec
    }

    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.spec.capabilities
    }

    #[must_use]
    pub fn base(&self) -> &TaskBase {
        &self.base
    }

    /// The owning hub, if it is still alive.
    #[must_use]
    pub fn hub(&self) -> Option<Arc<Hub>> {
        self.hub.upgrade()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.lock().attached
    }

    /// Last value reported for `capability`.
    #[must_use]
    pub fn value(&self, capability: &str) -> Option<SensorValue> {
        self.lock()
            .values
            .get(&Capability::new(capability))
            .cloned()
    }

    /// Capability that plain value reports belong to.
    ///
    /// A port reports one mode at a time, so this is the first sensing
    /// capability the kind has a mode for. Kinds without a mode table fall
    /// back to their first sensing capability.
    #[must_use]
    pub fn active_capability(&self) -> Option<&Capability> {
        self.spec
            .sensing()
            .find(|cap| self.kind().mode_of(cap).is_some())
            .or_else(|| self.spec.sensing().next())
    }

    /// Subscribe to this peripheral's signals.
    ///
    /// # Errors
    ///
    /// Fails with an unknown-signal configuration error for undeclared names.
    pub fn connect(&self, signal: &str, handler: Handler) -> Result<(), BrickError> {
        self.base.connect(signal, handler)
    }

    pub(crate) async fn emit(&self, signal: &str, event: &DecodedEvent) -> Result<(), BrickError> {
        self.base.emit(signal, event).await
    }

    /// Fold `event` into the peripheral state. Returns the capability a
    /// value event was stored under.
    pub(crate) fn record(&self, event: &DecodedEvent) -> Option<Capability> {
        let mut state = self.lock();
        match event.kind {
            EventKind::Attached { .. } => {
                state.attached = true;
                None
            }
            EventKind::Detached => {
                state.attached = false;
                None
            }
            EventKind::Value => {
                let capability = self.active_capability()?.clone();
                state.values.insert(capability.clone(), event.value.clone());
                Some(capability)
            }
            EventKind::Status => None,
        }
    }

    /// Commands that switch on update notifications for the
    /// [active capability](Self::active_capability).
    #[must_use]
    pub fn activation_commands(&self) -> Vec<(CommandKind, Vec<u8>)> {
        if self.kind() == PeripheralKind::Button {
            if self.spec.has_sensing() {
                return vec![(
                    CommandKind::HubProperty,
                    vec![BUTTON_PROPERTY, ENABLE_UPDATES],
                )];
            }
            return Vec::new();
        }

        self.active_capability()
            .and_then(|cap| self.kind().mode_of(cap))
            .map(|mode| {
                // mode, delta interval (u32 LE) = 1, notifications enabled
                vec![(CommandKind::PortInputFormat, vec![mode, 1, 0, 0, 0, 1])]
            })
            .unwrap_or_default()
    }

    /// Enqueue the activation commands on the owning hub.
    ///
    /// # Errors
    ///
    /// Fails when the hub is gone or not connected.
    pub fn activate(&self) -> Result<(), BrickError> {
        let hub = self.owning_hub()?;
        let sensing = self.spec.sensing().count();
        if sensing > 1
            && let Some(active) = self.active_capability()
        {
            tracing::warn!(
                peripheral = %self.base,
                %active,
                ignored = sensing - 1,
                "port reports one mode at a time"
            );
        }
        for (kind, parameters) in self.activation_commands() {
            tracing::debug!(peripheral = %self.base, %kind, "activating updates");
            hub.send(kind, self.port(), &parameters)?;
        }
        Ok(())
    }

    /// Drive an output at `power` percent (-100..=100, negative reverses).
    ///
    /// # Errors
    ///
    /// Fails when the hub is gone or not connected.
    pub fn set_speed(&self, power: i8) -> Result<(), BrickError> {
        let power = power.clamp(-100, 100).to_le_bytes()[0];
        self.output(&[OUTPUT_FLAGS, START_POWER, power])
    }

    /// Set a colour index on a light peripheral.
    ///
    /// # Errors
    ///
    /// Fails when the hub is gone or not connected.
    pub fn set_color(&self, color: u8) -> Result<(), BrickError> {
        self.write_direct(0, &[color])
    }

    /// Write raw mode data to the port.
    ///
    /// # Errors
    ///
    /// Fails when the hub is gone or not connected.
    pub fn write_direct(&self, mode: u8, data: &[u8]) -> Result<(), BrickError> {
        let mut parameters = vec![OUTPUT_FLAGS, WRITE_DIRECT_MODE_DATA, mode];
        parameters.extend_from_slice(data);
        self.output(&parameters)
    }

    fn output(&self, parameters: &[u8]) -> Result<(), BrickError> {
        self.owning_hub()?
            .send(CommandKind::PortOutput, self.port(), parameters)
    }

    fn owning_hub(&self) -> Result<Arc<Hub>, BrickError> {
        self.hub
            .upgrade()
            .ok_or_else(|| ConfigurationError::NotConnected(self.name().to_owned()).into())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PeripheralState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base.fmt(f)
    }
}

impl fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peripheral")
            .field("id", &self.base.id())
            .field("spec", &self.spec)
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

impl SignalSender for Peripheral {
    fn sender_id(&self) -> TaskId {
        self.base.id()
    }

    fn signals(&self) -> &Signals {
        self.base.signals()
    }
}
