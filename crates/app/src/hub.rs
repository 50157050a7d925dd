//! Hubs: user-declared hub types and the live instances built from them.
//!
//! A [`HubType`] describes what a hub looks like: its hardware family, the
//! peripherals attached to it, one change handler per sensing peripheral
//! and the control routine to run once connected. [`Hub::builder`] turns a
//! type into a registered instance, validating the attachments first.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use brickhub_domain::error::{BrickError, ConfigurationError};
use brickhub_domain::event::{CommandKind, DecodedEvent};
use brickhub_domain::hub::{HubKind, HubState};
use brickhub_domain::id::TaskId;
use brickhub_domain::peripheral::PeripheralSpec;
use brickhub_domain::port::Port;

use crate::attach::{self, AttachRegistry};
use crate::peripheral::Peripheral;
use crate::ports::MessageCodec;
use crate::queue::OutboundSink;
use crate::registry::HubRegistry;
use crate::signal::{BoxFuture, SignalBus, SignalSender, Signals};
use crate::task::TaskBase;

/// Handler invoked with every change of one peripheral.
pub type ChangeHandler =
    Arc<dyn Fn(Arc<Hub>, DecodedEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// A hub's control routine. Receives the hub and its cancellation token.
pub type RunRoutine = Arc<
    dyn Fn(Arc<Hub>, CancellationToken) -> BoxFuture<'static, Result<(), BrickError>>
        + Send
        + Sync,
>;

/// Declaration of a kind of hub.
pub struct HubType {
    name: String,
    kind: HubKind,
    ble_name: String,
    attachments: AttachRegistry,
    change_handlers: HashMap<String, ChangeHandler>,
    run: RunRoutine,
}

impl HubType {
    /// Create a builder for a hub type called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>, kind: HubKind) -> HubTypeBuilder {
        HubTypeBuilder {
            name: name.into(),
            kind,
            ble_name: None,
            attachments: AttachRegistry::new(),
            change_handlers: HashMap::new(),
            run: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> HubKind {
        self.kind
    }

    #[must_use]
    pub fn ble_name(&self) -> &str {
        &self.ble_name
    }

    #[must_use]
    pub fn attachments(&self) -> &AttachRegistry {
        &self.attachments
    }

    /// Whether a change handler exists for the peripheral called `name`.
    #[must_use]
    pub fn handles_changes_of(&self, name: &str) -> bool {
        self.change_handlers.contains_key(name)
    }
}

impl fmt::Debug for HubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("ble_name", &self.ble_name)
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
    }
}

/// Step-by-step builder for [`HubType`].
pub struct HubTypeBuilder {
    name: String,
    kind: HubKind,
    ble_name: Option<String>,
    attachments: AttachRegistry,
    change_handlers: HashMap<String, ChangeHandler>,
    run: Option<RunRoutine>,
}

impl HubTypeBuilder {
    /// Override the advertised local name to look for.
    #[must_use]
    pub fn ble_name(mut self, name: impl Into<String>) -> Self {
        self.ble_name = Some(name.into());
        self
    }

    /// Attach a peripheral. Declarations are kept in order.
    #[must_use]
    pub fn attach(mut self, spec: PeripheralSpec) -> Self {
        self.attachments.push(spec);
        self
    }

    /// Handle changes of the peripheral called `peripheral`.
    #[must_use]
    pub fn on_change<F, Fut>(mut self, peripheral: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<Hub>, DecodedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: ChangeHandler = Arc::new(move |hub, event| Box::pin(handler(hub, event)));
        self.change_handlers.insert(peripheral.into(), handler);
        self
    }

    /// Control routine started once every hub is connected.
    #[must_use]
    pub fn run<F, Fut>(mut self, routine: F) -> Self
    where
        F: Fn(Arc<Hub>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BrickError>> + Send + 'static,
    {
        self.run = Some(Arc::new(move |hub, cancel| Box::pin(routine(hub, cancel))));
        self
    }

    /// Consume the builder. Hub types without a routine finish right away.
    #[must_use]
    pub fn build(self) -> Arc<HubType> {
        Arc::new(HubType {
            ble_name: self
                .ble_name
                .unwrap_or_else(|| self.kind.default_ble_name().to_owned()),
            name: self.name,
            kind: self.kind,
            attachments: self.attachments,
            change_handlers: self.change_handlers,
            run: self
                .run
                .unwrap_or_else(|| Arc::new(|_, _| Box::pin(async { Ok(()) }))),
        })
    }
}

/// Everything a hub needs from the process while it is being set up.
#[derive(Clone)]
pub struct SetupContext {
    registry: Arc<HubRegistry>,
    bus: SignalBus,
    codec: Arc<dyn MessageCodec>,
}

impl SetupContext {
    #[must_use]
    pub fn new(codec: Arc<dyn MessageCodec>) -> Self {
        Self {
            registry: Arc::new(HubRegistry::new()),
            bus: SignalBus::new(),
            codec,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<HubRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    #[must_use]
    pub fn codec(&self) -> &Arc<dyn MessageCodec> {
        &self.codec
    }

    /// Start building an instance of `hub_type`.
    #[must_use]
    pub fn hub(&self, hub_type: &Arc<HubType>) -> HubBuilder<'_> {
        Hub::builder(self, hub_type)
    }
}

/// Builder for one [`Hub`] instance.
pub struct HubBuilder<'a> {
    context: &'a SetupContext,
    hub_type: Arc<HubType>,
    name: Option<String>,
    address: Option<String>,
}

impl HubBuilder<'_> {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Only connect to the device with this hardware address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Validate the attachments, instantiate the peripherals and register
    /// the hub.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] for bad attachments, an empty name,
    /// or when the registry is already sealed.
    pub fn build(self) -> Result<Arc<Hub>, BrickError> {
        let hub_type = self.hub_type;
        let name = self
            .name
            .unwrap_or_else(|| hub_type.name.clone());
        if name.is_empty() {
            return Err(ConfigurationError::EmptyName.into());
        }

        hub_type
            .attachments
            .validate(&hub_type.name, &hub_type.change_handlers)?;

        let context = self.context;
        let hub = Arc::new_cyclic(|weak| Hub {
            base: TaskBase::new(name, Signals::default(), context.bus.clone()),
            ble_name: hub_type.ble_name.clone(),
            declared_address: self.address,
            address: OnceLock::new(),
            state: Mutex::new(HubState::Disconnected),
            peripherals: hub_type.attachments.instantiate(weak, &context.bus),
            codec: Arc::clone(&context.codec),
            link: OnceLock::new(),
            hub_type: Arc::clone(&hub_type),
        });
        context.registry.register(Arc::clone(&hub))?;
        attach::wire_change_handlers(&hub, &hub_type.change_handlers)?;

        tracing::debug!(
            hub = %hub,
            kind = %hub.kind(),
            peripherals = hub.peripherals.len(),
            "hub created"
        );
        Ok(hub)
    }
}

/// One live hub.
pub struct Hub {
    base: TaskBase,
    hub_type: Arc<HubType>,
    ble_name: String,
    declared_address: Option<String>,
    address: OnceLock<String>,
    state: Mutex<HubState>,
    peripherals: Vec<Arc<Peripheral>>,
    codec: Arc<dyn MessageCodec>,
    link: OnceLock<Arc<dyn OutboundSink>>,
}

impl Hub {
    #[must_use]
    pub fn builder<'a>(context: &'a SetupContext, hub_type: &Arc<HubType>) -> HubBuilder<'a> {
        HubBuilder {
            context,
            hub_type: Arc::clone(hub_type),
            name: None,
            address: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.base.id()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.base.name()
    }

    #[must_use]
    pub fn kind(&self) -> HubKind {
        self.hub_type.kind
    }

    #[must_use]
    pub fn hub_type(&self) -> &Arc<HubType> {
        &self.hub_type
    }

    #[must_use]
    pub fn base(&self) -> &TaskBase {
        &self.base
    }

    /// Advertised local name to match during discovery.
    #[must_use]
    pub fn ble_name(&self) -> &str {
        &self.ble_name
    }

    #[must_use]
    pub fn uart_uuid(&self) -> Uuid {
        self.kind().uart_uuid()
    }

    #[must_use]
    pub fn char_uuid(&self) -> Uuid {
        self.kind().char_uuid()
    }

    /// The hardware address this hub was pinned to, if any.
    #[must_use]
    pub fn declared_address(&self) -> Option<&str> {
        self.declared_address.as_deref()
    }

    /// The address of the device actually connected to.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.address.get().map(String::as_str)
    }

    #[must_use]
    pub fn codec(&self) -> &Arc<dyn MessageCodec> {
        &self.codec
    }

    #[must_use]
    pub fn state(&self) -> HubState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidTransition`] for a move the hub
    /// lifecycle does not allow.
    pub fn transition(&self, next: HubState) -> Result<(), BrickError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.can_transition_to(next) {
            return Err(ConfigurationError::InvalidTransition {
                hub: self.name().to_owned(),
                from: *state,
                to: next,
            }
            .into());
        }
        tracing::debug!(hub = %self.base, from = %*state, to = %next, "hub state");
        *state = next;
        Ok(())
    }

    #[must_use]
    pub fn peripherals(&self) -> &[Arc<Peripheral>] {
        &self.peripherals
    }

    /// Look a peripheral up by its declared name.
    #[must_use]
    pub fn peripheral(&self, name: &str) -> Option<&Arc<Peripheral>> {
        self.peripherals.iter().find(|p| p.name() == name)
    }

    /// Look a peripheral up by the port it sits on.
    #[must_use]
    pub fn peripheral_at(&self, port: Port) -> Option<&Arc<Peripheral>> {
        self.peripherals.iter().find(|p| p.port() == port)
    }

    /// Peripherals built into the hub that never announce themselves.
    pub fn intrinsic_peripherals(&self) -> impl Iterator<Item = &Arc<Peripheral>> {
        self.peripherals.iter().filter(|p| p.kind().is_intrinsic())
    }

    /// Whether an outbound link has been set up.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.link.get().is_some()
    }

    /// Encode a command and hand it to the outbound queue.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::NotConnected`] before the hub has been
    /// connected, or a transport error once the queue has shut down.
    pub fn send(&self, kind: CommandKind, port: Port, parameters: &[u8]) -> Result<(), BrickError> {
        let link = self
            .link
            .get()
            .ok_or_else(|| ConfigurationError::NotConnected(self.name().to_owned()))?;
        let payload = self.codec.encode(kind, port, parameters);
        tracing::trace!(hub = %self.base, %kind, %port, len = payload.len(), "enqueue");
        link.enqueue(kind, payload)
    }

    /// Route raw inbound bytes as if the hub had sent them.
    pub async fn inject(self: &Arc<Self>, bytes: &[u8]) {
        crate::router::NotificationRouter::new(self).route(bytes).await;
    }

    /// Run the hub type's control routine.
    pub(crate) fn run(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<(), BrickError>> {
        (self.hub_type.run)(Arc::clone(self), cancel)
    }

    pub(crate) fn set_address(&self, address: String) {
        if self.address.set(address).is_err() {
            tracing::warn!(hub = %self.base, "address already resolved");
        }
    }

    pub(crate) fn set_link(&self, link: Arc<dyn OutboundSink>) {
        if self.link.set(link).is_err() {
            tracing::warn!(hub = %self.base, "outbound link already set");
        }
    }
}

impl fmt::Display for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.base.fmt(f)
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("id", &self.base.id())
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("address", &self.address())
            .field("peripherals", &self.peripherals)
            .finish_non_exhaustive()
    }
}

impl SignalSender for Hub {
    fn sender_id(&self) -> TaskId {
        self.base.id()
    }

    fn signals(&self) -> &Signals {
        self.base.signals()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use brickhub_domain::event::EventKind;
    use brickhub_domain::peripheral::PeripheralKind;

    use super::*;
    use crate::testing::TinyCodec;

    fn context() -> SetupContext {
        SetupContext::new(Arc::new(TinyCodec))
    }

    fn button() -> PeripheralSpec {
        PeripheralSpec::builder(PeripheralKind::Button)
            .name("hub_btn")
            .capability("sense_press")
            .build()
            .unwrap()
    }

    #[test]
    fn should_fail_before_registration_without_change_handler() {
        let ctx = context();
        let truck = HubType::builder("truck", HubKind::CPlus)
            .attach(button())
            .build();

        let err = ctx.hub(&truck).build().unwrap_err();
        assert!(matches!(
            err,
            BrickError::Configuration(ConfigurationError::MissingChangeHandler { .. })
        ));
        assert!(ctx.registry().hubs().is_empty());
    }

    #[test]
    fn should_register_hub_with_default_ble_name() {
        let ctx = context();
        let truck = HubType::builder("truck", HubKind::CPlus)
            .attach(button())
            .on_change("hub_btn", |_, _| async {})
            .build();

        let hub = ctx.hub(&truck).name("my truck").build().unwrap();
        assert_eq!(hub.name(), "my truck");
        assert_eq!(hub.ble_name(), "Control+ Hub");
        assert_eq!(hub.state(), HubState::Disconnected);
        assert_eq!(hub.intrinsic_peripherals().count(), 1);
        assert_eq!(ctx.registry().hubs().len(), 1);
    }

    #[test]
    fn should_give_instances_of_one_type_independent_peripherals() {
        let ctx = context();
        let truck = HubType::builder("truck", HubKind::CPlus)
            .attach(button())
            .on_change("hub_btn", |_, _| async {})
            .build();

        let a = ctx.hub(&truck).name("a").build().unwrap();
        let b = ctx.hub(&truck).name("b").build().unwrap();
        let btn_a = a.peripheral("hub_btn").unwrap();
        let btn_b = b.peripheral("hub_btn").unwrap();
        assert_ne!(btn_a.id(), btn_b.id());
        assert!(Arc::ptr_eq(&btn_a.hub().unwrap(), &a));
    }

    #[test]
    fn should_reject_invalid_transitions() {
        let ctx = context();
        let bare = HubType::builder("bare", HubKind::Duplo).build();
        let hub = ctx.hub(&bare).build().unwrap();

        assert!(hub.transition(HubState::Running).is_err());
        hub.transition(HubState::Scanning).unwrap();
        hub.transition(HubState::Finished).unwrap();
        assert!(hub.transition(HubState::Scanning).is_err());
    }

    #[test]
    fn should_refuse_to_send_before_connect() {
        let ctx = context();
        let bare = HubType::builder("bare", HubKind::Duplo).build();
        let hub = ctx.hub(&bare).build().unwrap();
        assert!(matches!(
            hub.send(CommandKind::HubAction, Port::INTRINSIC, &[]),
            Err(BrickError::Configuration(ConfigurationError::NotConnected(_)))
        ));
    }

    #[tokio::test]
    async fn should_call_change_handler_once_for_injected_attach() {
        let ctx = context();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let truck = HubType::builder("truck", HubKind::CPlus)
            .attach(button())
            .on_change("hub_btn", move |_, event| {
                let seen = Arc::clone(&seen);
                async move {
                    assert!(matches!(event.kind, EventKind::Attached { .. }));
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build();
        let hub = ctx.hub(&truck).build().unwrap();

        let frame = hub.codec().attach_frame(Port::INTRINSIC, 0x05);
        hub.inject(&frame).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(hub.peripheral("hub_btn").unwrap().is_attached());
    }
}
