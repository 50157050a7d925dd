//! Task base: identity, logging span and signal access shared by every
//! concurrent unit (hubs, peripherals, the outbound queue).

use std::fmt;

use brickhub_domain::error::BrickError;
use brickhub_domain::event::DecodedEvent;
use brickhub_domain::id::TaskId;

use crate::signal::{Handler, SignalBus, SignalSender, Signals};

/// Common state embedded in hubs, peripherals and queue tasks.
#[derive(Debug)]
pub struct TaskBase {
    id: TaskId,
    name: String,
    signals: Signals,
    bus: SignalBus,
    span: tracing::Span,
}

impl TaskBase {
    /// Allocate a fresh id for a unit called `name`.
    pub fn new(name: impl Into<String>, signals: Signals, bus: SignalBus) -> Self {
        let name = name.into();
        let id = TaskId::next();
        let span = tracing::info_span!("task", name = %name, id = id.get());
        Self {
            id,
            name,
            signals,
            bus,
            span,
        }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Span to instrument this unit's futures with.
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    #[must_use]
    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    /// Register `handler` for one of this unit's signals.
    ///
    /// # Errors
    ///
    /// Fails with an unknown-signal configuration error when `name` is not
    /// declared by this unit.
    pub fn connect(&self, name: &str, handler: Handler) -> Result<(), BrickError> {
        self.bus.connect(self, name, handler)
    }

    /// Emit one of this unit's signals.
    ///
    /// # Errors
    ///
    /// Fails with an unknown-signal configuration error when `name` is not
    /// declared by this unit.
    pub async fn emit(&self, name: &str, event: &DecodedEvent) -> Result<(), BrickError> {
        self.bus.emit(self, name, event).await
    }
}

impl fmt::Display for TaskBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.id)
    }
}

impl SignalSender for TaskBase {
    fn sender_id(&self) -> TaskId {
        self.id
    }

    fn signals(&self) -> &Signals {
        &self.signals
    }
}
