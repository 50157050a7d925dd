//! Signal bus: named publish/subscribe keyed by sender and signal name.
//!
//! Every sender declares the set of signal names it supports ([`Signals`]).
//! Connecting to or emitting a name outside that set is a programming error
//! and fails immediately with [`ConfigurationError::UnknownSignal`].
//!
//! Handlers come in two flavours: [`Handler::Immediate`] closures run
//! inline, [`Handler::Suspending`] ones return a future that is awaited.
//! On emit, all immediate handlers run first in registration order, then
//! every suspending handler is awaited in registration order.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use brickhub_domain::error::{BrickError, ConfigurationError};
use brickhub_domain::event::DecodedEvent;
use brickhub_domain::id::TaskId;

/// Boxed, `Send` future used for type-erased async callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type ImmediateFn = dyn Fn(TaskId, &DecodedEvent) + Send + Sync;
type SuspendingFn = dyn Fn(TaskId, DecodedEvent) -> BoxFuture<'static, ()> + Send + Sync;

/// A registered signal handler.
#[derive(Clone)]
pub enum Handler {
    Immediate(Arc<ImmediateFn>),
    Suspending(Arc<SuspendingFn>),
}

impl Handler {
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(TaskId, &DecodedEvent) + Send + Sync + 'static,
    {
        Self::Immediate(Arc::new(f))
    }

    pub fn suspending<F, Fut>(f: F) -> Self
    where
        F: Fn(TaskId, DecodedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Suspending(Arc::new(move |sender, event| Box::pin(f(sender, event))))
    }

    fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate(_) => f.write_str("Handler::Immediate"),
            Self::Suspending(_) => f.write_str("Handler::Suspending"),
        }
    }
}

/// The statically known signal names of a sender: its own names followed
/// by everything inherited from its ancestry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signals {
    names: Vec<Cow<'static, str>>,
}

impl Signals {
    #[must_use]
    pub fn declare(own: &[&'static str]) -> Self {
        Self {
            names: own.iter().map(|name| Cow::Borrowed(*name)).collect(),
        }
    }

    /// Append the parent's names after this type's own.
    #[must_use]
    pub fn inherit(mut self, parent: &Signals) -> Self {
        for name in &parent.names {
            if !self.contains(name) {
                self.names.push(name.clone());
            }
        }
        self
    }

    /// Add one dynamically built name (e.g. `change::sense_pos`).
    #[must_use]
    pub fn with(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        if !self.contains(&name) {
            self.names.push(name);
        }
        self
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|known| known == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(AsRef::as_ref)
    }
}

/// Anything that can appear as the sender side of a signal.
pub trait SignalSender: fmt::Display {
    fn sender_id(&self) -> TaskId;
    fn signals(&self) -> &Signals;
}

type Registry = HashMap<(TaskId, String), Vec<Handler>>;

/// Shared signal bus. Cloning yields another handle onto the same registry.
///
/// Handlers are held strongly for as long as the bus lives.
#[derive(Clone, Default)]
pub struct SignalBus {
    handlers: Arc<Mutex<Registry>>,
}

impl SignalBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `name` emitted by `sender`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownSignal`] when `sender` does not
    /// declare `name`.
    pub fn connect<S>(&self, sender: &S, name: &str, handler: Handler) -> Result<(), BrickError>
    where
        S: SignalSender + ?Sized,
    {
        ensure_known(sender, name)?;
        self.lock()
            .entry((sender.sender_id(), name.to_owned()))
            .or_default()
            .push(handler);
        tracing::trace!(sender = %sender, signal = name, "handler connected");
        Ok(())
    }

    /// Invoke every handler registered for `sender` + `name` and wait for
    /// all of them to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownSignal`] when `sender` does not
    /// declare `name`.
    pub async fn emit<S>(
        &self,
        sender: &S,
        name: &str,
        event: &DecodedEvent,
    ) -> Result<(), BrickError>
    where
        S: SignalSender + ?Sized,
    {
        ensure_known(sender, name)?;
        let id = sender.sender_id();
        let handlers = self.snapshot(id, name);
        if handlers.is_empty() {
            return Ok(());
        }

        tracing::trace!(sender = %sender, signal = name, count = handlers.len(), "emitting");

        for handler in handlers.iter().filter(|h| h.is_immediate()) {
            if let Handler::Immediate(f) = handler {
                f(id, event);
            }
        }
        for handler in handlers.iter().filter(|h| !h.is_immediate()) {
            if let Handler::Suspending(f) = handler {
                f(id, event.clone()).await;
            }
        }
        Ok(())
    }

    /// Number of handlers registered for `sender` + `name`.
    #[must_use]
    pub fn handler_count(&self, sender: TaskId, name: &str) -> usize {
        self.lock()
            .get(&(sender, name.to_owned()))
            .map_or(0, Vec::len)
    }

    /// Number of handlers registered across every sender and signal.
    #[must_use]
    pub fn total_handler_count(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn snapshot(&self, sender: TaskId, name: &str) -> Vec<Handler> {
        self.lock()
            .get(&(sender, name.to_owned()))
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalBus")
            .field("keys", &self.lock().len())
            .field("handlers", &self.total_handler_count())
            .finish()
    }
}

fn ensure_known<S>(sender: &S, name: &str) -> Result<(), BrickError>
where
    S: SignalSender + ?Sized,
{
    if sender.signals().contains(name) {
        Ok(())
    } else {
        Err(ConfigurationError::UnknownSignal {
            sender: sender.to_string(),
            signal: name.to_owned(),
        }
        .into())
    }
}
