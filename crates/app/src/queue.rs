//! Outbound queue: the single FIFO all hubs write through.
//!
//! Producers never block: [`OutboundQueue::enqueue`] pushes onto an
//! unbounded channel. One drain task frames every payload and writes it to
//! the transport, strictly in enqueue order. A bad payload or a failed write
//! is logged and skipped; it never stops the drain. Closing the drain stops
//! new messages, flushes what is already queued and then tears the
//! transport down.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use brickhub_domain::error::BrickError;
use brickhub_domain::event::CommandKind;
use brickhub_domain::frame::Frame;

use crate::ports::TransportAdapter;
use crate::signal::{SignalBus, Signals};
use crate::task::TaskBase;

/// The queue is closed and no longer accepts messages.
#[derive(Debug, thiserror::Error)]
#[error("outbound queue is closed")]
pub struct QueueClosed;

/// One message waiting to be written.
#[derive(Debug, Clone)]
pub struct OutboundItem<H> {
    pub kind: CommandKind,
    pub hub: String,
    pub handle: H,
    pub payload: Vec<u8>,
}

/// Where a hub pushes its encoded commands.
pub trait OutboundSink: Send + Sync {
    /// Queue one payload (no length prefix).
    ///
    /// # Errors
    ///
    /// Fails once the queue has shut down.
    fn enqueue(&self, kind: CommandKind, payload: Vec<u8>) -> Result<(), BrickError>;
}

/// Producer side of the queue.
#[derive(Debug, Clone)]
pub struct OutboundQueue<H> {
    sender: mpsc::UnboundedSender<OutboundItem<H>>,
}

impl<H: Clone + Send + Sync + 'static> OutboundQueue<H> {
    /// Create the producer handle together with the one drain, which
    /// reports on `bus`.
    #[must_use]
    pub fn channel(bus: &SignalBus) -> (Self, Drain<H>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let base = TaskBase::new("BLE queue", Signals::default(), bus.clone());
        (Self { sender }, Drain { base, receiver })
    }

    /// Queue `payload` for the hub called `hub`, writing through `handle`.
    ///
    /// # Errors
    ///
    /// Fails with a transport error once the drain has stopped.
    pub fn enqueue(
        &self,
        kind: CommandKind,
        hub: &str,
        handle: H,
        payload: Vec<u8>,
    ) -> Result<(), BrickError> {
        self.sender
            .send(OutboundItem {
                kind,
                hub: hub.to_owned(),
                handle,
                payload,
            })
            .map_err(|_| BrickError::Transport(Box::new(QueueClosed)))
    }

    /// A sink bound to one hub and its characteristic.
    #[must_use]
    pub fn link(&self, hub: &str, handle: H) -> Arc<dyn OutboundSink> {
        Arc::new(HubLink {
            queue: self.clone(),
            hub: hub.to_owned(),
            handle,
        })
    }
}

/// [`OutboundSink`] for one hub.
#[derive(Debug)]
pub struct HubLink<H> {
    queue: OutboundQueue<H>,
    hub: String,
    handle: H,
}

impl<H: Clone + Send + Sync + 'static> OutboundSink for HubLink<H> {
    fn enqueue(&self, kind: CommandKind, payload: Vec<u8>) -> Result<(), BrickError> {
        self.queue
            .enqueue(kind, &self.hub, self.handle.clone(), payload)
    }
}

/// What the drain did before it stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub written: usize,
    pub skipped: usize,
    pub torn_down: bool,
}

/// Consumer side of the queue.
#[derive(Debug)]
pub struct Drain<H> {
    base: TaskBase,
    receiver: mpsc::UnboundedReceiver<OutboundItem<H>>,
}

impl<H: Clone + Send + Sync + 'static> Drain<H> {
    /// Run the drain on its own task.
    pub fn spawn<T>(self, transport: T, close: CancellationToken) -> JoinHandle<DrainReport>
    where
        T: TransportAdapter<Handle = H> + 'static,
    {
        let span = self.base.span().clone();
        tokio::spawn(self.run(transport, close).instrument(span))
    }

    /// Write queued messages until every producer is gone or `close` fires,
    /// then tear the transport down.
    ///
    /// Once `close` fires no new message is accepted, but everything queued
    /// before that is still written. A write in flight always completes.
    pub async fn run<T>(mut self, transport: T, close: CancellationToken) -> DrainReport
    where
        T: TransportAdapter<Handle = H>,
    {
        let mut report = DrainReport::default();
        let mut closing = false;
        tracing::debug!(task = %self.base, "outbound queue started");

        loop {
            let item = tokio::select! {
                biased;
                () = close.cancelled(), if !closing => {
                    closing = true;
                    self.receiver.close();
                    tracing::debug!(
                        task = %self.base,
                        pending = self.receiver.len(),
                        "closing outbound queue"
                    );
                    continue;
                }
                item = self.receiver.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let frame = match Frame::new(&item.payload) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(
                        hub = %item.hub,
                        kind = %item.kind,
                        error = %err,
                        "dropping outbound message"
                    );
                    report.skipped += 1;
                    continue;
                }
            };

            tracing::trace!(hub = %item.hub, kind = %item.kind, len = frame.len(), "write");
            match transport.write(&item.handle, frame.as_bytes()).await {
                Ok(()) => report.written += 1,
                Err(err) => {
                    tracing::warn!(
                        hub = %item.hub,
                        kind = %item.kind,
                        error = %err,
                        "write failed"
                    );
                    report.skipped += 1;
                }
            }
        }

        tracing::info!(task = %self.base, "terminating outbound queue and disconnecting");
        match transport.teardown().await {
            Ok(()) => report.torn_down = true,
            Err(err) => tracing::warn!(error = %err, "transport teardown failed"),
        }
        report
    }
}
