//! Lifecycle orchestrator: the one process-wide run.
//!
//! ```text
//! Init → UserSetup → ConnectAll → RunAll → Draining → DisconnectAll → Terminated
//! ```
//!
//! Hubs are connected one after another, in registration order, and only
//! once all of them are connected do their control routines start. The
//! cleanup phases always run, whether the run ended normally, failed, or
//! was cancelled.
//!
//! Cancelled routines are not dropped: they observe their token and get a
//! grace period to send their last commands. The outbound queue is closed
//! only once every routine has returned, and it flushes what is queued
//! before the transport is torn down.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use brickhub_domain::error::BrickError;
use brickhub_domain::hub::HubState;

use crate::connection::{ConnectConfig, Connection, ConnectionManager};
use crate::hub::{Hub, SetupContext};
use crate::ports::{MessageCodec, TransportAdapter};
use crate::queue::OutboundQueue;

/// Where the run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    UserSetup,
    ConnectAll,
    RunAll,
    Draining,
    DisconnectAll,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::UserSetup => "user_setup",
            Self::ConnectAll => "connect_all",
            Self::RunAll => "run_all",
            Self::Draining => "draining",
            Self::DisconnectAll => "disconnect_all",
            Self::Terminated => "terminated",
        })
    }
}

/// Outcome of a run that got as far as starting hub routines.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Hubs whose routine returned `Ok`.
    pub completed: Vec<String>,
    /// Hubs whose routine failed, with the error.
    pub failed: Vec<(String, BrickError)>,
    /// Whether the run was cut short by cancellation.
    pub cancelled: bool,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// How long cancelled routines may keep running before they are aborted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

type Routines = JoinSet<Result<(), BrickError>>;

type HubConnection<T> = (
    Arc<Hub>,
    Connection<<T as TransportAdapter>::Device, <T as TransportAdapter>::Handle>,
);

/// Drives every registered hub through its lifecycle.
pub struct Orchestrator<T> {
    transport: T,
    codec: Arc<dyn MessageCodec>,
    config: ConnectConfig,
    cancel: CancellationToken,
    grace: Duration,
    phase: Phase,
}

impl<T> Orchestrator<T>
where
    T: TransportAdapter + Clone + 'static,
{
    pub fn new(transport: T, codec: Arc<dyn MessageCodec>) -> Self {
        Self {
            transport,
            codec,
            config: ConnectConfig::default(),
            cancel: CancellationToken::new(),
            grace: DEFAULT_GRACE_PERIOD,
            phase: Phase::Init,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ConnectConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `cancel` as the root token. Cancelling it stops the run and goes
    /// straight to cleanup.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// How long cancelled routines may keep running before they are
    /// aborted.
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run `setup`, connect every hub it created, run them to completion and
    /// clean up.
    ///
    /// # Errors
    ///
    /// Errors from setup or while connecting are returned once cleanup is
    /// done. Failed hub routines do not fail the run; they are listed in the
    /// returned [`RunReport`]. Cancellation is a normal outcome.
    pub async fn run<F, Fut>(mut self, setup: F) -> Result<RunReport, BrickError>
    where
        F: FnOnce(SetupContext) -> Fut,
        Fut: Future<Output = Result<(), BrickError>>,
    {
        let context = SetupContext::new(Arc::clone(&self.codec));
        let (queue, drain) = OutboundQueue::channel(context.bus());
        let close = CancellationToken::new();
        let drain = drain.spawn(self.transport.clone(), close.clone());
        let routers = self.cancel.child_token();

        let mut report = RunReport::default();
        let mut connections = Vec::new();
        let outcome = self
            .start(setup, &context, &queue, &routers, &mut connections, &mut report)
            .await;

        self.enter(Phase::Draining);
        drop(queue);
        close.cancel();
        let torn_down = match drain.await {
            Ok(drained) => {
                tracing::debug!(
                    written = drained.written,
                    skipped = drained.skipped,
                    "outbound queue drained"
                );
                drained.torn_down
            }
            Err(err) => {
                tracing::error!(error = %err, "outbound queue task failed");
                false
            }
        };

        self.enter(Phase::DisconnectAll);
        self.disconnect_all(&context, &connections).await;
        routers.cancel();
        if !torn_down && let Err(err) = self.transport.teardown().await {
            tracing::warn!(error = %err, "transport teardown failed");
        }

        self.enter(Phase::Terminated);
        match outcome {
            Ok(()) => Ok(report),
            Err(err) if err.is_cancelled() => {
                report.cancelled = true;
                Ok(report)
            }
            Err(err) => Err(err),
        }
    }

    async fn start<F, Fut>(
        &mut self,
        setup: F,
        context: &SetupContext,
        queue: &OutboundQueue<T::Handle>,
        routers: &CancellationToken,
        connections: &mut Vec<HubConnection<T>>,
        report: &mut RunReport,
    ) -> Result<(), BrickError>
    where
        F: FnOnce(SetupContext) -> Fut,
        Fut: Future<Output = Result<(), BrickError>>,
    {
        self.transport.power_on().await?;

        self.enter(Phase::UserSetup);
        setup(context.clone()).await?;
        context.registry().seal();
        let hubs = context.registry().hubs();
        tracing::info!(count = hubs.len(), "hubs declared");

        self.enter(Phase::ConnectAll);
        let manager = ConnectionManager::new(self.transport.clone(), self.config);
        for hub in &hubs {
            if self.cancel.is_cancelled() {
                return Err(BrickError::Cancelled);
            }
            let connection = manager
                .connect(hub, queue, context.registry(), routers)
                .await?;
            connections.push((Arc::clone(hub), connection));
        }

        self.enter(Phase::RunAll);
        self.run_all(&hubs, report).await
    }

    async fn run_all(&self, hubs: &[Arc<Hub>], report: &mut RunReport) -> Result<(), BrickError> {
        let mut routines = JoinSet::new();
        let mut names = HashMap::with_capacity(hubs.len());

        for hub in hubs {
            hub.transition(HubState::Running)?;
            let routine = hub.run(self.cancel.child_token());
            let handle = routines.spawn(routine.instrument(hub.base().span().clone()));
            names.insert(handle.id(), hub.name().to_owned());
        }

        let finished = tokio::select! {
            () = collect(&mut routines, &mut names, report) => true,
            () = self.cancel.cancelled() => false,
        };
        if !finished {
            tracing::info!(
                pending = routines.len(),
                grace = ?self.grace,
                "waiting for hub routines to stop"
            );
            let stopped =
                tokio::time::timeout(self.grace, collect(&mut routines, &mut names, report)).await;
            if stopped.is_err() {
                tracing::warn!(
                    pending = routines.len(),
                    "aborting hub routines after grace period"
                );
                routines.abort_all();
                collect(&mut routines, &mut names, report).await;
            }
        }

        if self.cancel.is_cancelled() {
            report.cancelled = true;
        }
        Ok(())
    }

    async fn disconnect_all(&self, context: &SetupContext, connections: &[HubConnection<T>]) {
        for (hub, connection) in connections {
            tracing::info!(hub = %hub, address = %connection.address, "disconnecting");
            if let Err(err) = self.transport.disconnect(&connection.device).await {
                tracing::warn!(hub = %hub, error = %err, "disconnect failed");
            }
        }

        for hub in context.registry().hubs() {
            for peripheral in hub.peripherals() {
                tracing::debug!(
                    hub = %hub,
                    peripheral = %peripheral,
                    port = %peripheral.port(),
                    kind = %peripheral.kind(),
                    attached = peripheral.is_attached(),
                    "port summary"
                );
            }
            if hub.state() != HubState::Finished
                && let Err(err) = hub.transition(HubState::Finished)
            {
                tracing::warn!(hub = %hub, error = %err, "unable to finish hub");
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = %self.phase, to = %phase, "lifecycle phase");
        self.phase = phase;
    }
}

/// Record every routine that finishes until none is left.
async fn collect(
    routines: &mut Routines,
    names: &mut HashMap<task::Id, String>,
    report: &mut RunReport,
) {
    while let Some(joined) = routines.join_next_with_id().await {
        let id = match &joined {
            Ok((id, _)) => *id,
            Err(err) => err.id(),
        };
        let name = names.remove(&id).unwrap_or_default();
        let result = match joined {
            Ok((_, result)) => result,
            Err(err) if err.is_cancelled() => Err(BrickError::Cancelled),
            Err(err) => Err(BrickError::control(name.as_str(), err)),
        };

        match result {
            Ok(()) => {
                tracing::info!(hub = %name, "hub routine completed");
                report.completed.push(name);
            }
            Err(err) if err.is_cancelled() => {
                tracing::info!(hub = %name, "hub routine cancelled");
                report.cancelled = true;
            }
            Err(err) => {
                tracing::error!(hub = %name, error = %err, "hub routine failed");
                report.failed.push((name, err));
            }
        }
    }
}
