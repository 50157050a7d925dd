//! # brickhub-app
//!
//! Orchestration core: **port definitions** plus everything that runs
//! between the radio and the user's hub code.
//!
//! ## Responsibilities
//! - Define **port traits** adapters implement:
//!   - `TransportAdapter`: scan, connect, write, notify, teardown
//!   - `MessageCodec`: command encoding, frame decoding
//! - Model hubs and peripherals as live units with their own signals
//! - Find and connect hubs (`ConnectionManager`), serialise every write
//!   through one FIFO (`OutboundQueue`), route notifications back to
//!   peripherals (`NotificationRouter`)
//! - Drive the whole run from setup to disconnect (`Orchestrator`)
//!
//! ## Dependency rule
//! Depends on `brickhub-domain` only (plus `tokio` for tasks, channels and
//! timers). Never imports adapter crates. Adapters depend on *this* crate,
//! not the reverse.

pub mod attach;
pub mod connection;
pub mod hub;
pub mod orchestrator;
pub mod peripheral;
pub mod ports;
pub mod queue;
pub mod registry;
pub mod router;
pub mod signal;
pub mod task;

#[cfg(test)]
mod testing;
