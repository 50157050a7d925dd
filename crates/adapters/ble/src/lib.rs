//! # brickhub-adapter-ble
//!
//! BLE adapter: implements the [`TransportAdapter`] port on top of
//! `btleplug`.
//!
//! ## Backends
//!
//! | Backend | Where radio calls run | Teardown |
//! |---------|-----------------------|----------|
//! | [`BtleplugTransport`] | on the caller's task | disconnects every connected hub |
//! | [`QueuedTransport`] | on one driver task, via a request channel | quit request, then the inner teardown |
//!
//! [`BleBackend`] picks one from [`BleConfig`]. Callers cannot tell them
//! apart.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `brickhub-app` and `brickhub-domain`.
//!
//! [`TransportAdapter`]: brickhub_app::ports::TransportAdapter

mod backend;
mod config;
mod error;
mod inline;
mod queued;

pub use backend::BleBackend;
pub use config::{BackendKind, BleConfig};
pub use error::BleError;
pub use inline::{BleHandle, BtleplugTransport};
pub use queued::QueuedTransport;
