//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the orchestration core and the outside
//! world: the BLE radio on one side, the byte-level protocol on the other.

pub mod codec;
pub mod transport;

pub use codec::MessageCodec;
pub use transport::{NotificationCallback, TransportAdapter};
