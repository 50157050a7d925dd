//! # brickhub-domain
//!
//! Pure domain model for driving LEGO Powered Up / Boost / Duplo / Control+
//! hubs over Bluetooth Low Energy.
//!
//! ## Responsibilities
//! - Foundational types: task identifiers, error taxonomy
//! - Define **Frames** (length-prefixed protocol messages, capped at 254 payload bytes)
//! - Define **Hub kinds** and the hub lifecycle state machine
//! - Define **Peripheral declarations** (type, name, port, capabilities)
//! - Define **Decoded events** (what the codec produces from inbound bytes)
//! - Contain all invariant enforcement that needs no IO
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod capability;
pub mod device;
pub mod event;
pub mod frame;
pub mod hub;
pub mod peripheral;
pub mod port;
