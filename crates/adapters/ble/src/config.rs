//! BLE transport configuration.

use serde::Deserialize;

/// Which backend drives the radio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Await every radio call on the caller's task.
    #[default]
    Inline,
    /// Hand every radio call to one background driver task.
    Queued,
}

/// Configuration for the BLE transport.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    pub backend: BackendKind,
    /// Index of the host adapter to use when several are present.
    pub adapter_index: usize,
    /// Use acknowledged writes instead of write-without-response.
    pub write_with_response: bool,
}
