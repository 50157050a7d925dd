//! BLE adapter error types.

use brickhub_domain::error::BrickError;

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// A radio call was made before `power_on`.
    #[error("BLE adapter is not powered on")]
    NotPoweredOn,

    /// The radio stack reported a failure.
    #[error("BLE operation failed")]
    Btle(#[from] btleplug::Error),

    /// Connect was asked for a device the last scan did not report.
    #[error("device {0} was not seen during the scan")]
    UnknownDevice(String),

    /// The connected device lacks the expected characteristic.
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound { uuid: uuid::Uuid },

    /// The driver task of the queued backend has stopped.
    #[error("BLE driver task is gone")]
    DriverGone,
}

impl BleError {
    /// Convert into a [`BrickError::Transport`] for propagation across port
    /// boundaries.
    #[must_use]
    pub fn into_domain(self) -> BrickError {
        BrickError::Transport(Box::new(self))
    }
}

impl From<BleError> for BrickError {
    fn from(err: BleError) -> Self {
        err.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_not_available_error() {
        let err = BleError::NotAvailable;
        assert_eq!(err.to_string(), "no BLE adapter available");
    }

    #[test]
    fn should_display_missing_characteristic() {
        let uuid = brickhub_domain::hub::LWP3_CHARACTERISTIC_UUID;
        let err = BleError::CharacteristicNotFound { uuid };
        assert_eq!(
            err.to_string(),
            "characteristic 00001624-1212-efde-1623-785feabcd123 not found"
        );
    }

    #[test]
    fn should_convert_btleplug_error_to_transport_error() {
        let err: BrickError = BleError::Btle(btleplug::Error::DeviceNotFound).into();
        assert!(matches!(err, BrickError::Transport(_)));
    }

    #[test]
    fn should_convert_driver_gone_to_transport_error() {
        let err: BrickError = BleError::DriverGone.into();
        assert!(matches!(err, BrickError::Transport(_)));
    }
}
