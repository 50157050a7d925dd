//! Peripheral declarations: which sensor or motor sits on which port, and
//! what it can do.
//!
//! Declarations are plain data. The `app` crate turns them into live
//! peripherals wired onto a hub.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::error::{BrickError, ConfigurationError};
use crate::port::Port;

/// Peripheral families with their LWP3 device-type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeripheralKind {
    /// The hub's own push button.
    Button,
    /// The hub's RGB status light.
    Led,
    Motor,
    TrainMotor,
    ExternalMotor,
    InternalMotor,
    CPlusXlMotor,
    CPlusLargeAngularMotor,
    DuploTrainMotor,
    VisionSensor,
    ExternalMotionSensor,
    InternalTiltSensor,
    VoltageSensor,
    CurrentSensor,
    TemperatureSensor,
    DuploSpeedSensor,
}

impl PeripheralKind {
    /// Device type id reported in attach messages.
    #[must_use]
    pub fn device_type(self) -> u16 {
        match self {
            Self::Motor => 0x0001,
            Self::TrainMotor => 0x0002,
            Self::Button => 0x0005,
            Self::VoltageSensor => 0x0014,
            Self::CurrentSensor => 0x0015,
            Self::Led => 0x0017,
            Self::ExternalMotionSensor => 0x0023,
            Self::VisionSensor => 0x0025,
            Self::ExternalMotor => 0x0026,
            Self::InternalMotor => 0x0027,
            Self::InternalTiltSensor => 0x0028,
            Self::DuploTrainMotor => 0x0029,
            Self::DuploSpeedSensor => 0x002C,
            Self::CPlusXlMotor => 0x002F,
            Self::CPlusLargeAngularMotor => 0x0031,
            Self::TemperatureSensor => 0x003C,
        }
    }

    /// Port the peripheral lives on when the declaration does not name one.
    #[must_use]
    pub fn default_port(self) -> Option<Port> {
        match self {
            Self::Button => Some(Port::INTRINSIC),
            Self::Led => Some(Port::HUB_LED),
            _ => None,
        }
    }

    /// Hub-intrinsic peripherals never get a hardware attach message; a
    /// synthetic one is injected right after connect.
    #[must_use]
    pub fn is_intrinsic(self) -> bool {
        self.default_port().is_some_and(Port::is_intrinsic)
    }

    /// Sensor mode index for a sensing capability, if this kind knows it.
    #[must_use]
    pub fn mode_of(self, capability: &Capability) -> Option<u8> {
        let mode = match (self, capability.as_str()) {
            (
                Self::ExternalMotor
                | Self::InternalMotor
                | Self::CPlusXlMotor
                | Self::CPlusLargeAngularMotor,
                "sense_speed",
            ) => 1,
            (
                Self::ExternalMotor
                | Self::InternalMotor
                | Self::CPlusXlMotor
                | Self::CPlusLargeAngularMotor,
                "sense_pos",
            ) => 2,
            (Self::CPlusLargeAngularMotor, "sense_apos") => 3,
            (Self::VisionSensor, "sense_color") => 0,
            (Self::VisionSensor, "sense_distance") => 1,
            (Self::VisionSensor, "sense_count") => 2,
            (Self::VisionSensor, "sense_reflectivity") => 3,
            (Self::ExternalMotionSensor, "sense_distance") => 0,
            (Self::ExternalMotionSensor, "sense_count") => 1,
            (Self::InternalTiltSensor, "sense_angle") => 0,
            (Self::InternalTiltSensor, "sense_tilt") => 1,
            (
                Self::VoltageSensor | Self::CurrentSensor | Self::TemperatureSensor,
                "sense_l" | "sense_temp",
            ) => 0,
            (Self::DuploSpeedSensor, "sense_speed") => 0,
            (Self::DuploSpeedSensor, "sense_count") => 1,
            _ => return None,
        };
        Some(mode)
    }
}

impl fmt::Display for PeripheralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Declaration of one peripheral attached to a hub type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralSpec {
    pub kind: PeripheralKind,
    pub name: String,
    pub port: Port,
    pub capabilities: Vec<Capability>,
}

impl PeripheralSpec {
    /// Create a builder for constructing a [`PeripheralSpec`].
    #[must_use]
    pub fn builder(kind: PeripheralKind) -> PeripheralSpecBuilder {
        PeripheralSpecBuilder {
            kind,
            name: None,
            port: None,
            capabilities: Vec::new(),
        }
    }

    /// Sensing capabilities in declared order.
    pub fn sensing(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter().filter(|cap| cap.is_sensing())
    }

    #[must_use]
    pub fn has_sensing(&self) -> bool {
        self.sensing().next().is_some()
    }
}

/// Step-by-step builder for [`PeripheralSpec`].
#[derive(Debug)]
pub struct PeripheralSpecBuilder {
    kind: PeripheralKind,
    name: Option<String>,
    port: Option<Port>,
    capabilities: Vec<Capability>,
}

impl PeripheralSpecBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn port(mut self, number: u8) -> Self {
        self.port = Some(Port::new(number));
        self
    }

    #[must_use]
    pub fn capability(mut self, capability: impl Into<Capability>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Consume the builder, validate, and return a [`PeripheralSpec`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyName`] when no name was given and
    /// [`ConfigurationError::MissingPort`] when a hardware peripheral has no
    /// port.
    pub fn build(self) -> Result<PeripheralSpec, BrickError> {
        let name = self
            .name
            .filter(|name| !name.is_empty())
            .ok_or(ConfigurationError::EmptyName)?;
        let port = self
            .port
            .or_else(|| self.kind.default_port())
            .ok_or_else(|| ConfigurationError::MissingPort(name.clone()))?;

        Ok(PeripheralSpec {
            kind: self.kind,
            name,
            port,
            capabilities: self.capabilities,
        })
    }
}
