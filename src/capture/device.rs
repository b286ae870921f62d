use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::frame::FramePair;

/// Failure category reported by a device binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    InvalidValue,
    WrongApiCallSequence,
    NotImplemented,
    Io,
    Memory,
    Unsupported,
    Unknown,
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidValue => "invalid value",
            Self::WrongApiCallSequence => "wrong API call sequence",
            Self::NotImplemented => "not implemented",
            Self::Io => "I/O",
            Self::Memory => "memory",
            Self::Unsupported => "unsupported operation",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Structured, unrecoverable error raised by the sensor device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Function: {name}\nArguments: {args}\nMessage: {message}\nType: {kind}")]
pub struct DeviceError {
    pub name: String,
    pub args: String,
    pub message: String,
    pub kind: DeviceErrorKind,
}

impl DeviceError {
    pub fn new(
        name: impl Into<String>,
        args: impl Into<String>,
        message: impl Into<String>,
        kind: DeviceErrorKind,
    ) -> Self {
        Self {
            name: name.into(),
            args: args.into(),
            message: message.into(),
            kind,
        }
    }
}

/// Source of synchronised colour/depth frame pairs.
pub trait DeviceService {
    /// Block up to `timeout` for the next complete pair.
    ///
    /// `Ok(None)` means nothing arrived in time; errors are fatal.
    fn blocking_acquire(&mut self, timeout: Duration) -> Result<Option<FramePair>, DeviceError>;
}

impl<D: DeviceService + ?Sized> DeviceService for Box<D> {
    fn blocking_acquire(&mut self, timeout: Duration) -> Result<Option<FramePair>, DeviceError> {
        (**self).blocking_acquire(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_every_field() {
        let err = DeviceError::new(
            "waitForFrames",
            "timeout=100",
            "device disconnected",
            DeviceErrorKind::Io,
        );
        assert_eq!(
            err.to_string(),
            "Function: waitForFrames\nArguments: timeout=100\nMessage: device disconnected\nType: I/O"
        );
    }
}
