use std::time::Duration;

use thiserror::Error;

use crate::protocol::LedType;

/// Errors surfaced by the library.
///
/// Argument problems are reported synchronously, before anything reaches the
/// socket. Transport problems are absorbed by the bridge's serializer and
/// keep-alive tasks and only show up as a change of [`SessionState`]; the
/// [`Error::Transport`] and [`Error::SessionTimeout`] variants are returned
/// by bridge construction and used internally to drive reconnects.
///
/// [`SessionState`]: crate::bridge::SessionState
#[derive(Debug, Error)]
pub enum Error {
    #[error("{name} must be a decimal percentage within 0.0-1.0, got {value}")]
    OutOfRange { name: &'static str, value: f64 },

    #[error("zone {zone} is outside 1..={max}")]
    InvalidZone { zone: u8, max: u8 },

    #[error("bridge version {0} is not supported")]
    UnsupportedVersion(u8),

    #[error("there is no command set for bridge version {version} and LED type {led_type}")]
    UnsupportedLedType { version: u8, led_type: LedType },

    #[error("{operation} is not supported by {led_type} groups")]
    Unsupported {
        operation: &'static str,
        led_type: LedType,
    },

    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("bridge did not answer within {0:?}")]
    SessionTimeout(Duration),

    #[error("bridge is closed")]
    Closed,

    #[error("pipeline callback failed: {0}")]
    Callback(anyhow::Error),
}

impl Error {
    /// True for every error raised while validating caller input.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Error::OutOfRange { .. }
                | Error::InvalidZone { .. }
                | Error::UnsupportedVersion(_)
                | Error::UnsupportedLedType { .. }
                | Error::Unsupported { .. }
                | Error::InvalidPipeline(_)
                | Error::InvalidArgument(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Reject values outside the decimal percentage range.
pub(crate) fn check_unit(name: &'static str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::OutOfRange { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_unit_bounds() {
        assert_eq!(check_unit("brightness", 0.0).unwrap(), 0.0);
        assert_eq!(check_unit("brightness", 1.0).unwrap(), 1.0);
        assert!(check_unit("brightness", -0.01).is_err());
        assert!(check_unit("brightness", 1.01).is_err());
        assert!(check_unit("brightness", f64::NAN).is_err());
    }

    #[test]
    fn test_invalid_argument_class() {
        let err = check_unit("hue", 2.0).unwrap_err();
        assert!(err.is_invalid_argument());
        assert!(!Error::Closed.is_invalid_argument());
        assert!(!Error::SessionTimeout(Duration::from_secs(1)).is_invalid_argument());
    }
}
