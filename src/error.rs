//! Errors raised by the adaptor kit and the identifiers reported to the host.

use thiserror::Error;

use crate::engine::props::PropKind;

/// Result type used by fallible functions inside `imaqkit`.
pub type Result<T> = std::result::Result<T, AdaptorError>;

/// Error identifier and message reported when a frame buffer cannot be allocated.
pub const ERRID_BAD_FRAME_ALLOC: &str = "imaq:demo:badFrameAlloc";
pub const ERRMSG_BAD_FRAME_ALLOC: &str = "Unable to allocate memory for frame.";

/// Error identifier and message reported when a device id is not in the catalog.
pub const ERRID_DEVICE_NOT_FOUND: &str = "imaq:demo:devicenotfound";
pub const ERRMSG_DEVICE_NOT_FOUND: &str = "Unable to find the image acquisition device.";

/// Warning identifier used while a property is being pushed to the device.
pub const WARNID_CONFIGURING_PROPERTY: &str = "imaq:demo:configuringproperty";

pub const ERRID_INVALID_GEOMETRY: &str = "imaq:demo:invalidGeometry";
pub const ERRID_PROPERTY: &str = "imaq:demo:property";
pub const ERRID_WORKER: &str = "imaq:demo:worker";
pub const ERRID_CONFIG: &str = "imaq:demo:config";

#[derive(Error, Debug)]
pub enum AdaptorError {
    #[error("unable to allocate {bytes} bytes for frame")]
    OutOfMemory { bytes: usize },

    #[error("invalid frame geometry {width}x{height}x{bands}")]
    InvalidGeometry { width: u32, height: u32, bands: u32 },

    #[error("no image acquisition device with id {0}")]
    DeviceNotFound(u32),

    #[error("unknown property {0:?}")]
    UnknownProperty(String),

    #[error("property {name:?} stores {expected:?} values")]
    PropertyType { name: String, expected: PropKind },

    #[error("failed to spawn capture worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("capture worker panicked")]
    WorkerPanicked,

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl AdaptorError {
    /// The identifier passed to the host's error channel for this error.
    pub fn error_id(&self) -> &'static str {
        match self {
            Self::OutOfMemory { .. } => ERRID_BAD_FRAME_ALLOC,
            Self::InvalidGeometry { .. } => ERRID_INVALID_GEOMETRY,
            Self::DeviceNotFound(_) => ERRID_DEVICE_NOT_FOUND,
            Self::UnknownProperty(_) | Self::PropertyType { .. } => ERRID_PROPERTY,
            Self::WorkerSpawn(_) | Self::WorkerPanicked => ERRID_WORKER,
            Self::Config(_) => ERRID_CONFIG,
        }
    }

    /// The message passed to the host's error channel for this error.
    ///
    /// Catalog errors keep the fixed host wording; the rest use `Display`.
    pub fn host_message(&self) -> String {
        match self {
            Self::OutOfMemory { .. } => ERRMSG_BAD_FRAME_ALLOC.to_string(),
            Self::DeviceNotFound(_) => ERRMSG_DEVICE_NOT_FOUND.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_failure_uses_fixed_identifier() {
        let err = AdaptorError::OutOfMemory { bytes: 12 };
        assert_eq!(err.error_id(), "imaq:demo:badFrameAlloc");
        assert_eq!(err.host_message(), "Unable to allocate memory for frame.");
        assert_eq!(err.to_string(), "unable to allocate 12 bytes for frame");
    }

    #[test]
    fn device_not_found_uses_fixed_identifier() {
        let err = AdaptorError::DeviceNotFound(9);
        assert_eq!(err.error_id(), ERRID_DEVICE_NOT_FOUND);
        assert_eq!(err.host_message(), ERRMSG_DEVICE_NOT_FOUND);
    }
}
