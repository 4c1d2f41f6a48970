//! Image acquisition adaptor kit.
//!
//! An adaptor turns a device into a stream of frames for a host engine. The
//! host owns frame delivery, property storage and the frame-subsetting
//! policy ([`engine::Engine`]); the adaptor owns the acquisition lifecycle
//! and the capture worker ([`adaptor::DemoAdaptor`]).

pub mod adaptor;
pub mod capture;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod pipeline;

use std::path::Path;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Prefix of environment variables overriding configuration keys, e.g.
/// `IMAQKIT__CAPTURE__PACING_MS=5`.
pub const ENV_PREFIX: &str = "IMAQKIT";

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub device_id: u32,
    /// Format name from the device catalog, or a camera file path.
    pub format: String,
    /// Wait between producing a frame and forwarding it.
    pub pacing_ms: u64,
    pub worker_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub frame_grab_interval: u32,
    pub frame_delay: u64,
    pub frames_per_trigger: Option<u64>,
    pub hardware_trigger: bool,
    /// Frames kept by the host before the oldest is dropped.
    pub ring_buffer_size: usize,
    /// Largest frame in bytes the host allocates; larger requests are refused.
    pub frame_memory_limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directives, used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: hardware::RGB_DEVICE_ID,
            format: "RGB_NTSC".to_string(),
            pacing_ms: 30, // ~33fps
            worker_name: "imaqkit-capture".to_string(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_grab_interval: 1,
            frame_delay: 0,
            frames_per_trigger: None,
            hardware_trigger: false,
            ring_buffer_size: 8,
            frame_memory_limit: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "imaqkit=info".to_string(),
        }
    }
}

impl Config {
    /// Defaults, overlaid by the TOML file at `path` when it exists, then by
    /// `IMAQKIT__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
