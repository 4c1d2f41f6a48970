//! Catalog of the demo devices: their formats, properties, video sources and
//! hardware trigger configurations.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::capture::FrameType;
use crate::engine::props::{PropInfo, PropValue, PropertyStore};
use crate::error::{AdaptorError, Result};

pub const DRIVER_DESCRIPTION: &str = "Demo Device Driver";
pub const DRIVER_VERSION: &str = "Version 1.0 (Beta 1)";

pub const RGB_DEVICE_ID: u32 = 1;
pub const MONOCHROME_DEVICE_ID: u32 = 2;
pub const DIGITAL_DEVICE_ID: u32 = 3;

pub const SYNC_INPUT: &str = "SyncInput";
pub const FRAME_RATE: &str = "FrameRate";
pub const HUE: &str = "Hue";
pub const SATURATION: &str = "Saturation";
pub const EXPERIMENT_SETUP: &str = "ExperimentSetup";
pub const BRIGHTNESS: &str = "Brightness";
pub const CONTRAST: &str = "Contrast";
pub const SHARPNESS: &str = "Sharpness";

/// Properties answered by the timestamp getter instead of stored state.
pub const TIMESTAMP_STRING: &str = "TimestampString";
pub const TIMESTAMP_INTEGER: &str = "TimestampInteger";

/// Frame geometry used when a format name does not resolve, e.g. when the
/// device was configured from a camera file.
pub const DEFAULT_FORMAT: DeviceFormatDescriptor = DeviceFormatDescriptor {
    width: 640,
    height: 480,
    bands: 3,
    frame_type: FrameType::Rgb24Packed,
};

/// Geometry and layout of one video format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFormatDescriptor {
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub frame_type: FrameType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatEntry {
    pub id: u32,
    pub name: &'static str,
    pub descriptor: DeviceFormatDescriptor,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: u32,
    pub name: &'static str,
    /// Whether the device accepts a camera configuration file in place of a
    /// fixed format.
    pub device_file_support: bool,
    pub formats: Vec<FormatEntry>,
}

impl DeviceInfo {
    pub fn format(&self, name: &str) -> Option<&FormatEntry> {
        self.formats.iter().find(|f| f.name == name)
    }

    pub fn default_format(&self) -> Option<&FormatEntry> {
        self.formats.iter().find(|f| f.is_default)
    }

    /// The descriptor for `format_name`, or [`DEFAULT_FORMAT`] when the name
    /// is not one of the device's fixed formats.
    pub fn resolve_format(&self, format_name: &str) -> DeviceFormatDescriptor {
        match self.format(format_name) {
            Some(entry) => entry.descriptor,
            None => {
                info!(
                    device = self.name,
                    format = format_name,
                    "format not in catalog, using default geometry"
                );
                DEFAULT_FORMAT
            }
        }
    }
}

/// A hardware trigger the device can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerConfig {
    pub condition: &'static str,
    pub condition_id: u32,
    pub source: &'static str,
    pub source_id: u32,
}

/// Everything a device declares when an adaptor is created for it.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceAttributes {
    pub properties: Vec<PropInfo>,
    pub sources: Vec<(&'static str, i64)>,
    pub triggers: Vec<TriggerConfig>,
}

fn format(
    id: u32,
    name: &'static str,
    width: u32,
    height: u32,
    frame_type: FrameType,
    is_default: bool,
) -> FormatEntry {
    FormatEntry {
        id,
        name,
        descriptor: DeviceFormatDescriptor {
            width,
            height,
            bands: frame_type.bands(),
            frame_type,
        },
        is_default,
    }
}

/// All devices the demo driver exposes.
pub fn available_hardware() -> Vec<DeviceInfo> {
    vec![
        DeviceInfo {
            id: RGB_DEVICE_ID,
            name: "Color Device",
            device_file_support: false,
            formats: vec![
                format(0, "RGB_NTSC", 640, 480, FrameType::Rgb24Packed, true),
                format(1, "S-Video", 160, 120, FrameType::Rgb24Packed, false),
            ],
        },
        DeviceInfo {
            id: MONOCHROME_DEVICE_ID,
            name: "Monochrome Device",
            device_file_support: false,
            formats: vec![
                format(0, "RS170", 640, 480, FrameType::Mono8, true),
                format(1, "CCIR", 768, 576, FrameType::Mono8, false),
            ],
        },
        DeviceInfo {
            id: DIGITAL_DEVICE_ID,
            name: "Digital Device",
            device_file_support: true,
            formats: Vec::new(),
        },
    ]
}

pub fn find_device(id: u32) -> Result<DeviceInfo> {
    available_hardware()
        .into_iter()
        .find(|d| d.id == id)
        .ok_or(AdaptorError::DeviceNotFound(id))
}

const INPUT_SOURCES: [(&str, i64); 6] = [
    ("input1", 1),
    ("input2", 2),
    ("input3", 3),
    ("input4", 4),
    ("input5", 5),
    ("input6", 6),
];

/// Properties, sources and triggers of device `id`.
///
/// Enumerated properties are declared by their integer identifier; the
/// first enumeration entry is the default.
pub fn device_attributes(id: u32) -> Result<DeviceAttributes> {
    match id {
        RGB_DEVICE_ID => Ok(DeviceAttributes {
            properties: vec![
                PropInfo::new(SYNC_INPUT, PropValue::Int(1)),
                PropInfo::new(FRAME_RATE, PropValue::Int(1)),
                PropInfo::new(HUE, PropValue::Double(0.5)),
                PropInfo::new(SATURATION, PropValue::Int(50)),
                PropInfo::new(
                    EXPERIMENT_SETUP,
                    PropValue::Text("Default Lab Setup".to_string()),
                ),
                PropInfo::new(TIMESTAMP_STRING, PropValue::Text(String::new())),
                PropInfo::new(TIMESTAMP_INTEGER, PropValue::Int(0)),
            ],
            sources: INPUT_SOURCES[..1].to_vec(),
            triggers: Vec::new(),
        }),
        MONOCHROME_DEVICE_ID => {
            let mut triggers = Vec::new();
            for (source, source_id) in [("TTL", 1), ("OptoTrig", 2)] {
                for (condition, condition_id) in [("risingEdge", 2), ("fallingEdge", 1)] {
                    triggers.push(TriggerConfig {
                        condition,
                        condition_id,
                        source,
                        source_id,
                    });
                }
            }
            Ok(DeviceAttributes {
                properties: vec![
                    PropInfo::new(FRAME_RATE, PropValue::Int(1)),
                    PropInfo::new(BRIGHTNESS, PropValue::Int(128)),
                    PropInfo::new(CONTRAST, PropValue::Int(128)),
                    PropInfo::new(SHARPNESS, PropValue::Double(0.5)),
                ],
                sources: INPUT_SOURCES.to_vec(),
                triggers,
            })
        }
        DIGITAL_DEVICE_ID => Ok(DeviceAttributes {
            properties: Vec::new(),
            sources: INPUT_SOURCES[..1].to_vec(),
            triggers: Vec::new(),
        }),
        other => Err(AdaptorError::DeviceNotFound(other)),
    }
}

/// Declare a device's properties in `store`, numbering them in order.
pub fn register_attributes(store: &PropertyStore, attrs: &DeviceAttributes) {
    for (index, info) in attrs.properties.iter().enumerate() {
        store.declare(info.clone().with_identifier(index as u32 + 1));
    }
}
