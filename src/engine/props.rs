//! Property containers owned by the host.
//!
//! The adaptor only observes host property storage: it registers post-set
//! listeners and custom getters and reads values back. [`PropertyStore`] and
//! [`EngineProps`] are in-memory containers used by [`HostEngine`].
//!
//! Listeners and getters are always invoked with no container lock held, so
//! a callback may read the container or drive the adaptor (which in turn
//! notifies listeners again) without deadlocking.
//!
//! [`HostEngine`]: crate::engine::HostEngine

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{AdaptorError, Result};

/// Name of the engine property carrying the selected video source id.
pub const SELECTED_SOURCE_NAME: &str = "SelectedSourceName";

/// Storage kind of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropKind {
    Double,
    Int,
    Text,
    DoubleArray,
    IntArray,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Double(f64),
    Int(i64),
    Text(String),
    DoubleArray(Vec<f64>),
    IntArray(Vec<i64>),
}

impl PropValue {
    pub fn kind(&self) -> PropKind {
        match self {
            PropValue::Double(_) => PropKind::Double,
            PropValue::Int(_) => PropKind::Int,
            PropValue::Text(_) => PropKind::Text,
            PropValue::DoubleArray(_) => PropKind::DoubleArray,
            PropValue::IntArray(_) => PropKind::IntArray,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Description of one declared property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropInfo {
    pub name: String,
    pub kind: PropKind,
    pub default: PropValue,
    pub identifier: u32,
    /// `false` for engine-generic properties such as `Tag`, which carry no
    /// device listener.
    pub device_specific: bool,
}

impl PropInfo {
    /// A device-specific property whose kind follows its default value.
    pub fn new(name: impl Into<String>, default: PropValue) -> Self {
        Self {
            name: name.into(),
            kind: default.kind(),
            default,
            identifier: 0,
            device_specific: true,
        }
    }

    pub fn with_identifier(mut self, identifier: u32) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn generic(mut self) -> Self {
        self.device_specific = false;
        self
    }
}

/// Called after a property value was stored.
pub type PostSetListener = Arc<dyn Fn(&PropInfo, &PropValue) -> Result<()> + Send + Sync>;

/// Computes a property value on demand instead of reading stored state.
pub type CustomGetFcn = Arc<dyn Fn(&PropInfo) -> PropValue + Send + Sync>;

/// Called after an engine property changed, with its new integer value.
pub type EnginePropListener = Arc<dyn Fn(i64) -> Result<()> + Send + Sync>;

/// Device-specific property storage owned by the host.
pub trait PropContainer: Send + Sync {
    fn prop_names(&self) -> Vec<String>;

    fn prop_info(&self, name: &str) -> Option<PropInfo>;

    /// Current value, through the custom getter when one is registered.
    fn get_prop_value(&self, name: &str) -> Result<PropValue>;

    /// Store a value and notify the property's listeners.
    fn set_prop_value(&self, name: &str, value: PropValue) -> Result<()>;

    /// Returns `false` when no such property exists.
    fn add_listener(&self, name: &str, listener: PostSetListener) -> bool;

    /// Returns `false` when no such property exists.
    fn set_custom_get_fcn(&self, name: &str, getter: CustomGetFcn) -> bool;

    fn notify_listeners(&self, name: &str) -> Result<()>;

    /// Invoke every listener of every property with its current value.
    fn notify_all_listeners(&self) -> Result<()>;
}

/// Engine-level property storage (source selection and similar).
pub trait EnginePropContainer: Send + Sync {
    fn add_listener(&self, name: &str, listener: EnginePropListener) -> bool;

    fn get_int(&self, name: &str) -> Option<i64>;

    /// Store a value and notify the property's listeners.
    fn set_int(&self, name: &str, value: i64) -> Result<()>;
}

struct Entry {
    info: PropInfo,
    value: PropValue,
    listeners: Vec<PostSetListener>,
    getter: Option<CustomGetFcn>,
}

type Notification = (PropInfo, PropValue, Vec<PostSetListener>);

/// In-memory [`PropContainer`], kept in declaration order.
#[derive(Default)]
pub struct PropertyStore {
    entries: RwLock<Vec<Entry>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property holding its default value. Redeclaring a name
    /// replaces its description and value but keeps registered callbacks.
    pub fn declare(&self, info: PropInfo) {
        let mut entries = self.entries.write();
        let value = info.default.clone();
        match entries.iter_mut().find(|e| e.info.name == info.name) {
            Some(entry) => {
                entry.info = info;
                entry.value = value;
            }
            None => entries.push(Entry {
                info,
                value,
                listeners: Vec::new(),
                getter: None,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn snapshot(&self, name: Option<&str>) -> Vec<Notification> {
        self.entries
            .read()
            .iter()
            .filter(|e| name.is_none() || name == Some(e.info.name.as_str()))
            .filter(|e| !e.listeners.is_empty())
            .map(|e| (e.info.clone(), e.value.clone(), e.listeners.clone()))
            .collect()
    }
}

fn dispatch(notifications: Vec<Notification>) -> Result<()> {
    for (info, value, listeners) in notifications {
        trace!(property = %info.name, listeners = listeners.len(), "notifying listeners");
        for listener in listeners {
            listener(&info, &value)?;
        }
    }
    Ok(())
}

impl PropContainer for PropertyStore {
    fn prop_names(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|e| e.info.name.clone())
            .collect()
    }

    fn prop_info(&self, name: &str) -> Option<PropInfo> {
        self.entries
            .read()
            .iter()
            .find(|e| e.info.name == name)
            .map(|e| e.info.clone())
    }

    fn get_prop_value(&self, name: &str) -> Result<PropValue> {
        let (info, value, getter) = {
            let entries = self.entries.read();
            let entry = entries
                .iter()
                .find(|e| e.info.name == name)
                .ok_or_else(|| AdaptorError::UnknownProperty(name.to_string()))?;
            (entry.info.clone(), entry.value.clone(), entry.getter.clone())
        };

        Ok(match getter {
            Some(getter) => getter(&info),
            None => value,
        })
    }

    fn set_prop_value(&self, name: &str, value: PropValue) -> Result<()> {
        {
            let mut entries = self.entries.write();
            let entry = entries
                .iter_mut()
                .find(|e| e.info.name == name)
                .ok_or_else(|| AdaptorError::UnknownProperty(name.to_string()))?;
            if entry.info.kind != value.kind() {
                return Err(AdaptorError::PropertyType {
                    name: name.to_string(),
                    expected: entry.info.kind,
                });
            }
            entry.value = value;
        }
        self.notify_listeners(name)
    }

    fn add_listener(&self, name: &str, listener: PostSetListener) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.info.name == name) {
            Some(entry) => {
                entry.listeners.push(listener);
                true
            }
            None => false,
        }
    }

    fn set_custom_get_fcn(&self, name: &str, getter: CustomGetFcn) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.info.name == name) {
            Some(entry) => {
                entry.getter = Some(getter);
                true
            }
            None => false,
        }
    }

    fn notify_listeners(&self, name: &str) -> Result<()> {
        dispatch(self.snapshot(Some(name)))
    }

    fn notify_all_listeners(&self) -> Result<()> {
        dispatch(self.snapshot(None))
    }
}

struct EngineEntry {
    name: String,
    value: i64,
    listeners: Vec<EnginePropListener>,
}

/// In-memory [`EnginePropContainer`]. Starts with source id 1 selected.
pub struct EngineProps {
    entries: RwLock<Vec<EngineEntry>>,
}

impl EngineProps {
    pub fn new() -> Self {
        let props = Self {
            entries: RwLock::new(Vec::new()),
        };
        props.declare(SELECTED_SOURCE_NAME, 1);
        props
    }

    pub fn declare(&self, name: &str, value: i64) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.value = value,
            None => entries.push(EngineEntry {
                name: name.to_string(),
                value,
                listeners: Vec::new(),
            }),
        }
    }
}

impl Default for EngineProps {
    fn default() -> Self {
        Self::new()
    }
}

impl EnginePropContainer for EngineProps {
    fn add_listener(&self, name: &str, listener: EnginePropListener) -> bool {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.listeners.push(listener);
                true
            }
            None => false,
        }
    }

    fn get_int(&self, name: &str) -> Option<i64> {
        self.entries
            .read()
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value)
    }

    fn set_int(&self, name: &str, value: i64) -> Result<()> {
        let listeners = {
            let mut entries = self.entries.write();
            let entry = entries
                .iter_mut()
                .find(|e| e.name == name)
                .ok_or_else(|| AdaptorError::UnknownProperty(name.to_string()))?;
            entry.value = value;
            entry.listeners.clone()
        };
        for listener in listeners {
            listener(value)?;
        }
        Ok(())
    }
}
