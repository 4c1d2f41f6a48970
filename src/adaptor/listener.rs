//! Property listeners: push changed values to the device, pausing an
//! acquisition in progress while the device is reconfigured.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use crate::adaptor::timestamp::timestamp_getter;
use crate::adaptor::DemoAdaptor;
use crate::engine::props::{EnginePropListener, PostSetListener, SELECTED_SOURCE_NAME};
use crate::engine::{Engine, EnginePropContainer, PropContainer, PropInfo, PropKind, PropValue};
use crate::error::{Result, WARNID_CONFIGURING_PROPERTY};
use crate::hardware::{TIMESTAMP_INTEGER, TIMESTAMP_STRING};

/// A property value decoded by its declared storage kind.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceSetting {
    Double(f64),
    Int(i64),
    Text(String),
}

impl DeviceSetting {
    /// # Panics
    ///
    /// Panics when the property is declared with a kind other than double,
    /// integer or text, or when `value` does not match the declared kind.
    /// The demo device declares no other kinds.
    pub fn decode(info: &PropInfo, value: &PropValue) -> Self {
        match (info.kind, value) {
            (PropKind::Double, PropValue::Double(v)) => Self::Double(*v),
            (PropKind::Int, PropValue::Int(v)) => Self::Int(*v),
            (PropKind::Text, PropValue::Text(v)) => Self::Text(v.clone()),
            (kind, value) => panic!(
                "unhandled storage kind {kind:?} for property {} (value {value:?})",
                info.name
            ),
        }
    }
}

/// Attach the device's callbacks to the host property containers.
///
/// Timestamp properties are answered by the wall-clock getter. Other
/// device-specific properties get a post-set listener.
pub(crate) fn register_listeners(engine: &dyn Engine, adaptor: &Weak<DemoAdaptor>) {
    let source = Weak::clone(adaptor);
    let on_source: EnginePropListener = Arc::new(move |source_id| match source.upgrade() {
        Some(adaptor) => adaptor.on_source_changed(source_id),
        None => Ok(()),
    });
    engine
        .engine_props()
        .add_listener(SELECTED_SOURCE_NAME, on_source);

    let props = engine.adaptor_props();
    for name in props.prop_names() {
        if name == TIMESTAMP_STRING || name == TIMESTAMP_INTEGER {
            props.set_custom_get_fcn(&name, timestamp_getter());
            continue;
        }

        let Some(info) = props.prop_info(&name) else {
            continue;
        };
        if !info.device_specific {
            continue;
        }

        let owner = Weak::clone(adaptor);
        let listener: PostSetListener = Arc::new(move |info, value| match owner.upgrade() {
            Some(adaptor) => adaptor.on_property_changed(info, value),
            None => Ok(()),
        });
        props.add_listener(&name, listener);
        debug!(property = %name, "listener registered");
    }
}

impl DemoAdaptor {
    /// Post-set handler for device-specific properties.
    ///
    /// The value is remembered; it reaches the device only once the device
    /// is open. Changing a property while acquiring stops the acquisition,
    /// applies the value and restarts. The restart notifies every listener
    /// again, which applies directly since the device is stopped by then.
    pub fn on_property_changed(&self, info: &PropInfo, value: &PropValue) -> Result<()> {
        let setting = DeviceSetting::decode(info, value);
        self.pending
            .lock()
            .insert(info.name.clone(), setting.clone());

        if !self.is_open() {
            return Ok(());
        }
        self.reconfigure(&info.name, |adaptor| adaptor.apply_setting(&info.name, setting))
    }

    /// Listener for the engine's selected source, with the same contract
    /// as [`on_property_changed`](Self::on_property_changed).
    pub fn on_source_changed(&self, source_id: i64) -> Result<()> {
        self.requested_source.store(source_id, Ordering::SeqCst);

        if !self.is_open() {
            return Ok(());
        }
        self.reconfigure(SELECTED_SOURCE_NAME, |adaptor| adaptor.apply_source(source_id))
    }

    fn reconfigure(&self, name: &str, apply: impl FnOnce(&Self)) -> Result<()> {
        let _control = self.control.lock();
        let was_acquiring = self.is_acquiring();
        if was_acquiring {
            info!(property = name, "pausing acquisition to reconfigure device");
            self.stop()?;
        }

        apply(self);

        if was_acquiring && !self.restart()? {
            warn!(property = name, "acquisition did not resume");
            self.engine().report_warning(
                WARNID_CONFIGURING_PROPERTY,
                &format!("Acquisition did not resume after configuring {name}."),
            );
        }
        Ok(())
    }

    pub(crate) fn apply_setting(&self, name: &str, setting: DeviceSetting) {
        let _driver = self.capture.state().lock_driver();
        debug!(property = name, value = ?setting, "configuring device property");
        self.registers.lock().insert(name.to_string(), setting);
    }

    pub(crate) fn apply_source(&self, source_id: i64) {
        let _driver = self.capture.state().lock_driver();
        let previous = self.selected_source.swap(source_id, Ordering::SeqCst);
        if previous != source_id {
            debug!(previous, source_id, "video source selected");
        }
    }
}
