//! The demo adaptor: open/start/stop/close lifecycle around one capture
//! worker producing synthetic frames.

pub mod listener;
pub mod timestamp;

pub use listener::DeviceSetting;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info, warn};

use crate::capture::{CaptureContext, CaptureTask, FrameSource, FrameType, Roi, SyntheticSource};
use crate::engine::props::SELECTED_SOURCE_NAME;
use crate::engine::Engine;
use crate::error::Result;
use crate::hardware::{self, DeviceFormatDescriptor, DeviceInfo};
use crate::CaptureConfig;

/// Adaptor for one demo device.
///
/// The adaptor is `Closed` until [`open`](Self::open), acquires between
/// [`start`](Self::start) and [`stop`](Self::stop), and stops and closes
/// itself when dropped. Control calls may come from any thread, including
/// property listeners running on the host's setter thread; they are
/// serialized by one reentrant control lock. Frames are produced on a
/// dedicated worker thread.
pub struct DemoAdaptor {
    device: DeviceInfo,
    format_name: String,
    capture: Arc<CaptureContext>,
    worker_name: String,

    /// Held for the whole of start, stop, close and a listener's
    /// reconfiguration. Reentrant because a reconfiguration stops and
    /// restarts, and start notifies listeners.
    control: ReentrantMutex<()>,
    open: AtomicBool,
    worker: Mutex<Option<CaptureTask>>,

    /// Last value seen per property.
    pending: Mutex<BTreeMap<String, DeviceSetting>>,
    /// Values pushed to the device, written under the driver lock.
    registers: Mutex<BTreeMap<String, DeviceSetting>>,
    requested_source: AtomicI64,
    selected_source: AtomicI64,
}

impl DemoAdaptor {
    pub fn new(
        engine: Arc<dyn Engine>,
        device: &DeviceInfo,
        format_name: &str,
        config: &CaptureConfig,
    ) -> Arc<Self> {
        Self::with_source(engine, Arc::new(SyntheticSource), device, format_name, config)
    }

    /// Adaptor for the device named by `config.device_id`.
    pub fn from_config(engine: Arc<dyn Engine>, config: &CaptureConfig) -> Result<Arc<Self>> {
        let device = hardware::find_device(config.device_id)?;
        Ok(Self::new(engine, &device, &config.format, config))
    }

    /// Adaptor producing frames from `source`.
    ///
    /// Listeners are registered on the engine's property containers here,
    /// so device properties must already be declared.
    pub fn with_source(
        engine: Arc<dyn Engine>,
        source: Arc<dyn FrameSource>,
        device: &DeviceInfo,
        format_name: &str,
        config: &CaptureConfig,
    ) -> Arc<Self> {
        let format = device.resolve_format(format_name);
        let source_id = engine
            .engine_props()
            .get_int(SELECTED_SOURCE_NAME)
            .unwrap_or(1);
        let pacing = Duration::from_millis(config.pacing_ms);
        let capture = Arc::new(CaptureContext::new(engine, source, format, pacing));

        info!(
            device = device.name,
            format = format_name,
            width = format.width,
            height = format.height,
            bands = format.bands,
            "adaptor created"
        );

        Arc::new_cyclic(|this| {
            listener::register_listeners(capture.engine().as_ref(), this);
            Self {
                device: device.clone(),
                format_name: format_name.to_string(),
                capture,
                worker_name: config.worker_name.clone(),
                control: ReentrantMutex::new(()),
                open: AtomicBool::new(false),
                worker: Mutex::new(None),
                pending: Mutex::new(BTreeMap::new()),
                registers: Mutex::new(BTreeMap::new()),
                requested_source: AtomicI64::new(source_id),
                selected_source: AtomicI64::new(source_id),
            }
        })
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        self.capture.engine()
    }

    /// State shared with the capture worker.
    pub fn capture(&self) -> &Arc<CaptureContext> {
        &self.capture
    }

    /// Prepare the device. Opening an open device does nothing; the worker
    /// thread is only created by [`start`](Self::start).
    pub fn open(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            info!(device = self.device.name, "device opened");
        }
    }

    /// Begin acquiring.
    ///
    /// Returns `Ok(false)` when the device is not open, and `Ok(true)`
    /// without spawning anything when it is already acquiring. Every
    /// property listener is notified before the worker starts, so the
    /// device runs with the current configuration.
    pub fn start(&self) -> Result<bool> {
        let _control = self.control.lock();
        if !self.is_open() {
            debug!("start ignored, device not open");
            return Ok(false);
        }
        // A worker that has decided to exit clears the flag first, so a set
        // flag means the current worker has another cycle to run.
        if self.worker_finished() {
            self.reap_worker()?;
        }
        if self.is_acquiring() {
            debug!("start ignored, already acquiring");
            return Ok(true);
        }

        self.reap_worker()?;
        self.engine().adaptor_props().notify_all_listeners()?;
        self.apply_source(self.requested_source.load(Ordering::SeqCst));

        self.capture.state().set_active(true);
        let capture = Arc::clone(&self.capture);
        match CaptureTask::spawn(&self.worker_name, move |signal| capture.run(&signal)) {
            Ok(task) => {
                *self.worker.lock() = Some(task);
                info!(
                    device = self.device.name,
                    frame_count = self.frame_count(),
                    "acquisition started"
                );
                Ok(true)
            }
            Err(err) => {
                self.capture.state().set_active(false);
                Err(err)
            }
        }
    }

    /// Start again after a [`stop`](Self::stop).
    pub fn restart(&self) -> Result<bool> {
        let _control = self.control.lock();
        debug!("restarting acquisition");
        self.start()
    }

    /// End the acquisition and wait for the worker to exit.
    ///
    /// Once this returns no capture cycle is running or will run, even when
    /// another thread was stopping the same device at the same time.
    /// Stopping a device that is not acquiring does nothing.
    pub fn stop(&self) -> Result<()> {
        let _control = self.control.lock();
        if !self.is_acquiring() {
            return self.reap_worker();
        }

        self.capture.state().set_active(false);
        self.reap_worker()?;
        drop(self.capture.state().lock_driver());

        info!(frame_count = self.frame_count(), "acquisition stopped");
        Ok(())
    }

    /// Stop if acquiring, then release the device. Closing a closed device
    /// does nothing.
    pub fn close(&self) -> Result<()> {
        let _control = self.control.lock();
        let stopped = self.stop();
        if self.open.swap(false, Ordering::SeqCst) {
            info!(device = self.device.name, "device closed");
        }
        stopped
    }

    fn reap_worker(&self) -> Result<()> {
        let task = self.worker.lock().take();
        match task {
            Some(task) => {
                task.signal_stop();
                task.join()
            }
            None => Ok(()),
        }
    }

    fn worker_finished(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(CaptureTask::is_finished)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn is_acquiring(&self) -> bool {
        self.capture.state().is_active()
    }

    /// Whether a worker thread exists and has not returned yet.
    pub fn worker_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Whether a cycle currently holds the driver lock.
    pub fn is_driver_busy(&self) -> bool {
        self.capture.state().is_driver_busy()
    }

    /// Frames produced so far, whether or not they were forwarded.
    pub fn frame_count(&self) -> u64 {
        self.capture.frame_count()
    }

    pub fn roi(&self) -> Roi {
        self.capture.roi()
    }

    /// Set the region of interest, clamped to the frame. Takes effect from
    /// the next cycle.
    pub fn set_roi(&self, roi: Roi) -> Roi {
        let roi = self.capture.set_roi(roi);
        debug!(?roi, "region of interest changed");
        roi
    }

    /// Value last pushed to the device for `name`.
    pub fn applied_setting(&self, name: &str) -> Option<DeviceSetting> {
        self.registers.lock().get(name).cloned()
    }

    /// Value last seen for `name`, applied or not.
    pub fn pending_setting(&self, name: &str) -> Option<DeviceSetting> {
        self.pending.lock().get(name).cloned()
    }

    /// Video source the device is configured for.
    pub fn selected_source(&self) -> i64 {
        self.selected_source.load(Ordering::SeqCst)
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn format_name(&self) -> &str {
        &self.format_name
    }

    pub fn format(&self) -> DeviceFormatDescriptor {
        self.capture.format()
    }

    pub fn driver_description(&self) -> &'static str {
        hardware::DRIVER_DESCRIPTION
    }

    pub fn driver_version(&self) -> &'static str {
        hardware::DRIVER_VERSION
    }

    pub fn max_width(&self) -> u32 {
        self.format().width
    }

    pub fn max_height(&self) -> u32 {
        self.format().height
    }

    pub fn number_of_bands(&self) -> u32 {
        self.format().bands
    }

    pub fn frame_type(&self) -> FrameType {
        self.format().frame_type
    }
}

impl Drop for DemoAdaptor {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "stop failed while dropping adaptor");
        }
        if let Err(err) = self.close() {
            warn!(error = %err, "close failed while dropping adaptor");
        }
    }
}
