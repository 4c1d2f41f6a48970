//! The capture worker body: one frame per cycle under the driver lock,
//! paced, subset by the host policy, cropped to the ROI and handed over.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use crossbeam::utils::CachePadded;
use metrics::counter;
use tracing::{debug, error, info, trace, warn};

use crate::capture::source::{FrameSource, IMAGE_DATA_OFFSET};
use crate::capture::state::AcquisitionState;
use crate::capture::worker::StopSignal;
use crate::capture::Roi;
use crate::engine::Engine;
use crate::error::Result;
use crate::hardware::DeviceFormatDescriptor;

/// State shared by the controller and the capture worker for one adaptor.
pub struct CaptureContext {
    state: AcquisitionState,
    engine: Arc<dyn Engine>,
    source: Arc<dyn FrameSource>,
    format: DeviceFormatDescriptor,
    roi: ArcSwap<Roi>,
    frame_count: CachePadded<AtomicU64>,
    pacing: Duration,
}

impl CaptureContext {
    pub fn new(
        engine: Arc<dyn Engine>,
        source: Arc<dyn FrameSource>,
        format: DeviceFormatDescriptor,
        pacing: Duration,
    ) -> Self {
        Self {
            state: AcquisitionState::new(),
            engine,
            source,
            format,
            roi: ArcSwap::from_pointee(Roi::full(format.width, format.height)),
            frame_count: CachePadded::new(AtomicU64::new(0)),
            pacing,
        }
    }

    pub fn state(&self) -> &AcquisitionState {
        &self.state
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn format(&self) -> DeviceFormatDescriptor {
        self.format
    }

    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    pub fn roi(&self) -> Roi {
        **self.roi.load()
    }

    /// Store a new ROI, clamped to the frame. Returns the stored value.
    pub fn set_roi(&self, roi: Roi) -> Roi {
        let roi = roi.clamped(self.format.width, self.format.height);
        self.roi.store(Arc::new(roi));
        roi
    }

    /// Frames produced so far, forwarded or not.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }

    /// Run cycles until the host has enough frames or the acquisition flag
    /// is cleared. The flag is always clear when this returns.
    pub fn run(&self, signal: &StopSignal) {
        let _active = ClearOnExit(&self.state);
        let mut offset = 0;

        info!(
            width = self.format.width,
            height = self.format.height,
            bands = self.format.bands,
            "capture loop running"
        );

        while self
            .state
            .keep_running(self.engine.is_acquisition_not_complete())
        {
            if let Err(err) = self.capture_cycle(&mut offset, signal) {
                self.state.deactivate();
                counter!("imaqkit_capture_errors_total").increment(1);
                error!(error = %err, "frame acquisition failed, stopping capture");
                self.engine.report_error(err.error_id(), &err.host_message());
                return;
            }
        }

        info!(frames = self.frame_count(), "capture loop finished");
    }

    /// Produce one frame and, if the host wants it, forward it.
    ///
    /// The driver lock is held for the whole cycle and released on every
    /// exit path, including a failed allocation.
    pub fn capture_cycle(&self, offset: &mut u32, signal: &StopSignal) -> Result<()> {
        let _driver = self.state.lock_driver();

        if self.engine.use_hardware_trigger() {
            // The synthetic source has no trigger input to wait on.
            trace!("hardware trigger requested");
        }

        let DeviceFormatDescriptor {
            width,
            height,
            bands,
            frame_type,
        } = self.format;
        let image = self.source.produce(width, height, bands, *offset)?;
        *offset = offset.wrapping_add(IMAGE_DATA_OFFSET);

        if signal.pace(self.pacing) {
            debug!("pacing interrupted by stop request");
        }

        let frame_count = self.frame_count();
        if self.engine.is_send_frame(frame_count) {
            let roi = self.roi();
            match self.engine.make_frame(frame_type, roi.width, roi.height) {
                Some(mut frame) => {
                    frame.set_image(&image, width, height, roi.origin_x, roi.origin_y);
                    frame.set_time(wall_clock_seconds());
                    self.engine.receive_frame(Some(frame));
                    counter!("imaqkit_frames_forwarded_total").increment(1);
                    trace!(frame_count, "frame forwarded");
                }
                None => {
                    counter!("imaqkit_frames_skipped_total").increment(1);
                    warn!(frame_count, "host could not allocate a frame, skipping");
                }
            }
        }

        self.frame_count.fetch_add(1, Ordering::SeqCst);
        counter!("imaqkit_frames_acquired_total").increment(1);
        Ok(())
    }
}

struct ClearOnExit<'a>(&'a AcquisitionState);

impl Drop for ClearOnExit<'_> {
    fn drop(&mut self) {
        if self.0.deactivate() {
            debug!("capture worker cleared acquisition flag");
        }
    }
}

/// Current wall-clock time in seconds since the Unix epoch.
pub fn wall_clock_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
