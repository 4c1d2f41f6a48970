//! In-process host engine: frame-subsetting policy, received-frame history,
//! an optional frame sink and the property containers.

use std::sync::atomic::{AtomicU64, Ordering};

use flume::{Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, trace, warn};

use crate::capture::{AdaptorFrame, Frame, FrameType};
use crate::engine::props::{EngineProps, PropertyStore};
use crate::engine::{Engine, EnginePropContainer, PropContainer};
use crate::pipeline::ringbuf::{FrameRingBuffer, RingStats};
use crate::EngineConfig;

/// Which produced frames the host wants, and how many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionPolicy {
    /// Forward every n-th frame.
    pub frame_grab_interval: u32,
    /// Number of initial frames to skip.
    pub frame_delay: u64,
    /// Frames to collect before the acquisition is complete; `None` runs
    /// until stopped.
    pub frames_per_trigger: Option<u64>,
    pub hardware_trigger: bool,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            frame_grab_interval: 1,
            frame_delay: 0,
            frames_per_trigger: None,
            hardware_trigger: false,
        }
    }
}

impl AcquisitionPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            frame_grab_interval: config.frame_grab_interval,
            frame_delay: config.frame_delay,
            frames_per_trigger: config.frames_per_trigger,
            hardware_trigger: config.hardware_trigger,
        }
    }

    pub fn is_send_frame(&self, frame_count: u64) -> bool {
        let interval = u64::from(self.frame_grab_interval.max(1));
        frame_count >= self.frame_delay && (frame_count - self.frame_delay) % interval == 0
    }

    pub fn is_complete(&self, frames_received: u64) -> bool {
        self.frames_per_trigger
            .is_some_and(|wanted| frames_received >= wanted)
    }
}

/// An error or warning raised through the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub id: String,
    pub message: String,
}

pub struct HostEngine {
    policy: RwLock<AcquisitionPolicy>,
    frames: Mutex<FrameRingBuffer>,
    sink: Option<Sender<Frame>>,
    frame_memory_limit: Option<usize>,

    received: AtomicU64,
    dropped: AtomicU64,
    refused: AtomicU64,

    errors: Mutex<Vec<Report>>,
    warnings: Mutex<Vec<Report>>,

    adaptor_props: PropertyStore,
    engine_props: EngineProps,
}

impl HostEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            policy: RwLock::new(AcquisitionPolicy::from_config(config)),
            frames: Mutex::new(FrameRingBuffer::new(config.ring_buffer_size)),
            sink: None,
            frame_memory_limit: config.frame_memory_limit,
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            refused: AtomicU64::new(0),
            errors: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
            adaptor_props: PropertyStore::new(),
            engine_props: EngineProps::new(),
        }
    }

    /// Also forward every received frame to `sink`. Frames are not held back
    /// when the sink is full.
    pub fn with_frame_sink(mut self, sink: Sender<Frame>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn policy(&self) -> AcquisitionPolicy {
        *self.policy.read()
    }

    pub fn set_policy(&self, policy: AcquisitionPolicy) {
        *self.policy.write() = policy;
    }

    /// Forget received-frame counts so a new acquisition starts from zero.
    pub fn reset(&self) {
        self.received.store(0, Ordering::SeqCst);
        self.dropped.store(0, Ordering::SeqCst);
        self.refused.store(0, Ordering::SeqCst);
    }

    pub fn frames_received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    /// Frames the adaptor explicitly dropped.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// `make_frame` requests refused because of the memory limit.
    pub fn frames_refused(&self) -> u64 {
        self.refused.load(Ordering::SeqCst)
    }

    /// Remove and return the stored frames, oldest first.
    pub fn take_frames(&self) -> Vec<Frame> {
        self.frames.lock().drain()
    }

    pub fn ring_stats(&self) -> RingStats {
        self.frames.lock().stats()
    }

    pub fn errors(&self) -> Vec<Report> {
        self.errors.lock().clone()
    }

    pub fn warnings(&self) -> Vec<Report> {
        self.warnings.lock().clone()
    }

    /// Concrete device property store, for declaring properties.
    pub fn property_store(&self) -> &PropertyStore {
        &self.adaptor_props
    }

    pub fn engine_property_store(&self) -> &EngineProps {
        &self.engine_props
    }
}

impl Engine for HostEngine {
    fn make_frame(
        &self,
        frame_type: FrameType,
        roi_width: u32,
        roi_height: u32,
    ) -> Option<AdaptorFrame> {
        if let Some(limit) = self.frame_memory_limit {
            let bytes = roi_width as usize * roi_height as usize * frame_type.bytes_per_pixel();
            if bytes > limit {
                self.refused.fetch_add(1, Ordering::SeqCst);
                debug!(bytes, limit, "frame request exceeds host memory limit");
                return None;
            }
        }
        AdaptorFrame::try_new(frame_type, roi_width, roi_height)
    }

    fn receive_frame(&self, frame: Option<AdaptorFrame>) {
        let Some(frame) = frame else {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            trace!("adaptor dropped frame");
            return;
        };

        let sequence = self.received.fetch_add(1, Ordering::SeqCst);
        let frame = frame.into_frame(sequence);
        trace!(sequence, bytes = frame.data.len(), "frame received");

        if let Some(sink) = &self.sink {
            match sink.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!(sequence, "frame sink full"),
                Err(TrySendError::Disconnected(_)) => trace!("frame sink closed"),
            }
        }
        self.frames.lock().push(frame);
    }

    fn report_error(&self, error_id: &str, message: &str) {
        error!(error_id, message, "adaptor error");
        self.errors.lock().push(Report {
            id: error_id.to_string(),
            message: message.to_string(),
        });
    }

    fn report_warning(&self, warning_id: &str, message: &str) {
        warn!(warning_id, message, "adaptor warning");
        self.warnings.lock().push(Report {
            id: warning_id.to_string(),
            message: message.to_string(),
        });
    }

    fn is_send_frame(&self, frame_count: u64) -> bool {
        self.policy.read().is_send_frame(frame_count)
    }

    fn is_acquisition_not_complete(&self) -> bool {
        !self.policy.read().is_complete(self.frames_received())
    }

    fn use_hardware_trigger(&self) -> bool {
        self.policy.read().hardware_trigger
    }

    fn adaptor_props(&self) -> &dyn PropContainer {
        &self.adaptor_props
    }

    fn engine_props(&self) -> &dyn EnginePropContainer {
        &self.engine_props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> HostEngine {
        HostEngine::new(&EngineConfig::default())
    }

    #[test]
    fn grab_interval_and_delay_subset_frames() {
        let policy = AcquisitionPolicy {
            frame_grab_interval: 3,
            frame_delay: 2,
            ..AcquisitionPolicy::default()
        };
        let sent: Vec<u64> = (0..10).filter(|n| policy.is_send_frame(*n)).collect();
        assert_eq!(sent, vec![2, 5, 8]);
    }

    #[test]
    fn zero_interval_behaves_like_one() {
        let policy = AcquisitionPolicy {
            frame_grab_interval: 0,
            ..AcquisitionPolicy::default()
        };
        assert!((0..4).all(|n| policy.is_send_frame(n)));
    }

    #[test]
    fn acquisition_completes_after_frames_per_trigger() {
        let engine = engine();
        engine.set_policy(AcquisitionPolicy {
            frames_per_trigger: Some(2),
            ..AcquisitionPolicy::default()
        });

        for _ in 0..2 {
            assert!(engine.is_acquisition_not_complete());
            let frame = engine.make_frame(FrameType::Mono8, 2, 2);
            engine.receive_frame(frame);
        }
        assert!(!engine.is_acquisition_not_complete());

        engine.reset();
        assert!(engine.is_acquisition_not_complete());
    }

    #[test]
    fn null_frame_counts_as_dropped() {
        let engine = engine();
        engine.receive_frame(None);
        assert_eq!(engine.frames_dropped(), 1);
        assert_eq!(engine.frames_received(), 0);
        assert!(engine.take_frames().is_empty());
    }

    #[test]
    fn memory_limit_refuses_large_frames() {
        let engine = HostEngine::new(&EngineConfig {
            frame_memory_limit: Some(16),
            ..EngineConfig::default()
        });
        assert!(engine.make_frame(FrameType::Mono8, 4, 4).is_some());
        assert!(engine.make_frame(FrameType::Rgb24Packed, 4, 4).is_none());
        assert_eq!(engine.frames_refused(), 1);
    }

    #[test]
    fn received_frames_reach_sink_and_history() {
        let (tx, rx) = flume::bounded(4);
        let engine = engine().with_frame_sink(tx);
        engine.receive_frame(engine.make_frame(FrameType::Mono8, 1, 1));
        engine.receive_frame(engine.make_frame(FrameType::Mono8, 1, 1));

        let sequences: Vec<u64> = rx.drain().map(|f| f.meta.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
        assert_eq!(engine.take_frames().len(), 2);
    }

    #[test]
    fn reports_are_recorded() {
        let engine = engine();
        engine.report_error("imaq:demo:x", "broken");
        engine.report_warning("imaq:demo:y", "odd");
        assert_eq!(
            engine.errors(),
            vec![Report {
                id: "imaq:demo:x".into(),
                message: "broken".into()
            }]
        );
        assert_eq!(engine.warnings().len(), 1);
    }
}
