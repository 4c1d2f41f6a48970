//! The host engine boundary.
//!
//! The engine owns frame delivery, error reporting, the frame-subsetting
//! policy and property storage. Adaptors reach it only through [`Engine`].

pub mod host;
pub mod props;

pub use host::{AcquisitionPolicy, HostEngine, Report};
pub use props::{
    EnginePropContainer, EngineProps, PropContainer, PropInfo, PropKind, PropValue, PropertyStore,
};

use crate::capture::{AdaptorFrame, FrameType};

pub trait Engine: Send + Sync {
    /// Allocate a frame for `roi_width` x `roi_height` pixels, or `None` when
    /// the host cannot provide one.
    fn make_frame(
        &self,
        frame_type: FrameType,
        roi_width: u32,
        roi_height: u32,
    ) -> Option<AdaptorFrame> {
        AdaptorFrame::try_new(frame_type, roi_width, roi_height)
    }

    /// Take ownership of a completed frame. `None` marks a frame dropped on
    /// purpose.
    fn receive_frame(&self, frame: Option<AdaptorFrame>);

    /// May be called from the capture worker; returns without waiting for
    /// the host to handle the report.
    fn report_error(&self, error_id: &str, message: &str);

    fn report_warning(&self, warning_id: &str, message: &str);

    /// Whether the frame with this zero-based count should be forwarded.
    fn is_send_frame(&self, frame_count: u64) -> bool;

    /// Whether the host still needs frames for the current acquisition.
    fn is_acquisition_not_complete(&self) -> bool;

    fn use_hardware_trigger(&self) -> bool;

    /// Container of device-specific properties.
    fn adaptor_props(&self) -> &dyn PropContainer;

    /// Container of engine-level properties such as the selected source.
    fn engine_props(&self) -> &dyn EnginePropContainer;
}
