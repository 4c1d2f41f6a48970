pub mod capture_loop;
pub mod frame;
pub mod source;
pub mod state;
pub mod worker;

pub use capture_loop::CaptureContext;
pub use frame::{AdaptorFrame, Frame, FrameMetadata, FrameType, MetaValue, Roi};
pub use source::{FrameSource, SyntheticSource};
pub use state::AcquisitionState;
pub use worker::{CaptureTask, StopSignal};
