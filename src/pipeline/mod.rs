pub mod ringbuf;

pub use self::ringbuf::{FrameRingBuffer, RingStats};
