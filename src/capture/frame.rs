use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Frame layouts a device format can declare.
///
/// The capture loop never interprets the tag; it only hands it to the host
/// together with the image bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameType {
    Mono8,
    Rgb24Packed,
    Bgr24Packed,
    Bayer8,
}

impl FrameType {
    /// Number of color bands the layout carries.
    pub fn bands(self) -> u32 {
        match self {
            FrameType::Mono8 | FrameType::Bayer8 => 1,
            FrameType::Rgb24Packed | FrameType::Bgr24Packed => 3,
        }
    }

    /// Bytes occupied by one pixel in a packed buffer. Every layout stores
    /// one byte per band, matching what a [`FrameSource`] produces.
    ///
    /// [`FrameSource`]: crate::capture::FrameSource
    pub fn bytes_per_pixel(self) -> usize {
        self.bands() as usize
    }
}

/// Region of interest inside the full sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub origin_x: u32,
    pub origin_y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(origin_x: u32, origin_y: u32, width: u32, height: u32) -> Self {
        Self {
            origin_x,
            origin_y,
            width,
            height,
        }
    }

    /// The whole frame.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Clamp the region so it lies inside a `width` x `height` frame and is
    /// at least one pixel in each direction.
    pub fn clamped(self, width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            return Self::full(width, height);
        }
        let origin_x = self.origin_x.min(width.saturating_sub(1));
        let origin_y = self.origin_y.min(height.saturating_sub(1));
        Self {
            origin_x,
            origin_y,
            width: self.width.clamp(1, width - origin_x),
            height: self.height.clamp(1, height - origin_y),
        }
    }
}

/// Named metadata attached to a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Double(f64),
    Text(String),
    Vector(Vec<f64>),
    Matrix {
        rows: usize,
        cols: usize,
        data: Vec<f64>,
    },
    Volume {
        rows: usize,
        cols: usize,
        depth: usize,
        data: Vec<f64>,
    },
    Flags(Vec<bool>),
}

/// A frame being filled by the adaptor before it is handed to the host.
///
/// Created by [`Engine::make_frame`](crate::engine::Engine::make_frame) at ROI
/// size; ownership moves to the host on `receive_frame`.
#[derive(Debug, Clone)]
pub struct AdaptorFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    frame_type: FrameType,
    time: f64,
    meta: Vec<(String, MetaValue)>,
}

impl AdaptorFrame {
    /// Allocate a zeroed frame, or `None` when the buffer cannot be reserved.
    pub fn try_new(frame_type: FrameType, width: u32, height: u32) -> Option<Self> {
        let len = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(frame_type.bytes_per_pixel())?;
        let mut data = Vec::new();
        data.try_reserve_exact(len).ok()?;
        data.resize(len, 0);

        Some(Self {
            data,
            width,
            height,
            frame_type,
            time: 0.0,
            meta: Vec::new(),
        })
    }

    /// Copy the frame-sized window at (`origin_x`, `origin_y`) out of a full
    /// `src_width` x `src_height` image.
    ///
    /// Rows or columns of the window that fall outside the source stay zero.
    pub fn set_image(
        &mut self,
        src: &[u8],
        src_width: u32,
        src_height: u32,
        origin_x: u32,
        origin_y: u32,
    ) {
        let bpp = self.frame_type.bytes_per_pixel();
        let src_stride = src_width as usize * bpp;
        let dst_stride = self.width as usize * bpp;

        if origin_x >= src_width {
            return;
        }
        let cols = (self.width.min(src_width - origin_x)) as usize * bpp;
        let x0 = origin_x as usize * bpp;

        for row in 0..self.height {
            let src_row = origin_y as u64 + row as u64;
            if src_row >= src_height as u64 {
                break;
            }
            let start = src_row as usize * src_stride + x0;
            let Some(src_slice) = src.get(start..start + cols) else {
                break;
            };
            let dst_start = row as usize * dst_stride;
            self.data[dst_start..dst_start + cols].copy_from_slice(src_slice);
        }
    }

    pub fn image(&self) -> &[u8] {
        &self.data
    }

    /// Width, height and band count.
    pub fn dims(&self) -> (u32, u32, u32) {
        (self.width, self.height, self.frame_type.bands())
    }

    pub fn image_size(&self) -> usize {
        self.data.len()
    }

    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Acquisition time in seconds since the Unix epoch.
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Attach a metadata item, replacing any previous item of the same name.
    pub fn add_meta_item(&mut self, name: impl Into<String>, value: MetaValue) {
        let name = name.into();
        match self.meta.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.meta.push((name, value)),
        }
    }

    pub fn meta_names(&self) -> impl Iterator<Item = &str> {
        self.meta.iter().map(|(n, _)| n.as_str())
    }

    pub fn num_meta_items(&self) -> usize {
        self.meta.len()
    }

    pub fn meta_item(&self, name: &str) -> Option<&MetaValue> {
        self.meta.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Seal the frame into the immutable form the host stores.
    pub fn into_frame(self, sequence: u64) -> Frame {
        let meta = Arc::new(FrameMetadata {
            sequence,
            width: self.width,
            height: self.height,
            bands: self.frame_type.bands(),
            frame_type: self.frame_type,
            time: self.time,
            items: self.meta,
        });

        Frame {
            data: Bytes::from(self.data),
            meta,
            timestamp: Instant::now(),
        }
    }
}

/// Frame data with zero-copy semantics, as stored by the host.
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// When the host received the frame
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub bands: u32,
    pub frame_type: FrameType,
    pub time: f64,
    pub items: Vec<(String, MetaValue)>,
}
