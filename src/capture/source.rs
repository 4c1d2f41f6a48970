//! Frame producers. [`SyntheticSource`] stands in for the camera SDK and
//! renders a scrolling test pattern.

use crate::error::{AdaptorError, Result};

/// Step added to the pattern offset after every produced frame. Larger
/// values scroll the pattern faster.
pub const IMAGE_DATA_OFFSET: u32 = 2;

/// Produces the raw bytes of one full frame.
///
/// The returned buffer is `width * height * bands` bytes, band-interleaved.
pub trait FrameSource: Send + Sync {
    fn produce(&self, width: u32, height: u32, bands: u32, offset: u32) -> Result<Vec<u8>>;
}

/// Deterministic test pattern generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntheticSource;

impl FrameSource for SyntheticSource {
    fn produce(&self, width: u32, height: u32, bands: u32, offset: u32) -> Result<Vec<u8>> {
        let len = buffer_len(width, height, bands)?;
        let mut buf = alloc_frame_buffer(len)?;
        render_pattern(&mut buf, width, height, bands, offset);
        Ok(buf)
    }
}

/// Size in bytes of a `width` x `height` x `bands` frame.
pub fn buffer_len(width: u32, height: u32, bands: u32) -> Result<usize> {
    let invalid = || AdaptorError::InvalidGeometry {
        width,
        height,
        bands,
    };
    if width == 0 || height == 0 || bands == 0 {
        return Err(invalid());
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(bands as usize))
        .ok_or_else(invalid)
}

/// Reserve an empty buffer of exactly `len` bytes, reporting allocation
/// failure instead of aborting.
pub fn alloc_frame_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| AdaptorError::OutOfMemory { bytes: len })?;
    Ok(buf)
}

// Channel values use truncating `%` and wrap into a byte, so a negative
// remainder such as -2 becomes 254.
fn render_pattern(buf: &mut Vec<u8>, width: u32, height: u32, bands: u32, offset: u32) {
    let offset = offset as i64;

    if bands == 1 {
        for _y in 0..height {
            for x in 0..width as i64 {
                buf.push(((x + offset) % 255) as u8);
            }
        }
        return;
    }

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            for band in 0..bands {
                let v = match band % 3 {
                    0 => x - offset,
                    1 => y - offset,
                    _ => x + y - offset,
                };
                buf.push((v % 255) as u8);
            }
        }
    }
}
