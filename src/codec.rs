//! Conversion between packed pixel-region buffers and `ndarray` arrays.
//!
//! A pixel region is a flat, row-major byte buffer with `bpp` interleaved
//! channels per pixel and no row padding. The host-facing representation is
//! an `Array3<u8>` of shape `(height, width, channels)`.

use crate::palette::Palette;
use crate::{Error, Result};
use ndarray::{Array2, Array3, Axis};

/// Host-side pixel data, shape `(height, width, channels)`
pub type PixelArray = Array3<u8>;

/// Channels of a gray or indexed layer
pub const GRAY_CHANNELS: usize = 1;
/// Channels of an RGB layer
pub const RGB_CHANNELS: usize = 3;

fn check_channels(channels: usize) -> Result<()> {
    match channels {
        GRAY_CHANNELS | RGB_CHANNELS => Ok(()),
        other => Err(Error::UnsupportedChannelCount(other)),
    }
}

/// Reinterpret a packed buffer as a `(height, width, bpp)` array.
pub fn decode(buffer: &[u8], width: usize, height: usize, bpp: usize) -> Result<PixelArray> {
    check_channels(bpp)?;
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(bpp))
        .ok_or(Error::ShapeMismatch {
            expected: usize::MAX,
            actual: buffer.len(),
        })?;
    if buffer.len() != expected {
        return Err(Error::ShapeMismatch {
            expected,
            actual: buffer.len(),
        });
    }
    Array3::from_shape_vec((height, width, bpp), buffer.to_vec()).map_err(|_| Error::ShapeMismatch {
        expected,
        actual: buffer.len(),
    })
}

/// Pack an array back into a row-major buffer.
///
/// Works for any memory layout (views, transposes): elements are emitted in
/// logical `(row, column, channel)` order.
pub fn encode(array: &PixelArray) -> Result<Vec<u8>> {
    check_channels(array.len_of(Axis(2)))?;
    Ok(array.iter().copied().collect())
}

/// Promote a 2-D `(height, width)` plane to a single-channel array.
pub fn from_plane(plane: Array2<u8>) -> PixelArray {
    plane.insert_axis(Axis(2))
}

/// Check that every index has a palette entry.
pub fn check_indices(indices: &PixelArray, palette: &Palette) -> Result<()> {
    if indices.len_of(Axis(2)) != GRAY_CHANNELS {
        return Err(Error::UnsupportedChannelCount(indices.len_of(Axis(2))));
    }
    match indices.iter().copied().find(|&i| i as usize >= palette.len()) {
        Some(index) => Err(Error::IndexOutOfRange {
            index,
            len: palette.len(),
        }),
        None => Ok(()),
    }
}

/// Expand a single-channel index array into RGB through `palette`.
pub fn apply_palette(indices: &PixelArray, palette: &Palette) -> Result<PixelArray> {
    check_indices(indices, palette)?;
    let (height, width, _) = indices.dim();
    let mut out = Array3::<u8>::zeros((height, width, RGB_CHANNELS));
    for ((y, x, _), &index) in indices.indexed_iter() {
        // range checked above
        let color = palette.colors()[index as usize];
        for (c, value) in color.iter().enumerate() {
            out[[y, x, c]] = *value;
        }
    }
    Ok(out)
}
