//! Mask-merge compositing of two layers.
//!
//! Masks are painted in a foreground color on a background of the opposite
//! color. Merging two masks keeps foreground from either side: max when the
//! foreground is white, min when it is black.

use crate::codec::{PixelArray, GRAY_CHANNELS, RGB_CHANNELS};
use crate::{Error, Result};
use ndarray::{Array3, Zip};
use serde::{Deserialize, Serialize};

/// Image base type as reported by GIMP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorModel {
    Rgb,
    Gray,
    Indexed,
}

// Immutable code table (gimpenums RGB, GRAY, INDEXED).
const COLOR_MODEL_CODES: [(i64, ColorModel); 3] = [
    (0, ColorModel::Rgb),
    (1, ColorModel::Gray),
    (2, ColorModel::Indexed),
];

impl ColorModel {
    pub fn code(self) -> i64 {
        COLOR_MODEL_CODES
            .iter()
            .find(|(_, m)| *m == self)
            .map(|(c, _)| *c)
            .unwrap_or_default()
    }

    /// Look up a numeric base-type code; unknown codes are an error, not a panic.
    pub fn from_code(code: i64) -> Result<Self> {
        COLOR_MODEL_CODES
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, m)| *m)
            .ok_or_else(|| Error::UnsupportedColorModel(format!("unknown base type code {}", code)))
    }

    /// Model matching an array's channel count when creating a document.
    pub fn for_channels(channels: usize) -> Result<Self> {
        match channels {
            GRAY_CHANNELS => Ok(ColorModel::Gray),
            RGB_CHANNELS => Ok(ColorModel::Rgb),
            other => Err(Error::UnsupportedChannelCount(other)),
        }
    }
}

/// Which mask color carries information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForegroundColor {
    Black,
    #[default]
    White,
}

impl ForegroundColor {
    /// Value of pixels that carry no mask information
    pub fn background_value(self) -> u8 {
        match self {
            ForegroundColor::White => 0,
            ForegroundColor::Black => 255,
        }
    }
}

impl TryFrom<i64> for ForegroundColor {
    type Error = Error;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            1 => Ok(ForegroundColor::White),
            0 => Ok(ForegroundColor::Black),
            other => Err(Error::InvalidForegroundColor(other)),
        }
    }
}

/// Geometry of the target document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Canvas {
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }
}

/// Channel count shared by two documents that are about to be merged.
pub fn channels_for(src: ColorModel, dst: ColorModel) -> Result<usize> {
    if src != dst {
        return Err(Error::ImageTypeMismatch { src, dst });
    }
    match src {
        ColorModel::Rgb => Ok(RGB_CHANNELS),
        ColorModel::Gray => Ok(GRAY_CHANNELS),
        ColorModel::Indexed => Err(Error::UnsupportedColorModel(
            "image must be rgb or gray".into(),
        )),
    }
}

/// Full-canvas array of the convention's background color.
pub fn background(canvas: Canvas, foreground: ForegroundColor) -> PixelArray {
    Array3::from_elem(canvas.shape(), foreground.background_value())
}

/// Merge two masks; an absent side counts as all background.
pub fn merge(
    src: Option<&PixelArray>,
    dst: Option<&PixelArray>,
    canvas: Canvas,
    foreground: ForegroundColor,
) -> Result<PixelArray> {
    for array in [src, dst].into_iter().flatten() {
        if array.dim() != canvas.shape() {
            let (h, w, c) = array.dim();
            return Err(Error::ShapeMismatch {
                expected: canvas.height * canvas.width * canvas.channels,
                actual: h * w * c,
            });
        }
    }

    let filler;
    let (src, dst) = match (src, dst) {
        (Some(s), Some(d)) => (s, d),
        (Some(s), None) => {
            filler = background(canvas, foreground);
            (s, &filler)
        }
        (None, Some(d)) => {
            filler = background(canvas, foreground);
            (&filler, d)
        }
        (None, None) => return Ok(background(canvas, foreground)),
    };

    let combine: fn(u8, u8) -> u8 = match foreground {
        ForegroundColor::White => std::cmp::max::<u8>,
        ForegroundColor::Black => std::cmp::min::<u8>,
    };
    Ok(Zip::from(src).and(dst).map_collect(|&a, &b| combine(a, b)))
}
