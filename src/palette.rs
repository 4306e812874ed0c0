//! Color palettes for indexed layers

use crate::{Error, Result};

/// Maximum number of colors an indexed image can hold
pub const MAX_COLORS: usize = 256;

/// An ordered list of RGB colors; entry `i` is the color of index `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    /// Build a palette from 1..=256 colors.
    pub fn new(colors: Vec<[u8; 3]>) -> Result<Self> {
        if colors.is_empty() {
            return Err(Error::InvalidPalette("palette has no colors".into()));
        }
        if colors.len() > MAX_COLORS {
            return Err(Error::InvalidPalette(format!(
                "palette has {} colors, at most {} allowed",
                colors.len(),
                MAX_COLORS
            )));
        }
        Ok(Self { colors })
    }

    /// Build a palette from packed `r,g,b,r,g,b,...` bytes.
    pub fn from_flat(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % 3 != 0 {
            return Err(Error::InvalidPalette(format!(
                "{} bytes is not a whole number of RGB triples",
                bytes.len()
            )));
        }
        Self::new(bytes.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
    }

    /// The 256-entry "jet" colormap (dark blue → cyan → yellow → dark red).
    pub fn jet() -> Self {
        let colors = (0..MAX_COLORS)
            .map(|i| {
                let x = i as f64 / (MAX_COLORS - 1) as f64;
                [
                    channel(x, JET_RED),
                    channel(x, JET_GREEN),
                    channel(x, JET_BLUE),
                ]
            })
            .collect();
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn get(&self, index: u8) -> Option<[u8; 3]> {
        self.colors.get(index as usize).copied()
    }

    pub fn colors(&self) -> &[[u8; 3]] {
        &self.colors
    }

    /// Packed `r,g,b,...` bytes, the layout GIMP's colormap call expects.
    pub fn to_flat(&self) -> Vec<u8> {
        self.colors.iter().flatten().copied().collect()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::jet()
    }
}

// Piecewise-linear control points (x, value) per channel.
const JET_RED: &[(f64, f64)] = &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const JET_GREEN: &[(f64, f64)] = &[
    (0.0, 0.0),
    (0.125, 0.0),
    (0.375, 1.0),
    (0.64, 1.0),
    (0.91, 0.0),
    (1.0, 0.0),
];
const JET_BLUE: &[(f64, f64)] = &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

fn channel(x: f64, points: &[(f64, f64)]) -> u8 {
    let mut value = points[points.len() - 1].1;
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if x <= x1 {
            let t = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
            value = y0 + t * (y1 - y0);
            break;
        }
    }
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
