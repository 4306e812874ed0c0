//! Layer metadata

use crate::compositor::ColorModel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// One entry of a document's layer stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub name: String,
    /// 0 is the topmost layer
    pub position: usize,
    pub visible: bool,
    /// 0.0 to 100.0
    pub opacity: f64,
}

/// Pixel type of a layer (without alpha)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Rgb,
    Gray,
    Indexed,
}

impl LayerKind {
    /// gimpenums RGB_IMAGE, GRAY_IMAGE, INDEXED_IMAGE
    pub fn code(self) -> i64 {
        match self {
            LayerKind::Rgb => 0,
            LayerKind::Gray => 2,
            LayerKind::Indexed => 4,
        }
    }

    /// Layer type that fits an image of the given base type.
    pub fn for_model(model: ColorModel) -> Self {
        match model {
            ColorModel::Rgb => LayerKind::Rgb,
            ColorModel::Gray => LayerKind::Gray,
            ColorModel::Indexed => LayerKind::Indexed,
        }
    }

    /// Image base type a layer of this kind lives in.
    pub fn model(self) -> ColorModel {
        match self {
            LayerKind::Rgb => ColorModel::Rgb,
            LayerKind::Gray => ColorModel::Gray,
            LayerKind::Indexed => ColorModel::Indexed,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            LayerKind::Rgb => 3,
            LayerKind::Gray | LayerKind::Indexed => 1,
        }
    }
}

/// Check that a listing is ordered topmost-first with positions `0..len`.
pub fn check_stack(layers: &[LayerDescriptor]) -> Result<()> {
    for (expected, layer) in layers.iter().enumerate() {
        if layer.position != expected {
            return Err(Error::DecodeError(format!(
                "layer '{}' reported position {}, expected {}",
                layer.name, layer.position, expected
            )));
        }
    }
    Ok(())
}
