//! Error types for the bridge, codec and document layers

use crate::compositor::ColorModel;
use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to GIMP or reshaping pixel data
#[derive(Error, Debug)]
pub enum Error {
    /// Buffer length does not match the declared geometry
    #[error("Shape mismatch: expected {expected} bytes, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Arrays must have 1 (gray/indexed) or 3 (RGB) channels
    #[error("Unsupported channel count: {0}")]
    UnsupportedChannelCount(usize),

    /// An index value has no palette entry
    #[error("Index {index} out of range for palette of {len} colors")]
    IndexOutOfRange { index: u8, len: usize },

    /// Palette is empty or has more than 256 entries
    #[error("Invalid palette: {0}")]
    InvalidPalette(String),

    /// Mask foreground must be 1 (white) or 0 (black)
    #[error("Mask foreground color must be 1 for white and 0 for black, got {0}")]
    InvalidForegroundColor(i64),

    /// The two documents use different color models
    #[error("Image types must match: {src:?} vs {dst:?}")]
    ImageTypeMismatch { src: ColorModel, dst: ColorModel },

    /// Only RGB and gray images can be merged; unknown model codes land here too
    #[error("Unsupported color model: {0}")]
    UnsupportedColorModel(String),

    /// The script did not finish before the deadline
    #[error("Script execution timed out after {0}ms")]
    ExecutionTimeout(u64),

    /// Output could not be decoded as the expected structured value
    #[error("Failed to decode script output: {0}")]
    DecodeError(String),

    /// The interpreter reported a script error, crashed or exited non-zero
    #[error("External process failed: {0}")]
    ExternalProcessError(String),

    /// Another script is already running on this runner
    #[error("Bridge is busy with another script")]
    BridgeBusy,

    /// Interpreter executable could not be located
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),

    /// Named layer does not exist in the document
    #[error("Layer not found: {0}")]
    LayerNotFound(String),

    /// Not every file in a collection carries the requested prefix/suffix
    #[error("Path component mismatch: {0}")]
    PathComponentMismatch(String),

    /// Invalid glob pattern
    #[error("Invalid pattern: {0}")]
    PatternError(String),

    /// I/O failure (pipes, temporary files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::DecodeError(err.to_string())
    }
}

impl From<glob::PatternError> for Error {
    fn from(err: glob::PatternError) -> Self {
        Error::PatternError(err.to_string())
    }
}

impl Error {
    /// Whether retrying with a longer timeout could help
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ExecutionTimeout(_))
    }
}
