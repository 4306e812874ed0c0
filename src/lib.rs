//! xcfbridge
//!
//! Manipulate layered GIMP documents (`.xcf`) from Rust by driving GIMP's
//! batch scripting console, and move layer pixels in and out as
//! `ndarray::Array3<u8>` arrays.
//!
//! # Features
//!
//! - **Script bridge**: runs generated python-fu scripts in a fresh headless
//!   GIMP process with a per-call timeout and typed failures
//! - **Pixel codec**: packed pixel regions ⇄ `(height, width, channels)` arrays,
//!   including palette lookup for indexed layers
//! - **Mask compositing**: max/min merge of two layers under a foreground
//!   color convention
//!
//! # Example
//!
//! ```no_run
//! use ndarray::Array3;
//! use xcfbridge::{Document, RunnerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let doc = Document::new("mask.xcf", RunnerConfig::default());
//! doc.create("Background", &Array3::<u8>::zeros((2, 3, 3)))?;
//! let pixels = doc.layer_to_array("Background")?;
//! assert_eq!(pixels.dim(), (2, 3, 3));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod codec;
pub mod compositor;
pub mod palette;

pub mod script;
pub mod runner;

pub mod collection;
pub mod document;
pub mod layer;

// Async facade backed by a worker thread
pub mod async_api;

pub use async_api::AsyncBridge;
pub use codec::PixelArray;
pub use collection::DocumentCollection;
pub use compositor::{ColorModel, ForegroundColor};
pub use document::{Document, LayerOptions};
pub use layer::{LayerDescriptor, LayerKind};
pub use palette::Palette;
pub use runner::{Interpreter, ScriptRunner};
pub use script::Script;

/// Configuration for a script runner
///
/// The defaults target a GIMP installation on PATH, run from the current
/// directory:
/// - scripts are python-fu, executed by `gimp -i -b -` (under `xvfb-run`
///   when available)
/// - each layer read/write gets 10 seconds
///
/// # Examples
///
/// ```
/// let cfg = xcfbridge::RunnerConfig::default();
/// assert_eq!(cfg.layer_timeout_ms, 10_000);
/// assert_eq!(cfg.interpreter.program, "gimp");
/// ```
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Console to start for each script
    pub interpreter: Interpreter,
    /// Directory the interpreter runs in (exported as `__working_directory__`)
    pub working_directory: PathBuf,
    /// Extra environment variables; `None` values are skipped
    pub environment: HashMap<String, Option<String>>,
    /// Timeout used by `ScriptRunner::execute_default` in milliseconds
    pub script_timeout_ms: u64,
    /// Timeout for each document layer operation in milliseconds
    pub layer_timeout_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: Interpreter::gimp(),
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            environment: HashMap::new(),
            script_timeout_ms: 30_000,
            layer_timeout_ms: 10_000,
        }
    }
}

impl RunnerConfig {
    pub fn layer_timeout(&self) -> Duration {
        Duration::from_millis(self.layer_timeout_ms)
    }
}

/// Anything that can execute a script and hand back its stdout.
///
/// `ScriptRunner` is the real implementation; documents only talk to this
/// trait so they can be pointed at other consoles.
pub trait ScriptBackend: Send + Sync {
    /// Execute the script and return raw stdout
    fn execute(&self, script: &Script, timeout: Duration) -> Result<String>;

    /// Execute and decode the payload that follows the result marker
    fn execute_json(&self, script: &Script, timeout: Duration) -> Result<serde_json::Value> {
        let stdout = self.execute(script, timeout)?;
        runner::decode_output(&stdout)
    }
}

impl ScriptBackend for ScriptRunner {
    fn execute(&self, script: &Script, timeout: Duration) -> Result<String> {
        ScriptRunner::execute(self, script, timeout)
    }
}
