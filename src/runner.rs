//! Out-of-process script execution.
//!
//! Every call spawns one fresh interpreter process (GIMP in batch mode by
//! default), pipes prelude + script + epilogue into its stdin and waits for it
//! to exit. Output before `RESULT_MARKER` is treated as log noise; the text
//! after it is the JSON payload.
//!
//! Calls on one `ScriptRunner` are serialized through a mutex: a second
//! caller queues behind the first, or gets `Error::BridgeBusy` from
//! `try_execute`.

use crate::script::Script;
use crate::{Error, Result, RunnerConfig};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Line emitted by `return_json` right before the payload
pub const RESULT_MARKER: &str = "__XCFBRIDGE_RESULT__";
/// Last stderr line written by the prelude's exception hook
pub const ERROR_MARKER: &str = "__XCFBRIDGE_SCRIPT_ERROR__";

const GIMP_PRELUDE: &str = include_str!("gimp_prelude.py");
const GIMP_EPILOGUE: &str = "gimp.pdb.gimp_quit(0)";

const SHELL_PRELUDE: &str = r#"cd "$__working_directory__" || exit 1
get_parameter() { printenv "__param_$1"; }
return_json() { printf '\n%s\n%s' '__XCFBRIDGE_RESULT__' "$1"; }
"#;

// Extra time to drain pipes after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

// Longer timeouts are treated as this one (one year).
const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How to start a scripting console and what to wrap around each script
#[derive(Debug, Clone)]
pub struct Interpreter {
    /// Executable name or path, resolved through PATH at spawn time
    pub program: String,
    pub args: Vec<String>,
    /// Run under `xvfb-run -a` when it is installed
    pub use_xvfb: bool,
    /// Code placed before every script body
    pub prelude: String,
    /// Code placed after every script body
    pub epilogue: String,
}

impl Interpreter {
    /// GIMP without UI, data or fonts, reading a python-fu script from stdin.
    pub fn gimp() -> Self {
        Self {
            program: "gimp".to_string(),
            args: [
                "-i",
                "-d",
                "-f",
                "--batch-interpreter=python-fu-eval",
                "-b",
                "-",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            use_xvfb: true,
            prelude: GIMP_PRELUDE.to_string(),
            epilogue: GIMP_EPILOGUE.to_string(),
        }
    }

    /// `sh -s` with `get_parameter` and `return_json` shell functions.
    pub fn posix_shell() -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-s".to_string()],
            use_xvfb: false,
            prelude: SHELL_PRELUDE.to_string(),
            epilogue: String::new(),
        }
    }

    /// Full text written to the interpreter's stdin.
    pub fn wrap(&self, body: &str) -> String {
        format!("{}\n{}\n{}\n", self.prelude, body, self.epilogue)
    }

    fn command(&self) -> Result<Command> {
        let program = which::which(&self.program)
            .map_err(|e| Error::ExecutableNotFound(format!("{}: {}", self.program, e)))?;

        let xvfb = if self.use_xvfb {
            which::which("xvfb-run").ok()
        } else {
            None
        };

        let mut command = match xvfb {
            Some(xvfb) => {
                let mut c = Command::new(xvfb);
                c.arg("-a").arg(program);
                c
            }
            None => Command::new(program),
        };
        command.args(&self.args);
        Ok(command)
    }
}

/// Captured process output
#[derive(Debug, Clone)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes scripts in the external console, one process per call.
pub struct ScriptRunner {
    config: RunnerConfig,
    in_flight: Mutex<()>,
}

impl ScriptRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            in_flight: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `script`, waiting for a free slot, and return its stdout.
    pub fn execute(&self, script: &Script, timeout: Duration) -> Result<String> {
        Ok(self.execute_with_output(script, timeout)?.stdout)
    }

    /// Like `execute`, but also hand back what the interpreter wrote to stderr.
    pub fn execute_with_output(&self, script: &Script, timeout: Duration) -> Result<ScriptOutput> {
        let _guard = self.lock();
        self.run(script, timeout)
    }

    /// Like `execute`, but fail with `BridgeBusy` instead of queueing.
    pub fn try_execute(&self, script: &Script, timeout: Duration) -> Result<String> {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(Error::BridgeBusy),
        };
        Ok(self.run(script, timeout)?.stdout)
    }

    /// Run `script` and decode the payload that follows `RESULT_MARKER`.
    pub fn execute_and_decode<T: DeserializeOwned>(&self, script: &Script, timeout: Duration) -> Result<T> {
        let stdout = self.execute(script, timeout)?;
        decode_output(&stdout)
    }

    /// `execute_and_decode` into an untyped JSON value.
    pub fn execute_json(&self, script: &Script, timeout: Duration) -> Result<serde_json::Value> {
        self.execute_and_decode(script, timeout)
    }

    /// Run with the configured default timeout.
    pub fn execute_default(&self, script: &Script) -> Result<String> {
        self.execute(script, Duration::from_millis(self.config.script_timeout_ms))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run(&self, script: &Script, timeout: Duration) -> Result<ScriptOutput> {
        let timeout = timeout.min(MAX_TIMEOUT);
        let interpreter = &self.config.interpreter;
        let mut command = interpreter.command()?;
        command
            .current_dir(&self.config.working_directory)
            .env("__working_directory__", &self.config.working_directory)
            .envs(
                self.config
                    .environment
                    .iter()
                    .filter_map(|(k, v)| v.as_ref().map(|v| (k, v))),
            )
            .envs(script.env_vars())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Spawning {:?} ({} script parameters)", command, script.params().len());
        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::ExecutableNotFound(format!("{}: {}", interpreter.program, e)),
            _ => Error::ExternalProcessError(format!("Failed to spawn {}: {}", interpreter.program, e)),
        })?;

        let code = interpreter.wrap(script.body());
        let stdin = child.stdin.take();
        let writer = thread::spawn(move || -> io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(code.as_bytes())?;
                stdin.flush()?;
            }
            Ok(())
        });
        let stdout_rx = spawn_reader(child.stdout.take());
        let stderr_rx = spawn_reader(child.stderr.take());

        let deadline = later(Instant::now(), timeout);
        let status = match child.wait_timeout(timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                warn!(
                    "Script exceeded {}ms; killing pid {}",
                    timeout.as_millis(),
                    child.id()
                );
                let _ = child.kill();
                let _ = child.wait();
                debug!("Timed out script:\n{}", script.body());
                return Err(Error::ExecutionTimeout(timeout.as_millis() as u64));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Io(e));
            }
        };

        match writer.join() {
            Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => {
                warn!("Failed to write script to interpreter stdin: {}", e)
            }
            Err(_) => warn!("stdin writer thread panicked"),
            _ => {}
        }

        let drain_until = later(deadline.max(Instant::now()), DRAIN_GRACE);
        let stdout = collect(&stdout_rx, drain_until, timeout)?;
        let stderr = String::from_utf8_lossy(&collect(&stderr_rx, drain_until, timeout)?).into_owned();

        check_script_error(&stderr)?;
        if !status.success() {
            warn!("Interpreter exited with {}", status);
            return Err(Error::ExternalProcessError(format!(
                "interpreter exited with {}: {}",
                status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(stdout)
            .map_err(|e| Error::DecodeError(format!("stdout is not valid UTF-8: {}", e)))?;
        debug!("Script finished: {} bytes stdout, {} bytes stderr", stdout.len(), stderr.len());
        Ok(ScriptOutput { stdout, stderr })
    }
}

// `start + wait`, saturating instead of panicking on overflow.
fn later(start: Instant, wait: Duration) -> Instant {
    start
        .checked_add(wait)
        .or_else(|| start.checked_add(MAX_TIMEOUT))
        .unwrap_or(start)
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let res = match pipe {
            Some(mut p) => p.read_to_end(&mut buf).map(|_| buf),
            None => Ok(buf),
        };
        let _ = tx.send(res);
    });
    rx
}

fn collect(rx: &Receiver<io::Result<Vec<u8>>>, until: Instant, timeout: Duration) -> Result<Vec<u8>> {
    match rx.recv_timeout(until.saturating_duration_since(Instant::now())) {
        Ok(res) => Ok(res?),
        // a grandchild still holds the pipe open
        Err(RecvTimeoutError::Timeout) => Err(Error::ExecutionTimeout(timeout.as_millis() as u64)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(Error::ExternalProcessError("output reader exited without result".into()))
        }
    }
}

fn check_script_error(stderr: &str) -> Result<()> {
    let trimmed = stderr.trim_end();
    let (rest, last) = match trimmed.rsplit_once('\n') {
        Some((rest, last)) => (rest, last),
        None => ("", trimmed),
    };
    if last.trim_start().starts_with(ERROR_MARKER) {
        return Err(Error::ExternalProcessError(format!("{}\n", rest.trim_end())));
    }
    Ok(())
}

/// Text following `RESULT_MARKER` in `stdout`.
pub fn extract_payload(stdout: &str) -> Result<&str> {
    let start = stdout
        .find(RESULT_MARKER)
        .ok_or_else(|| Error::DecodeError("no result marker in script output".into()))?;
    let payload = stdout[start + RESULT_MARKER.len()..].trim();
    if payload.is_empty() {
        return Err(Error::DecodeError("empty result payload".into()));
    }
    Ok(payload)
}

/// Decode the JSON payload of a finished script.
pub fn decode_output<T: DeserializeOwned>(stdout: &str) -> Result<T> {
    let payload = extract_payload(stdout)?;
    serde_json::from_str(payload).map_err(|e| Error::DecodeError(format!("{} in payload {:?}", e, preview(payload))))
}

fn preview(payload: &str) -> String {
    payload.chars().take(120).collect()
}
