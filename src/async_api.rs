use crate::runner::ScriptRunner;
use crate::script::Script;
use crate::{Error, Result, RunnerConfig};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

enum Command {
    Execute(Script, Duration, oneshot::Sender<Result<String>>),
    ExecuteJson(Script, Duration, oneshot::Sender<Result<serde_json::Value>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly script bridge backed by a dedicated worker thread.
///
/// The worker thread owns a `ScriptRunner` and executes commands sent from
/// async tasks one at a time, in the order they were sent. Clones share the
/// same worker.
#[derive(Clone)]
pub struct AsyncBridge {
    cmd_tx: Sender<Command>,
}

impl AsyncBridge {
    /// Create a new bridge (spawns a background thread that owns the runner).
    ///
    /// Fails only when the worker thread cannot be spawned.
    pub fn new(config: Option<RunnerConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

        thread::Builder::new()
            .name("xcfbridge-worker".into())
            .spawn(move || {
                let runner = ScriptRunner::new(config);

                while let Ok(cmd) = cmd_rx.recv() {
                    match cmd {
                        Command::Execute(script, timeout, resp) => {
                            let res = runner.execute(&script, timeout);
                            let _ = resp.send(res);
                        }
                        Command::ExecuteJson(script, timeout, resp) => {
                            let res = runner.execute_json(&script, timeout);
                            let _ = resp.send(res);
                        }
                        Command::Close(resp) => {
                            log::debug!("Async bridge worker shutting down");
                            let _ = resp.send(Ok(()));
                            break;
                        }
                    }
                }
            })?;

        Ok(Self { cmd_tx })
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| Error::ExternalProcessError("bridge worker has shut down".into()))
    }

    /// Execute a script and return its raw stdout
    pub async fn execute(&self, script: Script, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Execute(script, timeout, tx))?;
        rx.await
            .map_err(|e| Error::ExternalProcessError(format!("Execute canceled: {}", e)))?
    }

    /// Execute a script and decode the JSON after the result marker
    pub async fn execute_json(&self, script: Script, timeout: Duration) -> Result<serde_json::Value> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ExecuteJson(script, timeout, tx))?;
        rx.await
            .map_err(|e| Error::ExternalProcessError(format!("ExecuteJson canceled: {}", e)))?
    }

    /// Shutdown the background worker. Requests queued before this one still run.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Close(tx))?;
        rx.await
            .map_err(|e| Error::ExternalProcessError(format!("Close canceled: {}", e)))?
    }
}
