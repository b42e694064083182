//! Per-device command submission thread.

use basalt_core::{Command, Completion, Error, Fence, FenceSignal, Result};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Executes recorded command lists. Runs on the submission thread.
pub(crate) trait CommandExecutor: Send + Sync + 'static {
    fn execute(&self, commands: Vec<Command>) -> Result<Completion>;
}

struct Job {
    commands: Vec<Command>,
    signal: FenceSignal,
}

/// Single worker thread executing submissions in order.
///
/// Dropping the queue drains pending submissions and joins the thread.
pub(crate) struct SubmissionQueue {
    sender: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl SubmissionQueue {
    pub(crate) fn spawn(name: &str, executor: Arc<dyn CommandExecutor>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker = std::thread::Builder::new()
            .name(format!("{name}-submit"))
            .spawn(move || {
                for job in receiver {
                    let count = job.commands.len();
                    let result = executor.execute(job.commands);
                    if let Err(e) = &result {
                        tracing::debug!(commands = count, "submission failed: {e}");
                    }
                    job.signal.signal(result);
                }
            })
            .map_err(|e| Error::Device(format!("failed to start submission thread: {e}")))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub(crate) fn submit(&self, commands: Vec<Command>) -> Result<Fence> {
        let (signal, fence) = Fence::channel();
        tracing::debug!(commands = commands.len(), "submitting");
        self.sender
            .as_ref()
            .ok_or_else(|| Error::Device("submission queue is shut down".to_string()))?
            .send(Job { commands, signal })
            .map_err(|_| Error::Device("submission thread exited".to_string()))?;
        Ok(fence)
    }
}

impl Drop for SubmissionQueue {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("submission thread panicked");
            }
        }
    }
}
