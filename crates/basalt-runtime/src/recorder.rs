//! Command recording.

use basalt_core::{
    Accelerator, BindingTable, BufferBinding, Command, Completion, Error, GraphHandle, Result,
};
use std::time::Duration;

/// Collects the commands of one submission in execution order.
///
/// Holds no device state; the same recorder type serves every device.
#[derive(Debug, Default)]
pub(crate) struct CommandRecorder {
    commands: Vec<Command>,
    readbacks: usize,
}

impl CommandRecorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn upload(&mut self, dst: BufferBinding, data: &[u8]) {
        self.commands.push(Command::Upload {
            dst,
            data: data.to_vec(),
        });
    }

    pub(crate) fn initialize(&mut self, graph: GraphHandle, bindings: &BindingTable) {
        self.commands.push(Command::Initialize {
            graph,
            bindings: bindings.clone(),
        });
    }

    pub(crate) fn dispatch(&mut self, graph: GraphHandle, bindings: &BindingTable) {
        self.commands.push(Command::Dispatch {
            graph,
            bindings: bindings.clone(),
        });
    }

    pub(crate) fn readback(&mut self, src: BufferBinding) {
        self.commands.push(Command::Readback { src });
        self.readbacks += 1;
    }

    /// Submit the recorded commands and block until they complete.
    ///
    /// An expired `timeout` is reported as `DeviceHang`.
    pub(crate) fn submit_and_wait(
        self,
        device: &dyn Accelerator,
        timeout: Option<Duration>,
    ) -> Result<Completion> {
        tracing::trace!(commands = self.commands.len(), "recorded submission");
        let completion = device.submit(self.commands)?.wait(timeout)?;
        if completion.readbacks.len() != self.readbacks {
            return Err(Error::Device(format!(
                "expected {} readbacks, device returned {}",
                self.readbacks,
                completion.readbacks.len()
            )));
        }
        Ok(completion)
    }
}
