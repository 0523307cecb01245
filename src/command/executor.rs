//! External control-utility invocation
//!
//! Every [`MonitorCommandExecutor::execute`] call launches the configured
//! program exactly once with the operations for all devices. Execution is
//! best-effort: failures are logged and reported, never retried and never
//! returned as errors to the caller.
//!
//! Cancellation stops *waiting* for the child; the child itself is not killed
//! and may still finish applying its values after shutdown.

use super::payload::CommandPayload;
use super::translator::{build_operations, CommandLine};
use super::ApplyCommand;
use crate::config::DeviceTarget;
use crate::shutdown::ShutdownSignal;
use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, Instrument};

/// Process execution errors
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed while waiting for the process: {0}")]
    Wait(#[source] std::io::Error),
    #[error("Process exited with {}", describe_code(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("Execution cancelled")]
    Cancelled,
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Outcome of a single execute call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionReport {
    /// Process exited successfully
    Succeeded { elapsed: Duration },
    /// Process ran but reported failure
    Failed { code: Option<i32> },
    /// Process could not be started
    SpawnFailed,
    /// Shutdown interrupted the wait (or preceded the spawn)
    Cancelled,
    /// No devices configured, nothing launched
    Skipped,
}

/// Translates commands into control-utility invocations
pub struct MonitorCommandExecutor {
    program: String,
    devices: Arc<[DeviceTarget]>,
    shutdown: ShutdownSignal,
}

impl MonitorCommandExecutor {
    pub fn new(
        program: impl Into<String>,
        devices: Arc<[DeviceTarget]>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            program: program.into(),
            devices,
            shutdown,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the invocation for `payload` without running it (pure)
    pub fn command_line(&self, payload: &CommandPayload) -> CommandLine {
        let operations = build_operations(&self.devices, payload);
        CommandLine::from_operations(&self.program, &operations)
    }

    /// Run the control utility once for `payload`
    pub async fn execute(&self, payload: &CommandPayload) -> ExecutionReport {
        let line = self.command_line(payload);
        let span = crate::command_span!(
            brightness = payload.brightness().value(),
            color = payload.color().value(),
            operations = line.arguments.len() / 4
        );

        async move {
            if line.arguments.is_empty() {
                debug!("No monitors configured, nothing to execute");
                return ExecutionReport::Skipped;
            }

            debug!("Executing command: {}", line);
            let started = Instant::now();

            match self.run(&line).await {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    debug!("Command executed in {}ms", elapsed.as_millis());
                    ExecutionReport::Succeeded { elapsed }
                }
                Err(ExecutionError::Cancelled) => {
                    info!("Command execution cancelled");
                    ExecutionReport::Cancelled
                }
                Err(e @ ExecutionError::Spawn { .. }) => {
                    error!("Error while executing commands: {}", e);
                    ExecutionReport::SpawnFailed
                }
                Err(ExecutionError::NonZeroExit { code, stderr }) => {
                    error!(
                        "Command failed with {}: {}",
                        describe_code(&code),
                        stderr.trim()
                    );
                    ExecutionReport::Failed { code }
                }
                Err(e @ ExecutionError::Wait(_)) => {
                    error!("Error while executing commands: {}", e);
                    ExecutionReport::Failed { code: None }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Spawn the process and wait for it, honouring shutdown
    async fn run(&self, line: &CommandLine) -> Result<(), ExecutionError> {
        if self.shutdown.is_requested() {
            return Err(ExecutionError::Cancelled);
        }

        let mut command = Command::new(&line.program);
        command
            .args(&line.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let child = command.spawn().map_err(|source| ExecutionError::Spawn {
            program: line.program.clone(),
            source,
        })?;

        let mut shutdown = self.shutdown.clone();
        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(ExecutionError::Wait)?,
            _ = shutdown.requested() => return Err(ExecutionError::Cancelled),
        };

        Self::check_output(output)
    }

    fn check_output(output: Output) -> Result<(), ExecutionError> {
        if !output.stdout.is_empty() {
            debug!(
                "Command output: {}",
                String::from_utf8_lossy(&output.stdout).trim()
            );
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(ExecutionError::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

#[async_trait]
impl ApplyCommand for MonitorCommandExecutor {
    async fn apply(&self, payload: CommandPayload) {
        self.execute(&payload).await;
    }
}
