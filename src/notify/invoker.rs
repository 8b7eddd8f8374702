//! External notifier invocation.

use crate::error::InvokeError;
use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Runs the external notifier once per fired request.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Runs `program` with `args`, returning its standard output.
    ///
    /// # Errors
    /// Spawn failures, a non-zero exit status and overrunning `timeout` are
    /// all reported as [`InvokeError`].
    async fn invoke(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<Vec<u8>, InvokeError>;
}

/// Invoker backed by a child process.
///
/// The child is killed when the timeout expires.
#[derive(Debug, Default, Clone)]
pub struct CommandInvoker;

impl CommandInvoker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Invoker for CommandInvoker {
    async fn invoke(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<Vec<u8>, InvokeError> {
        debug!("Running {} with {} arguments", program, args.len());
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(InvokeError::Timeout(timeout)),
        };

        if !output.status.success() {
            return Err(InvokeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}
