//! Host command seam.
//!
//! Mounting GlusterFS, attaching loop devices and formatting backing files
//! are done by external utilities. The driver only sees them through
//! [`Host`]: a program name and arguments in, exit status and output back.
//! [`SystemHost`] runs the real commands.

use std::fmt;
use std::io;

use async_trait::async_trait;
use tokio::process::Command;

use crate::constants::MOUNT_TABLE;

/// Captured result of a host command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Trimmed stderr, falling back to stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "exit code {code}: {}", self.diagnostic()),
            None => write!(f, "terminated by signal: {}", self.diagnostic()),
        }
    }
}

/// OS collaborator interface.
#[async_trait]
pub trait Host: Send + Sync + fmt::Debug {
    /// Run `program` with `args` and capture its output.
    ///
    /// An `Err` means the program could not be started at all; a non-zero
    /// exit is reported through [`CommandOutput::status`].
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput>;

    /// Contents of the mount table in `/proc/self/mounts` format.
    async fn mount_table(&self) -> io::Result<String>;
}

/// [`Host`] backed by real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

#[async_trait]
impl Host for SystemHost {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<CommandOutput> {
        tracing::trace!(program, ?args, "Running host command");
        let output = Command::new(program)
            .args(args)
            .output()
            .await?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn mount_table(&self) -> io::Result<String> {
        tokio::fs::read_to_string(MOUNT_TABLE).await
    }
}
