//! External process execution
//!
//! Every interaction with the filesystem goes through an external program.
//! [`CommandRunner`] is the seam between the invokers and the OS so the
//! argument marshaling can be exercised without the real binaries.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::CsiError;

/// Captured result of a finished process
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, decoded lossily
    pub fn combined(&self) -> String {
        let mut out = String::from_utf8_lossy(&self.stdout).into_owned();
        out.push_str(&String::from_utf8_lossy(&self.stderr));
        out
    }

    /// Human-readable exit status
    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs an external program to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput>;
}

/// Runner backed by real OS processes
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput> {
        let output = Command::new(program).args(args).output().await?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Run a program and turn spawn failures or non-zero exits into internal errors.
///
/// `what` names the operation in the error message, e.g. `curvefs_tool create-fs`.
/// Secret flags are masked in the message.
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    what: &str,
    program: &Path,
    args: &[String],
) -> Result<CommandOutput, CsiError> {
    let output = runner.run(program, args).await.map_err(|e| {
        CsiError::internal(format!(
            "{} failed. cmd: {} {:?}, output: , err: {}",
            what,
            program.display(),
            redact(args),
            e
        ))
    })?;

    if !output.success() {
        return Err(CsiError::internal(format!(
            "{} failed. cmd: {} {:?}, output: {}, err: {}",
            what,
            program.display(),
            redact(args),
            output.combined(),
            output.status_text()
        )));
    }

    Ok(output)
}

/// Copy of `args` with secret values masked, for logging
pub(crate) fn redact(args: &[String]) -> Vec<String> {
    const SECRET_FLAGS: [&str; 2] = ["-s3_ak=", "-s3_sk="];
    args.iter()
        .map(|arg| match SECRET_FLAGS.iter().find(|f| arg.starts_with(*f)) {
            Some(flag) => format!("{}***", flag),
            None => arg.clone(),
        })
        .collect()
}
