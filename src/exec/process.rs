// src/exec/process.rs

//! External process invocation.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Future returned by [`ProcessLauncher::launch`].
///
/// `Ok(code)` means the program ran and exited with `code`; `Err` means it
/// could not be started (missing binary, permissions, OS failure).
pub type LaunchFuture<'a> = Pin<Box<dyn Future<Output = std::io::Result<i32>> + Send + 'a>>;

/// Trait abstracting how an external program is run.
///
/// Production code uses [`TokioProcessLauncher`]; tests provide scripted
/// launchers that never spawn real processes.
pub trait ProcessLauncher: Send + Sync + Debug {
    /// Run `program` with `args` (in this order) and wait for it to exit.
    ///
    /// Dropping the returned future must stop the program.
    fn launch<'a>(&'a self, program: &'a str, args: &'a [String]) -> LaunchFuture<'a>;
}

/// Runs programs with `tokio::process`, streaming their output to the log.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessLauncher;

impl ProcessLauncher for TokioProcessLauncher {
    fn launch<'a>(&'a self, program: &'a str, args: &'a [String]) -> LaunchFuture<'a> {
        Box::pin(async move {
            let mut cmd = Command::new(program);
            cmd.args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                // A cancelled pipeline drops this future; the child goes with it.
                .kill_on_drop(true);

            let mut child = cmd.spawn()?;
            let pid = child.id();
            debug!(program, ?pid, "spawned process");

            if let Some(stdout) = child.stdout.take() {
                let name = program.to_string();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        info!(program = %name, "stdout: {}", line);
                    }
                });
            }

            // Always consume stderr so buffers don't fill; log at debug.
            if let Some(stderr) = child.stderr.take() {
                let name = program.to_string();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        debug!(program = %name, "stderr: {}", line);
                    }
                });
            }

            let status = child.wait().await?;
            Ok(exit_code(status))
        })
    }
}

/// Exit code of a finished process. Processes killed by a signal report
/// `128 + signal`, as shells do.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
