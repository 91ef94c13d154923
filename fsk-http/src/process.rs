use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    process::Command,
};
use tracing::{debug, warn};

/// Captured result of a child that ran to completion.
#[derive(Clone, Debug)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug)]
pub enum ProcessError {
    /// The binary could not be started (missing, not executable, ...).
    Launch { program: PathBuf, source: io::Error },
    /// The child was killed after exceeding its deadline.
    Timeout { program: PathBuf, limit: Duration },
    /// Pipe I/O with a running child failed.
    Io { program: PathBuf, source: io::Error },
}

impl std::fmt::Display for ProcessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessError::Launch { program, source } => {
                write!(f, "failed to launch {}: {source}", program.display())
            }
            ProcessError::Timeout { program, limit } => write!(
                f,
                "{} did not finish within {:.3}s",
                program.display(),
                limit.as_secs_f64()
            ),
            ProcessError::Io { program, source } => {
                write!(f, "i/o error talking to {}: {source}", program.display())
            }
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::Launch { source, .. } | ProcessError::Io { source, .. } => Some(source),
            ProcessError::Timeout { .. } => None,
        }
    }
}

/// Runs external binaries as isolated children under a wall-clock limit.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Executes `program` with `args`, writing `input` to its stdin when
    /// given. On expiry the child is killed and reaped before returning.
    pub async fn run(
        &self,
        program: &Path,
        args: &[OsString],
        input: Option<&[u8]>,
    ) -> Result<ProcessOutput, ProcessError> {
        let started = Instant::now();
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            "spawning {} with {} args (stdin {} bytes)",
            program.display(),
            args.len(),
            input.map(<[u8]>::len).unwrap_or(0)
        );
        let mut child = command.spawn().map_err(|source| ProcessError::Launch {
            program: program.to_path_buf(),
            source,
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let completed = tokio::time::timeout(self.timeout, async {
            let (fed, status, stdout, stderr) = tokio::join!(
                feed_stdin(stdin, input),
                child.wait(),
                read_stream(stdout),
                read_stream(stderr),
            );
            fed?;
            Ok::<_, io::Error>((status?, stdout?, stderr?))
        })
        .await;

        match completed {
            Ok(Ok((status, stdout, stderr))) => Ok(ProcessOutput {
                exit_code: status.code(),
                stdout,
                stderr,
                elapsed: started.elapsed(),
            }),
            Ok(Err(source)) => {
                terminate(&mut child, program).await;
                Err(ProcessError::Io {
                    program: program.to_path_buf(),
                    source,
                })
            }
            Err(_) => {
                warn!(
                    "{} exceeded {:.3}s deadline; killing child",
                    program.display(),
                    self.timeout.as_secs_f64()
                );
                terminate(&mut child, program).await;
                Err(ProcessError::Timeout {
                    program: program.to_path_buf(),
                    limit: self.timeout,
                })
            }
        }
    }
}

async fn terminate(child: &mut tokio::process::Child, program: &Path) {
    // kill() also waits, so the child is reaped here rather than left a zombie.
    if let Err(err) = child.kill().await {
        warn!("failed to kill {}: {err}", program.display());
    }
}

async fn feed_stdin(
    stdin: Option<tokio::process::ChildStdin>,
    input: Option<&[u8]>,
) -> io::Result<()> {
    let (Some(mut stdin), Some(input)) = (stdin, input) else {
        return Ok(());
    };
    let result = async {
        stdin.write_all(input).await?;
        stdin.shutdown().await
    }
    .await;
    match result {
        // The child may legitimately exit without draining stdin.
        Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}
