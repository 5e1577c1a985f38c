//! Starting a child and pumping its output

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ProcessError, Result};
use crate::options::{CreateOptions, OutputWriter, ResolvedCommand};

/// How long the pumps get to flush after the child exits. Grandchildren
/// that inherited the pipes can otherwise hold them open indefinitely.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A started child and the tasks copying its output.
pub(crate) struct Spawned {
    pub child: Child,
    pub pid: i32,
    pumps: Vec<JoinHandle<()>>,
}

impl Spawned {
    /// Wait for the pumps to finish, abandoning them after a grace period.
    pub async fn drain(&mut self) {
        let pumps = std::mem::take(&mut self.pumps);
        let aborts: Vec<_> = pumps.iter().map(JoinHandle::abort_handle).collect();

        let drained = tokio::time::timeout(PUMP_DRAIN_TIMEOUT, async {
            for pump in pumps {
                let _ = pump.await;
            }
        })
        .await;

        if drained.is_err() {
            debug!(pid = self.pid, "Output pumps still open after exit, abandoning");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

/// Start the process described by `opts`.
pub(crate) fn spawn(ctx: &CancellationToken, opts: &CreateOptions) -> Result<Spawned> {
    if ctx.is_cancelled() {
        return Err(ProcessError::Canceled);
    }

    let ResolvedCommand {
        mut command,
        stdout,
        stderr,
        stdin,
    } = opts.resolve()?;

    debug!(args = ?opts.args, "Spawning process");
    let mut child = command.spawn().map_err(ProcessError::SpawnFailed)?;
    let pid = match child.id() {
        Some(pid) => pid as i32,
        None => {
            return Err(ProcessError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::Other,
                "process exited before its pid could be read",
            )))
        }
    };

    let mut pumps = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
        pumps.push(tokio::spawn(pump(out, stdout)));
    }
    if let Some(err) = child.stderr.take() {
        pumps.push(tokio::spawn(pump(err, stderr)));
    }

    if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), stdin) {
        tokio::spawn(async move {
            if let Err(e) = pipe.write_all(&bytes).await {
                warn!(pid, error = %e, "Failed to write standard input");
            }
            // dropping the pipe closes the child's stdin
        });
    }

    info!(pid, command = %opts.args[0], "Process spawned");

    Ok(Spawned { child, pid, pumps })
}

async fn pump<R>(reader: R, writer: OutputWriter)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                if let Err(e) = writer.write(&line) {
                    debug!(error = %e, "Output sink rejected a write");
                }
            }
            Err(e) => {
                debug!(error = %e, "Output pipe read failed");
                break;
            }
        }
    }

    if let Err(e) = writer.flush() {
        debug!(error = %e, "Output sink flush failed");
    }
}
