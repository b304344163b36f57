//! Pseudo-terminal execution for commands that wait on a tty

use crate::attempt::{
    kill_and_reap, read_some, Attempt, AttemptEnd, InputWriter, DRAIN_TIMEOUT, READ_CHUNK,
};
use crate::command::CommandLine;
use crate::config::ExecConfig;
use crate::events::{ExecEvent, StreamKind};
use shellgate_core::ProcessSignal;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::process::Child;
use tracing::debug;

/// Trailing characters treated as an input prompt.
const PROMPT_MARKERS: &[char] = &[':', '$', '#'];

/// Whether a chunk ends like a prompt (`Password:`, `$ `, `# `).
///
/// False positives: any output line ending in one of the markers.
/// False negatives: prompts ending in anything else, or prompts split so the
/// marker is not in the last chunk.
pub fn looks_like_prompt(chunk: &str) -> bool {
    chunk
        .trim_end()
        .chars()
        .last()
        .is_some_and(|c| PROMPT_MARKERS.contains(&c))
}

/// Start `line` attached to a fresh PTY.
///
/// Authenticated callers run through `shell -c`; guests get the argv vector
/// directly, so a PTY re-run never hands a guest string to the shell.
pub(crate) fn spawn(
    line: &CommandLine,
    cwd: &Path,
    config: &ExecConfig,
    shell_allowed: bool,
) -> io::Result<(Child, pty_process::Pty)> {
    // Builder methods consume self
    let mut cmd = if shell_allowed {
        pty_process::Command::new(&config.shell).args(["-c", line.as_str()])
    } else {
        let (program, args) = line
            .argv()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        pty_process::Command::new(program).args(args)
    };
    cmd = cmd.env_clear();
    for (key, value) in config.child_env() {
        cmd = cmd.env(key, value);
    }
    cmd = cmd.env("TERM", "xterm-256color").current_dir(cwd);

    let (pty, pts) = pty_process::open().map_err(io::Error::other)?;
    let child = cmd.spawn(pts).map_err(io::Error::other)?;
    Ok((child, pty))
}

/// Stream PTY output until exit, cancellation or timeout.
pub(crate) async fn supervise(
    mut child: Child,
    pty: pty_process::Pty,
    mut attempt: Attempt<'_>,
    timeout: Duration,
) -> AttemptEnd {
    let (reader, writer) = tokio::io::split(pty);
    let mut reader = Some(reader);
    let mut input = InputWriter::spawn(writer);
    let mut buf = [0u8; READ_CHUNK];
    let mut control_open = true;

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            n = read_some(&mut reader, &mut buf), if reader.is_some() => match n {
                Some(n) => forward(&attempt, &buf[..n]),
                // EIO once the child side closes
                None => reader = None,
            },
            signal = attempt.control.recv(), if control_open => match signal {
                Some(ProcessSignal::Input(text)) => input.push(attempt.conn_id, text),
                Some(signal) => attempt.stop(&mut child, &signal),
                None => control_open = false,
            },
            status = child.wait() => {
                drain(&mut reader, &attempt).await;
                return attempt.finish(status);
            }
            _ = &mut deadline => {
                debug!(conn_id = %attempt.conn_id, pid = %attempt.pid, "PTY kill-timeout reached");
                kill_and_reap(&mut child).await;
                return attempt.expired();
            }
        }
    }
}

fn forward(attempt: &Attempt<'_>, bytes: &[u8]) {
    if let Some(chunk) = attempt.forward(StreamKind::Stdout, bytes) {
        if looks_like_prompt(&chunk) {
            attempt.sink.emit(ExecEvent::PtyInputReady);
        }
    }
}

async fn drain<R: tokio::io::AsyncRead + Unpin>(reader: &mut Option<R>, attempt: &Attempt<'_>) {
    let mut buf = [0u8; READ_CHUNK];
    let _ = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(n) = read_some(reader, &mut buf).await {
            forward(attempt, &buf[..n]);
        }
    })
    .await;
}
