//! Plain subprocess execution with piped stdio

use crate::attempt::{
    kill_and_reap, read_some, Attempt, AttemptEnd, InputWriter, DRAIN_TIMEOUT, READ_CHUNK,
};
use crate::command::CommandLine;
use crate::config::ExecConfig;
use crate::events::StreamKind;
use shellgate_core::ProcessSignal;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info};

/// Start `line` with piped stdio, a restricted environment and `cwd`.
///
/// Only authenticated callers are dispatched through `shell -c`.
pub(crate) fn spawn(
    line: &CommandLine,
    cwd: &Path,
    config: &ExecConfig,
    shell_allowed: bool,
) -> io::Result<Child> {
    let mut cmd = if shell_allowed && line.needs_shell() {
        let mut cmd = Command::new(&config.shell);
        cmd.arg("-c").arg(line.as_str());
        cmd
    } else {
        let (program, args) = line
            .argv()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd
    };

    cmd.current_dir(cwd)
        .env_clear()
        .envs(config.child_env())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn()
}

/// Stream output until exit, escalation, cancellation or timeout.
///
/// The grace timer only acts while nothing has been read and the attempt is
/// still the session's active process; the deadline kills in any case but
/// only reports a timeout for a current, uncancelled attempt.
pub(crate) async fn supervise(
    mut child: Child,
    mut attempt: Attempt<'_>,
    timeout: Duration,
    grace: Duration,
) -> AttemptEnd {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut input = child.stdin.take().map(InputWriter::spawn);
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];
    let mut grace_armed = true;
    let mut control_open = true;

    let deadline = tokio::time::sleep(timeout);
    let grace_timer = tokio::time::sleep(grace);
    tokio::pin!(deadline, grace_timer);

    loop {
        tokio::select! {
            n = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => match n {
                Some(n) => {
                    grace_armed = false;
                    attempt.forward(StreamKind::Stdout, &out_buf[..n]);
                }
                None => stdout = None,
            },
            n = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => match n {
                Some(n) => {
                    grace_armed = false;
                    attempt.forward(StreamKind::Stderr, &err_buf[..n]);
                }
                None => stderr = None,
            },
            signal = attempt.control.recv(), if control_open => match signal {
                Some(ProcessSignal::Input(text)) => {
                    if let Some(input) = input.as_mut() {
                        input.push(attempt.conn_id, text);
                    }
                }
                Some(signal) => attempt.stop(&mut child, &signal),
                None => control_open = false,
            },
            status = child.wait() => {
                drain(&mut stdout, &mut stderr, &attempt).await;
                return attempt.finish(status);
            }
            _ = &mut grace_timer, if grace_armed => {
                grace_armed = false;
                if !attempt.cancelled && attempt.is_current() {
                    info!(
                        conn_id = %attempt.conn_id,
                        pid = %attempt.pid,
                        grace_ms = grace.as_millis() as u64,
                        "No output within grace period, re-running under PTY"
                    );
                    kill_and_reap(&mut child).await;
                    return AttemptEnd::Escalate;
                }
            }
            _ = &mut deadline => {
                debug!(conn_id = %attempt.conn_id, pid = %attempt.pid, "Kill-timeout reached");
                kill_and_reap(&mut child).await;
                return attempt.expired();
            }
        }
    }
}

async fn drain(
    stdout: &mut Option<ChildStdout>,
    stderr: &mut Option<ChildStderr>,
    attempt: &Attempt<'_>,
) {
    let mut out_buf = [0u8; READ_CHUNK];
    let mut err_buf = [0u8; READ_CHUNK];
    let _ = tokio::time::timeout(DRAIN_TIMEOUT, async {
        loop {
            tokio::select! {
                n = read_some(stdout, &mut out_buf), if stdout.is_some() => match n {
                    Some(n) => { attempt.forward(StreamKind::Stdout, &out_buf[..n]); }
                    None => *stdout = None,
                },
                n = read_some(stderr, &mut err_buf), if stderr.is_some() => match n {
                    Some(n) => { attempt.forward(StreamKind::Stderr, &err_buf[..n]); }
                    None => *stderr = None,
                },
                else => break,
            }
        }
    })
    .await;
}
