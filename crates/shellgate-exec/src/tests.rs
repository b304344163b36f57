use super::*;
use shellgate_core::{ProcessHandle, ProcessMode, SessionConfig, SessionRegistry};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const CONN: &str = "conn-test";

fn setup(config: ExecConfig, cwd: PathBuf) -> (CommandRunner, Arc<SessionRegistry>) {
    let sessions = Arc::new(SessionRegistry::new(SessionConfig::default()));
    sessions.create(CONN, IpAddr::V4(Ipv4Addr::LOCALHOST), cwd);
    (CommandRunner::new(config, Arc::clone(&sessions)), sessions)
}

fn default_setup() -> (CommandRunner, Arc<SessionRegistry>) {
    setup(ExecConfig::default(), PathBuf::from("/tmp"))
}

fn count(sink: &RecordingSink, pred: impl Fn(&ExecEvent) -> bool) -> usize {
    sink.events().iter().filter(|e| pred(e)).count()
}

fn completions(sink: &RecordingSink) -> usize {
    count(sink, |e| matches!(e, ExecEvent::Complete { .. }))
}

fn pty_starts(sink: &RecordingSink) -> usize {
    count(sink, |e| matches!(e, ExecEvent::PtyStarted))
}

async fn wait_for_process(sessions: &SessionRegistry) {
    for _ in 0..100 {
        if sessions.active_process(CONN).is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("process never attached");
}

// ── Streaming and completion ─────────────────────────────────────────────

#[tokio::test]
async fn test_echo_streams_and_completes_once() {
    let (runner, sessions) = default_setup();
    let sink = Arc::new(RecordingSink::new());

    let outcome = runner
        .execute(CONN, "echo hello", true, sink.clone())
        .await
        .unwrap();

    assert_eq!(outcome, ExecOutcome::Completed { exit_code: Some(0) });
    assert!(sink.output(StreamKind::Stdout).contains("hello"));
    assert_eq!(completions(&sink), 1);
    assert_eq!(pty_starts(&sink), 0);
    assert!(sessions.active_process(CONN).is_none());
}

#[tokio::test]
async fn test_stderr_and_exit_code() {
    let (runner, _sessions) = default_setup();
    let sink = Arc::new(RecordingSink::new());

    let outcome = runner
        .execute(CONN, "ls /definitely/not/here", true, sink.clone())
        .await
        .unwrap();

    assert!(matches!(outcome, ExecOutcome::Completed { exit_code: Some(code) } if code != 0));
    assert!(!sink.output(StreamKind::Stderr).is_empty());
    let last = sink.events().pop().unwrap();
    assert!(matches!(last, ExecEvent::Complete { success: false, .. }));
}

#[tokio::test]
async fn test_metacharacters_dispatch_through_shell() {
    let (runner, _sessions) = default_setup();
    let sink = Arc::new(RecordingSink::new());

    runner
        .execute(CONN, "echo abc | tr a z", true, sink.clone())
        .await
        .unwrap();

    assert!(sink.output(StreamKind::Stdout).contains("zbc"));
}

#[tokio::test]
async fn test_runs_in_session_directory_with_restricted_env() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, _sessions) = setup(ExecConfig::default(), dir.path().to_path_buf());
    let sink = Arc::new(RecordingSink::new());

    runner
        .execute(CONN, "pwd", true, sink.clone())
        .await
        .unwrap();
    assert!(sink.output(StreamKind::Stdout).contains(dir.path().to_str().unwrap()));

    let sink = Arc::new(RecordingSink::new());
    runner
        .execute(CONN, "printenv USER", true, sink.clone())
        .await
        .unwrap();
    assert_eq!(sink.output(StreamKind::Stdout).trim(), "webshell");
}

// ── Policy ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_guest_denied_never_spawns() {
    let (runner, sessions) = default_setup();
    let sink = Arc::new(RecordingSink::new());

    let err = runner
        .execute(CONN, "rm -rf /", false, sink.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Denied { .. }));
    assert!(sink.events().is_empty());
    assert!(sessions.active_process(CONN).is_none());

    let err = runner
        .execute(CONN, "ls; whoami", false, sink.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Denied { .. }));
}

#[tokio::test]
async fn test_guest_line_break_denied_before_spawn() {
    let (runner, sessions) = default_setup();
    let sink = Arc::new(RecordingSink::new());

    let err = runner
        .execute(CONN, "session\nid", false, sink.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Denied { .. }));
    assert!(sink.events().is_empty());
    assert!(sessions.active_process(CONN).is_none());
}

#[tokio::test]
async fn test_guest_pty_retry_never_uses_shell() {
    let config = ExecConfig {
        guest_commands: vec!["definitely-not-a-command-xyz".to_string()],
        ..ExecConfig::default()
    };
    let (runner, sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());

    // Through `shell -c` this would complete with 127 and a shell error message
    let err = runner
        .execute(CONN, "definitely-not-a-command-xyz --flag", false, sink.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::SpawnFailed(_)));
    assert!(sink.output(StreamKind::Stdout).is_empty());
    assert_eq!(completions(&sink), 0);
    assert!(sessions.active_process(CONN).is_none());
}

#[tokio::test]
async fn test_guest_allowlisted_runs() {
    let (runner, _sessions) = default_setup();
    let sink = Arc::new(RecordingSink::new());

    let outcome = runner
        .execute(CONN, "echo guest", false, sink.clone())
        .await
        .unwrap();
    assert_eq!(outcome, ExecOutcome::Completed { exit_code: Some(0) });
}

#[tokio::test]
async fn test_busy_session_rejected() {
    let (runner, sessions) = default_setup();
    let (handle, _rx) = ProcessHandle::new(ProcessMode::Plain);
    sessions.attach_process(CONN, handle).unwrap();

    let err = runner
        .execute(CONN, "echo hi", true, Arc::new(RecordingSink::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Busy));
}

#[tokio::test]
async fn test_missing_session() {
    let (runner, _sessions) = default_setup();
    let err = runner
        .execute("ghost", "echo hi", true, Arc::new(RecordingSink::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::SessionNotFound));
}

// ── Builtins ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cd_updates_directory() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir(root.path().join("work")).unwrap();
    let (runner, sessions) = setup(ExecConfig::default(), root.path().to_path_buf());
    let sink = Arc::new(RecordingSink::new());

    let outcome = runner.execute(CONN, "cd work", true, sink.clone()).await.unwrap();

    let expected = root.path().join("work");
    assert_eq!(
        outcome,
        ExecOutcome::Builtin {
            output: format!("Changed directory to: {}", expected.display())
        }
    );
    assert_eq!(sessions.directory(CONN).unwrap(), expected);
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_cd_missing_leaves_directory_unchanged() {
    let root = tempfile::tempdir().unwrap();
    let (runner, sessions) = setup(ExecConfig::default(), root.path().to_path_buf());

    let err = runner
        .execute(CONN, "cd missing", true, Arc::new(RecordingSink::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Builtin(ref msg) if msg.contains("No such file or directory")));
    assert_eq!(sessions.directory(CONN).unwrap(), root.path());
}

// ── Escalation, timeout, cancellation ────────────────────────────────────

#[tokio::test]
async fn test_silent_process_escalates_once() {
    let config = ExecConfig {
        pty_grace_ms: 100,
        ..ExecConfig::default()
    };
    let (runner, sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());

    let outcome = runner
        .execute(CONN, "sleep 1", true, sink.clone())
        .await
        .unwrap();

    assert_eq!(outcome, ExecOutcome::Completed { exit_code: Some(0) });
    assert_eq!(pty_starts(&sink), 1);
    assert_eq!(completions(&sink), 1);
    assert!(sessions.active_process(CONN).is_none());
}

#[tokio::test]
async fn test_spawn_failure_retried_under_pty() {
    let (runner, _sessions) = default_setup();
    let sink = Arc::new(RecordingSink::new());

    let outcome = runner
        .execute(CONN, "definitely-not-a-command-xyz", true, sink.clone())
        .await
        .unwrap();

    assert_eq!(outcome, ExecOutcome::Completed { exit_code: Some(127) });
    assert_eq!(pty_starts(&sink), 1);
    assert_eq!(completions(&sink), 1);
}

#[tokio::test]
async fn test_timeout_kills_without_completion() {
    let config = ExecConfig {
        command_timeout_secs: 1,
        pty_grace_ms: 10_000,
        ..ExecConfig::default()
    };
    let (runner, sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());

    let err = runner
        .execute(CONN, "sleep 10", true, sink.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Timeout(1)));
    assert_eq!(err.to_string(), "Command timed out (1s)");
    assert_eq!(completions(&sink), 0);
    assert!(sessions.active_process(CONN).is_none());
}

#[tokio::test]
async fn test_timeout_applies_to_pty_attempt() {
    let config = ExecConfig {
        command_timeout_secs: 1,
        pty_grace_ms: 100,
        ..ExecConfig::default()
    };
    let (runner, _sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());

    let err = runner
        .execute(CONN, "sleep 10", true, sink.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Timeout(1)));
    assert_eq!(pty_starts(&sink), 1);
    assert_eq!(completions(&sink), 0);
}

#[tokio::test]
async fn test_cancel_terminates_without_completion() {
    let config = ExecConfig {
        pty_grace_ms: 10_000,
        ..ExecConfig::default()
    };
    let (runner, sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());

    let task = {
        let runner = runner.clone();
        let sink: Arc<dyn ExecSink> = sink.clone();
        tokio::spawn(async move { runner.execute(CONN, "sleep 10", true, sink).await })
    };

    wait_for_process(&sessions).await;
    assert!(runner.cancel(CONN));
    assert!(!runner.cancel(CONN));

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ExecOutcome::Cancelled);
    assert_eq!(completions(&sink), 0);
    assert!(sessions.active_process(CONN).is_none());
}

#[tokio::test]
async fn test_input_reaches_plain_process() {
    let config = ExecConfig {
        pty_grace_ms: 10_000,
        ..ExecConfig::default()
    };
    let (runner, sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());

    assert!(!runner.send_input(CONN, "too early"));

    let task = {
        let runner = runner.clone();
        let sink: Arc<dyn ExecSink> = sink.clone();
        tokio::spawn(async move { runner.execute(CONN, "head -n 1", true, sink).await })
    };

    wait_for_process(&sessions).await;
    assert!(runner.send_input(CONN, "from the client"));

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ExecOutcome::Completed { exit_code: Some(0) });
    assert!(sink.output(StreamKind::Stdout).contains("from the client"));
}

#[tokio::test]
async fn test_deleting_session_kills_process() {
    let config = ExecConfig {
        pty_grace_ms: 10_000,
        ..ExecConfig::default()
    };
    let (runner, sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());

    let task = {
        let runner = runner.clone();
        let sink: Arc<dyn ExecSink> = sink.clone();
        tokio::spawn(async move { runner.execute(CONN, "sleep 10", true, sink).await })
    };

    wait_for_process(&sessions).await;
    assert!(sessions.delete(CONN));

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ExecOutcome::Cancelled);
    assert_eq!(completions(&sink), 0);
}

#[tokio::test]
async fn test_unread_input_does_not_block_timeout() {
    let config = ExecConfig {
        command_timeout_secs: 2,
        pty_grace_ms: 10_000,
        ..ExecConfig::default()
    };
    let (runner, sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());

    let task = {
        let runner = runner.clone();
        let sink: Arc<dyn ExecSink> = sink.clone();
        tokio::spawn(async move {
            runner
                .execute(CONN, "while true; do echo x; sleep 0.2; done", true, sink)
                .await
        })
    };

    wait_for_process(&sessions).await;
    // Far more than a pipe buffer, and the loop never reads stdin
    let block = "y".repeat(16 * 1024);
    for _ in 0..20 {
        runner.send_input(CONN, &block);
    }

    let err = tokio::time::timeout(Duration::from_secs(8), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, ExecError::Timeout(2)));
    assert_eq!(completions(&sink), 0);
    assert!(sessions.active_process(CONN).is_none());
}

#[tokio::test]
async fn test_cancel_after_unread_input() {
    let config = ExecConfig {
        pty_grace_ms: 10_000,
        ..ExecConfig::default()
    };
    let (runner, sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());

    let task = {
        let runner = runner.clone();
        let sink: Arc<dyn ExecSink> = sink.clone();
        tokio::spawn(async move {
            runner
                .execute(CONN, "while true; do echo x; sleep 0.2; done", true, sink)
                .await
        })
    };

    wait_for_process(&sessions).await;
    let block = "y".repeat(16 * 1024);
    for _ in 0..20 {
        runner.send_input(CONN, &block);
    }
    assert!(runner.cancel(CONN));

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ExecOutcome::Cancelled);
    assert_eq!(completions(&sink), 0);
}

#[tokio::test]
async fn test_pty_prompt_signals_ready_and_takes_input() {
    let config = ExecConfig {
        pty_grace_ms: 100,
        ..ExecConfig::default()
    };
    let (runner, sessions) = setup(config, PathBuf::from("/tmp"));
    let sink = Arc::new(RecordingSink::new());
    let ready = |sink: &RecordingSink| count(sink, |e| matches!(e, ExecEvent::PtyInputReady));

    // `read -p` stays silent on a pipe, so this escalates to the PTY
    let task = {
        let runner = runner.clone();
        let sink: Arc<dyn ExecSink> = sink.clone();
        tokio::spawn(async move {
            runner
                .execute(CONN, r#"read -p 'Name: ' n; echo "hi $n""#, true, sink)
                .await
        })
    };

    for _ in 0..200 {
        if ready(&sink) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(ready(&sink), 1);
    assert_eq!(pty_starts(&sink), 1);
    assert_eq!(
        sessions.active_process(CONN).map(|p| p.mode()),
        Some(ProcessMode::Pty)
    );

    assert!(runner.send_input(CONN, "world"));

    let outcome = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ExecOutcome::Completed { exit_code: Some(0) });
    assert!(sink.output(StreamKind::Stdout).contains("hi world"));
    assert_eq!(completions(&sink), 1);
    assert_eq!(ready(&sink), 1);
}
