//! Integration tests for the shellmux binary.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn shellmux(log_dir: &tempfile::TempDir) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_shellmux"));
    command.env("SHELLMUX_LOG_DIR", log_dir.path()).args(["--shell", "sh"]);
    command
}

fn run_shellmux(args: &[&str]) -> Output {
    let log_dir = tempfile::tempdir().unwrap();
    shellmux(&log_dir).args(args).output().unwrap()
}

fn wait_with_deadline(child: &mut Child, deadline: Duration) -> Option<std::process::ExitStatus> {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        thread::sleep(Duration::from_millis(20));
    }
    child.kill().unwrap();
    child.wait().unwrap();
    None
}

#[test]
fn runs_commands_and_exits_with_last_code() {
    let output = run_shellmux(&["echo hi", "echo oops >&2; (exit 3)"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["hi"]);
    assert!(stderr.contains("oops"));
}

#[test]
fn json_prints_one_result_per_command() {
    let output = run_shellmux(&["--json", "echo hi"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());

    let lines: Vec<_> = stdout.lines().collect();
    assert_eq!(lines.len(), 1);
    let result: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(result["stdout"][0], "hi");
    assert_eq!(result["exit_code"], 0);
    assert_eq!(result["details"]["command"], "echo hi");
}

#[test]
fn reads_commands_from_stdin_until_quit() {
    let log_dir = tempfile::tempdir().unwrap();
    let mut child = shellmux(&log_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"echo one\n:quit\necho never\n")
        .unwrap();

    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["one"]);
}

#[cfg(unix)]
#[test]
fn ctrl_c_at_prompt_exits() {
    let log_dir = tempfile::tempdir().unwrap();
    let mut child = shellmux(&log_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    // Keep stdin open so only the signal can end the prompt
    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b"echo ready\n").unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let mut line = String::new();
    stdout.read_line(&mut line).unwrap();
    assert_eq!(line.trim(), "ready");
    thread::sleep(Duration::from_millis(300));

    let killed = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let status = wait_with_deadline(&mut child, Duration::from_secs(10));
    drop(stdin);
    assert_eq!(status.and_then(|s| s.code()), Some(0));
}
