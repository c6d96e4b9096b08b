//! Shell execution hook: runs one command under the tool root with a hard
//! timeout, capped output capture and whole-process-group termination.

use std::path::{Component, Path};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::workspace::Workspace;

/// Grace period for the capture readers once the process has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ShellSettings {
    /// Upper bound for any single run.
    pub timeout: Duration,
    /// Per-stream capture cap in bytes.
    pub max_output_bytes: usize,
    /// Reject arguments whose `..` components leave the root.
    pub sanitize_args: bool,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_output_bytes: 64 * 1024,
            sanitize_args: true,
        }
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub truncated: bool,
    /// A process outside the group kept a pipe open after the command
    /// exited, so capture stopped early.
    pub pipe_held_open: bool,
}

impl ShellOutput {
    /// Text form handed to the model.
    pub fn render(&self, max_output_bytes: usize) -> String {
        let mut result = format!("Exit code: {}\n", self.exit_code);
        if !self.stdout.is_empty() {
            result.push_str(&format!("\n--- stdout ---\n{}\n", self.stdout));
        }
        if !self.stderr.is_empty() {
            result.push_str(&format!("\n--- stderr ---\n{}\n", self.stderr));
        }
        if self.truncated {
            result.push_str(&format!(
                "\n[Output was truncated to {max_output_bytes} bytes per stream]\n"
            ));
        }
        if self.pipe_held_open {
            result.push_str(
                "\n[Output capture stopped: a detached background process kept the output pipe open]\n",
            );
        }
        result
    }
}

#[derive(Debug, Clone)]
pub struct ShellHook {
    workspace: Workspace,
    settings: ShellSettings,
}

impl ShellHook {
    pub fn new(workspace: Workspace, settings: ShellSettings) -> Self {
        Self {
            workspace,
            settings,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn settings(&self) -> &ShellSettings {
        &self.settings
    }

    /// Run `command`.
    ///
    /// With no `args` the command line is handed to `sh -c`; otherwise
    /// `command` is executed directly with `args`. `timeout` is clamped to
    /// the configured maximum. A non-zero exit code is a normal result.
    pub async fn run(
        &self,
        command: &str,
        args: &[String],
        working_dir: Option<&str>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ShellOutput, ToolError> {
        if command.trim().is_empty() {
            return Err(ToolError::InvalidArgs("command must not be empty".into()));
        }
        let timeout = timeout
            .map(|t| t.min(self.settings.timeout))
            .unwrap_or(self.settings.timeout);

        let cwd = self
            .workspace
            .resolve(working_dir.unwrap_or("."))?;
        if !cwd.is_dir() {
            return Err(ToolError::NotADirectory(
                working_dir.unwrap_or(".").to_string(),
            ));
        }

        if self.settings.sanitize_args {
            if args.is_empty() {
                self.check_tokens(&cwd, command.split(is_shell_separator))?;
            } else {
                self.check_tokens(&cwd, std::iter::once(command))?;
                self.check_tokens(&cwd, args.iter().map(String::as_str))?;
            }
        }

        let mut cmd = if args.is_empty() {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        } else {
            let mut c = Command::new(command);
            c.args(args);
            c
        };
        cmd.current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                ToolError::ExecutionFailed(format!("command not found: {command}"))
            }
            std::io::ErrorKind::PermissionDenied => {
                ToolError::PermissionDenied(format!("cannot execute {command}"))
            }
            _ => ToolError::ExecutionFailed(format!("failed to spawn {command}: {e}")),
        })?;
        let pid = child.id();
        tracing::debug!(command, ?pid, timeout_secs = timeout.as_secs_f64(), "Shell command started");

        let cap = self.settings.max_output_bytes;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolError::ExecutionFailed("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::ExecutionFailed("stderr not captured".into()))?;
        let stdout_capture = SharedCapture::default();
        let stderr_capture = SharedCapture::default();
        let stdout_task = tokio::spawn(read_capped(stdout, cap, stdout_capture.clone()));
        let stderr_task = tokio::spawn(read_capped(stderr, cap, stderr_capture.clone()));

        let status = tokio::select! {
            res = child.wait() => {
                res.map_err(|e| ToolError::ExecutionFailed(format!("wait failed: {e}")))?
            }
            _ = tokio::time::sleep(timeout) => {
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                tracing::warn!(command, timeout_secs = timeout.as_secs_f64(), "Shell command timed out");
                return Err(ToolError::Timeout(timeout));
            }
            _ = cancel.cancelled() => {
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(ToolError::Cancelled);
            }
        };

        // Background children may still hold the pipes open.
        kill_group(pid);

        let (stdout, stderr) = tokio::join!(
            join_capture(stdout_task, &stdout_capture),
            join_capture(stderr_task, &stderr_capture),
        );
        let pipe_held_open = stdout.held_open || stderr.held_open;
        if pipe_held_open {
            tracing::warn!(command, "Output pipe held open by a detached process");
        }

        Ok(ShellOutput {
            stdout: String::from_utf8_lossy(&stdout.buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.buf).into_owned(),
            exit_code: exit_code(status),
            truncated: stdout.truncated || stderr.truncated,
            pipe_held_open,
        })
    }

    fn check_tokens<'a>(
        &self,
        cwd: &Path,
        tokens: impl Iterator<Item = &'a str>,
    ) -> Result<(), ToolError> {
        for token in tokens {
            let value = token
                .split_once('=')
                .map(|(_, v)| v)
                .unwrap_or(token)
                .trim_matches(|c| c == '"' || c == '\'');
            if Path::new(value)
                .components()
                .any(|c| c == Component::ParentDir)
            {
                self.workspace.contain(cwd, value)?;
            }
        }
        Ok(())
    }
}

fn is_shell_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ';' | '|' | '&' | '<' | '>' | '(' | ')' | '`')
}

#[derive(Debug, Default)]
struct Capture {
    buf: Vec<u8>,
    truncated: bool,
    held_open: bool,
}

/// Filled by the reader task so bytes survive an aborted read.
type SharedCapture = Arc<Mutex<Capture>>;

async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize, capture: SharedCapture) {
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut capture = capture.lock().unwrap_or_else(|e| e.into_inner());
                let room = cap.saturating_sub(capture.buf.len());
                capture.buf.extend_from_slice(&chunk[..n.min(room)]);
                // keep draining so the child never blocks on a full pipe
                if n > room {
                    capture.truncated = true;
                }
            }
        }
    }
}

async fn join_capture(mut task: tokio::task::JoinHandle<()>, capture: &SharedCapture) -> Capture {
    let held_open = tokio::time::timeout(DRAIN_GRACE, &mut task).await.is_err();
    if held_open {
        task.abort();
    }
    let mut capture = capture.lock().unwrap_or_else(|e| e.into_inner());
    Capture {
        buf: std::mem::take(&mut capture.buf),
        truncated: capture.truncated || held_open,
        held_open,
    }
}

async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_group(pid);
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "Child already gone");
    }
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // The child was spawned as its own group leader, so its pid is the pgid.
        unsafe {
            libc::killpg(pid as libc::pid_t, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(-1)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn hook(settings: ShellSettings) -> (tempfile::TempDir, ShellHook) {
        let tmp = tempfile::tempdir().unwrap();
        let ws = Workspace::new(tmp.path()).unwrap();
        (tmp, ShellHook::new(ws, settings))
    }

    #[tokio::test]
    async fn test_captures_stdout_stderr_and_exit_code() {
        let (_tmp, hook) = hook(ShellSettings::default());
        let out = hook
            .run("echo out; echo err >&2; exit 3", &[], None, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_code, 3);
        assert!(!out.truncated);
        assert!(!out.pipe_held_open);

        let text = out.render(1024);
        assert!(text.starts_with("Exit code: 3"));
        assert!(text.contains("--- stdout ---\nout"));
    }

    #[tokio::test]
    async fn test_direct_exec_with_args_in_working_dir() {
        let (tmp, hook) = hook(ShellSettings::default());
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/a.txt"), "").unwrap();

        let out = hook
            .run("ls", &["-1".into()], Some("sub"), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout, "a.txt\n");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_process_group() {
        let (tmp, hook) = hook(ShellSettings::default());
        let started = Instant::now();
        let err = hook
            .run(
                "sleep 1; touch marker",
                &[],
                None,
                Some(Duration::from_millis(200)),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!tmp.path().join("marker").exists());
    }

    #[tokio::test]
    async fn test_requested_timeout_clamped_to_configured_max() {
        let (_tmp, hook) = hook(ShellSettings {
            timeout: Duration::from_millis(200),
            ..ShellSettings::default()
        });
        let err = hook
            .run("sleep 10", &[], None, Some(Duration::from_secs(60)), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::Timeout(Duration::from_millis(200)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_command() {
        let (_tmp, hook) = hook(ShellSettings::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let err = hook.run("sleep 10", &[], None, None, &cancel).await.unwrap_err();
        assert_eq!(err, ToolError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let (_tmp, hook) = hook(ShellSettings {
            max_output_bytes: 16,
            ..ShellSettings::default()
        });
        let out = hook
            .run("yes | head -c 100000", &[], None, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout.len(), 16);
        assert!(out.truncated);
        assert!(out.render(16).contains("truncated"));
    }

    #[tokio::test]
    async fn test_detached_process_holding_pipe_keeps_captured_output() {
        let (_tmp, hook) = hook(ShellSettings::default());
        let started = Instant::now();
        let out = hook
            .run("echo hello; setsid sleep 5 &", &[], None, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.exit_code, 0);
        assert!(out.truncated);
        assert!(out.pipe_held_open);
        assert!(out.render(1024).contains("kept the output pipe open"));
    }

    #[tokio::test]
    async fn test_parent_dir_arguments_rejected() {
        let (_tmp, hook) = hook(ShellSettings::default());
        let cancel = CancellationToken::new();

        let err = hook.run("cat ../../etc/passwd", &[], None, None, &cancel).await.unwrap_err();
        assert!(matches!(err, ToolError::PathEscape(_)));

        let err = hook
            .run("ls", &["--dir=../..".into()], None, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PathEscape(_)));

        let err = hook.run("ls", &[], Some(".."), None, &cancel).await.unwrap_err();
        assert!(matches!(err, ToolError::PathEscape(_)));
    }

    #[tokio::test]
    async fn test_parent_dir_inside_root_allowed() {
        let (tmp, hook) = hook(ShellSettings::default());
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let out = hook
            .run("ls ../", &[], Some("sub"), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout, "sub\n");
    }

    #[tokio::test]
    async fn test_sanitizer_can_be_disabled() {
        let (_tmp, hook) = hook(ShellSettings {
            sanitize_args: false,
            ..ShellSettings::default()
        });
        let out = hook
            .run("echo ../x", &[], None, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.stdout, "../x\n");
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let (_tmp, hook) = hook(ShellSettings::default());
        let err = hook
            .run("definitely-not-a-real-binary-xyz", &["a".into()], None, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed(_)));
    }
}
