//! Subprocess adapter: speaks the launcher contract over a plain child
//! process, one invocation per subcommand.

use std::process::Stdio;

use agent_shared::{AgentResult, LauncherError, LauncherErrorKind, VmId};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use super::{binary, LaunchSpec, LaunchedRun, Launcher, LauncherConfig, RunOptions};

/// Longest single argument the launcher is handed verbatim before this
/// adapter falls back to base64-encoding the whole command line.
const MAX_PLAIN_ARG_LEN: usize = 200;

/// Whether `command` contains an argument long or quoting-hazardous
/// enough that passing it straight through argv risks mangling it.
fn needs_encoding(command: &[String]) -> bool {
    command.iter().any(|arg| {
        arg.len() > MAX_PLAIN_ARG_LEN
            || arg
                .chars()
                .any(|c| matches!(c, '\'' | '"' | '`' | '$' | ';' | '|' | '&' | '<' | '>' | '\n'))
    })
}

/// Append `command` to `cmd`, base64-encoding the whole argv as a single
/// `--argv-b64` flag when any argument is long or quoting-hazardous.
/// Cheap commands go straight through as plain trailing args.
fn append_command(cmd: &mut Command, command: &[String]) {
    if needs_encoding(command) {
        let json = serde_json::to_string(command).expect("argv serializes to json");
        cmd.arg("--argv-b64").arg(BASE64.encode(json));
    } else {
        cmd.arg("--");
        cmd.args(command);
    }
}

/// Launcher adapter that shells out to an external binary supporting
/// `create`, `start`, `delete`, `run`, `shell`, and `list` subcommands.
pub struct SubprocessLauncher {
    config: LauncherConfig,
}

impl SubprocessLauncher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        Command::new(binary(&self.config))
    }

    /// Run a subcommand to completion. The launcher's stderr is
    /// pattern-matched exactly once, here, and converted into a
    /// `LauncherErrorKind` so no other part of the crate ever inspects
    /// launcher text again.
    async fn run_subcommand(&self, args: &[&str]) -> AgentResult<Vec<u8>> {
        let output = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| LauncherError::other(format!("failed to spawn launcher: {e}")))?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify(&stderr).into())
    }
}

/// Translate launcher stderr text into a structured error kind. This is
/// the single place in the crate that does textual introspection of
/// launcher output.
fn classify(stderr: &str) -> LauncherError {
    let lower = stderr.to_lowercase();
    if lower.contains("no vm found")
        || lower.contains("not found")
        || lower.contains("no such file")
    {
        LauncherError::not_found(stderr.trim().to_string())
    } else if lower.contains("connection refused") || lower.contains("unavailable") {
        LauncherError {
            kind: LauncherErrorKind::Unavailable,
            message: stderr.trim().to_string(),
        }
    } else if lower.contains("timed out") || lower.contains("resource temporarily unavailable") {
        LauncherError {
            kind: LauncherErrorKind::Transient,
            message: stderr.trim().to_string(),
        }
    } else {
        LauncherError::other(stderr.trim().to_string())
    }
}

#[async_trait]
impl Launcher for SubprocessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> AgentResult<()> {
        self.run_subcommand(&["create", &spec.id, "--image", &spec.rootfs_image]).await?;
        self.run_subcommand(&[
            "start",
            &spec.id,
            "--cpus",
            &spec.cpu_count.to_string(),
            "--memory",
            &spec.memory_mib.to_string(),
            "--network",
            &spec.network_mode,
        ])
        .await?;
        Ok(())
    }

    async fn stop(&self, id: &VmId) -> AgentResult<()> {
        match self.run_subcommand(&["delete", id, "--stop"]).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_launcher_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn cleanup(&self, id: &VmId) -> AgentResult<()> {
        match self.run_subcommand(&["delete", id]).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_launcher_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn run(
        &self,
        id: &VmId,
        options: &RunOptions,
        stdout_sink: &mut (dyn AsyncWrite + Send + Unpin),
        stderr_sink: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> AgentResult<LaunchedRun> {
        let mut cmd = self.command();
        cmd.arg("run").arg(id);
        if let Some(dir) = &options.working_dir {
            cmd.arg("--workdir").arg(dir);
        }
        append_command(&mut cmd, &options.command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| LauncherError::other(format!("failed to spawn launcher run: {e}")))?;

        let mut child_stdout = child.stdout.take().expect("piped stdout");
        let mut child_stderr = child.stderr.take().expect("piped stderr");

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();

        let timeout = tokio::time::timeout(options.timeout, async {
            let stdout_fut = child_stdout.read_to_end(&mut stdout_buf);
            let stderr_fut = child_stderr.read_to_end(&mut stderr_buf);
            let (stdout_res, stderr_res) = tokio::join!(stdout_fut, stderr_fut);
            stdout_res.and(stderr_res)
        })
        .await;

        match timeout {
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Ok(LaunchedRun {
                    exit_code: 124,
                    stdout: stdout_buf,
                    stderr: stderr_buf,
                });
            }
            Ok(Err(e)) => {
                return Err(LauncherError::other(format!("failed reading launcher output: {e}")).into());
            }
            Ok(Ok(())) => {}
        }

        stdout_sink
            .write_all(&stdout_buf)
            .await
            .map_err(agent_shared::AgentError::Io)?;
        stderr_sink
            .write_all(&stderr_buf)
            .await
            .map_err(agent_shared::AgentError::Io)?;

        let status = child
            .wait()
            .await
            .map_err(|e| LauncherError::other(format!("failed waiting for launcher: {e}")))?;

        let exit_code = if status.success() {
            0
        } else {
            #[cfg(unix)]
            {
                use std::os::unix::process::ExitStatusExt;
                status.code().or_else(|| status.signal()).unwrap_or(1)
            }
            #[cfg(not(unix))]
            {
                status.code().unwrap_or(1)
            }
        };

        Ok(LaunchedRun {
            exit_code,
            stdout: stdout_buf,
            stderr: stderr_buf,
        })
    }

    async fn shell(&self, id: &VmId) -> AgentResult<()> {
        self.run_subcommand(&["shell", id]).await?;
        Ok(())
    }

    async fn list(&self) -> AgentResult<Vec<VmId>> {
        let stdout = self.run_subcommand(&["list"]).await?;
        let text = String::from_utf8_lossy(&stdout);
        Ok(text
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognises_not_found_variants() {
        for msg in ["no vm found: x", "Error: not found", "no such file or directory"] {
            assert_eq!(classify(msg).kind, LauncherErrorKind::NotFound);
        }
    }

    #[test]
    fn classify_recognises_unavailable() {
        assert_eq!(
            classify("connection refused").kind,
            LauncherErrorKind::Unavailable
        );
    }

    #[test]
    fn classify_falls_back_to_other() {
        assert_eq!(classify("disk full").kind, LauncherErrorKind::Other);
    }

    #[test]
    fn plain_short_command_does_not_need_encoding() {
        assert!(!needs_encoding(&["python3".to_string(), "script.py".to_string()]));
    }

    #[test]
    fn quoting_hazardous_command_needs_encoding() {
        assert!(needs_encoding(&["sh".to_string(), "-c".to_string(), "echo $HOME; ls".to_string()]));
    }

    #[test]
    fn overly_long_argument_needs_encoding() {
        let long_arg = "x".repeat(MAX_PLAIN_ARG_LEN + 1);
        assert!(needs_encoding(&[long_arg]));
    }

    #[tokio::test]
    async fn run_reports_exit_code_124_when_the_launcher_outruns_the_timeout() {
        use std::io::Write as _;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("slow-launcher.sh");
        {
            let mut f = std::fs::File::create(&script_path).unwrap();
            writeln!(f, "#!/bin/sh").unwrap();
            writeln!(f, "sleep 5").unwrap();
        }
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let launcher = SubprocessLauncher::new(LauncherConfig::new(script_path));
        let options = RunOptions {
            command: vec!["echo".into(), "hi".into()],
            timeout: Duration::from_millis(50),
            working_dir: None,
        };
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let result = launcher
            .run(&"timeout-test".to_string(), &options, &mut stdout, &mut stderr)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 124);
    }
}
