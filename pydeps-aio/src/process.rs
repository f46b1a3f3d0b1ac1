// pydeps-aio/src/process.rs
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use pydeps_common::error::{PydepsError, Result};
use tokio::process::Command;
use tracing::{debug, error};

/// Runs an external command and captures its output. The child is killed
/// when `timeout` elapses. A non-zero exit status is returned, not raised.
pub async fn run_command_async(
    command: &str,
    args: &[String],
    cwd: Option<PathBuf>,
    envs: Option<HashMap<String, String>>,
    timeout: Option<Duration>,
) -> Result<Output> {
    debug!(
        "Running command: {} {:?} (cwd: {:?}, envs: {:?})",
        command,
        args,
        cwd,
        envs.as_ref().map(|e| e.keys().collect::<Vec<_>>())
    );

    let mut cmd = Command::new(command);
    cmd.args(args);
    cmd.kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    if let Some(env_map) = envs {
        cmd.envs(env_map);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.stdin(Stdio::null());

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
            Ok(result) => result,
            Err(_) => {
                return Err(PydepsError::CommandExecError(format!(
                    "{command} did not finish within {}",
                    humantime::format_duration(limit)
                )))
            }
        },
        None => cmd.output().await,
    };

    match output {
        Ok(output) => {
            if !output.status.success() {
                debug!("Command failed with status: {}", output.status);
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.trim().is_empty() {
                    debug!("Stderr:\n{}", stderr.trim());
                }
            } else {
                debug!("Command finished successfully.");
            }
            Ok(output)
        }
        Err(e) => {
            error!("Failed to execute {command}: {e}");
            Err(PydepsError::Io(Arc::new(e)))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output_and_status() {
        let output = run_command_async(
            "sh",
            &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
            None,
            Some(HashMap::from([("PYDEPS_TEST".to_string(), "1".to_string())])),
            None,
        )
        .await
        .unwrap();
        assert_eq!(output.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(String::from_utf8_lossy(&output.stderr).trim(), "err");
    }

    #[tokio::test]
    async fn times_out() {
        let result = run_command_async(
            "sh",
            &["-c".to_string(), "sleep 5".to_string()],
            None,
            None,
            Some(Duration::from_millis(100)),
        )
        .await;
        assert!(matches!(result, Err(PydepsError::CommandExecError(_))));
    }

    #[tokio::test]
    async fn missing_binary_is_io_error() {
        let result = run_command_async("pydeps-no-such-binary", &[], None, None, None).await;
        assert!(matches!(result, Err(PydepsError::Io(_))));
    }
}
