use std::path::Path;
use std::time::Duration;

use openssh::{KnownHosts, Session, Stdio as OpenSshStdio};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{ExecutionResult, Executor};
use crate::error::{Error, Result};
use crate::model::{Server, ServerCredentials};

/// Executes commands over SSH using the system ssh client via `openssh`,
/// which multiplexes every call over one control socket per Server.
pub struct ShellExecutor {
    session: Session,
}

impl ShellExecutor {
    pub async fn connect(server: &Server, credentials: &ServerCredentials) -> Result<Self> {
        let user = credentials.username.as_deref().unwrap_or("postgres");
        let destination = format!("ssh://{user}@{}:{}", server.host, server.port.unwrap_or(22));

        let session = Session::connect(&destination, KnownHosts::Strict)
            .await
            .map_err(|e| Error::Transport(format!("ssh connect to '{}' failed: {e}", server.name)))?;

        Ok(Self { session })
    }
}

#[async_trait::async_trait]
impl Executor for ShellExecutor {
    async fn execute(&self, command: &str, timeout_secs: u64) -> Result<ExecutionResult> {
        let mut cmd = self.session.command("sh");
        cmd.arg("-c").arg(command);
        cmd.stdout(OpenSshStdio::piped());
        cmd.stderr(OpenSshStdio::piped());

        let fut = cmd.output();
        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), fut)
            .await
            .map_err(|_| Error::Timeout(timeout_secs))?
            .map_err(|e| Error::Transport(format!("ssh command failed: {e}")))?;

        Ok(ExecutionResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;

        let mut cmd = self.session.command("sh");
        cmd.arg("-c").arg(format!("cat > {remote_path}"));
        cmd.stdin(OpenSshStdio::piped());
        cmd.stdout(OpenSshStdio::null());

        let mut child = cmd
            .spawn()
            .await
            .map_err(|e| Error::Transport(format!("ssh upload spawn failed: {e}")))?;

        let mut stdin = child
            .stdin()
            .take()
            .ok_or_else(|| Error::Transport("ssh upload: no stdin handle".to_string()))?;
        stdin.write_all(&data).await?;
        stdin.shutdown().await?;
        drop(stdin);

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Transport(format!("ssh upload wait failed: {e}")))?;
        if !status.success() {
            return Err(Error::Transport(format!(
                "ssh upload to '{remote_path}' exited non-zero"
            )));
        }
        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let mut cmd = self.session.command("cat");
        cmd.arg(remote_path);
        cmd.stdout(OpenSshStdio::piped());

        let mut child = cmd
            .spawn()
            .await
            .map_err(|e| Error::Transport(format!("ssh download spawn failed: {e}")))?;

        let mut stdout = child
            .stdout()
            .take()
            .ok_or_else(|| Error::Transport("ssh download: no stdout handle".to_string()))?;
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Transport(format!("ssh download wait failed: {e}")))?;
        if !status.success() {
            return Err(Error::Transport(format!(
                "ssh download from '{remote_path}' exited non-zero"
            )));
        }

        tokio::fs::write(local_path, buf).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.session
            .close()
            .await
            .map_err(|e| Error::Transport(format!("ssh close failed: {e}")))
    }
}
