use std::path::Path;
use std::time::Duration;

use bollard::container::UploadToContainerOptions;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use futures::StreamExt;

use super::{ExecutionResult, Executor};
use crate::error::{Error, Result};
use crate::model::Server;

/// Executes commands inside a running container via the Docker daemon API.
/// `server.host` names the container (or `container:name` endpoint string).
pub struct ContainerExecutor {
    docker: Docker,
    container_name: String,
}

impl ContainerExecutor {
    pub async fn connect(server: &Server) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Transport(format!("docker connect failed: {e}")))?;

        docker
            .ping()
            .await
            .map_err(|e| Error::Transport(format!("docker daemon unreachable: {e}")))?;

        Ok(Self {
            docker,
            container_name: server.host.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Executor for ContainerExecutor {
    async fn execute(&self, command: &str, timeout_secs: u64) -> Result<ExecutionResult> {
        let exec = self
            .docker
            .create_exec(
                &self.container_name,
                CreateExecOptions {
                    cmd: Some(vec!["sh", "-c", command]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| Error::Transport(format!("docker exec create failed: {e}")))?;

        let run = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();

            if let StartExecResults::Attached { mut output, .. } =
                self.docker.start_exec(&exec.id, None).await.map_err(|e| {
                    Error::Transport(format!("docker exec start failed: {e}"))
                })?
            {
                while let Some(chunk) = output.next().await {
                    match chunk.map_err(|e| Error::Transport(format!("docker exec stream error: {e}")))? {
                        bollard::container::LogOutput::StdOut { message } => {
                            stdout.extend_from_slice(&message)
                        }
                        bollard::container::LogOutput::StdErr { message } => {
                            stderr.extend_from_slice(&message)
                        }
                        _ => {}
                    }
                }
            }

            let inspect = self
                .docker
                .inspect_exec(&exec.id)
                .await
                .map_err(|e| Error::Transport(format!("docker exec inspect failed: {e}")))?;

            Ok::<_, Error>(ExecutionResult {
                exit_code: inspect.exit_code.unwrap_or(-1) as i32,
                stdout,
                stderr,
            })
        };

        tokio::time::timeout(Duration::from_secs(timeout_secs), run)
            .await
            .map_err(|_| Error::Timeout(timeout_secs))?
    }

    async fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;
        let tar = build_single_file_tar(remote_path, &data)?;

        self.docker
            .upload_to_container(
                &self.container_name,
                Some(UploadToContainerOptions {
                    path: "/",
                    ..Default::default()
                }),
                tar.into(),
            )
            .await
            .map_err(|e| Error::Transport(format!("docker upload failed: {e}")))
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let mut stream = self.docker.download_from_container(
            &self.container_name,
            Some(bollard::container::DownloadFromContainerOptions { path: remote_path }),
        );

        let mut tar_bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            tar_bytes.extend_from_slice(&chunk.map_err(|e| {
                Error::Transport(format!("docker download stream error: {e}"))
            })?);
        }

        let data = extract_single_file_tar(&tar_bytes)?;
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn build_single_file_tar(path: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    let name = path.trim_start_matches('/');
    builder
        .append_data(&mut header, name, data)
        .map_err(|e| Error::Transport(format!("tar build failed: {e}")))?;
    builder
        .into_inner()
        .map_err(|e| Error::Transport(format!("tar finalize failed: {e}")))
}

fn extract_single_file_tar(tar_bytes: &[u8]) -> Result<Vec<u8>> {
    let mut archive = tar::Archive::new(tar_bytes);
    let mut entries = archive
        .entries()
        .map_err(|e| Error::Transport(format!("tar read failed: {e}")))?;
    let mut entry = entries
        .next()
        .ok_or_else(|| Error::Transport("empty tar stream from docker".to_string()))?
        .map_err(|e| Error::Transport(format!("tar entry read failed: {e}")))?;

    let mut buf = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut buf)
        .map_err(|e| Error::Transport(format!("tar entry extract failed: {e}")))?;
    Ok(buf)
}
