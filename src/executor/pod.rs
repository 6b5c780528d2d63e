use std::path::Path;
use std::time::Duration;

use futures::{AsyncReadExt, AsyncWriteExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use kube::Client;

use super::{ExecutionResult, Executor};
use crate::error::{Error, Result};
use crate::model::Server;

/// Executes commands inside a Kubernetes pod via the API server's exec
/// subresource. `server.host` is `namespace/pod[:container]`.
pub struct PodExecutor {
    client: Client,
    namespace: String,
    pod_name: String,
    container: Option<String>,
}

impl PodExecutor {
    pub async fn connect(server: &Server) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::Transport(format!("kube client init failed: {e}")))?;

        let (namespace, rest) = server
            .host
            .split_once('/')
            .ok_or_else(|| Error::Transport(format!("pod endpoint '{}' missing namespace", server.host)))?;
        let (pod_name, container) = match rest.split_once(':') {
            Some((pod, container)) => (pod, Some(container.to_string())),
            None => (rest, None),
        };

        Ok(Self {
            client,
            namespace: namespace.to_string(),
            pod_name: pod_name.to_string(),
            container,
        })
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn attach_params(&self) -> AttachParams {
        let params = AttachParams::default().stdout(true).stderr(true);
        match &self.container {
            Some(c) => params.container(c),
            None => params,
        }
    }
}

#[async_trait::async_trait]
impl Executor for PodExecutor {
    async fn execute(&self, command: &str, timeout_secs: u64) -> Result<ExecutionResult> {
        let run = async {
            let mut attached = self
                .pods()
                .exec(&self.pod_name, vec!["sh", "-c", command], &self.attach_params())
                .await
                .map_err(|e| Error::Transport(format!("pod exec failed: {e}")))?;

            let mut stdout = Vec::new();
            if let Some(mut stream) = attached.stdout() {
                stream
                    .read_to_end(&mut stdout)
                    .await
                    .map_err(|e| Error::Transport(format!("pod exec stdout read failed: {e}")))?;
            }

            let mut stderr = Vec::new();
            if let Some(mut stream) = attached.stderr() {
                stream
                    .read_to_end(&mut stderr)
                    .await
                    .map_err(|e| Error::Transport(format!("pod exec stderr read failed: {e}")))?;
            }

            let status = attached.take_status().and_then(|mut s| s.next().await);
            let exit_code = status
                .and_then(|s| s.status)
                .map(|s| if s == "Success" { 0 } else { 1 })
                .unwrap_or(0);

            Ok::<_, Error>(ExecutionResult {
                exit_code,
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

        let command = format!("cat > {remote_path}");
        let mut attached = self
            .pods()
            .exec(
                &self.pod_name,
                vec!["sh", "-c", &command],
                &AttachParams::default().stdin(true).stdout(false).stderr(false),
            )
            .await
            .map_err(|e| Error::Transport(format!("pod upload exec failed: {e}")))?;

        let mut stdin = attached
            .stdin()
            .ok_or_else(|| Error::Transport("pod upload: no stdin stream".to_string()))?;
        stdin
            .write_all(&data)
            .await
            .map_err(|e| Error::Transport(format!("pod upload write failed: {e}")))?;
        stdin
            .close()
            .await
            .map_err(|e| Error::Transport(format!("pod upload close failed: {e}")))?;

        Ok(())
    }

    async fn download_file(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        let command = format!("cat {remote_path}");
        let mut attached = self
            .pods()
            .exec(&self.pod_name, vec!["sh", "-c", &command], &self.attach_params())
            .await
            .map_err(|e| Error::Transport(format!("pod download exec failed: {e}")))?;

        let mut buf = Vec::new();
        if let Some(mut stream) = attached.stdout() {
            stream
                .read_to_end(&mut buf)
                .await
                .map_err(|e| Error::Transport(format!("pod download read failed: {e}")))?;
        }

        tokio::fs::write(local_path, buf).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
