pub mod container;
pub mod pod;
pub mod shell;
pub mod validation;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Server, ServerCredentials, TransportKind};

/// Outcome of a single command run through an `Executor`.
#[derive(Clone, Debug, Default)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Unified remote-execution capability across the three transport kinds. Every
/// command passed to `execute` must already have cleared
/// `validation::validate_command`; implementations do not re-validate.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &str, timeout_secs: u64) -> Result<ExecutionResult>;

    async fn upload_file(&self, local_path: &std::path::Path, remote_path: &str) -> Result<()>;

    async fn download_file(&self, remote_path: &str, local_path: &std::path::Path) -> Result<()>;

    async fn close(self: Box<Self>) -> Result<()>;
}

/// Builds the Executor matching a Server's configured transport.
pub async fn build_executor(
    server: &Server,
    credentials: &ServerCredentials,
) -> Result<Box<dyn Executor>> {
    match server.transport_kind {
        TransportKind::Shell => {
            Ok(Box::new(shell::ShellExecutor::connect(server, credentials).await?))
        }
        TransportKind::Container => Ok(Box::new(container::ContainerExecutor::connect(server).await?)),
        TransportKind::Pod => Ok(Box::new(pod::PodExecutor::connect(server).await?)),
    }
}
