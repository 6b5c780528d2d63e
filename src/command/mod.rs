use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::crypto::decrypt_server_credentials;
use crate::error::Result;
use crate::executor::build_executor;
use crate::executor::validation::validate_command;
use crate::model::{CommandExecution, CommandStatus, ResourceType};

/// Runs an ad hoc operational command (a saved Command's template, fully
/// substituted, or a bare string) against a Server through the same
/// Executor and allow-list the backup pipeline uses. Always records a
/// CommandExecution row and an audit log entry, whether or not the command
/// itself ran — a rejected command is as auditable as a successful one.
#[instrument(skip(catalog, config), fields(server_id = %server_id))]
pub async fn execute_ad_hoc_command(
    catalog: &dyn Catalog,
    config: &Config,
    server_id: Uuid,
    command_id: Option<Uuid>,
    command_text: &str,
    actor: Option<&str>,
) -> Result<CommandExecution> {
    let mut execution = CommandExecution {
        id: Uuid::new_v4(),
        command_id,
        server_id,
        command_text: command_text.to_string(),
        status: CommandStatus::Pending,
        exit_code: None,
        stdout: None,
        stderr: None,
        started_at: None,
        finished_at: None,
    };
    catalog.insert_command_execution(&execution).await?;

    if let Err(err) = validate_command(command_text) {
        execution.status = CommandStatus::Failed;
        execution.stderr = Some(err.to_string());
        execution.finished_at = Some(Utc::now());
        catalog.update_command_execution(&execution).await?;
        audit(catalog, actor, &execution).await;
        return Ok(execution);
    }

    execution.status = CommandStatus::Running;
    execution.started_at = Some(Utc::now());
    catalog.update_command_execution(&execution).await?;

    match run(catalog, config, server_id, command_text, config.remote_exec_timeout_secs).await {
        Ok((exit_code, stdout, stderr)) => {
            execution.exit_code = Some(exit_code);
            execution.stdout = Some(stdout);
            execution.stderr = Some(stderr);
            execution.status = if exit_code == 0 { CommandStatus::Completed } else { CommandStatus::Failed };
        }
        Err(err) => {
            execution.status = CommandStatus::Failed;
            execution.stderr = Some(err.to_string());
        }
    }
    execution.finished_at = Some(Utc::now());
    catalog.update_command_execution(&execution).await?;
    audit(catalog, actor, &execution).await;

    Ok(execution)
}

async fn run(
    catalog: &dyn Catalog,
    config: &Config,
    server_id: Uuid,
    command_text: &str,
    timeout_secs: u64,
) -> Result<(i32, String, String)> {
    let server = catalog.get_server(server_id).await?;
    let credentials = decrypt_server_credentials(config, &server)?;
    let executor = build_executor(&server, &credentials).await?;

    let result = executor.execute(command_text, timeout_secs).await;
    let _ = executor.close().await;
    let result = result?;

    Ok((
        result.exit_code,
        String::from_utf8_lossy(&result.stdout).to_string(),
        String::from_utf8_lossy(&result.stderr).to_string(),
    ))
}

async fn audit(catalog: &dyn Catalog, actor: Option<&str>, execution: &CommandExecution) {
    let _ = catalog
        .insert_audit_log(
            actor,
            "command_execute",
            ResourceType::Command,
            Some(execution.id),
            Some(serde_json::json!({
                "server_id": execution.server_id,
                "status": format!("{:?}", execution.status),
                "exit_code": execution.exit_code,
            })),
        )
        .await;
}
