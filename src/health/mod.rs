use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::crypto::decrypt_server_credentials;
use crate::error::Result;
use crate::executor::build_executor;
use crate::fanout::FanOutBus;
use crate::metrics::MetricsState;
use crate::model::{HealthState, ProgressEvent, ResourceType, Server};
use crate::notification::{BackupNotification, NotificationSink};

const PROBE_COMMAND: &str = "echo ping";
const PROBE_TIMEOUT_SECS: u64 = 10;

/// Periodically pings every active Server's transport and records its
/// health state. Notifications fire only on the edge — healthy-to-unhealthy
/// or unhealthy-to-healthy — never on every tick while a server stays down.
pub struct HealthProber {
    catalog: Arc<dyn Catalog>,
    fanout: FanOutBus,
    metrics: Arc<MetricsState>,
    notifications: NotificationSink,
    config: Arc<Config>,
}

impl HealthProber {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        fanout: FanOutBus,
        metrics: Arc<MetricsState>,
        notifications: NotificationSink,
        config: Arc<Config>,
    ) -> Self {
        Self { catalog, fanout, metrics, notifications, config }
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.health_tick_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "health tick failed");
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn tick(&self) -> Result<()> {
        for server in self.catalog.list_active_servers().await? {
            if let Err(err) = self.probe(&server).await {
                warn!(server = %server.name, error = %err, "health probe failed");
            }
        }
        Ok(())
    }

    async fn probe(&self, server: &Server) -> Result<()> {
        let previous = server.health_state;
        let next = self.probe_state(server).await;
        let now = Utc::now();

        self.metrics.set_server_health(&server.name, health_state_ordinal(next));

        let heartbeat = matches!(next, HealthState::Healthy).then_some(now);
        self.catalog.update_server_health(server.id, next, heartbeat).await?;

        if previous != next {
            let message = format!("server '{}' transitioned {previous:?} -> {next:?}", server.name);
            self.notifications
                .notify(&BackupNotification {
                    event: "server_health_changed",
                    server: &server.name,
                    database: "",
                    backup_id: String::new(),
                    message: &message,
                })
                .await;
            self.fanout
                .publish(ProgressEvent::ServerHealth {
                    server_id: server.id,
                    state: next,
                    message: message.clone(),
                    at: now,
                })
                .await;
            let _ = self
                .catalog
                .insert_audit_log(
                    None,
                    "server.health_changed",
                    ResourceType::Server,
                    Some(server.id),
                    Some(serde_json::json!({ "from": format!("{previous:?}"), "to": format!("{next:?}") })),
                )
                .await;
        }

        Ok(())
    }

    /// Constructs an executor and runs the no-op probe command. `Unknown` is
    /// reserved for the probe itself throwing (bad credentials, transport
    /// construction failure) as distinct from the remote command failing.
    async fn probe_state(&self, server: &Server) -> HealthState {
        let credentials = match decrypt_server_credentials(&self.config, server) {
            Ok(credentials) => credentials,
            Err(err) => {
                warn!(server = %server.name, error = %err, "health probe could not decrypt credentials");
                return HealthState::Unknown;
            }
        };

        let executor = match build_executor(server, &credentials).await {
            Ok(executor) => executor,
            Err(err) => {
                warn!(server = %server.name, error = %err, "health probe could not build executor");
                return HealthState::Unknown;
            }
        };

        let result = executor.execute(PROBE_COMMAND, PROBE_TIMEOUT_SECS).await;
        let _ = executor.close().await;

        match result {
            Ok(result) if result.success() => HealthState::Healthy,
            Ok(_) => HealthState::Unhealthy,
            Err(err) => {
                warn!(server = %server.name, error = %err, "health probe command failed");
                HealthState::Unhealthy
            }
        }
    }
}

fn health_state_ordinal(state: HealthState) -> i64 {
    match state {
        HealthState::Unknown => 0,
        HealthState::Healthy => 1,
        HealthState::Degraded => 2,
        HealthState::Unhealthy => 3,
    }
}
