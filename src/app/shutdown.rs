use super::orchestrator::ENGINE;
use super::{ComponentState, TimelapserApp};
use crate::error::Result;
use crate::events::Trigger;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Per-task budget for background tasks to exit after cancellation
const TASK_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl TimelapserApp {
    /// Perform graceful shutdown of all components.
    ///
    /// A capture in progress is stopped, which builds its video from the
    /// frames captured so far.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Cancel all background tasks
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for (component, handle) in tasks.into_iter().rev() {
            self.set_component_state(component, ComponentState::Stopping)
                .await;

            match timeout(TASK_STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => {
                    self.set_component_state(component, ComponentState::Stopped)
                        .await;
                    info!("{} component stopped", component);
                }
                Ok(Err(e)) => {
                    self.set_component_state(component, ComponentState::Failed)
                        .await;
                    error!("Error stopping {} component: {}", component, e);
                    exit_code = 1;
                }
                Err(_) => {
                    self.set_component_state(component, ComponentState::Failed)
                        .await;
                    error!("{} component stop timeout", component);
                    exit_code = 1;
                }
            }
        }

        self.set_component_state(ENGINE, ComponentState::Stopping)
            .await;
        if let Some(report) = self.engine.stop(Trigger::Shutdown).await {
            info!(
                "Capture stopped at shutdown with {} frames: {:?}",
                report.frame_count, report.outcome
            );
        }
        // No-op unless a preview outlived its session
        self.frame_source.stop_preview().await;
        self.set_component_state(ENGINE, ComponentState::Stopped)
            .await;

        if exit_code != 0 {
            warn!("Some components did not stop cleanly");
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
