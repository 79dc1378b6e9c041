use super::orchestrator::{AUTO_START, CONTROL, ENGINE, TELEMETRY};
use super::{ComponentState, TimelapserApp};
use crate::error::Result;
use crate::telemetry::MqttTelemetry;
use std::sync::Arc;
use tracing::info;

impl TimelapserApp {
    /// Register every component as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing timelapser components");

        let mut states = self.component_states.lock().await;
        states.insert(TELEMETRY, ComponentState::Stopped);
        states.insert(ENGINE, ComponentState::Stopped);

        if self.config.capture.auto_start {
            states.insert(AUTO_START, ComponentState::Stopped);
        }

        if self.control_enabled() {
            states.insert(CONTROL, ComponentState::Stopped);
        }

        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start the telemetry feed, the auto-start watcher and the control surface
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting timelapser");

        // Telemetry first so the engine sees the printer's state
        self.set_component_state(TELEMETRY, ComponentState::Starting)
            .await;
        let mqtt = MqttTelemetry::new(self.config.printer.clone(), Arc::clone(&self.telemetry));
        let cancel = self.cancellation_token.child_token();
        self.track(TELEMETRY, tokio::spawn(mqtt.run(cancel))).await;
        self.set_component_state(TELEMETRY, ComponentState::Running)
            .await;
        info!(
            "Telemetry started for printer {} ({})",
            self.config.printer.host,
            self.config.printer.report_topic()
        );

        // The engine itself is passive until a session starts
        self.set_component_state(ENGINE, ComponentState::Running)
            .await;

        if self.config.capture.auto_start {
            self.set_component_state(AUTO_START, ComponentState::Starting)
                .await;
            let watcher = self
                .engine
                .spawn_auto_start(self.cancellation_token.child_token());
            self.track(AUTO_START, watcher).await;
            self.set_component_state(AUTO_START, ComponentState::Running)
                .await;
            info!("Capture will start automatically at layer 0");
        }

        #[cfg(feature = "control")]
        if self.config.control.enabled {
            self.set_component_state(CONTROL, ComponentState::Starting)
                .await;

            let server = crate::control::ControlServer::new(
                self.config.control.clone(),
                self.engine.clone(),
            );
            let cancel = self.cancellation_token.child_token();
            let states = Arc::clone(&self.component_states);

            // Marked running up front; a bind or serve failure flips it to failed
            self.set_component_state(CONTROL, ComponentState::Running)
                .await;
            let handle = tokio::spawn(async move {
                if let Err(e) = server.start(cancel).await {
                    tracing::error!("Control server error: {}", e);
                    states
                        .lock()
                        .await
                        .insert(CONTROL, ComponentState::Failed);
                }
            });
            self.track(CONTROL, handle).await;
            info!(
                "Control server started on {}:{}",
                self.config.control.ip, self.config.control.port
            );
        }

        info!("Timelapser started successfully");
        Ok(())
    }

    fn control_enabled(&self) -> bool {
        cfg!(feature = "control") && self.config.control.enabled
    }

    async fn track(&self, component: &'static str, handle: tokio::task::JoinHandle<()>) {
        self.tasks.lock().await.push((component, handle));
    }
}
