//! The kubernetes input: collection loop, event watcher and autodiscovery
//! running on one task tracker under one cancellation token

use super::default_collectors;
use super::events::EventWatcher;
use super::runner::{Runner, SOURCE_NAME};
use crate::config::AgentConfig;
use crate::discovery::{Autodiscovery, DiscoveryRegistry};
use crate::inputs::InputRegistry;
use crate::io::Feeder;
use crate::k8s::api::{EventApi, KubeApi};
use crate::k8s::K8sClient;
use crate::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

pub struct KubernetesInput {
    tracker: TaskTracker,
    cancel: CancellationToken,
    registry: DiscoveryRegistry,
}

impl KubernetesInput {
    /// Connect with the configured credentials and start every loop
    pub async fn start(
        config: &AgentConfig,
        feeder: Arc<dyn Feeder>,
        inputs: InputRegistry,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let credentials = config.kubernetes.credentials()?;
        let client = Arc::new(K8sClient::connect(&credentials).await?);
        Ok(Self::start_with(
            client.clone(),
            client,
            config,
            feeder,
            inputs,
            cancel,
        ))
    }

    pub fn start_with(
        api: Arc<dyn KubeApi>,
        events: Arc<dyn EventApi>,
        config: &AgentConfig,
        feeder: Arc<dyn Feeder>,
        inputs: InputRegistry,
        cancel: CancellationToken,
    ) -> Self {
        let tracker = TaskTracker::new();
        let registry = DiscoveryRegistry::new();
        let k8s = &config.kubernetes;
        let tags = config.merged_tags();

        let runner = Runner::new(api.clone(), feeder.clone(), default_collectors())
            .with_interval(k8s.interval())
            .with_tags(tags.clone());
        let token = cancel.child_token();
        tracker.spawn(async move { runner.run(token).await });

        if k8s.enable_events {
            let mut watcher = EventWatcher::new(events, feeder.clone(), SOURCE_NAME).with_tags(tags);
            let token = cancel.child_token();
            tracker.spawn(async move { watcher.run(token).await });
        }

        if k8s.enable_autodiscovery {
            let discovery = Autodiscovery::new(
                api,
                registry.clone(),
                inputs,
                feeder,
                tracker.clone(),
                cancel.child_token(),
            )
            .with_node_name(k8s.resolve_node_name())
            .with_tags(config.global_tags.clone())
            .with_interval(k8s.discovery_interval());
            tracker.spawn(async move { discovery.run().await });
        }

        info!(
            events = k8s.enable_events,
            autodiscovery = k8s.enable_autodiscovery,
            "Kubernetes input started"
        );

        Self {
            tracker,
            cancel,
            registry,
        }
    }

    pub fn registry(&self) -> &DiscoveryRegistry {
        &self.registry
    }

    /// Tasks still running, discovered inputs included
    pub fn running_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel every loop and wait for all of them to return
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Kubernetes input stopped");
    }
}
