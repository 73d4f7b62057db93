//! Listing and watching seams over the cluster API
//!
//! Collectors, the namespace aggregator and autodiscovery only see
//! [`KubeApi`]; the event watcher only sees [`EventApi`]. Both are
//! implemented by [`K8sClient`](super::K8sClient) against a live cluster and
//! by [`InMemoryCluster`](super::InMemoryCluster) for tests and dry runs.

use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    Endpoints, Event, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Service,
};
use k8s_openapi::api::networking::v1::Ingress;

/// One listing call per resource kind. `namespace: None` lists across all
/// namespaces; cluster-scoped kinds take no namespace.
#[async_trait]
pub trait KubeApi: Send + Sync {
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>>;
    async fn list_nodes(&self) -> Result<Vec<Node>>;
    async fn list_namespaces(&self) -> Result<Vec<Namespace>>;
    async fn list_deployments(&self, namespace: Option<&str>) -> Result<Vec<Deployment>>;
    async fn list_daemonsets(&self, namespace: Option<&str>) -> Result<Vec<DaemonSet>>;
    async fn list_replicasets(&self, namespace: Option<&str>) -> Result<Vec<ReplicaSet>>;
    async fn list_statefulsets(&self, namespace: Option<&str>) -> Result<Vec<StatefulSet>>;
    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>>;
    async fn list_endpoints(&self, namespace: Option<&str>) -> Result<Vec<Endpoints>>;
    async fn list_jobs(&self, namespace: Option<&str>) -> Result<Vec<Job>>;
    async fn list_cronjobs(&self, namespace: Option<&str>) -> Result<Vec<CronJob>>;
    async fn list_ingresses(&self, namespace: Option<&str>) -> Result<Vec<Ingress>>;
    async fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>>;
    async fn list_persistent_volume_claims(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<PersistentVolumeClaim>>;
}

/// Result of the baseline event listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSnapshot {
    pub resource_version: String,
    pub count: usize,
}

/// One item read from the event watch stream
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Added(Box<Event>),
    Modified(Box<Event>),
    Deleted(Box<Event>),
    Bookmark(String),
    Error(String),
}

pub type EventStream = BoxStream<'static, Result<StreamEvent>>;

#[async_trait]
pub trait EventApi: Send + Sync {
    /// List all events to establish the watch cursor
    async fn list_events(&self) -> Result<EventSnapshot>;

    /// Open a watch starting after `resource_version`
    async fn watch_events(&self, resource_version: &str) -> Result<EventStream>;
}
