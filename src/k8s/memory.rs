//! In-memory cluster serving listings and scripted event watches
//!
//! Objects are filtered by namespace the way the API server would. Listing
//! failures can be injected per kind, optionally for a single namespace.

use crate::k8s::api::{EventApi, EventSnapshot, EventStream, KubeApi, StreamEvent};
use crate::{DatakitError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    Endpoints, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::Metadata;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Default)]
struct ClusterState {
    pods: Vec<Pod>,
    nodes: Vec<Node>,
    namespaces: Vec<Namespace>,
    deployments: Vec<Deployment>,
    daemonsets: Vec<DaemonSet>,
    replicasets: Vec<ReplicaSet>,
    statefulsets: Vec<StatefulSet>,
    services: Vec<Service>,
    endpoints: Vec<Endpoints>,
    jobs: Vec<Job>,
    cronjobs: Vec<CronJob>,
    ingresses: Vec<Ingress>,
    persistent_volumes: Vec<PersistentVolume>,
    persistent_volume_claims: Vec<PersistentVolumeClaim>,
    failures: Vec<(String, Option<String>)>,
    calls: Vec<(String, Option<String>)>,
    event_sessions: VecDeque<EventSession>,
}

/// One list+watch cycle: the baseline version and what the watch yields
/// before its stream closes
pub struct EventSession {
    pub resource_version: String,
    pub items: Vec<Result<StreamEvent>>,
}

#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ClusterState) -> R) -> R {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state)
    }

    pub fn add_pod(&self, pod: Pod) {
        self.with_state(|s| s.pods.push(pod));
    }

    pub fn add_node(&self, node: Node) {
        self.with_state(|s| s.nodes.push(node));
    }

    pub fn add_namespace(&self, namespace: Namespace) {
        self.with_state(|s| s.namespaces.push(namespace));
    }

    pub fn add_deployment(&self, deployment: Deployment) {
        self.with_state(|s| s.deployments.push(deployment));
    }

    pub fn add_daemonset(&self, daemonset: DaemonSet) {
        self.with_state(|s| s.daemonsets.push(daemonset));
    }

    pub fn add_replicaset(&self, replicaset: ReplicaSet) {
        self.with_state(|s| s.replicasets.push(replicaset));
    }

    pub fn add_statefulset(&self, statefulset: StatefulSet) {
        self.with_state(|s| s.statefulsets.push(statefulset));
    }

    pub fn add_service(&self, service: Service) {
        self.with_state(|s| s.services.push(service));
    }

    pub fn add_endpoints(&self, endpoints: Endpoints) {
        self.with_state(|s| s.endpoints.push(endpoints));
    }

    pub fn add_job(&self, job: Job) {
        self.with_state(|s| s.jobs.push(job));
    }

    pub fn add_cronjob(&self, cronjob: CronJob) {
        self.with_state(|s| s.cronjobs.push(cronjob));
    }

    pub fn add_ingress(&self, ingress: Ingress) {
        self.with_state(|s| s.ingresses.push(ingress));
    }

    pub fn add_persistent_volume(&self, volume: PersistentVolume) {
        self.with_state(|s| s.persistent_volumes.push(volume));
    }

    pub fn add_persistent_volume_claim(&self, claim: PersistentVolumeClaim) {
        self.with_state(|s| s.persistent_volume_claims.push(claim));
    }

    /// Make listings of `kind` fail, in one namespace or (`None`) everywhere
    pub fn fail_listing(&self, kind: &str, namespace: Option<&str>) {
        self.with_state(|s| {
            s.failures
                .push((kind.to_string(), namespace.map(str::to_string)))
        });
    }

    pub fn clear_failures(&self) {
        self.with_state(|s| s.failures.clear());
    }

    /// Listing calls made so far, as `(kind, namespace)`
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn push_event_session(&self, resource_version: &str, items: Vec<Result<StreamEvent>>) {
        self.with_state(|s| {
            s.event_sessions.push_back(EventSession {
                resource_version: resource_version.to_string(),
                items,
            })
        });
    }

    pub fn event_sessions_remaining(&self) -> usize {
        self.with_state(|s| s.event_sessions.len())
    }

    fn list<T>(
        &self,
        kind: &str,
        namespace: Option<&str>,
        select: impl FnOnce(&ClusterState) -> &Vec<T>,
    ) -> Result<Vec<T>>
    where
        T: Clone + Metadata<Ty = ObjectMeta>,
    {
        self.with_state(|s| {
            s.calls
                .push((kind.to_string(), namespace.map(str::to_string)));

            let failed = s.failures.iter().any(|(k, ns)| {
                k == kind && (ns.is_none() || ns.as_deref() == namespace)
            });
            if failed {
                return Err(DatakitError::ListFailed {
                    kind: kind.to_string(),
                    message: "injected failure".to_string(),
                });
            }

            Ok(select(s)
                .iter()
                .filter(|item| match namespace {
                    Some(ns) => item.metadata().namespace.as_deref() == Some(ns),
                    None => true,
                })
                .cloned()
                .collect())
        })
    }
}

#[async_trait]
impl KubeApi for InMemoryCluster {
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>> {
        self.list("pods", namespace, |s| &s.pods)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list("nodes", None, |s| &s.nodes)
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        self.list("namespaces", None, |s| &s.namespaces)
    }

    async fn list_deployments(&self, namespace: Option<&str>) -> Result<Vec<Deployment>> {
        self.list("deployments", namespace, |s| &s.deployments)
    }

    async fn list_daemonsets(&self, namespace: Option<&str>) -> Result<Vec<DaemonSet>> {
        self.list("daemonsets", namespace, |s| &s.daemonsets)
    }

    async fn list_replicasets(&self, namespace: Option<&str>) -> Result<Vec<ReplicaSet>> {
        self.list("replicasets", namespace, |s| &s.replicasets)
    }

    async fn list_statefulsets(&self, namespace: Option<&str>) -> Result<Vec<StatefulSet>> {
        self.list("statefulsets", namespace, |s| &s.statefulsets)
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>> {
        self.list("services", namespace, |s| &s.services)
    }

    async fn list_endpoints(&self, namespace: Option<&str>) -> Result<Vec<Endpoints>> {
        self.list("endpoints", namespace, |s| &s.endpoints)
    }

    async fn list_jobs(&self, namespace: Option<&str>) -> Result<Vec<Job>> {
        self.list("jobs", namespace, |s| &s.jobs)
    }

    async fn list_cronjobs(&self, namespace: Option<&str>) -> Result<Vec<CronJob>> {
        self.list("cronjobs", namespace, |s| &s.cronjobs)
    }

    async fn list_ingresses(&self, namespace: Option<&str>) -> Result<Vec<Ingress>> {
        self.list("ingresses", namespace, |s| &s.ingresses)
    }

    async fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>> {
        self.list("persistentvolumes", None, |s| &s.persistent_volumes)
    }

    async fn list_persistent_volume_claims(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        self.list("persistentvolumeclaims", namespace, |s| {
            &s.persistent_volume_claims
        })
    }
}

#[async_trait]
impl EventApi for InMemoryCluster {
    async fn list_events(&self) -> Result<EventSnapshot> {
        self.with_state(|s| match s.event_sessions.front() {
            Some(session) => Ok(EventSnapshot {
                resource_version: session.resource_version.clone(),
                count: 0,
            }),
            None => Err(DatakitError::ListFailed {
                kind: "events".to_string(),
                message: "no scripted event session left".to_string(),
            }),
        })
    }

    async fn watch_events(&self, resource_version: &str) -> Result<EventStream> {
        let session = self.with_state(|s| s.event_sessions.pop_front());
        match session {
            Some(session) if session.resource_version == resource_version => {
                Ok(futures::stream::iter(session.items).boxed())
            }
            Some(session) => Err(DatakitError::WatchError(format!(
                "watch from {} does not match scripted baseline {}",
                resource_version, session.resource_version
            ))),
            None => Err(DatakitError::WatchError(
                "no scripted event session left".to_string(),
            )),
        }
    }
}
