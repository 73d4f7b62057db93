use crate::k8s::api::{EventApi, EventSnapshot, EventStream, KubeApi, StreamEvent};
use crate::{DatakitError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    Endpoints, Event, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Page size for list calls
const QUERY_LIMIT: u32 = 500;

/// Server-side timeout for one watch request
const WATCH_TIMEOUT_SECS: u32 = 290;

const CONTEXT_NAME: &str = "datakit";

/// Where the cluster credentials come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    BearerToken {
        url: String,
        token_file: PathBuf,
        insecure_skip_verify: bool,
    },
    Tls {
        url: String,
        ca: PathBuf,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
        insecure_skip_verify: bool,
    },
    /// Local kubeconfig file; `None` infers in-cluster or `~/.kube/config`
    Kubeconfig { path: Option<PathBuf> },
}

impl Credentials {
    fn describe(&self) -> &'static str {
        match self {
            Credentials::BearerToken { .. } => "bearer token",
            Credentials::Tls { .. } => "TLS client certificate",
            Credentials::Kubeconfig { path: Some(_) } => "kubeconfig",
            Credentials::Kubeconfig { path: None } => "inferred config",
        }
    }

    async fn kube_config(&self) -> Result<Config> {
        match self {
            Credentials::BearerToken {
                url,
                token_file,
                insecure_skip_verify,
            } => {
                validate_url(url)?;
                let token = read_credential(token_file)?;
                if token.trim().is_empty() {
                    return Err(DatakitError::CredentialError {
                        path: token_file.display().to_string(),
                        message: "token file is empty".to_string(),
                    });
                }

                let kubeconfig = synthesize_kubeconfig(
                    serde_json::json!({
                        "server": url,
                        "insecure-skip-tls-verify": insecure_skip_verify,
                    }),
                    serde_json::json!({ "tokenFile": token_file.display().to_string() }),
                )?;
                from_kubeconfig(kubeconfig).await
            }
            Credentials::Tls {
                url,
                ca,
                cert,
                key,
                insecure_skip_verify,
            } => {
                validate_url(url)?;
                read_credential(ca)?;

                let mut user = serde_json::Map::new();
                if let Some(cert) = cert {
                    read_credential(cert)?;
                    user.insert(
                        "client-certificate".to_string(),
                        cert.display().to_string().into(),
                    );
                }
                if let Some(key) = key {
                    read_credential(key)?;
                    user.insert("client-key".to_string(), key.display().to_string().into());
                }

                let kubeconfig = synthesize_kubeconfig(
                    serde_json::json!({
                        "server": url,
                        "certificate-authority": ca.display().to_string(),
                        "insecure-skip-tls-verify": insecure_skip_verify,
                    }),
                    serde_json::Value::Object(user),
                )?;
                from_kubeconfig(kubeconfig).await
            }
            Credentials::Kubeconfig { path: Some(path) } => {
                read_credential(path)?;
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    DatakitError::CredentialError {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    }
                })?;
                from_kubeconfig(kubeconfig).await
            }
            Credentials::Kubeconfig { path: None } => Config::infer().await.map_err(|e| {
                DatakitError::KubernetesError(format!("Failed to infer K8s config: {}", e))
            }),
        }
    }
}

fn validate_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(DatakitError::InvalidUrl(url.to_string()));
    }

    let parsed = reqwest::Url::parse(url).map_err(|_| DatakitError::InvalidUrl(url.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(DatakitError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

fn read_credential(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| DatakitError::CredentialError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Build a single-context kubeconfig around one cluster and one user entry
fn synthesize_kubeconfig(cluster: serde_json::Value, user: serde_json::Value) -> Result<Kubeconfig> {
    let document = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": CONTEXT_NAME, "cluster": cluster }],
        "users": [{ "name": CONTEXT_NAME, "user": user }],
        "contexts": [{
            "name": CONTEXT_NAME,
            "context": { "cluster": CONTEXT_NAME, "user": CONTEXT_NAME },
        }],
        "current-context": CONTEXT_NAME,
    });

    serde_json::from_value(document)
        .map_err(|e| DatakitError::ConfigError(format!("Invalid synthesized kubeconfig: {}", e)))
}

async fn from_kubeconfig(kubeconfig: Kubeconfig) -> Result<Config> {
    Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| DatakitError::KubernetesError(format!("Failed to load K8s config: {}", e)))
}

pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    pub async fn connect(credentials: &Credentials) -> Result<Self> {
        debug!("Initializing Kubernetes client from {}", credentials.describe());

        let config = credentials.kube_config().await?;
        let cluster_url = config.cluster_url.to_string();

        let client = Client::try_from(config).map_err(|e| {
            DatakitError::KubernetesError(format!("Failed to create K8s client: {}", e))
        })?;

        info!(cluster_url = %cluster_url, "Kubernetes client ready");

        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn scoped<K>(&self, namespace: Option<&str>) -> Api<K>
    where
        K: kube::Resource<Scope = NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    fn cluster<K>(&self) -> Api<K>
    where
        K: kube::Resource,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::all(self.client.clone())
    }

    async fn list_paged<K>(&self, api: Api<K>, kind: &str) -> Result<Vec<K>>
    where
        K: Clone + DeserializeOwned + Debug,
    {
        let mut items = Vec::new();
        let mut params = ListParams::default().limit(QUERY_LIMIT);

        loop {
            let page = api.list(&params).await.map_err(|e| DatakitError::ListFailed {
                kind: kind.to_string(),
                message: e.to_string(),
            })?;
            items.extend(page.items);

            match page.metadata.continue_ {
                Some(token) if !token.is_empty() => {
                    params = params.continue_token(&token);
                }
                _ => break,
            }
        }

        debug!(kind, count = items.len(), "Listed objects");
        Ok(items)
    }
}

#[async_trait]
impl KubeApi for K8sClient {
    async fn list_pods(&self, namespace: Option<&str>) -> Result<Vec<Pod>> {
        self.list_paged(self.scoped(namespace), "pods").await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list_paged(self.cluster(), "nodes").await
    }

    async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        self.list_paged(self.cluster(), "namespaces").await
    }

    async fn list_deployments(&self, namespace: Option<&str>) -> Result<Vec<Deployment>> {
        self.list_paged(self.scoped(namespace), "deployments").await
    }

    async fn list_daemonsets(&self, namespace: Option<&str>) -> Result<Vec<DaemonSet>> {
        self.list_paged(self.scoped(namespace), "daemonsets").await
    }

    async fn list_replicasets(&self, namespace: Option<&str>) -> Result<Vec<ReplicaSet>> {
        self.list_paged(self.scoped(namespace), "replicasets").await
    }

    async fn list_statefulsets(&self, namespace: Option<&str>) -> Result<Vec<StatefulSet>> {
        self.list_paged(self.scoped(namespace), "statefulsets").await
    }

    async fn list_services(&self, namespace: Option<&str>) -> Result<Vec<Service>> {
        self.list_paged(self.scoped(namespace), "services").await
    }

    async fn list_endpoints(&self, namespace: Option<&str>) -> Result<Vec<Endpoints>> {
        self.list_paged(self.scoped(namespace), "endpoints").await
    }

    async fn list_jobs(&self, namespace: Option<&str>) -> Result<Vec<Job>> {
        self.list_paged(self.scoped(namespace), "jobs").await
    }

    async fn list_cronjobs(&self, namespace: Option<&str>) -> Result<Vec<CronJob>> {
        self.list_paged(self.scoped(namespace), "cronjobs").await
    }

    async fn list_ingresses(&self, namespace: Option<&str>) -> Result<Vec<Ingress>> {
        self.list_paged(self.scoped(namespace), "ingresses").await
    }

    async fn list_persistent_volumes(&self) -> Result<Vec<PersistentVolume>> {
        self.list_paged(self.cluster(), "persistentvolumes").await
    }

    async fn list_persistent_volume_claims(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<PersistentVolumeClaim>> {
        self.list_paged(self.scoped(namespace), "persistentvolumeclaims")
            .await
    }
}

#[async_trait]
impl EventApi for K8sClient {
    async fn list_events(&self) -> Result<EventSnapshot> {
        let api: Api<Event> = self.cluster();
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| DatakitError::ListFailed {
                kind: "events".to_string(),
                message: e.to_string(),
            })?;

        Ok(EventSnapshot {
            resource_version: list.metadata.resource_version.unwrap_or_default(),
            count: list.items.len(),
        })
    }

    async fn watch_events(&self, resource_version: &str) -> Result<EventStream> {
        let api: Api<Event> = self.cluster();
        let params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);

        let stream = api
            .watch(&params, resource_version)
            .await
            .map_err(|e| DatakitError::WatchError(format!("Failed to open event watch: {}", e)))?;

        Ok(stream
            .map(|item| match item {
                Ok(WatchEvent::Added(event)) => Ok(StreamEvent::Added(Box::new(event))),
                Ok(WatchEvent::Modified(event)) => Ok(StreamEvent::Modified(Box::new(event))),
                Ok(WatchEvent::Deleted(event)) => Ok(StreamEvent::Deleted(Box::new(event))),
                Ok(WatchEvent::Bookmark(bookmark)) => {
                    Ok(StreamEvent::Bookmark(bookmark.metadata.resource_version))
                }
                Ok(WatchEvent::Error(status)) => Ok(StreamEvent::Error(format!(
                    "{} (code {})",
                    status.message, status.code
                ))),
                Err(e) => Err(DatakitError::WatchError(e.to_string())),
            })
            .boxed())
    }
}
