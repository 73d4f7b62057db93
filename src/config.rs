//! Agent configuration file
//!
//! ```yaml
//! global_tags: {cluster: prod}
//! kubernetes:
//!   url: https://kubernetes.default:443
//!   bearer_token: /run/secrets/kubernetes.io/serviceaccount/token
//!   interval_secs: 60
//!   tags: {team: infra}
//! ```
//!
//! Values are validated and clamped once at load time.

use crate::discovery::engine::{DEFAULT_SCAN_INTERVAL, MIN_SCAN_INTERVAL};
use crate::k8s::Credentials;
use crate::kubernetes::runner::{DEFAULT_INTERVAL, MIN_INTERVAL};
use crate::{DatakitError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const NODE_NAME_ENV_VARS: [&str; 2] = ["NODE_NAME", "ENV_K8S_NODE_NAME"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub global_tags: BTreeMap<String, String>,
    pub kubernetes: KubernetesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KubernetesConfig {
    pub url: Option<String>,
    pub bearer_token: Option<PathBuf>,
    pub insecure_skip_verify: bool,
    pub tls_ca: Option<PathBuf>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub kubeconfig: Option<PathBuf>,
    pub interval_secs: u64,
    pub tags: BTreeMap<String, String>,
    pub enable_events: bool,
    pub enable_autodiscovery: bool,
    pub discovery_interval_secs: u64,
    pub node_name: Option<String>,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            url: None,
            bearer_token: None,
            insecure_skip_verify: false,
            tls_ca: None,
            tls_cert: None,
            tls_key: None,
            kubeconfig: None,
            interval_secs: DEFAULT_INTERVAL.as_secs(),
            tags: BTreeMap::new(),
            enable_events: true,
            enable_autodiscovery: true,
            discovery_interval_secs: DEFAULT_SCAN_INTERVAL.as_secs(),
            node_name: None,
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DatakitError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: AgentConfig = if text.trim().is_empty() {
            AgentConfig::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| DatakitError::ConfigError(e.to_string()))?
        };
        config.validate()
    }

    fn validate(mut self) -> Result<Self> {
        let k8s = &mut self.kubernetes;

        if let Some(url) = &k8s.url {
            if url.trim().is_empty() {
                return Err(DatakitError::ConfigError(
                    "kubernetes.url must not be empty".to_string(),
                ));
            }
        }
        if k8s.tls_cert.is_some() != k8s.tls_key.is_some() {
            return Err(DatakitError::ConfigError(
                "kubernetes.tls_cert and kubernetes.tls_key must be set together".to_string(),
            ));
        }

        let min = MIN_INTERVAL.as_secs();
        if k8s.interval_secs < min {
            warn!(configured = k8s.interval_secs, min, "Collection interval too low, clamping");
            k8s.interval_secs = min;
        }
        let min = MIN_SCAN_INTERVAL.as_secs();
        if k8s.discovery_interval_secs < min {
            warn!(
                configured = k8s.discovery_interval_secs,
                min, "Discovery interval too low, clamping"
            );
            k8s.discovery_interval_secs = min;
        }

        Ok(self)
    }

    /// Global tags overlaid with the kubernetes input's own tags
    pub fn merged_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.global_tags.clone();
        tags.extend(self.kubernetes.tags.clone());
        tags
    }
}

impl KubernetesConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    /// Credential source: bearer token, then TLS bundle, then kubeconfig,
    /// then whatever kube can infer
    pub fn credentials(&self) -> Result<Credentials> {
        if let Some(token_file) = &self.bearer_token {
            return Ok(Credentials::BearerToken {
                url: self.require_url("bearer_token")?,
                token_file: token_file.clone(),
                insecure_skip_verify: self.insecure_skip_verify,
            });
        }
        if let Some(ca) = &self.tls_ca {
            return Ok(Credentials::Tls {
                url: self.require_url("tls_ca")?,
                ca: ca.clone(),
                cert: self.tls_cert.clone(),
                key: self.tls_key.clone(),
                insecure_skip_verify: self.insecure_skip_verify,
            });
        }
        Ok(Credentials::Kubeconfig {
            path: self.kubeconfig.clone(),
        })
    }

    fn require_url(&self, with: &str) -> Result<String> {
        self.url.clone().ok_or_else(|| {
            DatakitError::ConfigError(format!("kubernetes.{} requires kubernetes.url", with))
        })
    }

    /// Configured node name, else the first of `$NODE_NAME` / `$ENV_K8S_NODE_NAME`
    pub fn resolve_node_name(&self) -> Option<String> {
        self.resolve_node_name_with(|key| std::env::var(key).ok())
    }

    fn resolve_node_name_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.node_name
            .clone()
            .or_else(|| NODE_NAME_ENV_VARS.iter().find_map(|key| lookup(key)))
            .filter(|n| !n.trim().is_empty())
    }
}
