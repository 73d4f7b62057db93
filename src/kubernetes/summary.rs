//! Per-namespace object counts
//!
//! Every namespace gets one `kubernetes` metric record. Kinds are listed one
//! after another inside a namespace, and a kind whose listing fails is left
//! out of that namespace's record instead of failing the whole summary.

use super::collector::{CollectContext, Collector};
use crate::k8s::api::KubeApi;
use crate::k8s::types;
use crate::Result;
use async_trait::async_trait;
use datakit_common::{Category, Record};
use std::future::Future;
use tracing::warn;

pub const SUMMARY_MEASUREMENT: &str = "kubernetes";

pub struct NamespaceSummaryCollector;

#[async_trait]
impl Collector for NamespaceSummaryCollector {
    fn kind(&self) -> &'static str {
        "namespace_summary"
    }

    fn category(&self) -> Category {
        Category::Metric
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let namespaces: Vec<String> = match ctx.namespace() {
            Some(ns) => vec![ns.to_string()],
            None => api
                .list_namespaces()
                .await?
                .iter()
                .map(|ns| types::name(&ns.metadata).to_string())
                .collect(),
        };

        // Nodes are cluster-scoped; the same count is reported for every namespace
        let nodes = count("node", None, api.list_nodes()).await;

        let mut records = Vec::with_capacity(namespaces.len());
        for ns in &namespaces {
            records.push(summarize(api, ns, nodes, ctx).await);
        }
        Ok(records)
    }
}

async fn summarize(
    api: &dyn KubeApi,
    namespace: &str,
    nodes: Option<usize>,
    ctx: &CollectContext,
) -> Record {
    let ns = Some(namespace);
    let mut record = Record::new(SUMMARY_MEASUREMENT, ctx.now).with_tag("namespace", namespace);

    let mut set = |key: &str, value: Option<usize>| {
        if let Some(v) = value {
            record.set_field(key, v);
        }
    };

    set("daemonset", count("daemonset", ns, api.list_daemonsets(ns)).await);
    set("deployment", count("deployment", ns, api.list_deployments(ns)).await);
    set("endpoints", count("endpoints", ns, api.list_endpoints(ns)).await);
    set("node", nodes);
    set("service", count("service", ns, api.list_services(ns)).await);
    set("statefulset", count("statefulset", ns, api.list_statefulsets(ns)).await);
    set("ingress", count("ingress", ns, api.list_ingresses(ns)).await);

    match api.list_pods(ns).await {
        Ok(pods) => {
            let containers = pods
                .iter()
                .filter_map(|p| p.spec.as_ref())
                .map(|s| s.containers.len())
                .sum();
            set("pod", Some(pods.len()));
            set("container", Some(containers));
        }
        Err(e) => warn!(kind = "pod", namespace, error = %e, "Failed to count objects"),
    }

    set("job", count("job", ns, api.list_jobs(ns)).await);
    set("cronjob", count("cronjob", ns, api.list_cronjobs(ns)).await);

    record.merge_tags(&ctx.extra_tags);
    record
}

async fn count<T>(
    kind: &str,
    namespace: Option<&str>,
    listing: impl Future<Output = Result<Vec<T>>>,
) -> Option<usize> {
    match listing.await {
        Ok(items) => Some(items.len()),
        Err(e) => {
            warn!(kind, namespace = namespace.unwrap_or("*"), error = %e, "Failed to count objects");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::InMemoryCluster;
    use datakit_common::FieldValue;
    use serde_json::json;

    fn cluster_with_two_namespaces() -> InMemoryCluster {
        let cluster = InMemoryCluster::new();
        for ns in ["a", "b"] {
            cluster.add_namespace(serde_json::from_value(json!({"metadata": {"name": ns}})).unwrap());
            cluster.add_endpoints(
                serde_json::from_value(json!({"metadata": {"name": "web", "namespace": ns}})).unwrap(),
            );
            cluster.add_pod(
                serde_json::from_value(json!({
                    "metadata": {"name": "web-0", "namespace": ns},
                    "spec": {"containers": [{"name": "app"}, {"name": "proxy"}]}
                }))
                .unwrap(),
            );
        }
        cluster.add_node(serde_json::from_value(json!({"metadata": {"name": "n1"}})).unwrap());
        cluster
    }

    #[tokio::test]
    async fn test_counts_per_namespace() {
        let cluster = cluster_with_two_namespaces();
        let records = NamespaceSummaryCollector
            .collect(&cluster, &CollectContext::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.name, SUMMARY_MEASUREMENT);
            assert_eq!(record.field("pod"), Some(&FieldValue::Int(1)));
            assert_eq!(record.field("container"), Some(&FieldValue::Int(2)));
            assert_eq!(record.field("endpoints"), Some(&FieldValue::Int(1)));
            assert_eq!(record.field("node"), Some(&FieldValue::Int(1)));
            assert_eq!(record.field("deployment"), Some(&FieldValue::Int(0)));
        }
    }

    #[tokio::test]
    async fn test_failed_kind_is_omitted_for_that_namespace_only() {
        let cluster = cluster_with_two_namespaces();
        cluster.fail_listing("endpoints", Some("a"));

        let records = NamespaceSummaryCollector
            .collect(&cluster, &CollectContext::default())
            .await
            .unwrap();

        let a = records.iter().find(|r| r.tag("namespace") == Some("a")).unwrap();
        let b = records.iter().find(|r| r.tag("namespace") == Some("b")).unwrap();
        assert_eq!(a.field("endpoints"), None);
        assert_eq!(a.field("pod"), Some(&FieldValue::Int(1)));
        assert_eq!(a.field("service"), Some(&FieldValue::Int(0)));
        assert_eq!(b.field("endpoints"), Some(&FieldValue::Int(1)));
    }

    #[tokio::test]
    async fn test_namespace_listing_failure_fails_summary() {
        let cluster = cluster_with_two_namespaces();
        cluster.fail_listing("namespaces", None);

        let result = NamespaceSummaryCollector
            .collect(&cluster, &CollectContext::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_calls_are_serial_in_kind_order() {
        let cluster = cluster_with_two_namespaces();
        NamespaceSummaryCollector
            .collect(&cluster, &CollectContext::default().with_namespace("a"))
            .await
            .unwrap();

        let kinds: Vec<String> = cluster.calls().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                "nodes",
                "daemonsets",
                "deployments",
                "endpoints",
                "services",
                "statefulsets",
                "ingresses",
                "pods",
                "jobs",
                "cronjobs"
            ]
        );
    }
}
