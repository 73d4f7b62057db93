use super::collector::{finish, object_record, CollectContext, Collector};
use crate::k8s::api::KubeApi;
use crate::k8s::quantity;
use crate::Result;
use async_trait::async_trait;
use datakit_common::Record;
use k8s_openapi::api::core::v1::Node;

const ROLE_LABEL_PREFIX: &str = "node-role.kubernetes.io/";

pub struct NodeCollector;

#[async_trait]
impl Collector for NodeCollector {
    fn kind(&self) -> &'static str {
        "node"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let nodes = api.list_nodes().await?;
        Ok(nodes.iter().map(|node| node_record(node, ctx)).collect())
    }
}

fn node_record(node: &Node, ctx: &CollectContext) -> Record {
    let mut record = object_record("kubernetes_nodes", "node_name", &node.metadata, ctx);
    let status = node.status.as_ref();

    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .map(|c| c.status == "True")
        .unwrap_or(false);
    record.set_tag("status", if ready { "Ready" } else { "NotReady" });
    record.set_tag("node_ready", ready.to_string());
    record.set_tag("role", roles(node));

    if let Some(ip) = status
        .and_then(|s| s.addresses.as_ref())
        .and_then(|addrs| addrs.iter().find(|a| a.type_ == "InternalIP"))
    {
        record.set_tag("internal_ip", ip.address.as_str());
    }
    if let Some(info) = status.and_then(|s| s.node_info.as_ref()) {
        record.set_tag("kubelet_version", info.kubelet_version.as_str());
    }

    let capacity = status.and_then(|s| s.capacity.as_ref());
    let allocatable = status.and_then(|s| s.allocatable.as_ref());
    record.set_field(
        "cpu_capacity",
        quantity::cpu_cores(capacity.and_then(|c| c.get("cpu"))),
    );
    record.set_field(
        "cpu_allocatable",
        quantity::cpu_cores(allocatable.and_then(|c| c.get("cpu"))),
    );
    record.set_field(
        "mem_capacity",
        quantity::bytes(capacity.and_then(|c| c.get("memory"))),
    );
    record.set_field(
        "mem_allocatable",
        quantity::bytes(allocatable.and_then(|c| c.get("memory"))),
    );
    record.set_field(
        "pods_capacity",
        quantity::bytes(capacity.and_then(|c| c.get("pods"))),
    );
    record.set_field(
        "pods_allocatable",
        quantity::bytes(allocatable.and_then(|c| c.get("pods"))),
    );

    finish(record, ctx)
}

/// Comma-joined roles from `node-role.kubernetes.io/<role>` labels, or `none`
fn roles(node: &Node) -> String {
    let roles: Vec<&str> = node
        .metadata
        .labels
        .iter()
        .flat_map(|labels| labels.keys())
        .filter_map(|k| k.strip_prefix(ROLE_LABEL_PREFIX))
        .filter(|r| !r.is_empty())
        .collect();

    if roles.is_empty() {
        "none".to_string()
    } else {
        roles.join(",")
    }
}
