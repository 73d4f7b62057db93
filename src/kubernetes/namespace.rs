use super::collector::{finish, object_record, CollectContext, Collector};
use crate::k8s::api::KubeApi;
use crate::Result;
use async_trait::async_trait;
use datakit_common::Record;

pub struct NamespaceCollector;

#[async_trait]
impl Collector for NamespaceCollector {
    fn kind(&self) -> &'static str {
        "namespace"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let namespaces = api.list_namespaces().await?;
        Ok(namespaces
            .iter()
            .map(|ns| {
                let mut record =
                    object_record("kubernetes_namespaces", "namespace_name", &ns.metadata, ctx);
                record.set_tag(
                    "status",
                    ns.status
                        .as_ref()
                        .and_then(|s| s.phase.as_deref())
                        .unwrap_or("Active"),
                );
                finish(record, ctx)
            })
            .collect())
    }
}
