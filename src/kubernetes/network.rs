use super::collector::{finish, object_record, CollectContext, Collector};
use crate::k8s::api::KubeApi;
use crate::Result;
use async_trait::async_trait;
use datakit_common::Record;
use k8s_openapi::api::core::v1::{Endpoints, Service};

pub struct ServiceCollector;

#[async_trait]
impl Collector for ServiceCollector {
    fn kind(&self) -> &'static str {
        "service"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let services = api.list_services(ctx.namespace()).await?;
        Ok(services.iter().map(|s| service_record(s, ctx)).collect())
    }
}

fn service_record(service: &Service, ctx: &CollectContext) -> Record {
    let mut record = object_record(
        "kubernetes_services",
        "service_name",
        &service.metadata,
        ctx,
    );
    let spec = service.spec.as_ref();

    record.set_tag(
        "type",
        spec.and_then(|s| s.type_.as_deref()).unwrap_or("ClusterIP"),
    );
    record.set_tag(
        "cluster_ip",
        spec.and_then(|s| s.cluster_ip.as_deref()).unwrap_or(""),
    );

    let external_ips = spec
        .and_then(|s| s.external_ips.as_ref())
        .map(|ips| ips.join(","))
        .unwrap_or_default();
    let ports = spec
        .and_then(|s| s.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .map(|p| format!("{}/{}", p.port, p.protocol.as_deref().unwrap_or("TCP")))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();

    record.set_field("external_ips", external_ips);
    record.set_field("ports", ports);
    record.set_field(
        "session_affinity",
        spec.and_then(|s| s.session_affinity.clone())
            .unwrap_or_else(|| "None".to_string()),
    );

    finish(record, ctx)
}

pub struct EndpointsCollector;

#[async_trait]
impl Collector for EndpointsCollector {
    fn kind(&self) -> &'static str {
        "endpoints"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let endpoints = api.list_endpoints(ctx.namespace()).await?;
        Ok(endpoints.iter().map(|e| endpoints_record(e, ctx)).collect())
    }
}

fn endpoints_record(endpoints: &Endpoints, ctx: &CollectContext) -> Record {
    let mut record = object_record(
        "kubernetes_endpoints",
        "endpoints_name",
        &endpoints.metadata,
        ctx,
    );

    let mut ready = 0;
    let mut not_ready = 0;
    let mut ports = 0;
    for subset in endpoints.subsets.iter().flatten() {
        ready += subset.addresses.as_ref().map(Vec::len).unwrap_or(0);
        not_ready += subset.not_ready_addresses.as_ref().map(Vec::len).unwrap_or(0);
        ports += subset.ports.as_ref().map(Vec::len).unwrap_or(0);
    }

    record.set_field("ready_addresses", ready);
    record.set_field("not_ready_addresses", not_ready);
    record.set_field("ports", ports);

    finish(record, ctx)
}
