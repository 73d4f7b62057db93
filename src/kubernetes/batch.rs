use super::collector::{finish, object_record, CollectContext, Collector};
use crate::k8s::api::KubeApi;
use crate::k8s::types;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datakit_common::Record;
use k8s_openapi::api::batch::v1::{CronJob, Job};

pub struct JobCollector;

#[async_trait]
impl Collector for JobCollector {
    fn kind(&self) -> &'static str {
        "job"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let jobs = api.list_jobs(ctx.namespace()).await?;
        Ok(jobs.iter().map(|job| job_record(job, ctx)).collect())
    }
}

fn job_record(job: &Job, ctx: &CollectContext) -> Record {
    let mut record = object_record("kubernetes_jobs", "job_name", &job.metadata, ctx);
    if let Some((key, owner)) = types::owner(&job.metadata) {
        record.set_tag(key, owner);
    }

    let spec = job.spec.as_ref();
    let status = job.status.as_ref();
    record.set_field("active", status.and_then(|s| s.active).unwrap_or(0));
    record.set_field("succeeded", status.and_then(|s| s.succeeded).unwrap_or(0));
    record.set_field("failed", status.and_then(|s| s.failed).unwrap_or(0));
    record.set_field("completions", spec.and_then(|s| s.completions).unwrap_or(1));
    record.set_field("parallelism", spec.and_then(|s| s.parallelism).unwrap_or(1));

    let started = status.and_then(|s| s.start_time.as_ref()).map(|t| t.0);
    let completed = status.and_then(|s| s.completion_time.as_ref()).map(|t| t.0);
    record.set_field("duration", job_duration(started, completed, ctx.now));

    finish(record, ctx)
}

/// Seconds from start to completion, or to `now` while still running
fn job_duration(
    started: Option<DateTime<Utc>>,
    completed: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> i64 {
    match started {
        Some(start) => (completed.unwrap_or(now) - start).num_seconds().max(0),
        None => 0,
    }
}

pub struct CronJobCollector;

#[async_trait]
impl Collector for CronJobCollector {
    fn kind(&self) -> &'static str {
        "cronjob"
    }

    async fn collect(&self, api: &dyn KubeApi, ctx: &CollectContext) -> Result<Vec<Record>> {
        let cronjobs = api.list_cronjobs(ctx.namespace()).await?;
        Ok(cronjobs.iter().map(|c| cronjob_record(c, ctx)).collect())
    }
}

fn cronjob_record(cronjob: &CronJob, ctx: &CollectContext) -> Record {
    let mut record = object_record(
        "kubernetes_cron_jobs",
        "cron_job_name",
        &cronjob.metadata,
        ctx,
    );
    let spec = cronjob.spec.as_ref();
    let status = cronjob.status.as_ref();

    record.set_field(
        "schedule",
        spec.map(|s| s.schedule.clone()).unwrap_or_default(),
    );
    record.set_field("suspend", spec.and_then(|s| s.suspend).unwrap_or(false));
    record.set_field(
        "active",
        status
            .and_then(|s| s.active.as_ref())
            .map(Vec::len)
            .unwrap_or(0),
    );
    record.set_field(
        "last_schedule_age",
        types::since_seconds(status.and_then(|s| s.last_schedule_time.as_ref()), ctx.now),
    );

    finish(record, ctx)
}
