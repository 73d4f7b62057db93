//! Prometheus text exposition scraper
//!
//! ```toml
//! [[inputs.prom]]
//! urls = ["http://$IP:9100/metrics"]
//! interval_secs = 30
//! measurement_name = "node_exporter"   # optional
//! [inputs.prom.tags]
//! service = "node-exporter"
//! ```

use super::{Input, InputContext};
use crate::io::FeedOption;
use crate::{DatakitError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datakit_common::{Category, Record};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const INPUT_NAME: &str = "prom";

const DEFAULT_INTERVAL_SECS: u64 = 60;
const MIN_INTERVAL_SECS: u64 = 1;
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct PromConfig {
    #[serde(default)]
    urls: Vec<String>,
    url: Option<String>,
    #[serde(default = "default_interval")]
    interval_secs: u64,
    measurement_name: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

pub struct PromInput {
    urls: Vec<String>,
    interval: Duration,
    measurement_name: Option<String>,
    tags: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl PromInput {
    pub fn from_table(table: &toml::Table) -> Result<Self> {
        let config: PromConfig = toml::Value::Table(table.clone())
            .try_into()
            .map_err(|e: toml::de::Error| DatakitError::InputConfigError(e.message().to_string()))?;

        let mut urls = config.urls;
        if let Some(url) = config.url {
            urls.push(url);
        }
        if urls.is_empty() {
            return Err(DatakitError::InputConfigError(
                "prom input needs at least one url".to_string(),
            ));
        }
        for url in &urls {
            reqwest::Url::parse(url)
                .map_err(|e| DatakitError::InputConfigError(format!("{}: {}", url, e)))?;
        }

        let client = reqwest::Client::builder()
            .timeout(SCRAPE_TIMEOUT)
            .build()
            .map_err(|e| DatakitError::InputConfigError(e.to_string()))?;

        Ok(Self {
            urls,
            interval: Duration::from_secs(config.interval_secs.max(MIN_INTERVAL_SECS)),
            measurement_name: config.measurement_name,
            tags: config.tags,
            client,
        })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    async fn scrape(&self, url: &str) -> Result<String> {
        let scrape_err = |e: reqwest::Error| DatakitError::ScrapeError {
            url: url.to_string(),
            message: e.to_string(),
        };
        self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(scrape_err)?
            .text()
            .await
            .map_err(scrape_err)
    }

    async fn scrape_all(&self, ctx: &InputContext) {
        for url in &self.urls {
            let start = Instant::now();
            let body = match self.scrape(url).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(%url, error = %e, "Scrape failed");
                    ctx.feeder.feed_last_error(INPUT_NAME, &e.to_string());
                    continue;
                }
            };

            let mut records = parse_exposition(&body, self.measurement_name.as_deref(), Utc::now());
            for record in &mut records {
                record.merge_tags(&self.tags);
                record.merge_tags(&ctx.tags);
            }
            debug!(%url, records = records.len(), "Scraped");

            if records.is_empty() {
                continue;
            }
            let option = FeedOption::with_cost(start.elapsed());
            if let Err(e) = ctx.feeder.feed(INPUT_NAME, Category::Metric, records, &option) {
                warn!(%url, error = %e, "Failed to feed scraped records");
            }
        }
    }
}

#[async_trait]
impl Input for PromInput {
    fn name(&self) -> &str {
        INPUT_NAME
    }

    async fn run(&self, ctx: InputContext) {
        info!(urls = ?self.urls, interval = ?self.interval, "Starting prom input");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.scrape_all(&ctx).await;
        }
        debug!(urls = ?self.urls, "Prom input stopped");
    }
}

/// Turn exposition text into metric records
///
/// Samples sharing a measurement and label set are folded into one record.
/// Without `measurement_name`, `node_cpu_seconds` becomes measurement `node`
/// with field `cpu_seconds`; with it, the full metric name is the field.
pub fn parse_exposition(
    text: &str,
    measurement_name: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<Record> {
    let mut grouped: BTreeMap<(String, BTreeMap<String, String>), Record> = BTreeMap::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(sample) = parse_sample(line) else {
            debug!(line, "Skipping unparsable sample");
            continue;
        };
        if !sample.value.is_finite() {
            continue;
        }

        let (measurement, field) = match measurement_name {
            Some(m) => (m.to_string(), sample.name.clone()),
            None => match sample.name.split_once('_') {
                Some((m, f)) if !m.is_empty() && !f.is_empty() => (m.to_string(), f.to_string()),
                _ => (sample.name.clone(), "value".to_string()),
            },
        };

        let record = grouped
            .entry((measurement.clone(), sample.labels.clone()))
            .or_insert_with(|| {
                let mut record = Record::new(measurement, now);
                for (k, v) in &sample.labels {
                    record.set_tag(k.as_str(), v.as_str());
                }
                record
            });
        record.set_field(field, sample.value);
    }

    grouped.into_values().collect()
}

#[derive(Debug, PartialEq)]
struct Sample {
    name: String,
    labels: BTreeMap<String, String>,
    value: f64,
}

fn parse_sample(line: &str) -> Option<Sample> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() {
        return None;
    }

    let mut rest = &line[name_end..];
    let mut labels = BTreeMap::new();
    if let Some(after_brace) = rest.strip_prefix('{') {
        let (parsed, remaining) = parse_labels(after_brace)?;
        labels = parsed;
        rest = remaining;
    }

    let value_text = rest.split_whitespace().next()?;
    let value = match value_text {
        "+Inf" => f64::INFINITY,
        "-Inf" => f64::NEG_INFINITY,
        v => v.parse().ok()?,
    };

    Some(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Parse `k="v",...}` and return the labels and the text after `}`
fn parse_labels(input: &str) -> Option<(BTreeMap<String, String>, &str)> {
    let mut labels = BTreeMap::new();
    let mut chars = input.char_indices().peekable();

    loop {
        while chars.next_if(|(_, c)| c.is_whitespace() || *c == ',').is_some() {}

        let (start, c) = chars.next()?;
        if c == '}' {
            return Some((labels, &input[start + 1..]));
        }

        let mut key = String::from(c);
        loop {
            let (_, c) = chars.next()?;
            if c == '=' {
                break;
            }
            key.push(c);
        }
        let key = key.trim().to_string();

        if chars.next()?.1 != '"' {
            return None;
        }
        let mut value = String::new();
        loop {
            match chars.next()?.1 {
                '"' => break,
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                other => value.push(other),
            }
        }
        labels.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datakit_common::FieldValue;

    const EXPOSITION: &str = r#"
# HELP node_cpu_seconds_total Seconds the CPUs spent in each mode.
# TYPE node_cpu_seconds_total counter
node_cpu_seconds_total{cpu="0",mode="idle"} 1234.5
node_cpu_seconds_total{cpu="0",mode="user"} 10
node_load1 0.42
node_filesystem_avail_bytes{mountpoint="/",label="a \"quoted\", value"} 1e9
process_weird NaN
bad line here
"#;

    #[test]
    fn test_parse_labels_with_escapes() {
        let sample = parse_sample(r#"m_x{a="1",b="x\"y,z"} 3 1700000000"#).unwrap();
        assert_eq!(sample.name, "m_x");
        assert_eq!(sample.labels.get("a").map(String::as_str), Some("1"));
        assert_eq!(sample.labels.get("b").map(String::as_str), Some("x\"y,z"));
        assert_eq!(sample.value, 3.0);
    }

    #[test]
    fn test_parse_exposition_groups_by_labels() {
        let records = parse_exposition(EXPOSITION, None, Utc::now());

        let node: Vec<&Record> = records.iter().filter(|r| r.name == "node").collect();
        // idle, user, load1 (no labels) and filesystem
        assert_eq!(node.len(), 4);

        let load = node.iter().find(|r| r.tags.is_empty()).unwrap();
        assert_eq!(load.field("load1"), Some(&FieldValue::Float(0.42)));

        let fs = node
            .iter()
            .find(|r| r.tag("mountpoint") == Some("/"))
            .unwrap();
        assert_eq!(fs.tag("label"), Some("a \"quoted\", value"));
        assert_eq!(fs.field("filesystem_avail_bytes"), Some(&FieldValue::Float(1e9)));

        // NaN samples and garbage lines are dropped
        assert!(records.iter().all(|r| r.name != "process"));
        assert!(records.iter().all(|r| r.name != "bad"));
    }

    #[test]
    fn test_measurement_name_override() {
        let records = parse_exposition("up 1\nscrape_duration_seconds 0.1\n", Some("app"), Utc::now());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "app");
        assert_eq!(records[0].field("up"), Some(&FieldValue::Float(1.0)));
        assert_eq!(
            records[0].field("scrape_duration_seconds"),
            Some(&FieldValue::Float(0.1))
        );
    }

    #[test]
    fn test_from_table() {
        let table: toml::Table = "url = \"http://10.0.0.5:9100/metrics\"\ninterval_secs = 0\n[tags]\nsvc = \"x\"\n"
            .parse()
            .unwrap();
        let input = PromInput::from_table(&table).unwrap();
        assert_eq!(input.urls(), ["http://10.0.0.5:9100/metrics".to_string()]);
        assert_eq!(input.interval(), Duration::from_secs(1));

        let empty = toml::Table::new();
        assert!(PromInput::from_table(&empty).is_err());

        let bad: toml::Table = "url = \"not a url\"".parse().unwrap();
        assert!(PromInput::from_table(&bad).is_err());
    }
}
