//! Feeder writing one JSON document per record to stdout

use super::{FeedOption, Feeder};
use crate::Result;
use datakit_common::{Category, Record};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, warn};

#[derive(Serialize)]
struct Line<'a> {
    source: &'a str,
    category: Category,
    #[serde(flatten)]
    record: &'a Record,
}

#[derive(Default)]
pub struct StdoutFeeder;

impl StdoutFeeder {
    pub fn new() -> Self {
        Self
    }
}

impl Feeder for StdoutFeeder {
    fn feed(
        &self,
        source: &str,
        category: Category,
        records: Vec<Record>,
        option: &FeedOption,
    ) -> Result<()> {
        debug!(
            source,
            %category,
            count = records.len(),
            cost_ms = option.collect_cost.as_millis() as u64,
            "Feeding records"
        );

        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for record in &records {
            let line = serde_json::to_string(&Line {
                source,
                category,
                record,
            })?;
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }

    fn feed_last_error(&self, source: &str, error: &str) {
        warn!(source, error, "Collection reported an error");
    }
}
