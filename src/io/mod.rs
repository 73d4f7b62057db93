//! Output feed contract
//!
//! Every producer hands finished records to a [`Feeder`] together with the
//! category they belong to and the time it took to collect them. Collection
//! failures that produce no records are surfaced through
//! [`Feeder::feed_last_error`].

pub mod memory;
pub mod stdout;

pub use memory::MemoryFeeder;
pub use stdout::StdoutFeeder;

use crate::Result;
use datakit_common::{Category, Record};
use std::time::Duration;

/// Per-batch feed options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedOption {
    pub collect_cost: Duration,
}

impl FeedOption {
    pub fn with_cost(collect_cost: Duration) -> Self {
        Self { collect_cost }
    }
}

pub trait Feeder: Send + Sync {
    fn feed(
        &self,
        source: &str,
        category: Category,
        records: Vec<Record>,
        option: &FeedOption,
    ) -> Result<()>;

    fn feed_last_error(&self, source: &str, error: &str);
}
