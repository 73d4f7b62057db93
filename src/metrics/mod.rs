pub mod collector;
pub mod exporter;

pub use collector::{FeedMetrics, MeteredFeeder};
pub use exporter::render_metrics;
