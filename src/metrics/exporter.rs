use crate::{DatakitError, Result};
use prometheus::{Encoder, Registry, TextEncoder};

/// Encode every metric in `registry` in the Prometheus text format
pub fn render_metrics(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();

    encoder
        .encode(&registry.gather(), &mut buf)
        .map_err(|e| DatakitError::MetricsError(e.to_string()))?;

    String::from_utf8(buf).map_err(|e| DatakitError::MetricsError(e.to_string()))
}
