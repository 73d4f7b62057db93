//! Kubernetes resource quantity parsing
//!
//! Quantities look like `250m`, `1.5`, `128Mi`, `2G` or `1e3`. CPU values are
//! converted to cores and memory/storage values to bytes by the same routine:
//! the suffix alone determines the multiplier.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Parse a quantity string into its canonical numeric value
///
/// Returns `None` for anything that is not a well-formed quantity.
pub fn parse_quantity(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let split = raw
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);

    if number.is_empty() || number == "+" || number == "-" {
        return None;
    }
    let value: f64 = number.parse().ok()?;

    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        exp if exp.starts_with('e') || exp.starts_with('E') => {
            let exponent: i32 = exp[1..].parse().ok()?;
            10f64.powi(exponent)
        }
        _ => return None,
    };

    let parsed = value * multiplier;
    parsed.is_finite().then_some(parsed)
}

/// CPU quantity in cores; malformed values degrade to 0
pub fn cpu_cores(quantity: Option<&Quantity>) -> f64 {
    quantity.and_then(|q| parse_quantity(&q.0)).unwrap_or(0.0)
}

/// Memory or storage quantity in bytes; malformed values degrade to 0
pub fn bytes(quantity: Option<&Quantity>) -> i64 {
    quantity
        .and_then(|q| parse_quantity(&q.0))
        .map(|v| v.round() as i64)
        .unwrap_or(0)
}
