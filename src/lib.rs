pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod inputs;
pub mod io;
pub mod k8s;
pub mod kubernetes;
pub mod metrics;

pub use datakit_common::{Category, FieldValue, Record};
pub use error::{DatakitError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
