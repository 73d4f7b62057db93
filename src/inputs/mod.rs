//! Input plugins that autodiscovery can start
//!
//! Configurations are TOML documents holding `[[inputs.<name>]]` tables; each
//! table becomes one input instance built by the constructor registered for
//! `<name>`.

pub mod prom;

use crate::io::Feeder;
use crate::{DatakitError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// What a running input gets from its host
#[derive(Clone)]
pub struct InputContext {
    pub feeder: Arc<dyn Feeder>,
    pub cancel: CancellationToken,
    pub tags: BTreeMap<String, String>,
}

#[async_trait]
pub trait Input: Send + Sync {
    fn name(&self) -> &str;

    /// Run until `ctx.cancel` fires or the input finishes on its own
    async fn run(&self, ctx: InputContext);
}

pub type InputCreator = Arc<dyn Fn(&toml::Table) -> Result<Box<dyn Input>> + Send + Sync>;

/// Input constructors by name
#[derive(Clone, Default)]
pub struct InputRegistry {
    creators: BTreeMap<String, InputCreator>,
}

impl InputRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in input
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(prom::INPUT_NAME, |table| {
            Ok(Box::new(prom::PromInput::from_table(table)?) as Box<dyn Input>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, creator: F)
    where
        F: Fn(&toml::Table) -> Result<Box<dyn Input>> + Send + Sync + 'static,
    {
        self.creators.insert(name.to_string(), Arc::new(creator));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.creators.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.creators.keys().map(String::as_str).collect()
    }

    pub fn create(&self, name: &str, table: &toml::Table) -> Result<Box<dyn Input>> {
        let creator = self
            .creators
            .get(name)
            .ok_or_else(|| DatakitError::InputNotFound(name.to_string()))?;
        creator(table)
    }
}

/// Instances built from one configuration document
#[derive(Default)]
pub struct LoadedInputs {
    pub instances: Vec<Box<dyn Input>>,
    /// Input names with no registered constructor
    pub unknown: Vec<String>,
}

/// Build every `[[inputs.<name>]]` table in `text`
///
/// Unregistered names are collected in [`LoadedInputs::unknown`] rather than
/// failing the document. Syntax errors and invalid tables fail it.
pub fn load_inputs(registry: &InputRegistry, text: &str) -> Result<LoadedInputs> {
    let document: toml::Table = text
        .parse()
        .map_err(|e: toml::de::Error| DatakitError::InputConfigError(e.message().to_string()))?;

    let inputs = match document.get("inputs") {
        Some(toml::Value::Table(inputs)) => inputs,
        _ => {
            return Err(DatakitError::InputConfigError(
                "no [[inputs.<name>]] table found".to_string(),
            ))
        }
    };

    let mut loaded = LoadedInputs::default();
    for (name, value) in inputs {
        if !registry.contains(name) {
            warn!(input = %name, "Input is not registered, skipping");
            loaded.unknown.push(name.clone());
            continue;
        }

        let tables: Vec<&toml::Table> = match value {
            toml::Value::Table(table) => vec![table],
            toml::Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_table().ok_or_else(|| {
                        DatakitError::InputConfigError(format!(
                            "inputs.{} entries must be tables",
                            name
                        ))
                    })
                })
                .collect::<Result<_>>()?,
            _ => {
                return Err(DatakitError::InputConfigError(format!(
                    "inputs.{} must be a table or an array of tables",
                    name
                )))
            }
        };

        for table in tables {
            loaded.instances.push(registry.create(name, table)?);
        }
    }
    Ok(loaded)
}
