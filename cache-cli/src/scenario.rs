//! Scenario files: a seeded tree plus a list of mutations to replay.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use coord_cache_client::{CacheOption, ConnectionState, MemoryNodeStore, NodePath, StoreError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// A replayable scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Cache root path.
    pub root: String,
    /// Track only the root node.
    #[serde(default)]
    pub single_node: bool,
    /// Keep node payloads in the cache.
    #[serde(default = "default_cache_data")]
    pub cache_data: bool,
    /// Nodes created before the cache starts.
    #[serde(default)]
    pub seed: Vec<Seed>,
    /// Mutations applied after INITIALIZED, in order.
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

fn default_cache_data() -> bool {
    true
}

/// A node present before the cache starts. Missing ancestors are created.
#[derive(Debug, Clone, Deserialize)]
pub struct Seed {
    /// Node path.
    pub path: String,
    /// UTF-8 payload.
    #[serde(default)]
    pub data: Option<String>,
    /// Binary payload, standard base64.
    #[serde(default)]
    pub data_base64: Option<String>,
}

/// One scenario step.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    /// Create a node (and any missing ancestors).
    Create {
        /// Node path.
        path: String,
        /// UTF-8 payload.
        #[serde(default)]
        data: Option<String>,
        /// Binary payload, standard base64.
        #[serde(default)]
        data_base64: Option<String>,
    },
    /// Replace a node's payload.
    Set {
        /// Node path.
        path: String,
        /// UTF-8 payload.
        #[serde(default)]
        data: Option<String>,
        /// Binary payload, standard base64.
        #[serde(default)]
        data_base64: Option<String>,
    },
    /// Delete a node.
    Delete {
        /// Node path.
        path: String,
        /// Delete descendants first instead of failing on a non-empty node.
        #[serde(default)]
        recursive: bool,
    },
    /// Inject a connection state transition.
    Connection {
        /// The new state.
        state: ConnectionState,
    },
    /// Pause before the next step.
    Wait {
        /// Pause length in milliseconds.
        ms: u64,
    },
}

impl Scenario {
    /// Parse a scenario from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Invalid scenario")
    }

    /// Load a scenario file.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("In {}", path.display()))
    }

    /// The validated cache root.
    pub fn root_path(&self) -> Result<NodePath> {
        parse_path(&self.root)
    }

    /// Cache options implied by the scenario.
    pub fn options(&self) -> Vec<CacheOption> {
        let mut options = Vec::new();
        if self.single_node {
            options.push(CacheOption::SingleNodeCache);
        }
        if !self.cache_data {
            options.push(CacheOption::DataNotCached);
        }
        options
    }

    /// Create every seed node in `store`. Seeding an existing node sets its data.
    pub fn seed_store(&self, store: &MemoryNodeStore) -> Result<()> {
        for seed in &self.seed {
            let path = parse_path(&seed.path)?;
            let data = payload(seed.data.as_deref(), seed.data_base64.as_deref())?;
            match store.create_parents(&path, &data) {
                Ok(_) => {}
                Err(StoreError::NodeExists(_)) => {
                    store
                        .set_data(&path, &data)
                        .with_context(|| format!("Failed to seed {}", path))?;
                }
                Err(e) => return Err(e).with_context(|| format!("Failed to seed {}", path)),
            }
        }
        Ok(())
    }
}

impl Step {
    /// Apply this step to `store`.
    pub async fn apply(&self, store: &MemoryNodeStore) -> Result<()> {
        match self {
            Step::Create {
                path,
                data,
                data_base64,
            } => {
                let path = parse_path(path)?;
                let data = payload(data.as_deref(), data_base64.as_deref())?;
                store
                    .create_parents(&path, &data)
                    .with_context(|| format!("create {}", path))?;
            }
            Step::Set {
                path,
                data,
                data_base64,
            } => {
                let path = parse_path(path)?;
                let data = payload(data.as_deref(), data_base64.as_deref())?;
                store
                    .set_data(&path, &data)
                    .with_context(|| format!("set {}", path))?;
            }
            Step::Delete { path, recursive } => {
                let path = parse_path(path)?;
                let result = if *recursive {
                    store.delete_recursive(&path)
                } else {
                    store.delete(&path)
                };
                result.with_context(|| format!("delete {}", path))?;
            }
            Step::Connection { state } => store.set_connection_state(*state),
            Step::Wait { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
        Ok(())
    }
}

fn parse_path(raw: &str) -> Result<NodePath> {
    NodePath::new(raw).with_context(|| format!("Invalid path {:?}", raw))
}

fn payload(text: Option<&str>, encoded: Option<&str>) -> Result<Vec<u8>> {
    match (text, encoded) {
        (Some(_), Some(_)) => anyhow::bail!("Specify either data or data_base64, not both"),
        (Some(text), None) => Ok(text.as_bytes().to_vec()),
        (None, Some(encoded)) => STANDARD
            .decode(encoded)
            .context("data_base64 is not valid base64"),
        (None, None) => Ok(Vec::new()),
    }
}
