//! Replay a scenario and print the settled cache contents.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

use super::{render_data, run_scenario};
use crate::scenario::Scenario;

/// Run the snapshot command.
pub async fn run(path: &Path, settle: Duration) -> Result<()> {
    let scenario = Scenario::load(path).await?;
    let cache = run_scenario(&scenario, None, settle).await?;

    if cache.is_empty() {
        println!("Cache is empty.");
    } else {
        println!("{} node(s) cached under {}:", cache.size(), cache.root());
        println!();
        for node in cache.stream_all() {
            let data = node
                .data()
                .map(render_data)
                .unwrap_or_else(|| "<not cached>".to_string());
            println!("  {} v{} {:?}", node.path, node.version(), data);
        }
    }

    println!();
    let metrics = serde_json::to_string_pretty(&cache.metrics()).context("Failed to encode metrics")?;
    println!("Metrics: {}", metrics);

    cache.stop();
    Ok(())
}
