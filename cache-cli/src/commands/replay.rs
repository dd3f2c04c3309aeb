//! Replay a scenario and print what a listener observes.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{listener_for, run_scenario, ListenerShape};
use crate::scenario::Scenario;

/// Run the replay command.
pub async fn run(path: &Path, shape: ListenerShape, json: bool, settle: Duration) -> Result<()> {
    let scenario = Scenario::load(path).await?;
    let root = scenario.root_path()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = listener_for(shape, root, tx);
    let cache = run_scenario(&scenario, Some(listener), settle).await?;
    cache.stop();

    let mut count = 0;
    while let Ok(observed) = rx.try_recv() {
        if json {
            println!(
                "{}",
                serde_json::to_string(&observed).context("Failed to encode event")?
            );
        } else {
            println!("{}", observed.to_line());
        }
        count += 1;
    }

    if !json {
        println!();
        println!("{} event(s) observed by the {:?} listener", count, shape);
    }
    Ok(())
}
