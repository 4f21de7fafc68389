//! Status command implementation

use super::StoreTarget;
use anyhow::{Context, Result};
use spool::QueueStore;

pub fn execute(target: &StoreTarget, json: bool) -> Result<()> {
    tracing::debug!("Checking spool status: {}", target.path.display());

    let store = target.open()?;
    let stats = store.stats();

    if json {
        let report = serde_json::json!({
            "path": target.path.display().to_string(),
            "database": target.name,
            "pending": stats.entries,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to render status")?
        );
        return Ok(());
    }

    println!("\nSpool Status");
    println!("{}", "=".repeat(60));
    println!("Path: {}", target.path.display());
    println!("Database: {}", target.name);
    println!("Pending Events: {}", stats.entries);

    if stats.entries == 0 {
        println!("\n✓ Queue is empty");
    } else {
        println!("\n⚠️  {} event(s) awaiting delivery", stats.entries);
    }

    Ok(())
}
