//! List command implementation

use super::StoreTarget;
use anyhow::{Context, Result};
use spool::key_provider::parse_hex_key;
use spool::{codec, PayloadCipher, QueueStore};

pub fn execute(target: &StoreTarget, limit: usize, key_hex: Option<&str>) -> Result<()> {
    let key = key_hex
        .map(parse_hex_key)
        .transpose()
        .context("Invalid --key-hex")?;
    let cipher = PayloadCipher::new(key);

    let store = target.open()?;
    let entries = store.scan(limit).context("Failed to scan store")?;

    println!("{:<38} {:>8} {:>10}", "GUID", "HEADERS", "BODY");
    println!("{}", "-".repeat(58));

    let mut unreadable = 0;
    for entry in &entries {
        let decoded = cipher
            .decrypt(&entry.value)
            .and_then(|frame| codec::decode(&frame));
        match decoded {
            Ok(event) => {
                println!(
                    "{:<38} {:>8} {:>10}",
                    entry.key_lossy(),
                    event.headers.len(),
                    event.body.len()
                );
            }
            Err(e) => {
                unreadable += 1;
                tracing::debug!(key = %entry.key_lossy(), error = %e, "Unreadable entry");
                println!("{:<38} {:>8} {:>10}", entry.key_lossy(), "?", "?");
            }
        }
    }

    println!(
        "\nShowing {} of {} queued event(s)",
        entries.len(),
        store.count()
    );
    if unreadable > 0 {
        println!(
            "⚠️  {} entr{} could not be decoded{}",
            unreadable,
            if unreadable == 1 { "y" } else { "ies" },
            if cipher.is_enabled() {
                " with the given key"
            } else {
                " (encrypted queue? pass --key-hex)"
            }
        );
    }

    Ok(())
}
