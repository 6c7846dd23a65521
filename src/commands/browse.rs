//! Browse command handler.
//!
//! Serves the record file through an in-memory channel and prints the window
//! after the initial fill and after each scroll step.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use crmsync::config::CrmSyncConfig;
use crmsync::models::{ListSelection, Record, RecordId, SortIndex, SortOrder, WindowSnapshot};
use crmsync::services::{ListSynchronizer, WindowRenderer};
use crmsync::MemoryChannel;

/// Browse command options.
pub struct BrowseOptions {
    /// Module to list.
    pub module: String,
    /// Sort index name.
    pub index: String,
    /// Sort order name.
    pub order: String,
    /// Optional filter.
    pub filter: Option<String>,
    /// Forward scroll steps.
    pub scroll: usize,
}

/// Renderer that treats nothing as visible and prints window changes.
struct ConsoleRenderer;

impl WindowRenderer for ConsoleRenderer {
    fn on_window_changed(&self, snapshot: &WindowSnapshot) {
        tracing::debug!(
            generation = snapshot.generation,
            size = snapshot.len(),
            "Window changed"
        );
    }

    fn is_record_visible(&self, _id: &RecordId) -> bool {
        false
    }
}

/// Walks a windowed list over the records in `file`.
pub async fn cmd_browse(
    config: &CrmSyncConfig,
    file: &Path,
    options: BrowseOptions,
) -> anyhow::Result<()> {
    let records: Vec<Record> = super::read_json(file)?;
    let index: SortIndex = options.index.parse().context("--index")?;
    let order: SortOrder = options.order.parse().context("--order")?;

    let mut selection = ListSelection::new(options.module.as_str())
        .with_index(index)
        .with_order(order);
    selection.filter = options.filter;

    let channel = Arc::new(MemoryChannel::with_records(records));
    let mut sync = ListSynchronizer::new(channel, Arc::new(ConsoleRenderer), selection, config);

    sync.refresh().await?;
    print_window("initial fill", &sync.snapshot());

    for step in 1..=options.scroll {
        let decision = sync.on_scroll(0.0, f64::MAX).await?;
        if decision.is_idle() {
            println!("End of list after {} scroll step(s).", step - 1);
            break;
        }
        print_window(&format!("scroll {step}"), &sync.snapshot());
    }
    Ok(())
}

fn print_window(label: &str, snapshot: &WindowSnapshot) {
    let span = match (snapshot.entries.first(), snapshot.entries.last()) {
        (Some(head), Some(tail)) => format!("{}..={}", head.offset, tail.offset),
        _ => "empty".to_string(),
    };
    println!(
        "[{label}] {} record(s) at {span}{}",
        snapshot.len(),
        if snapshot.forward_exhausted {
            " (end)"
        } else {
            ""
        }
    );
    for entry in &snapshot.entries {
        println!(
            "  {:>5}  {:<24} {}",
            entry.offset,
            entry.record.id.as_str(),
            entry.record.name
        );
    }
}
