//! Entry processor: scanned entries → processed manifest records.
//!
//! All entries of a route are processed concurrently. A custom processor
//! that errors or panics only affects its own entry, which comes back as a
//! minimal record carrying `extra.error`.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use futures::future::join_all;
use tracing::warn;

use crate::entry::{EntryExtra, ExportsSummary, ProcessedEntry, ScannedEntry};
use crate::route::RouteDefinition;

/// Processes every entry of a route; output order matches input order.
pub async fn process_entries(route: &RouteDefinition, entries: &[ScannedEntry]) -> Vec<ProcessedEntry> {
    join_all(entries.iter().map(|entry| process_entry(route, entry))).await
}

/// Processes a single entry.
pub async fn process_entry(route: &RouteDefinition, entry: &ScannedEntry) -> ProcessedEntry {
    let metadata = match &route.processor {
        None => Ok(entry.exports.config.clone().unwrap_or(serde_json::Value::Null)),
        Some(processor) => match AssertUnwindSafe(processor.process(entry)).catch_unwind().await {
            Ok(Ok(metadata)) => Ok(metadata),
            Ok(Err(e)) => Err(e.to_string()),
            Err(panic) => Err(panic_message(panic.as_ref())),
        },
    };

    match metadata {
        Ok(metadata) => ProcessedEntry {
            key: entry.key.clone(),
            path: entry.relative.clone(),
            exports: summarize(route, entry),
            metadata,
            plugin: entry.plugin.clone(),
            module: entry.module.clone(),
            extra: EntryExtra {
                parent: entry.parent.clone(),
                params: entry.params.clone(),
                catch_all: entry.catch_all.clone(),
                error: None,
            },
        },
        Err(error) => {
            warn!(
                route = %route.id(),
                key = %entry.key,
                path = %entry.path.display(),
                error = %error,
                "Entry processor failed, entry excluded from manifest"
            );
            ProcessedEntry {
                key: entry.key.clone(),
                path: entry.relative.clone(),
                exports: ExportsSummary::default(),
                metadata: serde_json::Value::Null,
                plugin: entry.plugin.clone(),
                module: entry.module.clone(),
                extra: EntryExtra {
                    error: Some(error),
                    ..EntryExtra::default()
                },
            }
        }
    }
}

fn summarize(route: &RouteDefinition, entry: &ScannedEntry) -> ExportsSummary {
    ExportsSummary {
        default: entry.exports.default,
        config: entry.exports.config.is_some(),
        named: route
            .exports
            .named
            .iter()
            .filter(|name| entry.exports.named.contains(*name))
            .cloned()
            .collect(),
    }
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
