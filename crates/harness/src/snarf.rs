//! Bulk log collection from test nodes
//!
//! When the database advertises log files, the harness downloads them into
//! the store after every case, and again on the emergency path when the DB
//! stage fails. Paths are flattened by stripping the directory prefix every
//! collected path shares, so the persisted layout stays short without
//! colliding. Races with log rotation and dying pipes are tolerated; any
//! other transfer error aborts the collection.

use anyhow::{Context, Result};
use shared::Store;

use crate::fanout::join_first_error;
use crate::plan::TestRun;

/// Download every advertised log file into the store
pub async fn snarf_logs(run: &TestRun, store: &Store) -> Result<()> {
    let Some(log_files) = run.db.log_files() else {
        return Ok(());
    };

    let listings: Vec<(String, Vec<String>)> =
        join_first_error(run.nodes.iter().map(|node| async move {
            let paths = log_files
                .log_files(run, node)
                .await
                .with_context(|| format!("failed to list log files on {node}"))?;
            Ok((node.clone(), paths))
        }))
        .await?;

    let all_paths: Vec<&str> = listings
        .iter()
        .flat_map(|(_, paths)| paths.iter().map(String::as_str))
        .collect();
    if all_paths.is_empty() {
        return Ok(());
    }
    let prefix = common_dir_prefix(&all_paths);

    let total: usize = join_first_error(listings.iter().map(|(node, paths)| {
        let prefix = prefix.as_str();
        async move { snarf_node(run, store, node, paths, prefix).await }
    }))
    .await?
    .into_iter()
    .sum();

    tracing::info!(files = total, "Collected node logs");

    Ok(())
}

async fn snarf_node(
    run: &TestRun,
    store: &Store,
    node: &str,
    paths: &[String],
    prefix: &str,
) -> Result<usize> {
    let Some(session) = run.sessions.get(node) else {
        tracing::warn!(node = %node, "No session for node; skipping log collection");
        return Ok(0);
    };

    let mut downloaded = 0;
    for path in paths {
        let suffix = strip_dir_prefix(path, prefix);
        let dest = store.log_dest(node, suffix);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        match session.download(path, &dest).await {
            Ok(()) => {
                tracing::debug!(node = %node, path = %path, "Downloaded log file");
                downloaded += 1;
            }
            Err(e) if e.is_benign_transfer() => {
                tracing::warn!(node = %node, path = %path, error = %e, "Skipping log file");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to download {path} from {node}"));
            }
        }
    }

    Ok(downloaded)
}

/// Longest directory prefix shared by every path
///
/// Never consumes a path's final component, so each path keeps at least its
/// file name.
fn common_dir_prefix(paths: &[&str]) -> String {
    let split: Vec<Vec<&str>> = paths.iter().map(|p| p.split('/').collect()).collect();

    let mut prefix_len = split
        .iter()
        .map(|comps| comps.len().saturating_sub(1))
        .min()
        .unwrap_or(0);

    'scan: for i in 0..prefix_len {
        let first = split[0][i];
        for comps in &split[1..] {
            if comps[i] != first {
                prefix_len = i;
                break 'scan;
            }
        }
    }

    if prefix_len == 0 {
        return String::new();
    }
    let mut prefix = split[0][..prefix_len].join("/");
    prefix.push('/');
    prefix
}

fn strip_dir_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix(prefix)
        .filter(|s| !s.is_empty())
        .unwrap_or(path)
}
