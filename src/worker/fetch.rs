//! Per-task fetch protocol (spec.md §4.6 "Per-task protocol").

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use dtg_common::{Error, ItemId, Result};
use dtg_db::models::Task;
use dtg_db::pool::{get_conn, DbPool};
use dtg_db::queries::tasks;
use futures::StreamExt;
use reqwest::header::{HeaderValue, RANGE, USER_AGENT};
use tokio::io::AsyncWriteExt;

use crate::aggregator::Aggregator;

use super::config::WorkerConfig;
use super::ItemControl;

/// Report progress to the store/aggregator at most this often while
/// streaming, so a segment made of many small chunks doesn't hammer SQLite.
const PROGRESS_REPORT_INTERVAL_BYTES: u64 = 65_536;

pub enum FetchOutcome {
    Completed,
    Paused { resume_token: String },
    Cancelled,
}

fn partial_path(root: &Path, task: &Task) -> PathBuf {
    let mut path = root.join(&task.destination_path);
    let file_name = format!(
        "{}.part",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("download")
    );
    path.set_file_name(file_name);
    path
}

/// Fetch one task end to end: GET with resume support, stream to a sibling
/// `.part` file, atomic rename on full success. Retries transient failures
/// internally up to the configured budget; a terminal failure, or a
/// transient one that exhausts the budget, is returned to the caller, which
/// decides how the item escalates (spec.md §4.6 "Retry & failure
/// classification").
pub async fn fetch_task(
    client: &reqwest::Client,
    config: &WorkerConfig,
    db_pool: &DbPool,
    aggregator: &Aggregator,
    root: &Path,
    task: &Task,
    control: &ItemControl,
) -> Result<FetchOutcome> {
    let destination = root.join(&task.destination_path);
    let partial = partial_path(root, task);

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut attempt = 0u32;
    loop {
        if control.cancel_requested.load(Ordering::Relaxed) {
            return Ok(FetchOutcome::Cancelled);
        }

        match try_once(client, config, db_pool, aggregator, &partial, &destination, task, control).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_resumable() && attempt < config.retry_budget => {
                tokio::time::sleep(config.backoff_for_attempt(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn try_once(
    client: &reqwest::Client,
    config: &WorkerConfig,
    db_pool: &DbPool,
    aggregator: &Aggregator,
    partial: &Path,
    destination: &Path,
    task: &Task,
    control: &ItemControl,
) -> Result<FetchOutcome> {
    let existing_bytes = tokio::fs::metadata(partial).await.map(|m| m.len()).unwrap_or(0);

    let mut request = client.get(&task.source_url).timeout(config.request_timeout).header(
        USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("playkit-dtg")),
    );

    // No byte-range requests are issued unless a resume token dictates
    // (spec.md §6), so a fresh `.part` left over from an aborted attempt on
    // the same run is only resumed from if the task itself carries a token.
    let range_header = task.resume_token.clone();
    if let Some(ref range) = range_header {
        request = request.header(RANGE, range.clone());
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpFailure {
            status: Some(status.as_u16()),
            cause: format!("unexpected status fetching {}", task.source_url),
        });
    }

    let resuming = range_header.is_some() && status.as_u16() == 206;
    let mut file = if resuming {
        tokio::fs::OpenOptions::new().append(true).open(partial).await?
    } else {
        tokio::fs::File::create(partial).await?
    };

    let mut bytes_written = if resuming { existing_bytes } else { 0 };
    let mut last_reported = bytes_written;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        if control.cancel_requested.load(Ordering::Relaxed) {
            return Ok(FetchOutcome::Cancelled);
        }

        let chunk = chunk?;
        file.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;

        if bytes_written - last_reported >= PROGRESS_REPORT_INTERVAL_BYTES {
            report_progress(db_pool, aggregator, &task.item_id, &task.source_url, bytes_written)?;
            last_reported = bytes_written;
        }

        if control.pause_requested.load(Ordering::Relaxed) {
            file.flush().await?;
            let resume_token = format!("bytes={bytes_written}-");
            report_progress(db_pool, aggregator, &task.item_id, &task.source_url, bytes_written)?;
            return Ok(FetchOutcome::Paused { resume_token });
        }
    }

    file.flush().await?;
    drop(file);
    tokio::fs::rename(partial, destination).await?;
    report_progress(db_pool, aggregator, &task.item_id, &task.source_url, bytes_written)?;
    Ok(FetchOutcome::Completed)
}

fn report_progress(
    db_pool: &DbPool,
    aggregator: &Aggregator,
    item_id: &ItemId,
    source_url: &str,
    bytes_written: u64,
) -> Result<()> {
    let conn = get_conn(db_pool)?;
    tasks::update_progress(&conn, item_id, source_url, bytes_written as i64, None)?;
    drop(conn);
    aggregator.report_progress(item_id)
}
