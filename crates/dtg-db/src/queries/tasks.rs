//! Task database queries (spec.md §4.3, §4.5, §4.6).

use chrono::Utc;
use dtg_common::{Error, ItemId, Result, TaskStatus, TaskType};
use rusqlite::Connection;

use crate::models::Task;

const SELECT_COLUMNS: &str = "item_id, source_url, task_type, order_num, destination_path, status, \
     bytes_downloaded, total_bytes, retry_count, resume_token, last_error, updated_at";

fn parse_task_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    let task_type: String = row.get(2)?;
    let status: String = row.get(5)?;
    Ok(Task {
        item_id: ItemId::new(row.get::<_, String>(0)?),
        source_url: row.get(1)?,
        task_type: task_type.parse().unwrap_or(TaskType::Video),
        order_num: row.get(3)?,
        destination_path: row.get(4)?,
        status: status.parse().unwrap_or(TaskStatus::Failed),
        bytes_downloaded: row.get(6)?,
        total_bytes: row.get(7)?,
        retry_count: row.get(8)?,
        resume_token: row.get(9)?,
        last_error: row.get(10)?,
        updated_at: chrono::DateTime::parse_from_rfc3339(&row.get::<_, String>(11)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Insert a batch of planned tasks for an item in one transaction
/// (spec.md §4.3: the planner emits the full task set at once).
pub fn insert_tasks(conn: &mut Connection, tasks: &[Task]) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| Error::db_failure(e.to_string()))?;

    for task in tasks {
        tx.execute(
            &format!(
                "INSERT INTO tasks ({SELECT_COLUMNS})
                 VALUES (:item_id, :source_url, :task_type, :order_num, :destination_path, :status,
                         :bytes_downloaded, :total_bytes, :retry_count, :resume_token, :last_error, :updated_at)"
            ),
            rusqlite::named_params! {
                ":item_id": task.item_id.as_str(),
                ":source_url": &task.source_url,
                ":task_type": task.task_type.to_string(),
                ":order_num": task.order_num,
                ":destination_path": &task.destination_path,
                ":status": task.status.to_string(),
                ":bytes_downloaded": task.bytes_downloaded,
                ":total_bytes": task.total_bytes,
                ":retry_count": task.retry_count,
                ":resume_token": &task.resume_token,
                ":last_error": &task.last_error,
                ":updated_at": task.updated_at.to_rfc3339(),
            },
        )
        .map_err(|e| Error::db_failure(e.to_string()))?;
    }

    tx.commit().map_err(|e| Error::db_failure(e.to_string()))?;
    Ok(())
}

/// List an item's tasks in planner order.
pub fn list_tasks_for_item(conn: &Connection, item_id: &ItemId) -> Result<Vec<Task>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM tasks WHERE item_id = :item_id ORDER BY order_num ASC"
        ))
        .map_err(|e| Error::db_failure(e.to_string()))?;

    let tasks = stmt
        .query_map(
            rusqlite::named_params! { ":item_id": item_id.as_str() },
            parse_task_row,
        )
        .map_err(|e| Error::db_failure(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::db_failure(e.to_string()))?;

    Ok(tasks)
}

/// Get the next pending task for an item, in FIFO order (spec.md §4.6).
pub fn next_pending_task(conn: &Connection, item_id: &ItemId) -> Result<Option<Task>> {
    let result = conn.query_row(
        &format!(
            "SELECT {SELECT_COLUMNS} FROM tasks
             WHERE item_id = :item_id AND status = 'pending'
             ORDER BY order_num ASC LIMIT 1"
        ),
        rusqlite::named_params! { ":item_id": item_id.as_str() },
        parse_task_row,
    );

    match result {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::db_failure(e.to_string())),
    }
}

/// Mark a task as downloading.
pub fn start_task(conn: &Connection, item_id: &ItemId, source_url: &str) -> Result<()> {
    update_status(conn, item_id, source_url, TaskStatus::Downloading, None)
}

/// Update a task's progress in place (bytes downloaded so far, and total
/// size once known from a response header).
pub fn update_progress(
    conn: &Connection,
    item_id: &ItemId,
    source_url: &str,
    bytes_downloaded: i64,
    total_bytes: Option<i64>,
) -> Result<()> {
    let affected = conn
        .execute(
            "UPDATE tasks SET bytes_downloaded = :bytes_downloaded, total_bytes = :total_bytes, updated_at = :updated_at
             WHERE item_id = :item_id AND source_url = :source_url",
            rusqlite::named_params! {
                ":bytes_downloaded": bytes_downloaded,
                ":total_bytes": total_bytes,
                ":updated_at": Utc::now().to_rfc3339(),
                ":item_id": item_id.as_str(),
                ":source_url": source_url,
            },
        )
        .map_err(|e| Error::db_failure(e.to_string()))?;

    if affected == 0 {
        return Err(Error::invalid_state(format!(
            "no task for item {item_id} / {source_url}"
        )));
    }

    Ok(())
}

/// Mark a task completed.
pub fn complete_task(conn: &Connection, item_id: &ItemId, source_url: &str) -> Result<()> {
    update_status(conn, item_id, source_url, TaskStatus::Completed, None)
}

/// Mark a task failed, recording the cause and bumping the retry count.
pub fn fail_task(
    conn: &Connection,
    item_id: &ItemId,
    source_url: &str,
    error_message: &str,
) -> Result<()> {
    let affected = conn
        .execute(
            "UPDATE tasks SET status = 'failed', last_error = :last_error,
                retry_count = retry_count + 1, updated_at = :updated_at
             WHERE item_id = :item_id AND source_url = :source_url",
            rusqlite::named_params! {
                ":last_error": error_message,
                ":updated_at": Utc::now().to_rfc3339(),
                ":item_id": item_id.as_str(),
                ":source_url": source_url,
            },
        )
        .map_err(|e| Error::db_failure(e.to_string()))?;

    if affected == 0 {
        return Err(Error::invalid_state(format!(
            "no task for item {item_id} / {source_url}"
        )));
    }

    Ok(())
}

/// Reset a failed task back to pending for retry, within the caller's
/// retry budget check (spec.md §4.6 bounded exponential backoff).
pub fn requeue_task(conn: &Connection, item_id: &ItemId, source_url: &str) -> Result<()> {
    update_status(conn, item_id, source_url, TaskStatus::Pending, None)
}

/// Pause: persist the resume token surrendered by the worker so the
/// download can continue from this byte offset later (spec.md §4.6).
pub fn set_resume_token(
    conn: &Connection,
    item_id: &ItemId,
    source_url: &str,
    resume_token: Option<&str>,
) -> Result<()> {
    let affected = conn
        .execute(
            "UPDATE tasks SET resume_token = :resume_token, updated_at = :updated_at
             WHERE item_id = :item_id AND source_url = :source_url",
            rusqlite::named_params! {
                ":resume_token": resume_token,
                ":updated_at": Utc::now().to_rfc3339(),
                ":item_id": item_id.as_str(),
                ":source_url": source_url,
            },
        )
        .map_err(|e| Error::db_failure(e.to_string()))?;

    if affected == 0 {
        return Err(Error::invalid_state(format!(
            "no task for item {item_id} / {source_url}"
        )));
    }

    Ok(())
}

fn update_status(
    conn: &Connection,
    item_id: &ItemId,
    source_url: &str,
    status: TaskStatus,
    last_error: Option<&str>,
) -> Result<()> {
    let affected = conn
        .execute(
            "UPDATE tasks SET status = :status, last_error = :last_error, updated_at = :updated_at
             WHERE item_id = :item_id AND source_url = :source_url",
            rusqlite::named_params! {
                ":status": status.to_string(),
                ":last_error": last_error,
                ":updated_at": Utc::now().to_rfc3339(),
                ":item_id": item_id.as_str(),
                ":source_url": source_url,
            },
        )
        .map_err(|e| Error::db_failure(e.to_string()))?;

    if affected == 0 {
        return Err(Error::invalid_state(format!(
            "no task for item {item_id} / {source_url}"
        )));
    }

    Ok(())
}

/// Count every task still persisted for an item, regardless of status. Used
/// by the aggregator: once this reaches zero the item has no outstanding
/// work and transitions to `completed` (spec.md §4.7, §8 "Completion
/// equivalence" — a completed item has an empty persisted task list).
pub fn remaining_task_count(conn: &Connection, item_id: &ItemId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE item_id = :item_id",
        rusqlite::named_params! { ":item_id": item_id.as_str() },
        |row| row.get(0),
    )
    .map_err(|e| Error::db_failure(e.to_string()))
}

/// Count tasks for an item by status, used by the aggregator to decide
/// whether an item has reached `completed` (spec.md §4.7).
pub fn count_by_status(conn: &Connection, item_id: &ItemId, status: TaskStatus) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE item_id = :item_id AND status = :status",
        rusqlite::named_params! {
            ":item_id": item_id.as_str(),
            ":status": status.to_string(),
        },
        |row| row.get(0),
    )
    .map_err(|e| Error::db_failure(e.to_string()))
}

/// Sum of bytes downloaded across all of an item's tasks.
pub fn total_bytes_downloaded(conn: &Connection, item_id: &ItemId) -> Result<i64> {
    conn.query_row(
        "SELECT COALESCE(SUM(bytes_downloaded), 0) FROM tasks WHERE item_id = :item_id",
        rusqlite::named_params! { ":item_id": item_id.as_str() },
        |row| row.get(0),
    )
    .map_err(|e| Error::db_failure(e.to_string()))
}

/// Delete a single task once its fetch has fully succeeded (spec.md §4.6:
/// "on completion the worker calls the store to delete the task", which
/// drives the "completed item has an empty persisted task list" property).
pub fn delete_task(conn: &Connection, item_id: &ItemId, source_url: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM tasks WHERE item_id = :item_id AND source_url = :source_url",
        rusqlite::named_params! {
            ":item_id": item_id.as_str(),
            ":source_url": source_url,
        },
    )
    .map_err(|e| Error::db_failure(e.to_string()))?;

    Ok(())
}

/// Delete all tasks for an item (normally unnecessary, since `items` has
/// `ON DELETE CASCADE`, but exposed for callers that want to re-plan an
/// item in place without deleting the item row itself).
pub fn delete_tasks_for_item(conn: &Connection, item_id: &ItemId) -> Result<usize> {
    conn.execute(
        "DELETE FROM tasks WHERE item_id = :item_id",
        rusqlite::named_params! { ":item_id": item_id.as_str() },
    )
    .map_err(|e| Error::db_failure(e.to_string()))
}
