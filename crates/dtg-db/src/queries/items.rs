//! Item database queries (spec.md §4.5).

use chrono::Utc;
use dtg_common::{Error, ItemId, ItemState, Result};
use rusqlite::Connection;

use crate::models::Item;

fn parse_item_row(row: &rusqlite::Row) -> rusqlite::Result<Item> {
    let state_str: String = row.get(3)?;
    Ok(Item {
        id: ItemId::new(row.get::<_, String>(0)?),
        source_master_url: row.get(1)?,
        root_path: row.get(2)?,
        state: state_str
            .parse()
            .unwrap_or(ItemState::DbFailure),
        error_message: row.get(4)?,
        selected_variant: row.get(5)?,
        estimated_size_bytes: row.get(6)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&row.get::<_, String>(7)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: chrono::DateTime::parse_from_rfc3339(&row.get::<_, String>(8)?)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

const SELECT_COLUMNS: &str = "id, source_master_url, root_path, state, error_message, \
     selected_variant, estimated_size_bytes, created_at, updated_at";

/// Insert a new item or update an existing one in place (spec.md §4.5
/// "survives process restart").
pub fn upsert_item(conn: &Connection, item: &Item) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO items ({SELECT_COLUMNS})
             VALUES (:id, :source_master_url, :root_path, :state, :error_message, :selected_variant,
                     :estimated_size_bytes, :created_at, :updated_at)
             ON CONFLICT(id) DO UPDATE SET
                source_master_url = :source_master_url,
                root_path = :root_path,
                state = :state,
                error_message = :error_message,
                selected_variant = :selected_variant,
                estimated_size_bytes = :estimated_size_bytes,
                updated_at = :updated_at"
        ),
        rusqlite::named_params! {
            ":id": item.id.as_str(),
            ":source_master_url": &item.source_master_url,
            ":root_path": &item.root_path,
            ":state": item.state.to_string(),
            ":error_message": &item.error_message,
            ":selected_variant": &item.selected_variant,
            ":estimated_size_bytes": item.estimated_size_bytes,
            ":created_at": item.created_at.to_rfc3339(),
            ":updated_at": item.updated_at.to_rfc3339(),
        },
    )
    .map_err(|e| Error::db_failure(e.to_string()))?;

    Ok(())
}

/// Get an item by id.
pub fn get_item(conn: &Connection, id: &ItemId) -> Result<Option<Item>> {
    let result = conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM items WHERE id = :id"),
        rusqlite::named_params! { ":id": id.as_str() },
        parse_item_row,
    );

    match result {
        Ok(item) => Ok(Some(item)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::db_failure(e.to_string())),
    }
}

/// Set an item's state (and optionally error message), bumping `updated_at`.
/// Used by the aggregator to persist a lifecycle transition before it
/// notifies listeners (spec.md §4.7 persist-then-notify ordering).
pub fn set_state(
    conn: &Connection,
    id: &ItemId,
    state: ItemState,
    error_message: Option<&str>,
) -> Result<()> {
    let affected = conn
        .execute(
            "UPDATE items SET state = :state, error_message = :error_message, updated_at = :updated_at
             WHERE id = :id",
            rusqlite::named_params! {
                ":state": state.to_string(),
                ":error_message": error_message,
                ":updated_at": Utc::now().to_rfc3339(),
                ":id": id.as_str(),
            },
        )
        .map_err(|e| Error::db_failure(e.to_string()))?;

    if affected == 0 {
        return Err(Error::item_not_found(id.as_str()));
    }

    Ok(())
}

/// List items in a given lifecycle state, oldest first.
pub fn list_items_by_state(conn: &Connection, state: ItemState) -> Result<Vec<Item>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM items WHERE state = :state ORDER BY created_at ASC"
        ))
        .map_err(|e| Error::db_failure(e.to_string()))?;

    let items = stmt
        .query_map(
            rusqlite::named_params! { ":state": state.to_string() },
            parse_item_row,
        )
        .map_err(|e| Error::db_failure(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::db_failure(e.to_string()))?;

    Ok(items)
}

/// List all items, oldest first.
pub fn list_all_items(conn: &Connection) -> Result<Vec<Item>> {
    let mut stmt = conn
        .prepare(&format!("SELECT {SELECT_COLUMNS} FROM items ORDER BY created_at ASC"))
        .map_err(|e| Error::db_failure(e.to_string()))?;

    let items = stmt
        .query_map([], parse_item_row)
        .map_err(|e| Error::db_failure(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::db_failure(e.to_string()))?;

    Ok(items)
}

/// Delete an item and (via `ON DELETE CASCADE`) all of its tasks.
pub fn delete_item(conn: &Connection, id: &ItemId) -> Result<bool> {
    let affected = conn
        .execute(
            "DELETE FROM items WHERE id = :id",
            rusqlite::named_params! { ":id": id.as_str() },
        )
        .map_err(|e| Error::db_failure(e.to_string()))?;

    Ok(affected > 0)
}
