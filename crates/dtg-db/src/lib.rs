//! dtg-db: SQLite schema, migrations, and query operations for the offline
//! HLS download manager's persistent task store (spec.md §4.5).
//!
//! # Modules
//!
//! - `migrations` - embedded, versioned schema migrations.
//! - `pool` - r2d2 connection pool management.
//! - `models` - Rust models matching the database schema.
//! - `queries` - item and task query operations.
//!
//! ```no_run
//! use dtg_db::pool::{init_pool, get_conn};
//! use dtg_db::queries::items;
//!
//! let pool = init_pool("/var/lib/hls-dtg/db.sqlite").unwrap();
//! let conn = get_conn(&pool).unwrap();
//! let item = items::get_item(&conn, &dtg_common::ItemId::new("movie-1")).unwrap();
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
