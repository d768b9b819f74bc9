//! dtg-common: shared types, ids, and error kinds for the offline HLS
//! download manager.
//!
//! - **Typed id**: [`ItemId`] wraps the caller-provided opaque item string.
//! - **Core types**: [`TaskType`] and [`ItemState`] drive the task taxonomy
//!   and the item lifecycle state machine.
//! - **Path key**: [`path_key`] derives the deterministic destination path
//!   for a task, shared by the planner and the rewriter.
//! - **Error handling**: [`Error`]/[`Result`] cover the kinds spec.md §7
//!   requires be surfaced to the caller.
//!
//! ```
//! use dtg_common::{ItemId, TaskType, Error, Result};
//!
//! let item_id = ItemId::new("movie-42");
//!
//! fn example() -> Result<()> {
//!     Err(Error::item_not_found("movie-42"))
//! }
//! ```

pub mod error;
pub mod ids;
pub mod path_key;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
