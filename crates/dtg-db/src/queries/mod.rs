//! Database query modules.
//!
//! - `items`: item CRUD and lifecycle state transitions.
//! - `tasks`: per-task planning, progress, and resume-token persistence.

pub mod items;
pub mod tasks;
