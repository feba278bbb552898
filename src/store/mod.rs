//! SQLite-backed persistence for tasks and features.
//!
//! The store is the crate's canonical [`SnapshotSource`]: every committed
//! mutation pushes a fresh full snapshot to subscribers, which is what
//! drives resolver rebuilds.
//!
//! ## Example
//!
//! ```rust,ignore
//! use taskgraph_core::{SqliteTaskStore, Task};
//!
//! let store = SqliteTaskStore::open("tasks.db")?;
//! store.put_task(&Task::new("t1", "Ship the onboarding flow"))?;
//! let snapshot = store.snapshot()?;
//! ```
//!
//! [`SnapshotSource`]: crate::source::SnapshotSource

mod schema;
mod store;

pub use schema::{get_schema_version, initialize_schema, is_initialized, SCHEMA_VERSION};
pub use store::SqliteTaskStore;
