//! # taskgraph-core
//!
//! Dependency resolution core for a task/feature project-tracking tool.
//! Tasks contain ordered features; both may declare dependencies on each
//! other through lightweight textual reference tokens (`"<taskId>"` or
//! `"<taskId>.<featureId>"`).
//!
//! ## Core Components
//!
//! - **Model**: tasks, features, and full-state snapshots
//! - **Resolver**: token parsing, the derived dependency index, reference
//!   resolution, dependency-list validation with cycle detection, display
//!   numbering, and title search
//! - **Source**: the push-driven snapshot seam between store and resolver
//! - **Store**: SQLite-backed task persistence implementing the seam
//!
//! ## Example
//!
//! ```rust,ignore
//! use taskgraph_core::{DependencyResolver, SqliteTaskStore, Task};
//!
//! let store = SqliteTaskStore::in_memory()?;
//! store.put_task(&Task::new("1", "Foundations"))?;
//!
//! let resolver = DependencyResolver::new();
//! resolver.init(&store)?;
//!
//! // Gate a dependency edit before committing it to the store.
//! resolver.validate_dependency_list(Some("1"), &["2.a".into()])?;
//! ```

pub mod error;
pub mod model;
pub mod resolver;
pub mod source;
pub mod store;

// Re-exports for convenience
pub use error::{Error, Result};
pub use model::{Feature, ParseStatusError, Snapshot, Status, Task};
pub use resolver::{
    parse_ref, validate_dependency_list, DepListError, DependencyResolver, DisplayMap,
    EntryErrors, FeatureKey, IndexMetadata, InvalidEdge, ParsedRef, RefError, RefErrorCode,
    RefKind, ResolvedRef, ResolverIndex, SearchHit, UpdateListener, DEFAULT_SEARCH_LIMIT,
};
pub use source::{SnapshotListener, SnapshotSource, Subscription};
pub use store::SqliteTaskStore;
