//! Dependency resolver: reference parsing, index building, resolution,
//! dependency-list validation, display mapping, and search.
//!
//! The resolver turns raw task-store snapshots into a consistent, queryable
//! graph. It protects three invariants:
//!
//! - no dangling edge ever reaches the reverse-dependency index (broken
//!   edges are isolated per edge in the invalid-edge list),
//! - no dependency cycle is ever committed (every mutation is gated by
//!   full-graph cycle detection with the candidate edges substituted in),
//! - lookups stay O(1) against a write-heavy, externally-mutated source of
//!   truth (the whole index is rebuilt and swapped atomically per push).
//!
//! ## Example
//!
//! ```rust,ignore
//! use taskgraph_core::{DependencyResolver, SqliteTaskStore};
//!
//! let store = SqliteTaskStore::in_memory()?;
//! let resolver = DependencyResolver::new();
//! resolver.init(&store)?;
//!
//! resolver.validate_dependency_list(Some("12"), &["7.a".into()])?;
//! let dependents = resolver.dependents("7.a");
//! ```

mod display;
mod index;
mod parser;
mod search;
mod service;
mod validate;

pub use display::DisplayMap;
pub use index::{IndexMetadata, InvalidEdge, ResolvedRef, ResolverIndex};
pub use parser::{parse_ref, FeatureKey, ParsedRef, RefError, RefErrorCode, RefKind};
pub use search::{search, SearchHit, DEFAULT_SEARCH_LIMIT};
pub use service::{DependencyResolver, UpdateListener};
pub use validate::{validate_dependency_list, DepListError, EntryErrors};
