//! Derived dependency index built from task-store snapshots.
//!
//! One [`ResolverIndex`] is built per snapshot push, wholesale. It is never
//! patched in place, so a reader holding an older index always sees a
//! stable, self-consistent (if stale) view of the graph.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::model::{Feature, Snapshot, Task};
use crate::resolver::parser::{parse_ref, FeatureKey, ParsedRef, RefError, RefKind};

/// A dependency edge that failed to resolve during an index build.
///
/// Broken edges are isolated here instead of aborting the build; the rest of
/// the graph is still fully populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEdge {
    /// The node that declared the dependency.
    pub from: ParsedRef,
    /// The raw token that failed to resolve.
    pub to: String,
    /// Why resolution failed.
    pub error: RefError,
}

/// Metadata about an index build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexMetadata {
    /// When the index was built.
    pub built_at: Option<DateTime<Utc>>,
    /// Number of tasks indexed.
    pub task_count: usize,
    /// Number of features indexed.
    pub feature_count: usize,
    /// Number of resolved dependency edges.
    pub edge_count: usize,
}

/// A reference resolved against the index, carrying the addressed entities.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedRef {
    /// A resolved task reference.
    Task {
        /// The addressed task.
        task: Task,
    },
    /// A resolved feature reference.
    Feature {
        /// The owning task.
        task: Task,
        /// The addressed feature.
        feature: Feature,
    },
}

impl ResolvedRef {
    /// The kind of entity resolved.
    pub fn kind(&self) -> RefKind {
        match self {
            Self::Task { .. } => RefKind::Task,
            Self::Feature { .. } => RefKind::Feature,
        }
    }

    /// Id of the task (for features, the owning task).
    pub fn task_id(&self) -> &str {
        match self {
            Self::Task { task } | Self::Feature { task, .. } => &task.id,
        }
    }

    /// Canonical reference token for the resolved entity.
    pub fn token(&self) -> String {
        match self {
            Self::Task { task } => task.id.clone(),
            Self::Feature { task, feature } => format!("{}.{}", task.id, feature.id),
        }
    }

    /// Title of the resolved entity.
    pub fn title(&self) -> &str {
        match self {
            Self::Task { task } => &task.title,
            Self::Feature { feature, .. } => &feature.title,
        }
    }
}

/// Immutable derived index over one task-store snapshot.
#[derive(Debug, Clone, Default)]
pub struct ResolverIndex {
    tasks_by_id: HashMap<String, Task>,
    features_by_id: HashMap<FeatureKey, Feature>,
    dependents_of: HashMap<ParsedRef, Vec<ParsedRef>>,
    invalid_edges: Vec<InvalidEdge>,
    metadata: IndexMetadata,
}

impl ResolverIndex {
    /// Build a fresh index from a snapshot.
    ///
    /// Entity maps are copied verbatim, then every declared dependency token
    /// is parsed and resolved: successes land in the reverse-dependency map
    /// (deduplicated per target), failures are isolated per edge in
    /// [`invalid_edges`](Self::invalid_edges) without aborting the build.
    pub fn build(snapshot: &Snapshot) -> Self {
        let mut index = Self {
            tasks_by_id: snapshot.tasks_by_id.clone(),
            ..Self::default()
        };

        for task in snapshot.tasks_by_id.values() {
            for feature in &task.features {
                index
                    .features_by_id
                    .insert(FeatureKey::new(&task.id, &feature.id), feature.clone());
            }
        }

        let mut edges: Vec<(ParsedRef, String)> = Vec::new();
        for task in snapshot.tasks_by_id.values() {
            let from = ParsedRef::task(&task.id);
            for dep in &task.dependencies {
                edges.push((from.clone(), dep.clone()));
            }
            for feature in &task.features {
                let from = ParsedRef::feature(&task.id, &feature.id);
                for dep in &feature.dependencies {
                    edges.push((from.clone(), dep.clone()));
                }
            }
        }

        let mut edge_count = 0;
        for (from, token) in edges {
            let resolved =
                parse_ref(&token).and_then(|parsed| index.check_ref(&parsed).map(|()| parsed));
            match resolved {
                Ok(target) => {
                    let dependents = index.dependents_of.entry(target).or_default();
                    if !dependents.contains(&from) {
                        dependents.push(from);
                        edge_count += 1;
                    }
                }
                Err(error) => {
                    warn!(from = %from, to = %token, %error, "dropping unresolvable dependency edge");
                    index.invalid_edges.push(InvalidEdge { from, to: token, error });
                }
            }
        }

        index.metadata = IndexMetadata {
            built_at: Some(Utc::now()),
            task_count: index.tasks_by_id.len(),
            feature_count: index.features_by_id.len(),
            edge_count,
        };
        debug!(
            tasks = index.metadata.task_count,
            features = index.metadata.feature_count,
            edges = index.metadata.edge_count,
            invalid = index.invalid_edges.len(),
            "rebuilt dependency index"
        );
        index
    }

    /// Check that a parsed reference addresses an existing entity.
    pub fn check_ref(&self, parsed: &ParsedRef) -> Result<(), RefError> {
        match parsed {
            ParsedRef::Task { task_id } => {
                if self.tasks_by_id.contains_key(task_id) {
                    Ok(())
                } else {
                    Err(RefError::TaskNotFound {
                        task_id: task_id.clone(),
                    })
                }
            }
            ParsedRef::Feature {
                task_id,
                feature_id,
            } => {
                if !self.tasks_by_id.contains_key(task_id) {
                    return Err(RefError::TaskNotFound {
                        task_id: task_id.clone(),
                    });
                }
                let key = FeatureKey::new(task_id.clone(), feature_id.clone());
                if self.features_by_id.contains_key(&key) {
                    Ok(())
                } else {
                    Err(RefError::FeatureNotFound {
                        task_id: task_id.clone(),
                        feature_id: feature_id.clone(),
                    })
                }
            }
        }
    }

    /// Resolve a token to owned copies of the addressed entities.
    ///
    /// Parse failures propagate; a feature reference requires the owning
    /// task to exist before the feature itself is looked up.
    pub fn resolve(&self, token: &str) -> Result<ResolvedRef, RefError> {
        let parsed = parse_ref(token)?;
        self.resolve_parsed(&parsed)
    }

    /// Resolve an already-parsed reference.
    pub fn resolve_parsed(&self, parsed: &ParsedRef) -> Result<ResolvedRef, RefError> {
        match parsed {
            ParsedRef::Task { task_id } => {
                let task = self
                    .tasks_by_id
                    .get(task_id)
                    .ok_or_else(|| RefError::TaskNotFound {
                        task_id: task_id.clone(),
                    })?;
                Ok(ResolvedRef::Task { task: task.clone() })
            }
            ParsedRef::Feature {
                task_id,
                feature_id,
            } => {
                let task = self
                    .tasks_by_id
                    .get(task_id)
                    .ok_or_else(|| RefError::TaskNotFound {
                        task_id: task_id.clone(),
                    })?;
                let key = FeatureKey::new(task_id.clone(), feature_id.clone());
                let feature =
                    self.features_by_id
                        .get(&key)
                        .ok_or_else(|| RefError::FeatureNotFound {
                            task_id: task_id.clone(),
                            feature_id: feature_id.clone(),
                        })?;
                Ok(ResolvedRef::Feature {
                    task: task.clone(),
                    feature: feature.clone(),
                })
            }
        }
    }

    /// Thin ok/error wrapper: parse plus existence check, no entity copies.
    pub fn validate_token(&self, token: &str) -> Result<(), RefError> {
        let parsed = parse_ref(token)?;
        self.check_ref(&parsed)
    }

    /// Look up a task by id.
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks_by_id.get(task_id)
    }

    /// Look up a feature by owning task and feature id.
    pub fn feature(&self, task_id: &str, feature_id: &str) -> Option<&Feature> {
        self.features_by_id
            .get(&FeatureKey::new(task_id, feature_id))
    }

    /// All tasks, keyed by id.
    pub fn tasks_by_id(&self) -> &HashMap<String, Task> {
        &self.tasks_by_id
    }

    /// All features, keyed by `(task id, feature id)`.
    pub fn features_by_id(&self) -> &HashMap<FeatureKey, Feature> {
        &self.features_by_id
    }

    /// Nodes that declare a dependency on `target`.
    ///
    /// Only successfully resolved edges appear here; broken edges live in
    /// [`invalid_edges`](Self::invalid_edges) exclusively.
    pub fn dependents_of(&self, target: &ParsedRef) -> &[ParsedRef] {
        self.dependents_of
            .get(target)
            .map(|refs| refs.as_slice())
            .unwrap_or(&[])
    }

    /// The full reverse-dependency map.
    pub fn dependents_map(&self) -> &HashMap<ParsedRef, Vec<ParsedRef>> {
        &self.dependents_of
    }

    /// Every dependency edge that failed resolution during the build.
    pub fn invalid_edges(&self) -> &[InvalidEdge] {
        &self.invalid_edges
    }

    /// Metadata about this build.
    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// Number of tasks indexed.
    pub fn task_count(&self) -> usize {
        self.tasks_by_id.len()
    }

    /// Number of features indexed.
    pub fn feature_count(&self) -> usize {
        self.features_by_id.len()
    }

    /// Whether the index holds no tasks at all.
    pub fn is_empty(&self) -> bool {
        self.tasks_by_id.is_empty()
    }
}
