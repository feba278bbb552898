//! Linear title search over the resolver index.

use serde::Serialize;

use crate::resolver::index::ResolverIndex;
use crate::resolver::parser::{ParsedRef, RefKind};

/// Default maximum number of search hits.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// Canonical reference token for the matched entity.
    pub token: String,
    /// Whether the hit is a task or a feature.
    pub kind: RefKind,
    /// Matched title.
    pub title: String,
    /// Owning task title for feature hits.
    pub subtitle: Option<String>,
}

/// Case-insensitive substring search across task and feature titles.
///
/// Scans tasks in map iteration order and stops as soon as `limit` hits are
/// collected; best-effort for interactive lookups, not globally ranked.
pub fn search(index: &ResolverIndex, query: &str, limit: usize) -> Vec<SearchHit> {
    let needle = query.to_lowercase();
    let mut hits = Vec::new();

    'tasks: for task in index.tasks_by_id().values() {
        if hits.len() >= limit {
            break;
        }
        if task.title.to_lowercase().contains(&needle) {
            hits.push(SearchHit {
                token: ParsedRef::task(&task.id).to_string(),
                kind: RefKind::Task,
                title: task.title.clone(),
                subtitle: None,
            });
        }
        for feature in &task.features {
            if hits.len() >= limit {
                break 'tasks;
            }
            if feature.title.to_lowercase().contains(&needle) {
                hits.push(SearchHit {
                    token: ParsedRef::feature(&task.id, &feature.id).to_string(),
                    kind: RefKind::Feature,
                    title: feature.title.clone(),
                    subtitle: Some(task.title.clone()),
                });
            }
        }
    }

    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Feature, Snapshot, Task};

    fn index() -> ResolverIndex {
        ResolverIndex::build(&Snapshot::from_tasks([
            Task::new("1", "Login flow")
                .with_feature(Feature::new("a", "Login form"))
                .with_feature(Feature::new("b", "Session refresh")),
            Task::new("2", "Billing"),
        ]))
    }

    #[test]
    fn matches_are_case_insensitive() {
        let hits = search(&index(), "LOGIN", DEFAULT_SEARCH_LIMIT);
        let mut tokens: Vec<&str> = hits.iter().map(|h| h.token.as_str()).collect();
        tokens.sort_unstable();
        assert_eq!(tokens, vec!["1", "1.a"]);
    }

    #[test]
    fn feature_hits_carry_owner_subtitle() {
        let hits = search(&index(), "session", DEFAULT_SEARCH_LIMIT);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, RefKind::Feature);
        assert_eq!(hits[0].token, "1.b");
        assert_eq!(hits[0].subtitle.as_deref(), Some("Login flow"));
    }

    #[test]
    fn no_match_yields_empty() {
        assert!(search(&index(), "nonexistent", DEFAULT_SEARCH_LIMIT).is_empty());
    }

    #[test]
    fn limit_short_circuits_the_scan() {
        let snapshot = Snapshot::from_tasks(
            (0..100).map(|i| Task::new(format!("t{}", i), format!("Common title {}", i))),
        );
        let hits = search(&ResolverIndex::build(&snapshot), "common", 5);
        assert_eq!(hits.len(), 5);
    }
}
