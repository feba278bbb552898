//! Dependency-list validation and cycle detection.
//!
//! [`validate_dependency_list`] gates every dependency mutation: duplicates,
//! unresolvable references, and self-references are rejected first, and only
//! a well-formed candidate list reaches full-graph cycle detection with the
//! proposed edges substituted in. Running cycle detection over syntactically
//! broken input would produce misleading cycle reports, so it never happens.

use std::collections::{HashMap, HashSet};
use std::fmt;

use thiserror::Error;

use crate::resolver::index::ResolverIndex;
use crate::resolver::parser::{parse_ref, ParsedRef, RefError};

/// Aggregated duplicate/invalid findings for a proposed dependency list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryErrors {
    /// Tokens that appear more than once, each listed once.
    pub duplicates: Vec<String>,
    /// Tokens that failed to resolve, with the failure for each.
    pub invalid: Vec<(String, RefError)>,
}

impl EntryErrors {
    fn is_empty(&self) -> bool {
        self.duplicates.is_empty() && self.invalid.is_empty()
    }
}

impl fmt::Display for EntryErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if !self.duplicates.is_empty() {
            write!(f, "duplicate dependencies: ")?;
            for (i, token) in self.duplicates.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "`{}`", token)?;
            }
            wrote = true;
        }
        if !self.invalid.is_empty() {
            if wrote {
                write!(f, "; ")?;
            }
            write!(f, "invalid dependencies: ")?;
            for (i, (token, error)) in self.invalid.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "`{}` ({})", token, error)?;
            }
        }
        Ok(())
    }
}

/// Rejection produced by [`validate_dependency_list`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DepListError {
    /// The context node appears in its own proposed dependency list.
    /// Takes precedence over every other finding.
    #[error("`{token}` cannot depend on itself")]
    SelfDependency { token: String },

    /// Duplicate or unresolvable entries in the proposed list.
    #[error("{0}")]
    Entries(EntryErrors),

    /// The proposed edges would close a dependency loop.
    #[error("the proposed dependencies would create a cycle")]
    Cycle,
}

/// Validate a candidate dependency list for a context node.
///
/// `context` is the canonical token of the node being edited, or `None` for
/// a node that has not been created yet. An empty `proposed` list is always
/// valid: no new edges means no new cycle.
///
/// Check order: self-dependency first (it is a structurally different
/// mistake and wins over everything else), then aggregated duplicates and
/// invalid references, then cycle detection over the otherwise well-formed
/// graph with the context node's outgoing edges replaced by `proposed`.
pub fn validate_dependency_list(
    context: Option<&str>,
    proposed: &[String],
    index: &ResolverIndex,
) -> Result<(), DepListError> {
    if proposed.is_empty() {
        return Ok(());
    }

    if let Some(context) = context {
        if proposed.iter().any(|token| token == context) {
            return Err(DepListError::SelfDependency {
                token: context.to_string(),
            });
        }
    }

    let mut errors = EntryErrors::default();

    let mut seen: HashSet<&str> = HashSet::new();
    for token in proposed {
        if !seen.insert(token.as_str()) && !errors.duplicates.contains(token) {
            errors.duplicates.push(token.clone());
        }
    }

    let mut targets: Vec<ParsedRef> = Vec::new();
    for token in proposed {
        match parse_ref(token).and_then(|parsed| index.check_ref(&parsed).map(|()| parsed)) {
            Ok(parsed) => targets.push(parsed),
            Err(error) => errors.invalid.push((token.clone(), error)),
        }
    }

    if !errors.is_empty() {
        return Err(DepListError::Entries(errors));
    }

    if closes_cycle(context, &targets, index) {
        return Err(DepListError::Cycle);
    }

    Ok(())
}

/// Graph node for cycle detection.
///
/// `Candidate` hosts the proposed edges when the context node does not exist
/// in the index yet; being a dedicated variant, it can never collide with a
/// real task or feature id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CycleNode {
    Existing(ParsedRef),
    Candidate,
}

/// Would substituting `proposed` as the context node's outgoing edges close
/// a cycle anywhere in the graph?
fn closes_cycle(context: Option<&str>, proposed: &[ParsedRef], index: &ResolverIndex) -> bool {
    let context_node = context
        .and_then(|token| parse_ref(token).ok())
        .filter(|parsed| index.check_ref(parsed).is_ok())
        .map(CycleNode::Existing)
        .unwrap_or(CycleNode::Candidate);

    let mut nodes: Vec<CycleNode> = Vec::new();
    for task in index.tasks_by_id().values() {
        nodes.push(CycleNode::Existing(ParsedRef::task(&task.id)));
        for feature in &task.features {
            nodes.push(CycleNode::Existing(ParsedRef::feature(&task.id, &feature.id)));
        }
    }
    if context_node == CycleNode::Candidate {
        nodes.push(CycleNode::Candidate);
    }

    // Currently valid edges only: the reverse-dependency map is inverted
    // back into forward adjacency, which excludes broken edges by
    // construction. Everything leaving the context node is dropped here and
    // replaced by the proposed set below.
    let mut adjacency: HashMap<CycleNode, Vec<CycleNode>> = HashMap::new();
    for (target, referrers) in index.dependents_map() {
        for referrer in referrers {
            let from = CycleNode::Existing(referrer.clone());
            if from == context_node {
                continue;
            }
            adjacency
                .entry(from)
                .or_default()
                .push(CycleNode::Existing(target.clone()));
        }
    }
    adjacency
        .entry(context_node)
        .or_default()
        .extend(proposed.iter().cloned().map(CycleNode::Existing));

    has_cycle(&nodes, &adjacency)
}

/// Iterative DFS cycle detection over every component.
///
/// Explicit stack with `visited`/`on_stack` sets; a back-edge into a node
/// still on the stack is a cycle. Recursion depth would be unbounded on
/// pathological dependency chains, hence the explicit stack.
fn has_cycle(nodes: &[CycleNode], adjacency: &HashMap<CycleNode, Vec<CycleNode>>) -> bool {
    let mut visited: HashSet<&CycleNode> = HashSet::new();
    let mut on_stack: HashSet<&CycleNode> = HashSet::new();

    for root in nodes {
        if visited.contains(root) {
            continue;
        }
        visited.insert(root);
        on_stack.insert(root);
        let mut stack: Vec<(&CycleNode, usize)> = vec![(root, 0)];

        loop {
            let next = {
                let Some((node, cursor)) = stack.last_mut() else {
                    break;
                };
                let edges = adjacency
                    .get(*node)
                    .map(|edges| edges.as_slice())
                    .unwrap_or(&[]);
                match edges.get(*cursor) {
                    Some(next) => {
                        *cursor += 1;
                        Some(next)
                    }
                    None => None,
                }
            };

            match next {
                Some(next) => {
                    if on_stack.contains(next) {
                        return true;
                    }
                    if visited.insert(next) {
                        on_stack.insert(next);
                        stack.push((next, 0));
                    }
                }
                None => {
                    if let Some((done, _)) = stack.pop() {
                        on_stack.remove(done);
                    }
                }
            }
        }
    }

    false
}
