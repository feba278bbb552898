//! Project-scoped display-number mapping.
//!
//! Internally every entity is addressed by opaque ids; users see stable
//! sequential numbers instead (task `#N`, feature `#N.M`). The numbers are
//! assigned by the owning project and attached to the resolver as a plain
//! lookup table; a missing entry is a silent miss, never an error, because
//! display numbering is a presentation concern layered over the
//! authoritative id-based graph.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::Task;
use crate::resolver::parser::{parse_ref, ParsedRef};

/// Project-level mapping from opaque ids to display numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMap {
    task_numbers: HashMap<String, u32>,
    feature_numbers: HashMap<String, HashMap<String, u32>>,
}

impl DisplayMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number tasks and their features sequentially (1-based) in the given
    /// order. The caller supplies the order; it is what makes the numbers
    /// stable.
    pub fn number_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut map = Self::new();
        for (task_index, task) in tasks.into_iter().enumerate() {
            map.set_task(&task.id, task_index as u32 + 1);
            for (feature_index, feature) in task.features.iter().enumerate() {
                map.set_feature(&task.id, &feature.id, feature_index as u32 + 1);
            }
        }
        map
    }

    /// Assign a display number to a task.
    pub fn set_task(&mut self, task_id: impl Into<String>, number: u32) {
        self.task_numbers.insert(task_id.into(), number);
    }

    /// Assign a display number to a feature within a task.
    pub fn set_feature(
        &mut self,
        task_id: impl Into<String>,
        feature_id: impl Into<String>,
        number: u32,
    ) {
        self.feature_numbers
            .entry(task_id.into())
            .or_default()
            .insert(feature_id.into(), number);
    }

    /// Builder form of [`set_task`](Self::set_task).
    pub fn with_task(mut self, task_id: impl Into<String>, number: u32) -> Self {
        self.set_task(task_id, number);
        self
    }

    /// Builder form of [`set_feature`](Self::set_feature).
    pub fn with_feature(
        mut self,
        task_id: impl Into<String>,
        feature_id: impl Into<String>,
        number: u32,
    ) -> Self {
        self.set_feature(task_id, feature_id, number);
        self
    }

    /// Display number of a task.
    pub fn task_number(&self, task_id: &str) -> Option<u32> {
        self.task_numbers.get(task_id).copied()
    }

    /// Display number of a feature within its task.
    pub fn feature_number(&self, task_id: &str, feature_id: &str) -> Option<u32> {
        self.feature_numbers.get(task_id)?.get(feature_id).copied()
    }

    /// Render a reference token as its display form: `#N` for tasks,
    /// `#N.M` for features. `None` on parse failure or any missing lookup.
    pub fn display_ref(&self, token: &str) -> Option<String> {
        match parse_ref(token).ok()? {
            ParsedRef::Task { task_id } => Some(format!("#{}", self.task_number(&task_id)?)),
            ParsedRef::Feature {
                task_id,
                feature_id,
            } => {
                let task = self.task_number(&task_id)?;
                let feature = self.feature_number(&task_id, &feature_id)?;
                Some(format!("#{}.{}", task, feature))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::Feature;

    fn map() -> DisplayMap {
        DisplayMap::new()
            .with_task("t-abc", 3)
            .with_feature("t-abc", "f-xyz", 2)
    }

    #[test]
    fn renders_task_and_feature_refs() {
        let map = map();
        assert_eq!(map.display_ref("t-abc").as_deref(), Some("#3"));
        assert_eq!(map.display_ref("t-abc.f-xyz").as_deref(), Some("#3.2"));
    }

    #[test]
    fn missing_lookups_are_silent() {
        let map = map();
        assert_eq!(map.display_ref("unknown"), None);
        assert_eq!(map.display_ref("t-abc.unknown"), None);
        // Feature number without a task number still misses.
        let partial = DisplayMap::new().with_feature("t", "f", 1);
        assert_eq!(partial.display_ref("t.f"), None);
    }

    #[test]
    fn malformed_tokens_are_silent() {
        let map = map();
        assert_eq!(map.display_ref(""), None);
        assert_eq!(map.display_ref("a.b.c"), None);
    }

    #[test]
    fn number_tasks_assigns_sequential_numbers() {
        let tasks = vec![
            Task::new("t1", "First"),
            Task::new("t2", "Second")
                .with_feature(Feature::new("a", "One"))
                .with_feature(Feature::new("b", "Two")),
        ];
        let map = DisplayMap::number_tasks(&tasks);
        assert_eq!(map.display_ref("t1").as_deref(), Some("#1"));
        assert_eq!(map.display_ref("t2.b").as_deref(), Some("#2.2"));
    }
}
