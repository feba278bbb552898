//! SQLite-backed task store.
//!
//! The store is the authoritative source of truth for tasks and features;
//! the resolver is a pure reader of the snapshots it pushes. Every committed
//! mutation assembles a fresh full snapshot and notifies subscribers; there
//! is no incremental patching on the wire.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Feature, Snapshot, Status, Task};
use crate::source::{SnapshotListener, SnapshotSource, Subscription};
use crate::store::schema::{initialize_schema, is_initialized};

type ListenerSet = Mutex<Vec<(Uuid, SnapshotListener)>>;

/// SQLite-backed task store.
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
    listeners: Arc<ListenerSet>,
}

impl SqliteTaskStore {
    /// Open or create a task store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;

        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            listeners: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            listeners: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::Storage(e.to_string()))
    }

    // ==================== Task Operations ====================

    /// Insert or replace a task together with its features.
    pub fn put_task(&self, task: &Task) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO tasks (id, status, title, description, dependencies, rejection_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                     status = excluded.status,
                     title = excluded.title,
                     description = excluded.description,
                     dependencies = excluded.dependencies,
                     rejection_reason = excluded.rejection_reason,
                     updated_at = datetime('now')",
                params![
                    task.id,
                    task.status.as_str(),
                    task.title,
                    task.description,
                    serde_json::to_string(&task.dependencies).unwrap_or_default(),
                    task.rejection_reason,
                ],
            )?;

            // Features are replaced wholesale; `position` preserves order.
            tx.execute("DELETE FROM features WHERE task_id = ?1", params![task.id])?;
            for (position, feature) in task.features.iter().enumerate() {
                tx.execute(
                    "INSERT INTO features (
                        task_id, id, position, status, title, description,
                        plan, context, acceptance, dependencies, rejection_reason
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        task.id,
                        feature.id,
                        position as i64,
                        feature.status.as_str(),
                        feature.title,
                        feature.description,
                        serde_json::to_string(&feature.plan).unwrap_or_default(),
                        serde_json::to_string(&feature.context).unwrap_or_default(),
                        serde_json::to_string(&feature.acceptance).unwrap_or_default(),
                        serde_json::to_string(&feature.dependencies).unwrap_or_default(),
                        feature.rejection_reason,
                    ],
                )?;
            }

            tx.commit()
        })?;
        self.notify();
        Ok(())
    }

    /// Get a task by id, with its features in order.
    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        self.with_conn(|conn| {
            let task = conn
                .query_row(
                    "SELECT id, status, title, description, dependencies, rejection_reason
                     FROM tasks WHERE id = ?1",
                    params![task_id],
                    row_to_task,
                )
                .optional()?;

            let Some(mut task) = task else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT task_id, id, status, title, description,
                        plan, context, acceptance, dependencies, rejection_reason
                 FROM features WHERE task_id = ?1 ORDER BY position",
            )?;
            let features = stmt.query_map(params![task_id], row_to_feature)?;
            for feature in features {
                task.features.push(feature?);
            }
            Ok(Some(task))
        })
    }

    /// Remove a task (and, by cascade, its features). Returns whether a row
    /// was deleted.
    pub fn remove_task(&self, task_id: &str) -> Result<bool> {
        let removed = self.with_conn(|conn| {
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![task_id])
        })?;
        if removed > 0 {
            self.notify();
        }
        Ok(removed > 0)
    }

    /// Replace a task's raw dependency list.
    ///
    /// The store persists whatever it is given; callers gate the mutation
    /// through the resolver's dependency-list validation first.
    pub fn set_task_dependencies(&self, task_id: &str, dependencies: &[String]) -> Result<()> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE tasks SET dependencies = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![
                    task_id,
                    serde_json::to_string(dependencies).unwrap_or_default()
                ],
            )
        })?;
        if updated == 0 {
            return Err(Error::task_not_found(task_id));
        }
        self.notify();
        Ok(())
    }

    /// Replace a feature's raw dependency list.
    pub fn set_feature_dependencies(
        &self,
        task_id: &str,
        feature_id: &str,
        dependencies: &[String],
    ) -> Result<()> {
        let updated = self.with_conn(|conn| {
            conn.execute(
                "UPDATE features SET dependencies = ?3 WHERE task_id = ?1 AND id = ?2",
                params![
                    task_id,
                    feature_id,
                    serde_json::to_string(dependencies).unwrap_or_default()
                ],
            )
        })?;
        if updated == 0 {
            return Err(Error::feature_not_found(task_id, feature_id));
        }
        self.notify();
        Ok(())
    }

    /// Number of stored tasks.
    pub fn task_count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| {
                row.get::<_, i64>(0).map(|n| n as usize)
            })
        })
    }

    // ==================== Snapshot Assembly ====================

    fn load_snapshot(&self) -> Result<Snapshot> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, status, title, description, dependencies, rejection_reason FROM tasks",
            )?;
            let mut tasks_by_id: HashMap<String, Task> = HashMap::new();
            for task in stmt.query_map([], row_to_task)? {
                let task = task?;
                tasks_by_id.insert(task.id.clone(), task);
            }

            let mut stmt = conn.prepare(
                "SELECT task_id, id, status, title, description,
                        plan, context, acceptance, dependencies, rejection_reason
                 FROM features ORDER BY task_id, position",
            )?;
            let features = stmt.query_map([], |row| {
                let task_id: String = row.get(0)?;
                Ok((task_id, row_to_feature(row)?))
            })?;
            for feature in features {
                let (task_id, feature) = feature?;
                if let Some(task) = tasks_by_id.get_mut(&task_id) {
                    task.features.push(feature);
                }
            }

            Ok(Snapshot { tasks_by_id })
        })
    }

    /// Push a fresh snapshot to all subscribers.
    ///
    /// Listeners are invoked over a copy of the registry with no lock held,
    /// so a listener may unsubscribe itself during the callback.
    fn notify(&self) {
        let snapshot = match self.load_snapshot() {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(%error, "skipping snapshot push after failed load");
                return;
            }
        };
        let listeners: Vec<SnapshotListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

impl SnapshotSource for SqliteTaskStore {
    fn snapshot(&self) -> Result<Snapshot> {
        self.load_snapshot()
    }

    fn subscribe(&self, listener: SnapshotListener) -> Subscription {
        let id = Uuid::new_v4();
        self.listeners.lock().unwrap().push((id, listener));

        let weak: Weak<ListenerSet> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                if let Ok(mut listeners) = listeners.lock() {
                    listeners.retain(|(listener_id, _)| *listener_id != id);
                }
            }
        })
    }
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        status: parse_status(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        features: Vec::new(),
        dependencies: parse_list(row, 4)?,
        rejection_reason: row.get(5)?,
    })
}

fn row_to_feature(row: &Row<'_>) -> rusqlite::Result<Feature> {
    Ok(Feature {
        id: row.get(1)?,
        status: parse_status(row, 2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        plan: parse_list(row, 5)?,
        context: parse_list(row, 6)?,
        acceptance: parse_list(row, 7)?,
        dependencies: parse_list(row, 8)?,
        rejection_reason: row.get(9)?,
    })
}

fn parse_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<Status> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

fn parse_list(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::Status;
    use crate::resolver::{DepListError, DependencyResolver};

    fn sample_task() -> Task {
        Task::new("t1", "Auth")
            .with_status(Status::InProgress)
            .with_description("Login and sessions")
            .with_dependencies(["t0"])
            .with_feature(
                Feature::new("a", "Form")
                    .with_plan(["sketch", "build"])
                    .with_acceptance(["submits"]),
            )
            .with_feature(Feature::new("b", "Backend").with_dependencies(["t1.a"]))
    }

    #[test]
    fn put_and_get_round_trip() {
        let store = SqliteTaskStore::in_memory().unwrap();
        store.put_task(&sample_task()).unwrap();

        let loaded = store.get_task("t1").unwrap().unwrap();
        assert_eq!(loaded, sample_task());
        assert!(store.get_task("missing").unwrap().is_none());
        assert_eq!(store.task_count().unwrap(), 1);
    }

    #[test]
    fn feature_order_is_preserved() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let mut task = Task::new("t", "Ordered");
        for id in ["z", "a", "m", "b"] {
            task = task.with_feature(Feature::new(id, format!("Feature {}", id)));
        }
        store.put_task(&task).unwrap();

        let loaded = store.get_task("t").unwrap().unwrap();
        let ids: Vec<&str> = loaded.features.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m", "b"]);
    }

    #[test]
    fn put_replaces_features_wholesale() {
        let store = SqliteTaskStore::in_memory().unwrap();
        store.put_task(&sample_task()).unwrap();

        let trimmed = Task::new("t1", "Auth").with_feature(Feature::new("c", "Only one"));
        store.put_task(&trimmed).unwrap();

        let loaded = store.get_task("t1").unwrap().unwrap();
        assert_eq!(loaded.features.len(), 1);
        assert_eq!(loaded.features[0].id, "c");
    }

    #[test]
    fn remove_cascades_to_features() {
        let store = SqliteTaskStore::in_memory().unwrap();
        store.put_task(&sample_task()).unwrap();

        assert!(store.remove_task("t1").unwrap());
        assert!(!store.remove_task("t1").unwrap());
        assert_eq!(store.snapshot().unwrap().feature_count(), 0);
    }

    #[test]
    fn dependency_setters_require_existing_rows() {
        let store = SqliteTaskStore::in_memory().unwrap();
        store.put_task(&sample_task()).unwrap();

        store.set_task_dependencies("t1", &[]).unwrap();
        assert!(matches!(
            store.set_task_dependencies("ghost", &[]),
            Err(Error::TaskNotFound { .. })
        ));
        assert!(matches!(
            store.set_feature_dependencies("t1", "ghost", &[]),
            Err(Error::FeatureNotFound { .. })
        ));
    }

    #[test]
    fn mutations_push_snapshots_to_subscribers() {
        let store = SqliteTaskStore::in_memory().unwrap();
        let pushes = Arc::new(AtomicUsize::new(0));
        let guard = {
            let pushes = Arc::clone(&pushes);
            store.subscribe(Arc::new(move |snapshot| {
                pushes.fetch_add(1, Ordering::SeqCst);
                assert!(snapshot.task_count() <= 1);
            }))
        };

        store.put_task(&Task::new("t", "One")).unwrap();
        store.set_task_dependencies("t", &[]).unwrap();
        store.remove_task("t").unwrap();
        // A miss does not push.
        let _ = store.remove_task("t");

        assert_eq!(pushes.load(Ordering::SeqCst), 3);
        guard.unsubscribe();
        store.put_task(&Task::new("t2", "Two")).unwrap();
        assert_eq!(pushes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn reopening_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");

        {
            let store = SqliteTaskStore::open(&path).unwrap();
            store.put_task(&sample_task()).unwrap();
        }

        let store = SqliteTaskStore::open(&path).unwrap();
        assert_eq!(store.get_task("t1").unwrap().unwrap(), sample_task());
    }

    #[test]
    fn resolver_tracks_store_mutations_end_to_end() {
        let store = SqliteTaskStore::in_memory().unwrap();
        store.put_task(&Task::new("a", "First")).unwrap();
        store
            .put_task(&Task::new("b", "Second").with_dependencies(["a"]))
            .unwrap();

        let resolver = DependencyResolver::new();
        resolver.init(&store).unwrap();
        assert_eq!(resolver.dependents("a"), vec!["b".to_string()]);

        // Gate the mutation through the resolver, then commit it.
        assert_eq!(
            resolver.validate_dependency_list(Some("a"), &["b".to_string()]),
            Err(DepListError::Cycle)
        );
        let proposed = vec!["b".to_string()];
        store
            .put_task(&Task::new("c", "Third").with_dependencies(proposed.clone()))
            .unwrap();

        // The push rebuilt the index; the new edge is queryable.
        assert_eq!(resolver.dependents("b"), vec!["c".to_string()]);
        assert!(resolver.validate_ref("c").is_ok());
    }
}
