//! The resolver service: owns the current index, the snapshot subscription,
//! and the observer list.
//!
//! One [`DependencyResolver`] is constructed per active project context and
//! passed by reference to callers; there is no process-wide instance. The
//! model is push-driven and synchronous: every snapshot push rebuilds the
//! index to completion, the new index is swapped in atomically behind an
//! `Arc`, and only then are observers notified. Observers are invoked over a
//! copy of the listener list with no lock held, so a listener may
//! unsubscribe itself (or register new listeners) from inside its callback.

use std::sync::{Arc, Mutex, RwLock, Weak};

use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::model::Snapshot;
use crate::resolver::display::DisplayMap;
use crate::resolver::index::{ResolvedRef, ResolverIndex};
use crate::resolver::parser::{parse_ref, ParsedRef, RefError};
use crate::resolver::search::{search, SearchHit, DEFAULT_SEARCH_LIMIT};
use crate::resolver::validate::{validate_dependency_list, DepListError};
use crate::source::{SnapshotSource, Subscription};

/// Callback invoked after each completed index rebuild.
pub type UpdateListener = Arc<dyn Fn(&Arc<ResolverIndex>) + Send + Sync>;

struct Listener {
    id: Uuid,
    callback: UpdateListener,
}

#[derive(Default)]
struct ResolverState {
    index: Arc<ResolverIndex>,
    display: Option<DisplayMap>,
    listeners: Vec<Listener>,
}

/// Dependency resolver for one project context.
///
/// Starts empty; [`init`](Self::init) performs the first build from the
/// snapshot source and keeps rebuilding on every push until the resolver is
/// dropped. All read operations are pure, bounded computations over the
/// current index.
pub struct DependencyResolver {
    state: Arc<RwLock<ResolverState>>,
    // Kept outside the shared state: the push callback only ever holds a
    // weak handle to `state`, while this guard owns the callback's
    // registration for the resolver's lifetime.
    source_subscription: Mutex<Option<Subscription>>,
}

impl DependencyResolver {
    /// Create a resolver with an empty index.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ResolverState::default())),
            source_subscription: Mutex::new(None),
        }
    }

    /// Attach to a snapshot source: pull and build once, then rebuild on
    /// every subsequent push. Returns the first index.
    pub fn init(&self, source: &dyn SnapshotSource) -> Result<Arc<ResolverIndex>> {
        let first = Self::publish(&self.state, &source.snapshot()?);

        let weak: Weak<RwLock<ResolverState>> = Arc::downgrade(&self.state);
        let subscription = source.subscribe(Arc::new(move |snapshot| {
            if let Some(state) = weak.upgrade() {
                Self::publish(&state, snapshot);
            }
        }));
        *self.source_subscription.lock().unwrap() = Some(subscription);

        Ok(first)
    }

    /// Rebuild from a snapshot, swap the index in, and notify observers.
    ///
    /// The listener list is cloned under the lock and invoked after the lock
    /// is released, so callbacks can re-enter the resolver freely.
    fn publish(state: &RwLock<ResolverState>, snapshot: &Snapshot) -> Arc<ResolverIndex> {
        let index = Arc::new(ResolverIndex::build(snapshot));
        let listeners: Vec<UpdateListener> = {
            let mut state = state.write().unwrap();
            state.index = Arc::clone(&index);
            state
                .listeners
                .iter()
                .map(|listener| Arc::clone(&listener.callback))
                .collect()
        };
        debug!(listeners = listeners.len(), "publishing rebuilt index");
        for listener in listeners {
            listener(&index);
        }
        index
    }

    /// Attach project display-number maps. Does not rebuild the graph.
    pub fn set_project(&self, display: DisplayMap) {
        self.state.write().unwrap().display = Some(display);
    }

    /// Register an observer for index updates.
    ///
    /// The returned guard removes the observer when dropped; dropping it
    /// from inside the callback itself is safe.
    pub fn on_update(
        &self,
        callback: impl Fn(&Arc<ResolverIndex>) + Send + Sync + 'static,
    ) -> Subscription {
        let id = Uuid::new_v4();
        self.state.write().unwrap().listeners.push(Listener {
            id,
            callback: Arc::new(callback),
        });

        let weak = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                if let Ok(mut state) = state.write() {
                    state.listeners.retain(|listener| listener.id != id);
                }
            }
        })
    }

    /// The current index. The returned `Arc` stays valid (and stale) across
    /// later rebuilds.
    pub fn index(&self) -> Arc<ResolverIndex> {
        Arc::clone(&self.state.read().unwrap().index)
    }

    /// Parse a reference token without touching the index.
    pub fn parse_ref(&self, token: &str) -> std::result::Result<ParsedRef, RefError> {
        parse_ref(token)
    }

    /// Resolve a token against the current index.
    pub fn resolve_ref(&self, token: &str) -> std::result::Result<ResolvedRef, RefError> {
        self.index().resolve(token)
    }

    /// Parse plus existence check against the current index.
    pub fn validate_ref(&self, token: &str) -> std::result::Result<(), RefError> {
        self.index().validate_token(token)
    }

    /// Validate a candidate dependency list against the current index.
    pub fn validate_dependency_list(
        &self,
        context: Option<&str>,
        proposed: &[String],
    ) -> std::result::Result<(), DepListError> {
        validate_dependency_list(context, proposed, &self.index())
    }

    /// Display form of a token (`#N` / `#N.M`), if a project is attached
    /// and the ids are mapped.
    pub fn display_ref(&self, token: &str) -> Option<String> {
        self.state
            .read()
            .unwrap()
            .display
            .as_ref()
            .and_then(|display| display.display_ref(token))
    }

    /// Canonical tokens of the nodes that depend on `token`.
    ///
    /// Unparseable or unknown tokens simply have no dependents.
    pub fn dependents(&self, token: &str) -> Vec<String> {
        match parse_ref(token) {
            Ok(parsed) => self
                .index()
                .dependents_of(&parsed)
                .iter()
                .map(ToString::to_string)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Title search with the default limit.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        self.search_limited(query, DEFAULT_SEARCH_LIMIT)
    }

    /// Title search with an explicit limit.
    pub fn search_limited(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        search(&self.index(), query, limit)
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DependencyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().unwrap();
        f.debug_struct("DependencyResolver")
            .field("tasks", &state.index.task_count())
            .field("features", &state.index.feature_count())
            .field("listeners", &state.listeners.len())
            .field("has_project", &state.display.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{Feature, Task};
    use crate::source::SnapshotListener;

    /// Minimal in-memory snapshot source for driving the resolver.
    #[derive(Default)]
    struct TestSource {
        snapshot: Mutex<Snapshot>,
        listeners: Mutex<Vec<(Uuid, SnapshotListener)>>,
    }

    impl TestSource {
        fn new(snapshot: Snapshot) -> Arc<Self> {
            Arc::new(Self {
                snapshot: Mutex::new(snapshot),
                listeners: Mutex::new(Vec::new()),
            })
        }

        fn push(&self, snapshot: Snapshot) {
            *self.snapshot.lock().unwrap() = snapshot.clone();
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

    impl SnapshotSource for Arc<TestSource> {
        fn snapshot(&self) -> Result<Snapshot> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        fn subscribe(&self, listener: SnapshotListener) -> Subscription {
            let id = Uuid::new_v4();
            self.listeners.lock().unwrap().push((id, listener));
            let weak = Arc::downgrade(self);
            Subscription::new(move || {
                if let Some(source) = weak.upgrade() {
                    source
                        .listeners
                        .lock()
                        .unwrap()
                        .retain(|(listener_id, _)| *listener_id != id);
                }
            })
        }
    }

    fn seed() -> Snapshot {
        Snapshot::from_tasks([
            Task::new("1", "Foundations"),
            Task::new("2", "Build")
                .with_feature(Feature::new("a", "Slice").with_dependencies(["1"])),
        ])
    }

    #[test]
    fn init_builds_the_first_index() {
        let source = TestSource::new(seed());
        let resolver = DependencyResolver::new();
        let index = resolver.init(&source).unwrap();

        assert_eq!(index.task_count(), 2);
        assert_eq!(resolver.dependents("1"), vec!["2.a".to_string()]);
        assert!(resolver.validate_ref("2.a").is_ok());
    }

    #[test]
    fn pushes_rebuild_and_notify() {
        let source = TestSource::new(seed());
        let resolver = DependencyResolver::new();
        resolver.init(&source).unwrap();

        let notified = Arc::new(AtomicUsize::new(0));
        let seen_tasks = Arc::new(AtomicUsize::new(0));
        let _guard = {
            let notified = Arc::clone(&notified);
            let seen_tasks = Arc::clone(&seen_tasks);
            resolver.on_update(move |index| {
                notified.fetch_add(1, Ordering::SeqCst);
                seen_tasks.store(index.task_count(), Ordering::SeqCst);
            })
        };

        let mut next = seed();
        next.insert_task(Task::new("3", "More"));
        source.push(next);

        assert_eq!(notified.load(Ordering::SeqCst), 1);
        // The callback observed the fully rebuilt index.
        assert_eq!(seen_tasks.load(Ordering::SeqCst), 3);
        assert_eq!(resolver.index().task_count(), 3);
    }

    #[test]
    fn stale_index_handles_stay_consistent() {
        let source = TestSource::new(seed());
        let resolver = DependencyResolver::new();
        let before = resolver.init(&source).unwrap();

        source.push(Snapshot::from_tasks([Task::new("9", "Replaced")]));

        // The old handle still answers from its own snapshot.
        assert_eq!(before.task_count(), 2);
        assert!(before.task("1").is_some());
        // The resolver has moved on wholesale.
        let after = resolver.index();
        assert_eq!(after.task_count(), 1);
        assert!(after.task("1").is_none());
    }

    #[test]
    fn unsubscribed_listeners_stop_firing() {
        let source = TestSource::new(seed());
        let resolver = DependencyResolver::new();
        resolver.init(&source).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let guard = {
            let calls = Arc::clone(&calls);
            resolver.on_update(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        source.push(seed());
        guard.unsubscribe();
        source.push(seed());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_can_unsubscribe_itself_during_notify() {
        let source = TestSource::new(seed());
        let resolver = DependencyResolver::new();
        resolver.init(&source).unwrap();

        let self_guard: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));
        let other_calls = Arc::new(AtomicUsize::new(0));

        let guard = {
            let self_guard = Arc::clone(&self_guard);
            let calls = Arc::clone(&calls);
            resolver.on_update(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                // Dropping our own subscription mid-notification must not
                // deadlock or panic.
                let _ = self_guard.lock().unwrap().take();
            })
        };
        *self_guard.lock().unwrap() = Some(guard);

        let _other = {
            let other_calls = Arc::clone(&other_calls);
            resolver.on_update(move |_| {
                other_calls.fetch_add(1, Ordering::SeqCst);
            })
        };

        source.push(seed());
        source.push(seed());

        // The self-removing listener fired exactly once; the other listener
        // was never skipped.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(other_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn validate_and_search_go_through_the_current_index() {
        let source = TestSource::new(seed());
        let resolver = DependencyResolver::new();
        resolver.init(&source).unwrap();

        assert_eq!(
            resolver.validate_dependency_list(Some("1"), &["2.a".to_string()]),
            Err(DepListError::Cycle)
        );
        assert_eq!(resolver.search("foundations").len(), 1);
        assert_eq!(resolver.search_limited("s", 1).len(), 1);
    }

    #[test]
    fn display_refs_require_an_attached_project() {
        let source = TestSource::new(seed());
        let resolver = DependencyResolver::new();
        resolver.init(&source).unwrap();

        assert_eq!(resolver.display_ref("1"), None);

        resolver.set_project(DisplayMap::new().with_task("1", 1).with_task("2", 2).with_feature(
            "2", "a", 1,
        ));
        assert_eq!(resolver.display_ref("2.a").as_deref(), Some("#2.1"));
        assert_eq!(resolver.display_ref("missing"), None);
    }

    #[test]
    fn dropping_the_resolver_detaches_from_the_source() {
        let source = TestSource::new(seed());
        {
            let resolver = DependencyResolver::new();
            resolver.init(&source).unwrap();
            assert_eq!(source.listeners.lock().unwrap().len(), 1);
        }
        // State dropped with the resolver; its source subscription guard
        // removed the listener.
        assert_eq!(source.listeners.lock().unwrap().len(), 0);
    }
}
