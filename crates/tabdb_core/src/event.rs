//! Change events and the path-keyed event bus.
//!
//! Every committed mutation produces one [`ChangeEvent`]. The bus delivers it
//! to handlers registered on the exact path, then to handlers on each
//! ancestor path (closest first, the root last), then to global handlers.
//!
//! Handlers run synchronously on the emitting task, outside every lock. A
//! handler that panics is logged and skipped; the remaining handlers still
//! run.

use crate::path::DocPath;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tabdb_channel::ChangeSource;
use tracing::error;

/// A committed mutation at one path.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Where the change happened.
    pub path: DocPath,
    /// New value, `None` after a delete.
    pub value: Option<Value>,
    /// Value before the change, `None` if nothing was there.
    pub previous_value: Option<Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Whether the change was made here or received from another instance.
    pub source: ChangeSource,
}

impl ChangeEvent {
    /// Returns true if the change removed the value.
    pub fn is_delete(&self) -> bool {
        self.value.is_none()
    }

    /// Returns true if the change came from another instance.
    pub fn is_remote(&self) -> bool {
        self.source == ChangeSource::Remote
    }
}

/// A change handler.
pub type Handler = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    by_path: HashMap<DocPath, Vec<Handler>>,
    global: Vec<Handler>,
}

impl Registry {
    fn add(&mut self, key: &Option<DocPath>, handler: &Handler) {
        let list = match key {
            Some(path) => self.by_path.entry(path.clone()).or_default(),
            None => &mut self.global,
        };
        if !list.iter().any(|h| Arc::ptr_eq(h, handler)) {
            list.push(Arc::clone(handler));
        }
    }

    fn remove(&mut self, key: &Option<DocPath>, handler: &Handler) {
        match key {
            Some(path) => {
                if let Some(list) = self.by_path.get_mut(path) {
                    list.retain(|h| !Arc::ptr_eq(h, handler));
                    if list.is_empty() {
                        self.by_path.remove(path);
                    }
                }
            }
            None => self.global.retain(|h| !Arc::ptr_eq(h, handler)),
        }
    }
}

/// Distributes change events to subscribers.
#[derive(Default)]
pub struct EventBus {
    registry: Arc<RwLock<Registry>>,
    emitted: AtomicU64,
    handler_panics: AtomicU64,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for changes at `path` or below it.
    pub fn on<F>(&self, path: impl Into<DocPath>, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.on_handler(path, Arc::new(handler))
    }

    /// Registers a shared handler for changes at `path` or below it.
    ///
    /// Registering the same handler twice on one path has no extra effect.
    pub fn on_handler(&self, path: impl Into<DocPath>, handler: Handler) -> Subscription {
        self.register(Some(path.into()), handler)
    }

    /// Registers a handler for every change.
    pub fn on_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.on_any_handler(Arc::new(handler))
    }

    /// Registers a shared handler for every change.
    pub fn on_any_handler(&self, handler: Handler) -> Subscription {
        self.register(None, handler)
    }

    fn register(&self, key: Option<DocPath>, handler: Handler) -> Subscription {
        self.registry.write().add(&key, &handler);
        Subscription {
            registry: Arc::downgrade(&self.registry),
            key,
            handler,
        }
    }

    /// Delivers an event. Returns the number of handlers invoked.
    ///
    /// Ancestor subscribers receive a copy whose `path` is the ancestor they
    /// registered on; exact and global subscribers receive the event as is.
    pub fn emit(&self, event: &ChangeEvent) -> usize {
        let (exact, ancestors, global) = self.collect(&event.path);
        self.emitted.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        for handler in &exact {
            self.invoke(handler, event);
            delivered += 1;
        }
        for (ancestor, handlers) in ancestors {
            let bubbled = ChangeEvent {
                path: ancestor,
                ..event.clone()
            };
            for handler in &handlers {
                self.invoke(handler, &bubbled);
                delivered += 1;
            }
        }
        for handler in &global {
            self.invoke(handler, event);
            delivered += 1;
        }
        delivered
    }

    fn invoke(&self, handler: &Handler, event: &ChangeEvent) {
        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            self.handler_panics.fetch_add(1, Ordering::Relaxed);
            error!(path = %event.path, source = %event.source, "change handler panicked");
        }
    }

    /// Snapshots the handlers for `path` in delivery order so none run under
    /// the registry lock.
    fn collect(&self, path: &DocPath) -> (Vec<Handler>, Vec<(DocPath, Vec<Handler>)>, Vec<Handler>) {
        let registry = self.registry.read();

        let exact = registry.by_path.get(path).cloned().unwrap_or_default();
        let ancestors = path
            .ancestors()
            .filter_map(|ancestor| {
                let handlers = registry.by_path.get(&ancestor)?.clone();
                Some((ancestor, handlers))
            })
            .collect();
        (exact, ancestors, registry.global.clone())
    }

    /// Number of handlers registered on `path` exactly.
    pub fn handler_count(&self, path: &DocPath) -> usize {
        self.registry.read().by_path.get(path).map_or(0, Vec::len)
    }

    /// Number of global handlers.
    pub fn global_handler_count(&self) -> usize {
        self.registry.read().global.len()
    }

    /// Total events emitted.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Total handler invocations that panicked.
    pub fn handler_panics(&self) -> u64 {
        self.handler_panics.load(Ordering::Relaxed)
    }

    /// Removes every handler.
    pub fn clear(&self) {
        let mut registry = self.registry.write();
        registry.by_path.clear();
        registry.global.clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("EventBus")
            .field("paths", &registry.by_path.len())
            .field("global", &registry.global.len())
            .field("emitted", &self.emitted())
            .finish()
    }
}

/// Handle returned by a subscribe call.
///
/// Dropping the handle keeps the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "dropping a Subscription leaves the handler registered with no way to remove it"]
pub struct Subscription {
    registry: Weak<RwLock<Registry>>,
    key: Option<DocPath>,
    handler: Handler,
}

impl Subscription {
    /// Path the handler is registered on, `None` for a global handler.
    pub fn path(&self) -> Option<&DocPath> {
        self.key.as_ref()
    }

    /// Removes the handler. Idempotent with respect to other handles for the
    /// same handler; a no-op once the bus is gone.
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.write().remove(&self.key, &self.handler);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("path", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn event(path: &str) -> ChangeEvent {
        ChangeEvent {
            path: DocPath::parse(path),
            value: Some(json!(1)),
            previous_value: None,
            timestamp: 0,
            source: ChangeSource::Local,
        }
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> impl Fn(&ChangeEvent) + Send + Sync {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        move |_| log.lock().push(tag.clone())
    }

    #[test]
    fn delivery_order_exact_then_ancestors_then_global() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _g = bus.on_any(recorder(&log, "global"));
        let _r = bus.on("", recorder(&log, "root"));
        let _p = bus.on("projects", recorder(&log, "projects"));
        let _e = bus.on("projects.active", recorder(&log, "exact"));
        let _o = bus.on("entities", recorder(&log, "other"));

        assert_eq!(bus.emit(&event("projects.active")), 4);
        assert_eq!(*log.lock(), vec!["exact", "projects", "root", "global"]);
    }

    #[test]
    fn ancestors_see_their_own_path() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _p = bus.on("projects", move |e| sink.lock().push(e.path.joined()));
        let sink = Arc::clone(&seen);
        let _r = bus.on(DocPath::root(), move |e| sink.lock().push(e.path.joined()));
        let sink = Arc::clone(&seen);
        let _g = bus.on_any(move |e| sink.lock().push(e.path.joined()));

        bus.emit(&event("projects.list.p1"));
        assert_eq!(*seen.lock(), vec!["projects", "", "projects.list.p1"]);
    }

    #[test]
    fn descendants_do_not_receive_ancestor_changes() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _s = bus.on("projects.list.p1", recorder(&log, "p1"));

        bus.emit(&event("projects.list"));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn panicking_handler_does_not_stop_delivery() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _a = bus.on("a.b", |_| panic!("handler failure"));
        let _b = bus.on("a", recorder(&log, "a"));

        bus.emit(&event("a.b"));
        assert_eq!(*log.lock(), vec!["a"]);
        assert_eq!(bus.handler_panics(), 1);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let sub = bus.on("a", recorder(&log, "a"));
        assert_eq!(bus.handler_count(&DocPath::parse("a")), 1);
        sub.unsubscribe();
        assert_eq!(bus.handler_count(&DocPath::parse("a")), 0);

        bus.emit(&event("a"));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn same_handler_registered_once_per_path() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(recorder(&log, "h"));

        let first = bus.on_handler("a", Arc::clone(&handler));
        let _second = bus.on_handler("a", Arc::clone(&handler));
        assert_eq!(bus.handler_count(&DocPath::parse("a")), 1);

        bus.emit(&event("a"));
        assert_eq!(log.lock().len(), 1);

        first.unsubscribe();
        bus.emit(&event("a"));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn handler_may_subscribe_during_emit() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        let _s = bus.on("a", move |_| {
            let _nested = inner.on("b", |_| {});
        });

        bus.emit(&event("a"));
        assert_eq!(bus.handler_count(&DocPath::parse("b")), 1);
    }

    #[test]
    fn unsubscribe_after_bus_dropped_is_noop() {
        let bus = EventBus::new();
        let sub = bus.on_any(|_| {});
        assert_eq!(bus.global_handler_count(), 1);
        drop(bus);
        sub.unsubscribe();
    }
}
