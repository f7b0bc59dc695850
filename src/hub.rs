//! Minimal keyed publish/subscribe primitive.
//!
//! [`EventHub`] backs both subscriber surfaces of the client: room
//! broadcasts (keyed by application event name) and connection meta events
//! (keyed by [`EventKind`](crate::event::EventKind)). Handlers are invoked
//! synchronously on the connection-loop task, in registration order.
//!
//! Each registration is identified by the [`HandlerId`] returned from
//! [`on`](EventHub::on) / [`once`](EventHub::once); `off` removes exactly
//! that registration and nothing else.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Opaque token identifying one handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type BoxedHandler<A> = Arc<dyn Fn(&A) + Send + Sync>;

struct Registration<A: ?Sized> {
    id: HandlerId,
    once: bool,
    handler: BoxedHandler<A>,
}

/// A typed event hub keyed by `K`, delivering `&A` to each handler.
pub struct EventHub<K, A: ?Sized> {
    handlers: Mutex<HashMap<K, Vec<Registration<A>>>>,
    next_id: AtomicU64,
}

impl<K: Eq + Hash, A: ?Sized> EventHub<K, A> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register `handler` for every dispatch of `key`.
    pub fn on(&self, key: impl Into<K>, handler: impl Fn(&A) + Send + Sync + 'static) -> HandlerId {
        self.register(key.into(), Arc::new(handler), false)
    }

    /// Register `handler` for at most one dispatch of `key`.
    ///
    /// The registration is removed before the handler runs, so a dispatch
    /// triggered from inside the handler cannot deliver to it again.
    pub fn once(
        &self,
        key: impl Into<K>,
        handler: impl Fn(&A) + Send + Sync + 'static,
    ) -> HandlerId {
        self.register(key.into(), Arc::new(handler), true)
    }

    /// Remove the registration identified by `id` under `key`.
    ///
    /// Returns `true` if a registration was removed. Unknown keys or ids
    /// are a no-op.
    pub fn off(&self, key: impl Into<K>, id: HandlerId) -> bool {
        let key = key.into();
        let mut map = self.lock();
        let Some(list) = map.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|reg| reg.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            map.remove(&key);
        }
        removed
    }

    /// Dispatch `args` to every handler registered under `key`, in
    /// registration order. `once` handlers are deregistered first, then
    /// invoked, so re-entrant subscription changes are safe.
    pub(crate) fn emit(&self, key: &K, args: &A) {
        let snapshot: Vec<BoxedHandler<A>> = {
            let mut map = self.lock();
            let Some(list) = map.get_mut(key) else {
                return;
            };
            let snapshot = list.iter().map(|reg| Arc::clone(&reg.handler)).collect();
            list.retain(|reg| !reg.once);
            if list.is_empty() {
                map.remove(key);
            }
            snapshot
        };
        for handler in snapshot {
            handler(args);
        }
    }

    fn register(&self, key: K, handler: BoxedHandler<A>, once: bool) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .entry(key)
            .or_default()
            .push(Registration { id, once, handler });
        id
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Vec<Registration<A>>>> {
        // A poisoned hub would only mean a handler panicked; keep serving.
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, A: ?Sized> std::fmt::Debug for EventHub<K, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    fn hub() -> EventHub<String, str> {
        EventHub::new()
    }

    fn recorder() -> (Arc<StdMutex<Vec<String>>>, impl Fn(&str) + Clone) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |arg: &str| sink.lock().unwrap().push(arg.into()))
    }

    #[test]
    fn on_delivers_every_dispatch() {
        let hub = hub();
        let (seen, record) = recorder();
        hub.on("tick", record);

        hub.emit(&"tick".to_string(), "a");
        hub.emit(&"tick".to_string(), "b");
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn once_delivers_at_most_once() {
        let hub = hub();
        let (seen, record) = recorder();
        hub.once("tick", record);

        hub.emit(&"tick".to_string(), "a");
        hub.emit(&"tick".to_string(), "b");
        assert_eq!(*seen.lock().unwrap(), vec!["a"]);
    }

    #[test]
    fn off_removes_exactly_the_identified_registration() {
        let hub = hub();
        let (seen_a, record_a) = recorder();
        let (seen_b, record_b) = recorder();
        let id_a = hub.on("tick", record_a);
        hub.on("tick", record_b);

        assert!(hub.off("tick", id_a));
        hub.emit(&"tick".to_string(), "x");

        assert!(seen_a.lock().unwrap().is_empty());
        assert_eq!(*seen_b.lock().unwrap(), vec!["x"]);
    }

    #[test]
    fn off_without_matching_registration_is_a_noop() {
        let hub = hub();
        let (_, record) = recorder();
        let id = hub.on("tick", record);

        assert!(!hub.off("other", id));
        assert!(hub.off("tick", id));
        assert!(!hub.off("tick", id));
    }

    #[test]
    fn dispatch_follows_registration_order() {
        let hub = hub();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let sink = Arc::clone(&seen);
            hub.on("tick", move |_: &str| sink.lock().unwrap().push(tag));
        }

        hub.emit(&"tick".to_string(), "");
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn emit_with_no_handlers_is_a_noop() {
        let hub = hub();
        hub.emit(&"silence".to_string(), "x");
    }

    #[test]
    fn handler_may_unsubscribe_another_during_dispatch() {
        // The snapshot taken at dispatch time still delivers to handlers
        // removed mid-dispatch; subsequent dispatches do not.
        let hub = Arc::new(hub());
        let (seen_b, record_b) = recorder();
        let id_b = hub.on("tick", record_b);

        let hub2 = Arc::clone(&hub);
        hub.on("tick", move |_: &str| {
            hub2.off("tick", id_b);
        });

        hub.emit(&"tick".to_string(), "one");
        hub.emit(&"tick".to_string(), "two");
        assert_eq!(*seen_b.lock().unwrap(), vec!["one"]);
    }

    #[test]
    fn handler_ids_are_unique_across_keys() {
        let hub = hub();
        let (_, record) = recorder();
        let a = hub.on("x", record.clone());
        let b = hub.on("y", record);
        assert_ne!(a, b);
    }
}
