//! Event Router - demultiplexes inbound events
//!
//! Routing key is `(method, session)`:
//! - raw listeners see every envelope first
//! - `(method, None)` listeners see the method from every session
//! - `(method, Some(id))` listeners see only that session's traffic
//!
//! Listeners are cloned out of the map before being called, so a listener may
//! subscribe or unsubscribe from inside its own callback.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

use super::protocol::{EventMessage, SessionId};
use crate::error::{Error, Result};

/// Event listener, receives the event params
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Raw listener, receives the whole envelope
pub type RawListener = Arc<dyn Fn(&EventMessage) + Send + Sync>;

pub type SubscriptionId = u64;

type RouteKey = (String, Option<SessionId>);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Route {
    Raw,
    Event(RouteKey),
}

/// Handle returned by every subscribe call
#[derive(Debug)]
pub struct Subscription {
    router: Weak<EventRouter>,
    route: Route,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove exactly this registration. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.router.upgrade() {
            Some(router) => router.remove(&self.route, self.id),
            None => false,
        }
    }
}

#[derive(Default)]
pub struct EventRouter {
    next_id: AtomicU64,
    raw: DashMap<SubscriptionId, RawListener>,
    listeners: DashMap<RouteKey, Vec<(SubscriptionId, Listener)>>,
    /// Registration owned by the "set the handler" form, per key
    handlers: DashMap<RouteKey, SubscriptionId>,
    waiters: DashMap<RouteKey, Vec<oneshot::Sender<Value>>>,
    closed: AtomicBool,
}

impl EventRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(&self) -> SubscriptionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Listen to every event envelope
    pub fn subscribe_raw(self: &Arc<Self>, listener: RawListener) -> Subscription {
        let id = self.next_id();
        self.raw.insert(id, listener);
        Subscription {
            router: Arc::downgrade(self),
            route: Route::Raw,
            id,
        }
    }

    /// Additive subscription on `(method, session)`
    pub fn subscribe(
        self: &Arc<Self>,
        method: impl Into<String>,
        session_id: Option<SessionId>,
        listener: Listener,
    ) -> Subscription {
        let key = (method.into(), session_id);
        let id = self.next_id();
        self.listeners
            .entry(key.clone())
            .or_default()
            .push((id, listener));
        Subscription {
            router: Arc::downgrade(self),
            route: Route::Event(key),
            id,
        }
    }

    /// Replace the handler previously set through this method for the same
    /// `(method, session)`. Additive subscriptions are left alone.
    pub fn set_handler(
        self: &Arc<Self>,
        method: impl Into<String>,
        session_id: Option<SessionId>,
        listener: Listener,
    ) -> Subscription {
        let key: RouteKey = (method.into(), session_id);
        let subscription = self.subscribe(key.0.clone(), key.1.clone(), listener);
        if let Some(previous) = self.handlers.insert(key.clone(), subscription.id) {
            self.remove_listener(&key, previous);
        }
        subscription
    }

    /// Wait for the next `(method, session)` event
    ///
    /// Fails with `Disconnected` when the router is (or becomes) closed before
    /// a matching event arrives.
    pub async fn once(&self, method: impl Into<String>, session_id: Option<SessionId>) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters
            .entry((method.into(), session_id))
            .or_default()
            .push(tx);
        // close() may have drained the waiters before our insert landed
        if self.is_closed() {
            self.waiters.clear();
        }
        rx.await.map_err(|_| Error::Disconnected)
    }

    /// Deliver one event, in the documented order
    pub fn dispatch(&self, event: &EventMessage) {
        let raw: Vec<RawListener> = self.raw.iter().map(|e| e.value().clone()).collect();
        for listener in raw {
            listener(event);
        }

        let global = (event.method.clone(), None);
        self.emit(&global, &event.params);

        if let Some(session_id) = &event.session_id {
            let scoped = (event.method.clone(), Some(session_id.clone()));
            self.emit(&scoped, &event.params);
        }
    }

    fn emit(&self, key: &RouteKey, params: &Value) {
        let listeners: Vec<Listener> = match self.listeners.get(key) {
            Some(entry) => entry.value().iter().map(|(_, l)| l.clone()).collect(),
            None => Vec::new(),
        };
        for listener in listeners {
            listener(params);
        }

        if let Some((_, waiters)) = self.waiters.remove(key) {
            for tx in waiters {
                let _ = tx.send(params.clone());
            }
        }
    }

    fn remove(&self, route: &Route, id: SubscriptionId) -> bool {
        match route {
            Route::Raw => self.raw.remove(&id).is_some(),
            Route::Event(key) => {
                self.handlers.remove_if(key, |_, current| *current == id);
                self.remove_listener(key, id)
            }
        }
    }

    fn remove_listener(&self, key: &RouteKey, id: SubscriptionId) -> bool {
        let mut removed = false;
        if let Some(mut entry) = self.listeners.get_mut(key) {
            let before = entry.len();
            entry.retain(|(existing, _)| *existing != id);
            removed = entry.len() != before;
        }
        self.listeners.remove_if(key, |_, list| list.is_empty());
        removed
    }

    /// Number of listeners on exactly `(method, session)`
    pub fn listener_count(&self, method: &str, session_id: Option<&str>) -> usize {
        let key = (method.to_string(), session_id.map(str::to_string));
        self.listeners.get(&key).map(|l| l.len()).unwrap_or(0)
    }

    /// Drop every listener (raw and keyed). Pending `once` waiters stay.
    pub fn remove_all_listeners(&self) {
        self.raw.clear();
        self.listeners.clear();
        self.handlers.clear();
    }

    /// Fail every pending `once` and refuse new ones
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.waiters.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
