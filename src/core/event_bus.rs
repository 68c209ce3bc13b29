//! Pub/sub bus carrying player notifications to UI/timeline collaborators.
//!
//! - `subscribe::<E>()` registers a callback invoked synchronously on `emit()`
//! - every emitted event is also queued; `poll()` / `take::<E>()` drain it
//!
//! Callbacks run on the emitting task with no bus lock held, so a callback
//! may subscribe or unsubscribe. Callbacks must not block: the controller
//! emits from inside its seek and sync continuations.
//!
//! Callback order: FIFO within one event type. No ordering across types.

use log::warn;
use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Queue length at which the oldest half is evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Implemented for every `Send + Sync + 'static` type.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Boxed event as stored in the deferred queue
pub type BoxedEvent = Box<dyn Event>;

/// Handle returned by `subscribe`, used to remove one callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct BusShared {
    subscribers: RwLock<HashMap<TypeId, Vec<(SubscriptionId, Callback)>>>,
    queue: Mutex<VecDeque<BoxedEvent>>,
    next_id: AtomicU64,
}

impl BusShared {
    fn emit<E: Event>(&self, event: E) {
        let type_id = TypeId::of::<E>();

        // Snapshot callbacks so none run under the lock
        let callbacks: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&type_id)
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        for cb in callbacks {
            cb(&event);
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict_count = queue.len() / 2;
            warn!("EventBus queue full ({} events), evicting oldest {}", queue.len(), evict_count);
            queue.drain(0..evict_count);
        }
        queue.push_back(Box::new(event));
    }
}

/// Player notification bus. Cheap to clone; clones share subscribers and queue.
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<BusShared>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_types", &self.shared.subscribers.read().map(|s| s.len()).unwrap_or(0))
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(BusShared {
                subscribers: RwLock::new(HashMap::new()),
                queue: Mutex::new(VecDeque::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to events of type E.
    ///
    /// ```ignore
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let sink = Arc::clone(&seen);
    /// bus.subscribe::<SeekedEvent, _>(move |e| sink.lock().unwrap().push(e.clone()));
    /// ```
    pub fn subscribe<E, F>(&self, callback: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, wrapped));
        id
    }

    /// Remove a single callback. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.shared.subscribers.write().unwrap_or_else(|e| e.into_inner());
        for subs in subscribers.values_mut() {
            if let Some(pos) = subs.iter().position(|(sid, _)| *sid == id) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }

    /// Clear subscribers for type E
    pub fn unsubscribe_all<E: Event>(&self) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    /// Invoke callbacks for `event` and queue it
    pub fn emit<E: Event>(&self, event: E) {
        self.shared.emit(event);
    }

    /// Drain every queued event
    pub fn poll(&self) -> Vec<BoxedEvent> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }

    /// Drain queued events of type E, leaving other types queued
    pub fn take<E: Event + Clone>(&self) -> Vec<E> {
        let mut queue = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        let mut taken = Vec::new();
        queue.retain(|event| match downcast_event::<E>(event) {
            Some(e) => {
                taken.push(e.clone());
                false
            }
            None => true,
        });
        taken
    }

    /// Emit-only handle for components that should not subscribe
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.shared
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .is_some_and(|v| !v.is_empty())
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Emit-only handle, held by the state machine and the controller tasks
#[derive(Clone)]
pub struct EventEmitter {
    shared: Arc<BusShared>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

impl EventEmitter {
    pub fn emit<E: Event>(&self, event: E) {
        self.shared.emit(event);
    }
}

/// Downcast a queued event to its concrete type.
///
/// Derefs to `dyn Event` first: `Box<dyn Event>` itself satisfies the blanket
/// impl, and calling `as_any()` on the box would yield the box, not the event.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}
