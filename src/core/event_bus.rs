//! Named-channel Pub/Sub Event Bus for decoupled component communication.
//!
//! Architecture:
//! - Components subscribe to a channel name with an origin tag and a typed callback
//! - publish() invokes every binding of the channel synchronously, in subscription order
//! - Publishing into a channel nobody ever subscribed to is an error, not a no-op
//!
//! The bus is an explicit context object: create it at startup, clone the handle
//! into every component, call `clear()` at shutdown. There is no global registry.
//!
//! Reentrancy: callbacks may publish further events. Dispatch is depth-first (a
//! nested publish finishes its whole subscriber list before the outer one resumes)
//! and bounded by `max_depth`. The registry lock is never held while callbacks run,
//! so callbacks may also subscribe or unsubscribe; such changes apply to the next
//! publish, not the one in flight.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use log::{debug, error, trace, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default bound on nested publishes. Real flows nest 2-3 levels.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Marker trait for payloads. Payloads must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

// Blanket impl for all qualifying types
impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Type-erased callback
type Callback = Arc<dyn Fn(&dyn Any) -> Result<()> + Send + Sync>;

/// Revocable handle returned by `subscribe()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

struct Binding {
    id: SubscriptionId,
    origin: String,
    callback: Callback,
}

struct Registry {
    // Channel stays registered after its last binding is removed.
    channels: RwLock<IndexMap<String, Vec<Binding>>>,
    depth: AtomicUsize,
    max_depth: usize,
}

/// Decrements the dispatch depth when a publish unwinds.
struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Named-channel Pub/Sub bus.
///
/// Cloning yields another handle onto the same registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Registry>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channels", &self.channels())
            .field("depth", &self.depth())
            .field("max_depth", &self.inner.max_depth)
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Bus allowing at most `max_depth` nested publishes (minimum 1).
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            inner: Arc::new(Registry {
                channels: RwLock::new(IndexMap::new()),
                depth: AtomicUsize::new(0),
                max_depth: max_depth.max(1),
            }),
        }
    }

    // ========== Pub/Sub ==========

    /// Subscribe `callback` to `channel` on behalf of `origin`.
    ///
    /// The callback receives payloads of type E. A payload of another type
    /// published on the same channel is skipped with a warning.
    /// Subscribing the same origin twice is allowed; both bindings fire.
    ///
    /// # Example
    /// ```ignore
    /// let hits = Arc::new(AtomicI32::new(0));
    /// let h = Arc::clone(&hits);
    /// bus.subscribe::<SegmentLoaded, _>(SEGMENT_LOADED, "status", move |e| {
    ///     h.fetch_add(e.to - e.from + 1, Ordering::SeqCst);
    ///     Ok(())
    /// });
    /// ```
    pub fn subscribe<E, F>(&self, channel: &str, origin: &str, callback: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) -> Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        let channel_name = channel.to_string();
        let wrapped: Callback = Arc::new(move |any: &dyn Any| match any.downcast_ref::<E>() {
            Some(event) => callback(event),
            None => {
                warn!(
                    "Channel '{}': payload is not {}, binding skipped",
                    channel_name,
                    std::any::type_name::<E>()
                );
                Ok(())
            }
        });

        self.inner
            .channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(channel.to_string())
            .or_default()
            .push(Binding {
                id,
                origin: origin.to_string(),
                callback: wrapped,
            });
        debug!("'{}' subscribed to '{}'", origin, channel);
        id
    }

    /// Publish `payload` on `channel`.
    ///
    /// Every binding runs before this returns. The first failing callback
    /// aborts the rest of the list and its error is returned.
    pub fn publish<E: Event>(&self, channel: &str, payload: &E) -> Result<()> {
        let callbacks: Vec<Callback> = {
            let channels = self.inner.channels.read().unwrap_or_else(|e| e.into_inner());
            match channels.get(channel) {
                Some(bindings) => bindings.iter().map(|b| Arc::clone(&b.callback)).collect(),
                None => {
                    error!("Publish into unregistered channel '{}'", channel);
                    return Err(Error::ChannelNotRegistered {
                        channel: channel.to_string(),
                    });
                }
            }
        };

        let depth = self.inner.depth.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = DepthGuard(&self.inner.depth);
        if depth > self.inner.max_depth {
            error!(
                "Dispatch depth {} exceeds limit {} on '{}'",
                depth, self.inner.max_depth, channel
            );
            return Err(Error::DispatchDepthExceeded {
                channel: channel.to_string(),
                depth,
            });
        }

        trace!(
            "Publish '{}' ({}) to {} binding(s) at depth {}",
            channel,
            payload.type_name(),
            callbacks.len(),
            depth
        );
        for cb in &callbacks {
            cb(payload.as_any())?;
        }
        Ok(())
    }

    // ========== Removal & Lifecycle ==========

    /// Revoke one binding. Returns false if the handle was already revoked.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut channels = self.inner.channels.write().unwrap_or_else(|e| e.into_inner());
        for bindings in channels.values_mut() {
            if let Some(pos) = bindings.iter().position(|b| b.id == id) {
                bindings.remove(pos);
                return true;
            }
        }
        false
    }

    /// Revoke every binding made by `origin`. Returns how many were removed.
    pub fn unsubscribe_origin(&self, origin: &str) -> usize {
        let mut channels = self.inner.channels.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        for bindings in channels.values_mut() {
            let before = bindings.len();
            bindings.retain(|b| b.origin != origin);
            removed += before - bindings.len();
        }
        removed
    }

    /// Tear down: drop every binding and forget every channel.
    pub fn clear(&self) {
        self.inner
            .channels
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    // ========== Diagnostics ==========

    /// True once anyone has subscribed to `channel` (until `clear()`).
    pub fn is_registered(&self, channel: &str) -> bool {
        self.inner
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(channel)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(channel)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Origins bound to `channel`, in dispatch order.
    pub fn origins(&self, channel: &str) -> Vec<String> {
        self.inner
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(channel)
            .map(|v| v.iter().map(|b| b.origin.clone()).collect())
            .unwrap_or_default()
    }

    /// Registered channel names, in first-registration order.
    pub fn channels(&self) -> Vec<String> {
        self.inner
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Current nesting depth (0 outside any publish).
    pub fn depth(&self) -> usize {
        self.inner.depth.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicI32;

    #[derive(Clone, Debug)]
    struct TestEvent {
        value: i32,
    }

    #[derive(Clone, Debug)]
    struct OtherEvent;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_fan_out_in_subscription_order() {
        let bus = EventBus::new();
        let log = recorder();
        for origin in ["a", "b", "c"] {
            let l = Arc::clone(&log);
            bus.subscribe::<TestEvent, _>("tick", origin, move |e| {
                l.lock().unwrap().push(format!("{origin}:{}", e.value));
                Ok(())
            });
        }

        bus.publish("tick", &TestEvent { value: 7 }).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["a:7", "b:7", "c:7"]);
        assert_eq!(bus.origins("tick"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unregistered_channel_is_error() {
        let bus = EventBus::new();
        let err = bus.publish("nobody", &TestEvent { value: 1 }).unwrap_err();
        assert_eq!(
            err,
            Error::ChannelNotRegistered {
                channel: "nobody".into()
            }
        );
    }

    #[test]
    fn test_duplicate_subscriptions_both_fire() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        for _ in 0..2 {
            let c = Arc::clone(&counter);
            bus.subscribe::<TestEvent, _>("tick", "same", move |e| {
                c.fetch_add(e.value, Ordering::SeqCst);
                Ok(())
            });
        }
        bus.publish("tick", &TestEvent { value: 5 }).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_unsubscribe_keeps_channel_registered() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        let id = bus.subscribe::<TestEvent, _>("tick", "w", move |e| {
            c.fetch_add(e.value, Ordering::SeqCst);
            Ok(())
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        // Still a known channel, just nobody listening
        bus.publish("tick", &TestEvent { value: 3 }).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count("tick"), 0);
    }

    #[test]
    fn test_unsubscribe_origin() {
        let bus = EventBus::new();
        bus.subscribe::<TestEvent, _>("a", "w1", |_| Ok(()));
        bus.subscribe::<TestEvent, _>("b", "w1", |_| Ok(()));
        bus.subscribe::<TestEvent, _>("b", "w2", |_| Ok(()));
        assert_eq!(bus.unsubscribe_origin("w1"), 2);
        assert_eq!(bus.origins("b"), vec!["w2"]);
    }

    #[test]
    fn test_nested_publish_is_depth_first() {
        let bus = EventBus::new();
        let log = recorder();

        let l = Arc::clone(&log);
        let inner_bus = bus.clone();
        bus.subscribe::<TestEvent, _>("outer", "first", move |_| {
            l.lock().unwrap().push("outer:first".into());
            inner_bus.publish("inner", &OtherEvent)
        });
        let l = Arc::clone(&log);
        bus.subscribe::<TestEvent, _>("outer", "second", move |_| {
            l.lock().unwrap().push("outer:second".into());
            Ok(())
        });
        let l = Arc::clone(&log);
        bus.subscribe::<OtherEvent, _>("inner", "nested", move |_| {
            l.lock().unwrap().push("inner".into());
            Ok(())
        });

        bus.publish("outer", &TestEvent { value: 0 }).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["outer:first", "inner", "outer:second"]);
        assert_eq!(bus.depth(), 0);
    }

    #[test]
    fn test_runaway_recursion_is_bounded() {
        let bus = EventBus::with_max_depth(3);
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        let again = bus.clone();
        bus.subscribe::<TestEvent, _>("loop", "self", move |e| {
            c.fetch_add(1, Ordering::SeqCst);
            again.publish("loop", e)
        });

        let err = bus.publish("loop", &TestEvent { value: 0 }).unwrap_err();
        assert!(matches!(err, Error::DispatchDepthExceeded { depth: 4, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(bus.depth(), 0);
    }

    #[test]
    fn test_failing_callback_stops_dispatch() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        bus.subscribe::<TestEvent, _>("tick", "bad", |_| Err(Error::BoundsUnset));
        let c = Arc::clone(&counter);
        bus.subscribe::<TestEvent, _>("tick", "late", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(bus.publish("tick", &TestEvent { value: 1 }), Err(Error::BoundsUnset));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_payload_type_mismatch_skipped() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe::<TestEvent, _>("tick", "w", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.publish("tick", &OtherEvent).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_subscribe_during_dispatch_applies_next_time() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        let b = bus.clone();
        bus.subscribe::<TestEvent, _>("tick", "spawner", move |_| {
            let c = Arc::clone(&c);
            b.subscribe::<TestEvent, _>("tick", "spawned", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });

        bus.publish("tick", &TestEvent { value: 0 }).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        bus.publish("tick", &TestEvent { value: 0 }).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clear_forgets_channels() {
        let bus = EventBus::new();
        bus.subscribe::<TestEvent, _>("tick", "w", |_| Ok(()));
        assert!(bus.is_registered("tick"));
        bus.clear();
        assert!(!bus.is_registered("tick"));
        assert!(bus.publish("tick", &TestEvent { value: 0 }).is_err());
    }
}
