//! Listener registry and event fanout for one device connection.

use std::sync::{Arc, Mutex};

use super::{RawTrackingEvent, RemoteTrackingEvent};

/// Consumer of adapted tracking events.
pub trait TrackingListener: Send + Sync {
    fn on_event(&self, event: &RemoteTrackingEvent);
}

/// Lock-guarded listener registry and dispatch point for one connection.
///
/// Mutations and dispatch snapshotting are mutually exclusive on a single
/// lock. Dispatch clones the listener list under the lock and releases it
/// before invoking anyone, so a slow listener delays neither registration
/// nor the transport thread's next record. Delivery order is registration
/// order.
#[derive(Default)]
pub struct DistributionHub {
    listeners: Mutex<Vec<Arc<dyn TrackingListener>>>,
}

impl DistributionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn TrackingListener>) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(listener);
    }

    /// Remove a previously added listener. Unknown listeners are ignored.
    pub fn remove_listener(&self, listener: &Arc<dyn TrackingListener>) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().expect("listener lock poisoned").len()
    }

    /// Deliver one raw transport record to all listeners.
    ///
    /// Invoked on the transport's own callback thread. The transport
    /// occasionally delivers spurious `None` records; those are discarded
    /// silently.
    pub fn dispatch(&self, raw: Option<RawTrackingEvent>) {
        let raw = match raw {
            Some(raw) => raw,
            None => return,
        };

        let event = RemoteTrackingEvent::new(raw);

        let snapshot: Vec<Arc<dyn TrackingListener>> = self
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .clone();

        for listener in snapshot {
            listener.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        seen: Mutex<Vec<f64>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl TrackingListener for Recorder {
        fn on_event(&self, event: &RemoteTrackingEvent) {
            if let Some(value) = event.value("alpha") {
                self.seen.lock().unwrap().push(value);
            }
        }
    }

    fn raw(alpha: f64) -> RawTrackingEvent {
        let mut channels = BTreeMap::new();
        channels.insert("alpha".to_string(), alpha);
        RawTrackingEvent { time: 1, channels }
    }

    #[test]
    fn dispatch_reaches_all_listeners_with_same_values() {
        let hub = DistributionHub::new();
        let first = Recorder::new();
        let second = Recorder::new();
        hub.add_listener(first.clone());
        hub.add_listener(second.clone());

        hub.dispatch(Some(raw(0.5)));

        assert_eq!(*first.seen.lock().unwrap(), vec![0.5]);
        assert_eq!(*second.seen.lock().unwrap(), vec![0.5]);
    }

    #[test]
    fn removed_listener_no_longer_receives() {
        let hub = DistributionHub::new();
        let first = Recorder::new();
        let second = Recorder::new();
        hub.add_listener(first.clone());
        hub.add_listener(second.clone());

        hub.dispatch(Some(raw(1.0)));
        let first_as_listener: Arc<dyn TrackingListener> = first.clone();
        hub.remove_listener(&first_as_listener);
        hub.dispatch(Some(raw(2.0)));

        assert_eq!(*first.seen.lock().unwrap(), vec![1.0]);
        assert_eq!(*second.seen.lock().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn null_records_are_discarded_silently() {
        let hub = DistributionHub::new();
        let listener = Recorder::new();
        hub.add_listener(listener.clone());

        hub.dispatch(None);

        assert!(listener.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn delivery_follows_registration_order() {
        struct Ordered {
            id: usize,
            order: Arc<Mutex<Vec<usize>>>,
        }

        impl TrackingListener for Ordered {
            fn on_event(&self, _event: &RemoteTrackingEvent) {
                self.order.lock().unwrap().push(self.id);
            }
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let hub = DistributionHub::new();
        for id in 0..4 {
            hub.add_listener(Arc::new(Ordered {
                id,
                order: order.clone(),
            }));
        }

        hub.dispatch(Some(raw(0.0)));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn listener_may_register_another_during_dispatch() {
        // The dispatch snapshot is taken before listeners run, so mutating
        // the registry from inside a listener must not deadlock.
        struct SelfAdding {
            hub: Arc<DistributionHub>,
            added: AtomicUsize,
        }

        impl TrackingListener for SelfAdding {
            fn on_event(&self, _event: &RemoteTrackingEvent) {
                if self.added.fetch_add(1, Ordering::SeqCst) == 0 {
                    self.hub.add_listener(Recorder::new());
                }
            }
        }

        let hub = Arc::new(DistributionHub::new());
        hub.add_listener(Arc::new(SelfAdding {
            hub: hub.clone(),
            added: AtomicUsize::new(0),
        }));

        hub.dispatch(Some(raw(0.0)));
        assert_eq!(hub.listener_count(), 2);
    }
}
