//! Listener registry and dispatch (C4).
//!
//! A mapping from identity-keyed [`ListenerEntry`] to callback, guarded by a
//! plain `std::sync::Mutex`. Listeners are persistent: a match never
//! auto-removes its entry (Design Note / §3 "Listener persistence") — callers
//! get a [`CancelHandle`] back from [`ListenerRegistry::add_listen`] and are
//! responsible for invoking it. Transaction code (`broker::transaction`)
//! layers a deferred cancel on top to get "first match only" semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::frame::{Frame, Identity};

type Callback = Arc<dyn Fn(Frame) + Send + Sync>;

/// `(identity, unique_sequence)` — the key disambiguating multiple listeners
/// registered against the same identity so any one of them can be cancelled
/// independently of the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ListenerEntry {
    identity: Identity,
    sequence: u64,
}

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<ListenerEntry, Callback>>,
    sequence: AtomicU64,
}

/// Shared listener table plus the monotonic sequence counter used to mint
/// [`ListenerEntry`] keys.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Inner>,
}

/// Removes exactly the listener entry it was returned for. Safe to invoke
/// zero, one, or many times (P7) — subsequent invocations are no-ops because
/// `HashMap::remove` on an absent key simply returns `None`.
#[derive(Clone)]
pub struct CancelHandle {
    registry: ListenerRegistry,
    entry: ListenerEntry,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.registry.inner.entries.lock().unwrap().remove(&self.entry);
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` against `identity`. Returns a handle whose
    /// [`CancelHandle::cancel`] removes this specific registration, leaving
    /// any other listener registered for the same identity untouched.
    pub fn add_listen<F>(&self, identity: Identity, callback: F) -> CancelHandle
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let entry = ListenerEntry { identity, sequence };
        self.inner.entries.lock().unwrap().insert(entry, Arc::new(callback));
        CancelHandle { registry: self.clone(), entry }
    }

    /// Dispatch `frame` to every listener whose identity exactly matches.
    ///
    /// The registry lock is held only long enough to collect matching
    /// callbacks; each is then invoked from its own spawned task, so a slow
    /// or blocking callback can never stall the receive pump or delay
    /// sibling listeners (§4.4). Frames with no matching listener are
    /// silently dropped (logged at debug) — the "unmatched inbound" policy.
    pub fn dispatch(&self, frame: Frame) {
        let identity = frame.identity();
        let matches: Vec<Callback> = {
            let entries = self.inner.entries.lock().unwrap();
            entries
                .iter()
                .filter(|(entry, _)| entry.identity == identity)
                .map(|(_, callback)| callback.clone())
                .collect()
        };

        if matches.is_empty() {
            log::debug!("unmatched inbound frame, dropping: {identity:?}");
            return;
        }

        for callback in matches {
            let frame = frame.clone();
            tokio::spawn(async move {
                callback(frame);
            });
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.inner.entries.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{MessageType, Subsystem};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn id(cmd: u8) -> Identity {
        Identity::new(MessageType::SREQ, Subsystem::SYS, cmd)
    }

    /// P4: N listeners on the same identity all fire exactly once per frame.
    #[tokio::test]
    async fn fan_out_to_all_listeners_on_identity() {
        let registry = ListenerRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let counter = counter.clone();
            handles.push(registry.add_listen(id(0x02), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        registry.dispatch(Frame::new(MessageType::SREQ, Subsystem::SYS, 0x02, vec![]));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        drop(handles);
    }

    /// P5: a listener on a different identity must not fire.
    #[tokio::test]
    async fn selectivity_ignores_non_matching_identity() {
        let registry = ListenerRegistry::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();
        let _handle = registry.add_listen(id(0x02), move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(Frame::new(MessageType::SREQ, Subsystem::SYS, 0x03, vec![]));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    /// P7: cancel is idempotent.
    #[tokio::test]
    async fn cancel_is_idempotent() {
        let registry = ListenerRegistry::new();
        let handle = registry.add_listen(id(0x01), |_| {});
        assert_eq!(registry.listener_count(), 1);

        handle.cancel();
        handle.cancel();
        handle.cancel();

        assert_eq!(registry.listener_count(), 0);
    }

    #[tokio::test]
    async fn persistent_listener_survives_multiple_matches() {
        let registry = ListenerRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let _handle = registry.add_listen(id(0x05), move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        for _ in 0..3 {
            registry.dispatch(Frame::new(MessageType::SREQ, Subsystem::SYS, 0x05, vec![]));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelling_one_listener_leaves_siblings_intact() {
        let registry = ListenerRegistry::new();
        let a_count = Arc::new(AtomicUsize::new(0));
        let b_count = Arc::new(AtomicUsize::new(0));

        let a_clone = a_count.clone();
        let handle_a = registry.add_listen(id(0x09), move |_| {
            a_clone.fetch_add(1, Ordering::SeqCst);
        });
        let b_clone = b_count.clone();
        let _handle_b = registry.add_listen(id(0x09), move |_| {
            b_clone.fetch_add(1, Ordering::SeqCst);
        });

        handle_a.cancel();
        registry.dispatch(Frame::new(MessageType::SREQ, Subsystem::SYS, 0x09, vec![]));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(a_count.load(Ordering::SeqCst), 0);
        assert_eq!(b_count.load(Ordering::SeqCst), 1);
    }
}
