//! Typed event bus with per-kind and wildcard subscriptions.
//!
//! Each engine component owns its own bus; orchestrators aggregate child
//! events onto their own via wildcard forwarders. Emission is synchronous
//! and fire-and-forget: listeners are invoked inline, in registration
//! order per key, with no delivery guarantee across listeners registered
//! concurrently with an emission.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use vaultgit_types::{SyncEvent, SyncEventKind};

type Listener = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct BusState {
    next_id: u64,
    by_kind: HashMap<SyncEventKind, Vec<(u64, Listener)>>,
    wildcard: Vec<(u64, Listener)>,
}

/// Fire-and-forget broadcast of [`SyncEvent`]s.
pub struct EventBus {
    state: StdMutex<BusState>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: StdMutex::new(BusState {
                next_id: 0,
                by_kind: HashMap::new(),
                wildcard: Vec::new(),
            }),
        })
    }

    /// Subscribes a listener to one event kind.
    pub fn subscribe<F>(&self, kind: SyncEventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut state = self.lock_state();
        let id = state.next_id;
        state.next_id += 1;
        state
            .by_kind
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        SubscriptionId(id)
    }

    /// Subscribes a listener to every event.
    pub fn subscribe_all<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut state = self.lock_state();
        let id = state.next_id;
        state.next_id += 1;
        state.wildcard.push((id, Arc::new(listener)));
        SubscriptionId(id)
    }

    /// Removes a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.lock_state();
        for listeners in state.by_kind.values_mut() {
            listeners.retain(|(lid, _)| *lid != id.0);
        }
        state.wildcard.retain(|(lid, _)| *lid != id.0);
    }

    /// Broadcasts an event to kind-scoped listeners, then wildcards.
    ///
    /// Listeners run outside the bus lock so they may re-subscribe or emit.
    pub fn emit(&self, event: SyncEvent) {
        let listeners: Vec<Listener> = {
            let state = self.lock_state();
            let mut out = Vec::new();
            if let Some(scoped) = state.by_kind.get(&event.kind()) {
                out.extend(scoped.iter().map(|(_, l)| Arc::clone(l)));
            }
            out.extend(state.wildcard.iter().map(|(_, l)| Arc::clone(l)));
            out
        };

        for listener in listeners {
            listener(&event);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
