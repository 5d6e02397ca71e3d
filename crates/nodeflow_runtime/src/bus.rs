// SPDX-License-Identifier: MIT OR Apache-2.0
//! Event bus dispatching graph changes to subscribers.
//!
//! Subscribers are kept per scope in registration order. Dispatch takes a
//! snapshot of the matching handlers under the read lock and invokes them
//! after releasing it, so a subscriber registered during a dispatch is only
//! seen by later dispatches. Every registration change bumps the generation
//! counter recorded in the snapshot.

use crate::event::{EventSet, GraphChange, Participant, SubscriberScope};
use crate::subscriber::{GraphSubscriber, SubscriberId, Subscription};
use nodeflow_graph::GraphId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
struct Registration {
    id: SubscriberId,
    subscription: Subscription,
    subscriber: Arc<dyn GraphSubscriber>,
}

#[derive(Default)]
struct BusState {
    scopes: HashMap<SubscriberScope, Vec<Registration>>,
    generation: u64,
}

/// Handlers matching one change, captured at a given generation
pub struct DispatchSnapshot {
    /// Generation of the subscriber table when the snapshot was taken
    pub generation: u64,
    subscribers: Vec<(SubscriberId, Arc<dyn GraphSubscriber>)>,
}

impl DispatchSnapshot {
    /// Number of subscribers in the snapshot
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether the snapshot is empty
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

/// Outcome of a dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Subscribers that handled the change
    pub delivered: usize,
    /// Subscribers that returned an error
    pub failed: usize,
}

/// Ordered, scope-keyed subscriber table
#[derive(Default)]
pub struct EventBus {
    state: RwLock<BusState>,
}

impl EventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; it stays until [`EventBus::unsubscribe`] is called
    pub fn subscribe(
        &self,
        scope: SubscriberScope,
        subscription: Subscription,
        subscriber: Arc<dyn GraphSubscriber>,
    ) -> SubscriberId {
        let id = SubscriberId::new();
        let mut state = self.state.write();
        state.scopes.entry(scope).or_default().push(Registration {
            id,
            subscription,
            subscriber,
        });
        state.generation += 1;
        tracing::debug!("Registered subscriber {:?} on {:?}", id, scope);
        id
    }

    /// Remove a subscriber, returning whether it was registered
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut state = self.state.write();
        let mut removed = false;
        for registrations in state.scopes.values_mut() {
            let before = registrations.len();
            registrations.retain(|r| r.id != id);
            removed |= registrations.len() != before;
        }
        state.scopes.retain(|_, registrations| !registrations.is_empty());
        if removed {
            state.generation += 1;
            tracing::debug!("Unregistered subscriber {:?}", id);
        }
        removed
    }

    /// Current generation of the subscriber table
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Total number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.state.read().scopes.values().map(Vec::len).sum()
    }

    /// Snapshot the subscribers matching a change: graph-scoped ones first,
    /// then the ones listening to every graph, each in registration order
    pub fn matching(
        &self,
        graph_id: GraphId,
        events: &EventSet,
        participant: Participant,
    ) -> DispatchSnapshot {
        let state = self.state.read();
        let subscribers = [SubscriberScope::Graph(graph_id), SubscriberScope::All]
            .iter()
            .filter_map(|scope| state.scopes.get(scope))
            .flatten()
            .filter(|r| r.subscription.matches(events, participant))
            .map(|r| (r.id, Arc::clone(&r.subscriber)))
            .collect();

        DispatchSnapshot {
            generation: state.generation,
            subscribers,
        }
    }

    /// Deliver a change to every matching subscriber.
    ///
    /// A subscriber returning an error is logged and skipped; the remaining
    /// subscribers are still notified.
    pub fn publish(&self, change: &GraphChange<'_>) -> DispatchSummary {
        let snapshot = self.matching(change.graph_id, change.events, change.participant);
        self.deliver(snapshot, change)
    }

    /// Deliver a change to the subscribers captured by [`EventBus::matching`].
    ///
    /// Subscribers are the ones registered when the snapshot was taken.
    pub fn deliver(&self, snapshot: DispatchSnapshot, change: &GraphChange<'_>) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        for (id, subscriber) in snapshot.subscribers {
            match subscriber.on_graph_changed(change) {
                Ok(()) => summary.delivered += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(
                        "Subscriber {:?} failed handling change to graph {}: {}",
                        id,
                        change.graph_id,
                        e
                    );
                }
            }
        }
        summary
    }
}
