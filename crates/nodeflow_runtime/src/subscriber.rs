// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph subscribers.
//!
//! A subscriber is told about every change matching its [`Subscription`]:
//! at least one fired event kind in its event set, and a participant in its
//! participant set.

use crate::event::{EventSet, GraphChange, GraphEvent, Participant};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned by a subscriber handler
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    /// Create an error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Observer of graph changes
pub trait GraphSubscriber: Send + Sync {
    /// Handle a change.
    ///
    /// Runs synchronously on the mutating thread after the graph lock is
    /// released. `change.graph` is a copy taken right after the mutation, so
    /// the subscriber may call back into the manager, including for the same
    /// graph.
    fn on_graph_changed(&self, change: &GraphChange<'_>) -> Result<(), SubscriberError>;
}

impl<F> GraphSubscriber for F
where
    F: Fn(&GraphChange<'_>) -> Result<(), SubscriberError> + Send + Sync,
{
    fn on_graph_changed(&self, change: &GraphChange<'_>) -> Result<(), SubscriberError> {
        self(change)
    }
}

/// Filter deciding which changes reach a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Event kinds of interest
    pub events: EventSet,
    /// Participants of interest
    pub participants: HashSet<Participant>,
}

impl Subscription {
    /// Listen to the given event kinds from any participant
    pub fn new(events: impl IntoIterator<Item = GraphEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            participants: Participant::all().iter().copied().collect(),
        }
    }

    /// Listen to every event kind from any participant
    pub fn all() -> Self {
        Self::new(GraphEvent::all().iter().copied())
    }

    /// Restrict to changes made by the given participants
    pub fn from_participants(mut self, participants: impl IntoIterator<Item = Participant>) -> Self {
        self.participants = participants.into_iter().collect();
        self
    }

    /// Whether a change with these events and participant matches
    pub fn matches(&self, events: &EventSet, participant: Participant) -> bool {
        self.participants.contains(&participant) && !self.events.is_disjoint(events)
    }
}

impl Default for Subscription {
    fn default() -> Self {
        Self::all()
    }
}
