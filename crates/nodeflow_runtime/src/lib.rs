// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph runtime for Nodeflow.
//!
//! Owns open graphs, turns every mutation into change events, and keeps
//! output nodes up to date by interpreting changed graphs in the background.
//!
//! ## Architecture
//!
//! - [`GraphManager`]: graph lifecycle, mutations and change notification
//! - [`EventBus`]: ordered subscriber table keyed by graph or by all graphs
//! - [`InterpretationScheduler`]: one interpretation in flight per graph,
//!   with requests arriving meanwhile coalesced into a rerun
//! - [`OutputDispatcher`]: routes sink values to consumers by output ID

pub mod bus;
pub mod event;
pub mod manager;
pub mod output;
pub mod response;
pub mod runtime;
pub mod scheduler;
pub mod subscriber;

pub use bus::{DispatchSnapshot, DispatchSummary, EventBus};
pub use event::{EventSet, GraphChange, GraphEvent, Participant, SubscriberScope};
pub use manager::{GraphManager, ManagerError};
pub use output::{MediaOutput, OutputCleared, OutputDispatcher, OutputIdsListener, OutputSink};
pub use response::QueryResponse;
pub use runtime::{GraphRuntime, RuntimeOptions};
pub use scheduler::{InterpretationScheduler, InterpretationSubscriber, RequestOutcome};
pub use subscriber::{GraphSubscriber, SubscriberError, SubscriberId, Subscription};
