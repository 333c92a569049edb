//! Engine events and the hook system that delivers them.
//!
//! The APIs in [`crate::court_api`] publish an event after every committed state change. Hooks registered through
//! [`EventHooks`] run on their own tasks, so a slow or failing hook can never hold up or roll back the change that
//! triggered it. The [`crate::NotificationRouter`] is installed as a pair of such hooks.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::{OrderEvent, OrderEventKind, SettlementEvent};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
