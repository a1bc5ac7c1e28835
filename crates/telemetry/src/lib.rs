#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Telemetry
//!
//! Typed run events and the broadcast bus that distributes them.
//!
//! The coordinator emits a [`RunEvent`] at every externally observable
//! moment of a run, plus fine-grained [`TraceEvent`]s at planner decision
//! points. Events are **projections**, not the source of truth -- the token
//! store and context store are; dropping events is acceptable.

pub mod event;
pub mod trace;

pub use event::{EventBus, EventSubscriber, RunEvent};
pub use trace::TraceEvent;
