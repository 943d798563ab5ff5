//! Application-level orchestration.
//!
//! The controller owns one session (state, mediator, in-flight requests) and is
//! driven by UI commands; presentation layers only see the events it emits.

mod controller;

pub(crate) use controller::{run_controller, UiCommand};
