//! # System Module
//!
//! The search state machine.
//!
//! Transitions are pure and deterministic. The app drives them from the
//! results of remote calls; nothing here performs I/O.

mod state;

pub use state::*;
