//! Core business logic: the reducer-driven state store, the optimistic
//! mutation pipeline on top of it, and report generation over the current
//! collections.

pub mod mutations;
pub mod report;
pub mod state;
