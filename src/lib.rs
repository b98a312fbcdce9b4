//! `spendo-core` - client-side state sync and offline-tolerant cache for a
//! personal-finance app
//!
//! This crate is the layer between a finance UI and its remote document
//! store: a reducer-driven state container with derived aggregates, an
//! optimistic mutation pipeline with temporary-to-server id reconciliation,
//! live full-snapshot subscriptions, a persistent per-user collection cache
//! for instant first paint, and a session binder that wires all of it to the
//! authenticated identity.

// Deny the most critical lints that could lead to bugs or security issues
#![deny(
    // Security and correctness
    unsafe_code,
    unsafe_op_in_unsafe_fn,

    // Code quality - things that are almost always bugs
    unreachable_code,
    unreachable_patterns,
    unused_must_use,

    // Documentation - broken links are bugs
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
)]
// Warn on things that should be fixed but aren't necessarily bugs
#![warn(
    // Documentation - missing docs should be added gradually
    missing_docs,

    // Clippy categories for overall code quality
    clippy::all,
    clippy::pedantic,
    clippy::nursery,

    // Performance
    clippy::inefficient_to_string,
    clippy::large_types_passed_by_value,
    clippy::needless_pass_by_value,
    clippy::unnecessary_wraps,

    // Correctness
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::exit,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,

    // Complexity and readability
    clippy::cognitive_complexity,
    clippy::large_enum_variant,
    clippy::match_same_arms,
    clippy::too_many_lines,

    // Style consistency
    clippy::enum_glob_use,
    clippy::inconsistent_struct_constructor,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::redundant_closure_for_method_calls,
    clippy::semicolon_if_nothing_returned,
    clippy::wildcard_imports,

    // Future compatibility
    future_incompatible,
    rust_2018_idioms,
)]
// Allow some pedantic lints that are too noisy or not applicable
#![allow(
    clippy::module_name_repetitions,  // Common pattern in Rust
    clippy::missing_errors_doc,        // Will add gradually
    clippy::missing_panics_doc,        // Will add gradually
)]

/// Authentication provider interface and in-memory implementation
pub mod auth;
/// Persistent per-user collection cache (memory map plus JSON files)
pub mod cache;
/// Configuration management: config.toml, env overrides, category seed
pub mod config;
/// Core business logic - state store, mutation pipeline, reports
pub mod core;
/// Plain entity records and the collection enumeration
pub mod entities;
/// Unified error types and result handling
pub mod errors;
/// Email/push collaborator traits and fire-and-forget dispatch
pub mod notify;
/// Document store interface, subscriptions and the in-memory store
pub mod remote;
/// Session/identity binder gating subscriptions and mutations
pub mod session;
/// Remote sync adapter: wire codec, saves, cascades, typed subscriptions
pub mod sync;

#[cfg(test)]
pub mod test_utils;
