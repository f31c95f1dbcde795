//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate document store calls into the operations presentation code
//!   invokes: friend pairing, memo resolution, profile access and list
//!   hydration.
//! - Keep UI/FFI layers decoupled from store layout details.
//!
//! # Invariants
//! - Services never retry; each store failure is returned as `CoreError`.
//! - Dependent steps run sequentially and stop at the first failure.

pub mod hydrator;
pub mod memo_resolver;
pub mod profile_service;
pub mod relationship_service;
