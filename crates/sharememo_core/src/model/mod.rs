//! Domain model for profiles, friend edges and shared memos.
//!
//! # Responsibility
//! - Define the records exchanged between the store and core services.
//! - Keep wire field naming compatible with the document store schema.
//!
//! # Invariants
//! - Document keys (`identity`, memo `id`) are never embedded in stored
//!   fields; they are merged in after fetch.
//! - Shared memo membership is immutable after creation.

pub mod identity;
pub mod memo;
pub mod profile;
pub mod relationship;
