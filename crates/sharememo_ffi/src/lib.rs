//! Flutter-facing bindings for `sharememo_core`.

pub mod api;
