//! End-to-end drivers: sequence unpacking and configured multi-stage runs.

/// JSON-configured stage graph over every dataset operation.
pub mod config;
/// Raw buffer sequence to flow, back flow, depth, occlusions and archives.
pub mod unpack;
