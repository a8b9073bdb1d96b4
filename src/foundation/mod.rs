//! Shared types used by every stage: errors, frame naming and pixel planes.

/// Frame indices, resolutions, the frame-name codec and threading controls.
pub mod core;
/// Error taxonomy shared by all operations.
pub mod error;
/// Directory listing and glob helpers keyed by frame index.
pub mod files;
/// Row-major 2D planes and bilinear sampling.
pub mod plane;
