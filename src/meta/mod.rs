//! Raw per-frame render buffers and the depth channel extracted from them.

/// Named float channels of one rendered frame, loaded from multilayer EXR.
pub mod buffer;
/// Depth arrays, global depth range and normalized depth images.
pub mod depth;
