//! Cross-validation of flow against object IDs and surface correspondences.
//!
//! For a visible pixel `p` of frame N, following the flow to `p'` in frame N+1 must
//! land on the same object and approximately the same correspondence color. Pixels
//! marked occluded are excluded from the score but counted toward the occlusion
//! fraction of their frame.

/// Sampling, per-pixel classification, scoring and the file-driven check.
pub mod check;
/// Color-coded visualization of per-pixel verdicts.
pub mod debug;
/// Locating and loading the per-frame inputs of a check.
pub mod inputs;
