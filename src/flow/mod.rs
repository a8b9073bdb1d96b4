//! Optical flow: the `.flo` codec, decoding from raw motion vectors and occlusions.

/// Motion-vector decoding from raw render buffers.
pub mod decode;
/// Flow field type and the Middlebury `.flo` binary format.
pub mod field;
/// Forward/backward consistency occlusion masks.
pub mod occlusion;
