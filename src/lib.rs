//! flowtruth turns rendered animation buffers into optical-flow ground truth.
//!
//! # Pipeline overview
//!
//! 1. **Unpack**: multilayer EXR per frame -> forward/backward `.flo`, depth arrays,
//!    a sequence-wide depth range and occlusion masks
//! 2. **Pack**: per-frame files -> one frame-indexed zip with random access
//! 3. **Check**: flow cross-validated against object IDs and surface correspondences,
//!    yielding a sanity score and a pass/fail verdict
//!
//! Stages can be chained from a JSON [`PipelineConfig`].
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic**: every random choice is driven by an explicit seed; parallel
//!   runs give the same results as sequential ones.
#![forbid(unsafe_code)]

/// Frame-indexed zip archives.
pub mod archive;
/// Flow fields, motion decoding and occlusions.
pub mod flow;
/// Errors, naming, planes and file helpers.
pub mod foundation;
/// Raw render buffers and depth.
pub mod meta;
/// Unpack driver and configured stage runs.
pub mod pipeline;
/// Flow sanity checking against object IDs and correspondences.
pub mod sanity;

pub use archive::frames::{FrameArchive, PackSummary, pack_dir, unpack_archive};
pub use flow::decode::{DecodedFlow, MOTION_PASS, MotionUnits, decode_motion};
pub use flow::field::{
    FLO_TAG, FlowField, decode_flo, encode_flo, read_flo, resample_flow, write_flo,
};
pub use flow::occlusion::{
    DEFAULT_OCCLUSION_THRESHOLD_PX, OcclusionBatch, OcclusionMask, OcclusionParams,
    compute_occlusion_sequence, compute_occlusions, compute_occlusions_in, occluded_count,
};
pub use foundation::core::{FrameIndex, FrameName, Resolution, Threading};
pub use foundation::error::{FlowError, FlowResult};
pub use foundation::plane::Plane;
pub use meta::buffer::MetaBuffer;
pub use meta::depth::{
    DepthPlane, DepthRange, DepthRangeAccumulator, DepthRangeFile, extract_depth,
    render_depth_images,
};
pub use pipeline::config::{PipelineConfig, StageKind, StageOutcome, StageResult, StageSpec};
pub use pipeline::unpack::{SequenceUnpacker, UnpackConfig, UnpackSummary, unpack_sequence};
pub use sanity::check::{
    FrameSanity, FrameSelection, PixelMismatch, PixelVerdict, SanityConfig, SanityReport,
    check_pairs, run_sanity_check,
};
pub use sanity::inputs::{FramePair, SanityPatterns};
