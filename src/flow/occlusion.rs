use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::flow::field::{FlowField, read_flo};
use crate::foundation::core::{FrameIndex, FrameName, Threading};
use crate::foundation::error::{FlowError, FlowResult};
use crate::foundation::files::{ensure_dir, glob_frames};
use crate::foundation::plane::Plane;

/// Default round-trip tolerance, in pixels.
pub const DEFAULT_OCCLUSION_THRESHOLD_PX: f32 = 0.5;

/// Mask value of an occluded pixel; visible pixels are 0.
pub const OCCLUDED: u8 = 255;

/// Per-pixel occlusion of frame N: [`OCCLUDED`] where the surface is hidden in N+1.
pub type OcclusionMask = Plane<u8>;

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OcclusionParams {
    /// Largest allowed `|p - p''|` round-trip distance, in pixels. Also the margin by
    /// which a destination may fall outside the frame and still count as visible.
    pub threshold_px: f32,
}

impl Default for OcclusionParams {
    fn default() -> Self {
        Self {
            threshold_px: DEFAULT_OCCLUSION_THRESHOLD_PX,
        }
    }
}

impl OcclusionParams {
    pub fn validate(&self) -> FlowResult<()> {
        if !self.threshold_px.is_finite() || self.threshold_px < 0.0 {
            return Err(FlowError::config(format!(
                "occlusion threshold must be a non-negative number, got {}",
                self.threshold_px
            )));
        }
        Ok(())
    }
}

/// Forward/backward consistency occlusions for frame N.
///
/// For pixel `p`, `p' = p + F(p)` and `p'' = p' + B(p')`, with `B` sampled
/// bilinearly. `p` is occluded when `|p - p''| > threshold_px`. A destination more than
/// `threshold_px` outside `[0, w-1] x [0, h-1]` cannot round-trip and is occluded;
/// one within that margin has no backward flow to contradict it and stays visible.
pub fn compute_occlusions(
    forward: &FlowField,
    backward: &FlowField,
    params: &OcclusionParams,
) -> FlowResult<OcclusionMask> {
    check_pair(forward, backward)?;
    let mut mask = Plane::from_fn(forward.width, forward.height, |_, _| 0u8);
    for (y, row) in mask.data.chunks_mut(forward.width as usize).enumerate() {
        occlusion_row(forward, backward, params.threshold_px, y as u32, row);
    }
    Ok(mask)
}

/// Same result as [`compute_occlusions`], rows computed on `pool`.
pub fn compute_occlusions_in(
    pool: &rayon::ThreadPool,
    forward: &FlowField,
    backward: &FlowField,
    params: &OcclusionParams,
) -> FlowResult<OcclusionMask> {
    check_pair(forward, backward)?;
    let mut mask = Plane::from_fn(forward.width, forward.height, |_, _| 0u8);
    let width = forward.width as usize;
    pool.install(|| {
        mask.data
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                occlusion_row(forward, backward, params.threshold_px, y as u32, row)
            });
    });
    Ok(mask)
}

fn check_pair(forward: &FlowField, backward: &FlowField) -> FlowResult<()> {
    if !forward.same_size(backward) {
        return Err(FlowError::decode(format!(
            "forward flow is {} but backward flow is {}",
            forward.resolution(),
            backward.resolution()
        )));
    }
    Ok(())
}

fn occlusion_row(
    forward: &FlowField,
    backward: &FlowField,
    threshold: f32,
    y: u32,
    row: &mut [u8],
) {
    for (x, out) in row.iter_mut().enumerate() {
        let [fx, fy] = forward.data[y as usize * forward.width as usize + x];
        *out = if is_occluded(backward, x as f32, y as f32, fx, fy, threshold) {
            OCCLUDED
        } else {
            0
        };
    }
}

fn is_occluded(backward: &FlowField, x: f32, y: f32, fx: f32, fy: f32, threshold: f32) -> bool {
    if !fx.is_finite() || !fy.is_finite() {
        return true;
    }
    let (tx, ty) = (x + fx, y + fy);
    match backward.sample_bilinear(tx, ty) {
        Some([bx, by]) => (fx + bx).hypot(fy + by) > threshold,
        None => backward.distance_outside(tx, ty) > threshold,
    }
}

pub fn occluded_count(mask: &OcclusionMask) -> usize {
    mask.data.iter().filter(|&&v| v == OCCLUDED).count()
}

pub fn save_occlusions(path: &Path, mask: &OcclusionMask) -> FlowResult<()> {
    let img = image::GrayImage::from_raw(mask.width, mask.height, mask.data.clone())
        .ok_or_else(|| FlowError::decode("occlusion mask size does not match its data"))?;
    img.save(path).map_err(|e| FlowError::image(path, e))
}

/// Batch occlusions over flow and back-flow file sequences.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct OcclusionBatch {
    pub flow_pattern: String,
    pub backflow_pattern: String,
    pub odir: PathBuf,
    /// Restrict to these frames; `None` processes every frame with enough data.
    #[serde(default)]
    pub frames: Option<Vec<FrameIndex>>,
    #[serde(default)]
    pub params: OcclusionParams,
    #[serde(default)]
    pub threading: Threading,
}

/// Write `occlusions<N>.png` for every frame N with forward flow N and back flow N+1.
#[tracing::instrument(skip(batch), fields(odir = %batch.odir.display()))]
pub fn compute_occlusion_sequence(batch: &OcclusionBatch) -> FlowResult<Vec<PathBuf>> {
    batch.params.validate()?;
    let flows = glob_frames(&batch.flow_pattern)?;
    let backflows = glob_frames(&batch.backflow_pattern)?;

    let mut frames: Vec<(FrameIndex, FrameIndex)> = flows
        .keys()
        .filter_map(|&f| f.next().map(|n| (f, n)))
        .filter(|(_, n)| backflows.contains_key(n))
        .collect();
    if let Some(only) = &batch.frames {
        frames.retain(|(f, _)| only.contains(f));
        tracing::info!(
            requested = ?only,
            processing = frames.len(),
            "restricting occlusion frames"
        );
    }
    if frames.is_empty() {
        return Err(FlowError::input(format!(
            "no frame has both flow ('{}') and next-frame back flow ('{}')",
            batch.flow_pattern, batch.backflow_pattern
        )));
    }

    ensure_dir(&batch.odir)?;
    let pool = batch.threading.parallel.then(|| batch.threading.build_pool()).transpose()?;
    let name = FrameName::occlusions();
    let mut written = Vec::with_capacity(frames.len());
    for (f, next) in frames {
        let forward = read_flo(&flows[&f])?;
        let backward = read_flo(&backflows[&next])?;
        let mask = match &pool {
            Some(pool) => compute_occlusions_in(pool, &forward, &backward, &batch.params),
            None => compute_occlusions(&forward, &backward, &batch.params),
        }
        .map_err(|e| e.in_frame(f))?;

        let out = batch.odir.join(name.format(f));
        save_occlusions(&out, &mask)?;
        tracing::info!(frame = %f, occluded = occluded_count(&mask), "wrote occlusions");
        written.push(out);
    }
    Ok(written)
}

#[cfg(test)]
#[path = "../../tests/unit/flow/occlusion.rs"]
mod tests;
