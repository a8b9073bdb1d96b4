use std::path::{Path, PathBuf};

use crate::archive::frames::{PackSummary, pack_dir};
use crate::flow::decode::{MotionUnits, decode_motion};
use crate::flow::field::{FlowField, write_flo};
use crate::flow::occlusion::{
    OcclusionParams, compute_occlusions, compute_occlusions_in, occluded_count, save_occlusions,
};
use crate::foundation::core::{FrameIndex, FrameName, Resolution, Threading};
use crate::foundation::error::{FlowError, FlowResult};
use crate::foundation::files::{ensure_dir, sorted_files};
use crate::meta::buffer::MetaBuffer;
use crate::meta::depth::{
    DepthRange, DepthRangeAccumulator, DepthRangeFile, extract_depth, write_depth_array,
};

/// Where `unpack` writes each kind of output. Unset outputs are skipped.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct UnpackConfig {
    pub input_dir: PathBuf,
    pub flow_odir: Option<PathBuf>,
    pub back_flow_odir: Option<PathBuf>,
    pub depth_odir: Option<PathBuf>,
    pub occlusions_odir: Option<PathBuf>,
    pub depth_range_ofile: Option<PathBuf>,
    /// Packed from `flow_odir` after all frames are written.
    pub flow_zip: Option<PathBuf>,
    pub back_flow_zip: Option<PathBuf>,
    pub depth_zip: Option<PathBuf>,
    /// Declared resolution; defaults to the first buffer's.
    pub resolution: Option<Resolution>,
    pub units: MotionUnits,
    pub occlusion: OcclusionParams,
    pub threading: Threading,
}

impl UnpackConfig {
    pub fn validate(&self) -> FlowResult<()> {
        let zips = [
            ("flow_zip", &self.flow_zip, "flow_odir", &self.flow_odir),
            ("back_flow_zip", &self.back_flow_zip, "back_flow_odir", &self.back_flow_odir),
            ("depth_zip", &self.depth_zip, "depth_odir", &self.depth_odir),
        ];
        for (zip_key, zip, dir_key, dir) in zips {
            if zip.is_some() && dir.is_none() {
                return Err(FlowError::config(format!(
                    "'{zip_key}' is only written when '{dir_key}' is set"
                )));
            }
        }
        self.occlusion.validate()
    }

    fn wants_depth(&self) -> bool {
        self.depth_odir.is_some() || self.depth_range_ofile.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnpackSummary {
    pub frames: usize,
    pub flows: usize,
    pub back_flows: usize,
    pub depths: usize,
    pub occlusions: usize,
    pub depth_range: Option<DepthRange>,
    pub archives: Vec<PackSummary>,
}

struct PendingFrame {
    frame: FrameIndex,
    forward: FlowField,
}

/// Streams raw buffers in frame order and writes the per-frame ground truth.
///
/// Forward flow of a frame is held back until the next frame arrives, since the last
/// frame has no forward flow and occlusions of N need the backward flow of N+1.
pub struct SequenceUnpacker {
    config: UnpackConfig,
    resolution: Option<Resolution>,
    pool: Option<rayon::ThreadPool>,
    pending: Option<PendingFrame>,
    depth_range: DepthRangeAccumulator,
    summary: UnpackSummary,
}

impl SequenceUnpacker {
    pub fn new(config: UnpackConfig) -> FlowResult<Self> {
        config.validate()?;
        let outputs = [
            &config.flow_odir,
            &config.back_flow_odir,
            &config.depth_odir,
            &config.occlusions_odir,
        ];
        for dir in outputs.into_iter().flatten() {
            ensure_dir(dir)?;
        }
        let pool = config
            .threading
            .parallel
            .then(|| config.threading.build_pool())
            .transpose()?;
        Ok(Self {
            resolution: config.resolution,
            config,
            pool,
            pending: None,
            depth_range: DepthRangeAccumulator::default(),
            summary: UnpackSummary::default(),
        })
    }

    /// Decode one frame. Frames must arrive in order without gaps.
    pub fn push(&mut self, frame: FrameIndex, buffer: &MetaBuffer) -> FlowResult<()> {
        if let Some(prev) = &self.pending
            && Some(frame) != prev.frame.next()
        {
            return Err(FlowError::input(format!(
                "frame {frame} does not follow frame {}",
                prev.frame
            )));
        }
        let res = *self.resolution.get_or_insert(buffer.resolution());
        let decoded =
            decode_motion(buffer, res, self.config.units).map_err(|e| e.in_frame(frame))?;

        if let Some(prev) = self.pending.take() {
            self.emit_forward(&prev)?;
            match &decoded.backward {
                Some(backward) => self.emit_occlusions(&prev, backward)?,
                None if self.config.occlusions_odir.is_some() => {
                    tracing::warn!(
                        frame = %prev.frame,
                        "no backward flow in next frame; skipping occlusions"
                    );
                }
                None => {}
            }
            if let Some(backward) = &decoded.backward {
                self.emit_back_flow(frame, backward)?;
            }
        }

        if self.config.wants_depth() {
            let depth = extract_depth(buffer).map_err(|e| e.in_frame(frame))?;
            self.depth_range.observe(&depth);
            if let Some(dir) = &self.config.depth_odir {
                write_depth_array(&dir.join(FrameName::depth().format(frame)), &depth)?;
                self.summary.depths += 1;
            }
        }

        self.pending = Some(PendingFrame {
            frame,
            forward: decoded.forward,
        });
        self.summary.frames += 1;
        tracing::info!(frame = %frame, "unpacked frame");
        Ok(())
    }

    fn emit_forward(&mut self, prev: &PendingFrame) -> FlowResult<()> {
        if let Some(dir) = &self.config.flow_odir {
            write_flo(&dir.join(FrameName::flow().format(prev.frame)), &prev.forward)?;
            self.summary.flows += 1;
        }
        Ok(())
    }

    fn emit_back_flow(&mut self, frame: FrameIndex, backward: &FlowField) -> FlowResult<()> {
        if let Some(dir) = &self.config.back_flow_odir {
            write_flo(&dir.join(FrameName::back_flow().format(frame)), backward)?;
            self.summary.back_flows += 1;
        }
        Ok(())
    }

    fn emit_occlusions(&mut self, prev: &PendingFrame, backward: &FlowField) -> FlowResult<()> {
        let Some(dir) = &self.config.occlusions_odir else {
            return Ok(());
        };
        let params = &self.config.occlusion;
        let mask = match &self.pool {
            Some(pool) => compute_occlusions_in(pool, &prev.forward, backward, params),
            None => compute_occlusions(&prev.forward, backward, params),
        }?;
        save_occlusions(&dir.join(FrameName::occlusions().format(prev.frame)), &mask)?;
        tracing::debug!(frame = %prev.frame, occluded = occluded_count(&mask), "wrote occlusions");
        self.summary.occlusions += 1;
        Ok(())
    }

    /// Write the depth range and pack the requested archives.
    pub fn finish(mut self) -> FlowResult<UnpackSummary> {
        if let Some(path) = &self.config.depth_range_ofile {
            let range = self.depth_range.range().ok_or_else(|| {
                FlowError::decode(format!(
                    "no foreground depth in '{}'; cannot write a depth range",
                    self.config.input_dir.display()
                ))
            })?;
            let res = self
                .resolution
                .ok_or_else(|| FlowError::input("no frames were unpacked"))?;
            DepthRangeFile::for_resolution(range, res).write(path)?;
            tracing::info!(
                min = range.min,
                max = range.max,
                path = %path.display(),
                "wrote depth range"
            );
        }
        self.summary.depth_range = self.depth_range.range();

        let packs = [
            (&self.config.flow_zip, &self.config.flow_odir, "flo"),
            (&self.config.back_flow_zip, &self.config.back_flow_odir, "flo"),
            (&self.config.depth_zip, &self.config.depth_odir, "array"),
        ];
        for (zip, dir, ext) in packs {
            if let (Some(zip), Some(dir)) = (zip, dir) {
                self.summary.archives.push(pack_dir(dir, ext, zip)?);
            }
        }
        Ok(self.summary)
    }
}

fn is_exr(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("exr"))
}

/// Unpack every EXR buffer of `config.input_dir`, in file-name order.
#[tracing::instrument(skip_all, fields(input_dir = %config.input_dir.display()))]
pub fn unpack_sequence(config: UnpackConfig) -> FlowResult<UnpackSummary> {
    let files: Vec<PathBuf> = sorted_files(&config.input_dir)?
        .into_iter()
        .filter(|p| is_exr(p))
        .collect();
    if files.is_empty() {
        return Err(FlowError::input(format!(
            "no exr files in '{}'",
            config.input_dir.display()
        )));
    }

    let mut unpacker = SequenceUnpacker::new(config)?;
    for path in &files {
        let frame = FrameName::frame_of(path).ok_or_else(|| {
            FlowError::input(format!("'{}' has no frame number", path.display()))
        })?;
        let buffer = MetaBuffer::from_exr_file(path)?;
        unpacker.push(frame, &buffer)?;
    }
    let summary = unpacker.finish()?;
    tracing::info!(
        frames = summary.frames,
        flows = summary.flows,
        occlusions = summary.occlusions,
        "unpack complete"
    );
    Ok(summary)
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/unpack.rs"]
mod tests;
