use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{ColorType, DynamicImage};

use crate::flow::field::{FlowField, read_flo};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{FlowError, FlowResult};
use crate::foundation::files::glob_frames;
use crate::foundation::plane::Plane;

/// Glob patterns of the five per-frame inputs.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SanityPatterns {
    pub flow: String,
    pub objectid: String,
    pub corresp: String,
    pub occlusion: String,
    pub alpha: String,
}

#[derive(Clone, Debug, Default)]
struct FrameFiles {
    flow: Option<PathBuf>,
    objectid: Option<PathBuf>,
    corresp: Option<PathBuf>,
    occlusion: Option<PathBuf>,
    alpha: Option<PathBuf>,
}

/// Input files of a sequence, keyed by frame index.
#[derive(Clone, Debug)]
pub struct SequenceFiles {
    frames: BTreeMap<FrameIndex, FrameFiles>,
}

/// Everything needed to check frame N against frame N+1.
#[derive(Clone, Debug)]
pub struct FramePair {
    pub frame: FrameIndex,
    pub flow: FlowField,
    pub ids: Plane<u32>,
    pub corresp: Plane<[f32; 3]>,
    pub occlusion: Plane<u8>,
    pub alpha: Plane<u8>,
    pub next_ids: Plane<u32>,
    pub next_corresp: Plane<[f32; 3]>,
}

impl FramePair {
    /// All planes must match the flow resolution.
    pub fn validate(&self) -> FlowResult<()> {
        let f = &self.flow;
        let checks = [
            ("object ids", self.ids.same_size(f)),
            ("correspondences", self.corresp.same_size(f)),
            ("occlusions", self.occlusion.same_size(f)),
            ("alpha", self.alpha.same_size(f)),
            ("next object ids", self.next_ids.same_size(f)),
            ("next correspondences", self.next_corresp.same_size(f)),
        ];
        for (what, ok) in checks {
            if !ok {
                return Err(FlowError::decode(format!(
                    "frame {}: {what} size differs from flow {}",
                    self.frame,
                    f.resolution()
                )));
            }
        }
        Ok(())
    }
}

impl SequenceFiles {
    /// Expand all five patterns. Each must match at least one file.
    pub fn collect(patterns: &SanityPatterns) -> FlowResult<Self> {
        let mut frames: BTreeMap<FrameIndex, FrameFiles> = BTreeMap::new();
        let mut fill = |pattern: &str, set: fn(&mut FrameFiles, PathBuf)| -> FlowResult<()> {
            for (frame, path) in glob_frames(pattern)? {
                set(frames.entry(frame).or_default(), path);
            }
            Ok(())
        };
        fill(&patterns.flow, |f, p| f.flow = Some(p))?;
        fill(&patterns.objectid, |f, p| f.objectid = Some(p))?;
        fill(&patterns.corresp, |f, p| f.corresp = Some(p))?;
        fill(&patterns.occlusion, |f, p| f.occlusion = Some(p))?;
        fill(&patterns.alpha, |f, p| f.alpha = Some(p))?;
        Ok(Self { frames })
    }

    /// Frames N with all five inputs whose N+1 has object IDs and correspondences.
    pub fn testable_frames(&self) -> Vec<FrameIndex> {
        self.frames
            .iter()
            .filter(|(frame, files)| {
                files.flow.is_some()
                    && files.objectid.is_some()
                    && files.corresp.is_some()
                    && files.occlusion.is_some()
                    && files.alpha.is_some()
                    && frame
                        .next()
                        .and_then(|n| self.frames.get(&n))
                        .is_some_and(|n| n.objectid.is_some() && n.corresp.is_some())
            })
            .map(|(frame, _)| *frame)
            .collect()
    }

    pub fn load_pair(&self, frame: FrameIndex) -> FlowResult<FramePair> {
        let missing = || FlowError::input(format!("frame {frame} lacks sanity inputs"));
        let cur = self.frames.get(&frame).ok_or_else(missing)?;
        let next = frame
            .next()
            .and_then(|n| self.frames.get(&n))
            .ok_or_else(missing)?;
        let need = |p: &Option<PathBuf>| p.clone().ok_or_else(missing);

        let pair = FramePair {
            frame,
            flow: read_flo(&need(&cur.flow)?)?,
            ids: load_ids(&need(&cur.objectid)?)?,
            corresp: load_corresp(&need(&cur.corresp)?)?,
            occlusion: load_mask(&need(&cur.occlusion)?)?,
            alpha: load_alpha(&need(&cur.alpha)?)?,
            next_ids: load_ids(&need(&next.objectid)?)?,
            next_corresp: load_corresp(&need(&next.corresp)?)?,
        };
        pair.validate()?;
        Ok(pair)
    }
}

fn open_image(path: &Path) -> FlowResult<DynamicImage> {
    image::open(path).map_err(|e| FlowError::image(path, e))
}

/// Alpha channel when the image has one, luma otherwise.
pub fn load_alpha(path: &Path) -> FlowResult<Plane<u8>> {
    let img = open_image(path)?;
    let (w, h) = (img.width(), img.height());
    let data = if img.color().has_alpha() {
        img.to_rgba8().pixels().map(|p| p.0[3]).collect()
    } else {
        img.to_luma8().into_raw()
    };
    Plane::from_vec(w, h, data)
}

pub fn load_mask(path: &Path) -> FlowResult<Plane<u8>> {
    let img = open_image(path)?;
    let (w, h) = (img.width(), img.height());
    Plane::from_vec(w, h, img.to_luma8().into_raw())
}

/// Grayscale IDs keep their value; color-coded IDs pack as `r << 16 | g << 8 | b`.
///
/// The checker compares IDs per 8-bit channel within `SanityConfig::id_tolerance`,
/// which defaults to an exact match.
pub fn load_ids(path: &Path) -> FlowResult<Plane<u32>> {
    let img = open_image(path)?;
    let (w, h) = (img.width(), img.height());
    let data: Vec<u32> = if img.color().has_color() {
        img.to_rgb8()
            .pixels()
            .map(|p| (u32::from(p.0[0]) << 16) | (u32::from(p.0[1]) << 8) | u32::from(p.0[2]))
            .collect()
    } else if matches!(img.color(), ColorType::L16 | ColorType::La16) {
        img.to_luma16().pixels().map(|p| u32::from(p.0[0])).collect()
    } else {
        img.to_luma8().pixels().map(|p| u32::from(p.0[0])).collect()
    };
    Plane::from_vec(w, h, data)
}

pub fn load_corresp(path: &Path) -> FlowResult<Plane<[f32; 3]>> {
    let img = open_image(path)?;
    let (w, h) = (img.width(), img.height());
    let data = img
        .to_rgb8()
        .pixels()
        .map(|p| [f32::from(p.0[0]), f32::from(p.0[1]), f32::from(p.0[2])])
        .collect();
    Plane::from_vec(w, h, data)
}

#[cfg(test)]
#[path = "../../tests/unit/sanity/inputs.rs"]
mod tests;
