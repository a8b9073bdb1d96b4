use std::path::{Path, PathBuf};

use crate::foundation::core::{FrameName, Resolution};
use crate::foundation::error::{FlowError, FlowResult, IoContext as _};
use crate::foundation::files::{ensure_dir, sorted_files};
use crate::foundation::plane::Plane;
use crate::meta::buffer::MetaBuffer;

pub const DEPTH_CHANNEL: &str = "Depth.Z";
pub const ALPHA_CHANNEL: &str = "Combined.A";

/// Depth the renderer writes for empty space.
pub const DEPTH_BACKGROUND_SENTINEL: f32 = 1e10;

/// Channels stored per pixel in a depth array: depth, alpha.
pub const DEPTH_ARRAY_CHANNELS: usize = 2;

/// Per-pixel `[depth, alpha]`.
pub type DepthPlane = Plane<[f32; 2]>;

pub fn extract_depth(buffer: &MetaBuffer) -> FlowResult<DepthPlane> {
    let depth = buffer.channel(DEPTH_CHANNEL, true)?;
    let alpha = buffer.channel(ALPHA_CHANNEL, true)?;
    let data = depth.iter().zip(alpha).map(|(&d, &a)| [d, a]).collect();
    Plane::from_vec(buffer.width, buffer.height, data)
}

/// Background samples are kept in depth arrays but never widen the depth range.
pub fn is_background(depth: f32, alpha: f32) -> bool {
    alpha.is_nan() || alpha <= 0.0 || !depth.is_finite() || depth >= DEPTH_BACKGROUND_SENTINEL
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DepthRange {
    pub min: f32,
    pub max: f32,
}

impl DepthRange {
    /// Denominator used to normalize depth into `[0, 1]`.
    pub fn span(&self) -> f32 {
        (self.max - self.min).max(1e-4)
    }
}

/// Running min/max over the foreground depth of many frames.
#[derive(Clone, Debug, Default)]
pub struct DepthRangeAccumulator {
    range: Option<DepthRange>,
}

impl DepthRangeAccumulator {
    pub fn observe(&mut self, depth: &DepthPlane) {
        for &[d, a] in &depth.data {
            if is_background(d, a) {
                continue;
            }
            match &mut self.range {
                Some(r) => {
                    r.min = r.min.min(d);
                    r.max = r.max.max(d);
                }
                None => self.range = Some(DepthRange { min: d, max: d }),
            }
        }
    }

    pub fn range(&self) -> Option<DepthRange> {
        self.range
    }
}

/// Contents of the range file: `min max` on the first line, then optionally the
/// depth array shape `rows cols channels`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthRangeFile {
    pub range: DepthRange,
    pub shape: Option<[usize; 3]>,
}

impl DepthRangeFile {
    pub fn for_resolution(range: DepthRange, res: Resolution) -> Self {
        Self {
            range,
            shape: Some([
                res.height as usize,
                res.width as usize,
                DEPTH_ARRAY_CHANNELS,
            ]),
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = format!("{:.6} {:.6}\n", self.range.min, self.range.max);
        if let Some([rows, cols, channels]) = self.shape {
            out.push_str(&format!("{rows} {cols} {channels}\n"));
        }
        out
    }

    pub fn parse(text: &str, origin: &str) -> FlowResult<Self> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let first = lines
            .next()
            .ok_or_else(|| FlowError::decode(format!("depth range file '{origin}' is empty")))?;
        let nums: Vec<f32> = first
            .split_whitespace()
            .take(2)
            .map(str::parse)
            .collect::<Result<_, _>>()
            .map_err(|e| FlowError::decode(format!("depth range '{origin}': {e}")))?;
        let [min, max] = nums[..] else {
            return Err(FlowError::decode(format!(
                "depth range file '{origin}' needs two numbers on its first line"
            )));
        };

        let shape = match lines.next() {
            None => None,
            Some(line) => {
                let dims: Vec<usize> = line
                    .split_whitespace()
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|e| FlowError::decode(format!("depth shape '{origin}': {e}")))?;
                let [rows, cols, channels] = dims[..] else {
                    return Err(FlowError::decode(format!(
                        "depth shape in '{origin}' must be 'rows cols channels'"
                    )));
                };
                Some([rows, cols, channels])
            }
        };

        Ok(Self {
            range: DepthRange { min, max },
            shape,
        })
    }

    pub fn write(&self, path: &Path) -> FlowResult<()> {
        std::fs::write(path, self.to_text()).at_path(path)
    }

    pub fn read(path: &Path) -> FlowResult<Self> {
        let text = std::fs::read_to_string(path).at_path(path)?;
        Self::parse(&text, &path.display().to_string())
    }
}

/// Raw little-endian `f32`, row-major, `[depth, alpha]` interleaved.
pub fn encode_depth_array(depth: &DepthPlane) -> Vec<u8> {
    let mut out = Vec::with_capacity(depth.data.len() * 8);
    for [d, a] in &depth.data {
        out.extend_from_slice(&d.to_le_bytes());
        out.extend_from_slice(&a.to_le_bytes());
    }
    out
}

pub fn decode_depth_array(bytes: &[u8], res: Resolution, origin: &str) -> FlowResult<DepthPlane> {
    let expected = res.pixel_count() * DEPTH_ARRAY_CHANNELS * 4;
    if bytes.len() != expected {
        return Err(FlowError::decode(format!(
            "depth array '{origin}' is {} bytes, expected {expected} for {res}",
            bytes.len()
        )));
    }
    let data = bytes
        .chunks_exact(8)
        .map(|c| {
            [
                f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
            ]
        })
        .collect();
    Plane::from_vec(res.width, res.height, data)
}

pub fn write_depth_array(path: &Path, depth: &DepthPlane) -> FlowResult<()> {
    std::fs::write(path, encode_depth_array(depth)).at_path(path)
}

pub fn read_depth_array(path: &Path, res: Resolution) -> FlowResult<DepthPlane> {
    let bytes = std::fs::read(path).at_path(path)?;
    decode_depth_array(&bytes, res, &path.display().to_string())
}

/// Near is bright: `255 * (1 - (d - min) / span)`, clamped. Background ends up black.
pub fn depth_to_gray(depth: &DepthPlane, range: DepthRange) -> image::GrayImage {
    let span = range.span();
    image::GrayImage::from_fn(depth.width, depth.height, |x, y| {
        let [d, _] = depth.data[y as usize * depth.width as usize + x as usize];
        let v = ((1.0 - (d - range.min) / span) * 255.0).clamp(0.0, 255.0);
        image::Luma([v as u8])
    })
}

/// Render every depth array of `array_dir` to `depth<N>.png` in `odir`, normalized by
/// the sequence-wide range.
#[tracing::instrument]
pub fn render_depth_images(
    array_dir: &Path,
    range_file: &Path,
    odir: &Path,
) -> FlowResult<Vec<PathBuf>> {
    let file = DepthRangeFile::read(range_file)?;
    let Some([rows, cols, channels]) = file.shape else {
        return Err(FlowError::input(format!(
            "depth range file '{}' has no array shape line",
            range_file.display()
        )));
    };
    if channels != DEPTH_ARRAY_CHANNELS {
        return Err(FlowError::decode(format!(
            "depth arrays with {channels} channels are not supported"
        )));
    }
    let res = Resolution::new(cols as u32, rows as u32)?;

    let files = sorted_files(array_dir)?;
    if files.is_empty() {
        return Err(FlowError::input(format!(
            "no depth arrays in '{}'",
            array_dir.display()
        )));
    }

    ensure_dir(odir)?;
    let name = FrameName::depth_image();
    let mut written = Vec::with_capacity(files.len());
    for f in files {
        let frame = FrameName::frame_of(&f).ok_or_else(|| {
            FlowError::input(format!("depth array '{}' has no frame number", f.display()))
        })?;
        let depth = read_depth_array(&f, res)?;
        let out = odir.join(name.format(frame));
        depth_to_gray(&depth, file.range)
            .save(&out)
            .map_err(|e| FlowError::image(&out, e))?;
        written.push(out);
    }
    tracing::info!(count = written.len(), "wrote depth images");
    Ok(written)
}

#[cfg(test)]
#[path = "../../tests/unit/meta/depth.rs"]
mod tests;
