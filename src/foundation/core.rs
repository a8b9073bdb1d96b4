use std::path::Path;

use crate::foundation::error::{FlowError, FlowResult};

/// Width of the zero-padded frame number in every per-frame file name.
pub const FRAME_INDEX_DIGITS: usize = 6;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u32);

impl FrameIndex {
    /// The following frame, or `None` past `u32::MAX`.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl std::fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:0width$}", self.0, width = FRAME_INDEX_DIGITS)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> FlowResult<Self> {
        if width == 0 || height == 0 {
            return Err(FlowError::config(format!(
                "resolution must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Frame-index <-> file-name codec: `<prefix><6-digit index>.<ext>`.
///
/// `prefix` is lowercase ASCII letters and underscores; `ext` is ASCII letters.
/// Parsing accepts any number of digits so that files written by other tools with a
/// different padding still resolve to the right frame.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FrameName {
    pub prefix: String,
    pub ext: String,
}

impl FrameName {
    pub fn new(prefix: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ext: ext.into(),
        }
    }

    pub fn flow() -> Self {
        Self::new("flow", "flo")
    }

    pub fn back_flow() -> Self {
        Self::new("backflow", "flo")
    }

    pub fn depth() -> Self {
        Self::new("depth", "array")
    }

    pub fn depth_image() -> Self {
        Self::new("depth", "png")
    }

    pub fn occlusions() -> Self {
        Self::new("occlusions", "png")
    }

    pub fn format(&self, frame: FrameIndex) -> String {
        format!("{}{}.{}", self.prefix, frame, self.ext)
    }

    /// Split a file name into its codec parts, or `None` if it does not follow the
    /// naming convention.
    pub fn parse(file_name: &str) -> Option<(Self, FrameIndex)> {
        let (stem, ext) = file_name.rsplit_once('.')?;
        if ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_alphabetic()) {
            return None;
        }
        let digits_at = stem.find(|c: char| c.is_ascii_digit())?;
        let (prefix, digits) = stem.split_at(digits_at);
        if prefix.is_empty()
            || !prefix.bytes().all(|b| b.is_ascii_lowercase() || b == b'_')
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let index = digits.parse::<u32>().ok()?;
        Some((Self::new(prefix, ext), FrameIndex(index)))
    }

    /// Frame index of a path's file name, if it follows the naming convention.
    pub fn frame_of(path: &Path) -> Option<FrameIndex> {
        let name = path.file_name()?.to_str()?;
        Self::parse(name).map(|(_, frame)| frame)
    }
}

/// Parallelism controls shared by the occlusion and sanity stages.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Threading {
    /// Enable rayon parallelism when `true`.
    pub parallel: bool,
    /// Optional explicit worker thread count.
    pub threads: Option<usize>,
}

impl Threading {
    pub fn build_pool(&self) -> FlowResult<rayon::ThreadPool> {
        if let Some(n) = self.threads
            && n == 0
        {
            return Err(FlowError::config("'threads' must be >= 1 when set"));
        }
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = self.threads {
            builder = builder.num_threads(n);
        }
        builder
            .build()
            .map_err(|e| FlowError::config(format!("failed to build rayon thread pool: {e}")))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
