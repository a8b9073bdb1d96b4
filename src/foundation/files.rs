use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::foundation::core::{FrameIndex, FrameName};
use crate::foundation::error::{FlowError, FlowResult, IoContext as _};

pub fn ensure_dir(dir: &Path) -> FlowResult<()> {
    std::fs::create_dir_all(dir).at_path(dir)
}

pub fn ensure_parent_dir(path: &Path) -> FlowResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent),
        _ => Ok(()),
    }
}

/// Expand a glob pattern and key the matches by frame index.
///
/// A pattern that matches nothing is an input error. Matches whose file name carries
/// no frame number are skipped with a warning.
pub fn glob_frames(pattern: &str) -> FlowResult<BTreeMap<FrameIndex, PathBuf>> {
    let paths = glob::glob(pattern)
        .map_err(|e| FlowError::input(format!("invalid glob pattern '{pattern}': {e}")))?;

    let mut matched = 0usize;
    let mut out = BTreeMap::new();
    for entry in paths {
        let path = entry.map_err(|e| {
            FlowError::input(format!("cannot read match of '{pattern}': {e}"))
        })?;
        matched += 1;
        match FrameName::frame_of(&path) {
            Some(frame) => {
                out.insert(frame, path);
            }
            None => tracing::warn!(path = %path.display(), "skipping file without a frame number"),
        }
    }

    if matched == 0 {
        return Err(FlowError::input(format!("no files match '{pattern}'")));
    }
    Ok(out)
}

/// Regular files of a directory, sorted by file name.
pub fn sorted_files(dir: &Path) -> FlowResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).at_path(dir)? {
        let entry = entry.at_path(dir)?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/files.rs"]
mod tests;
