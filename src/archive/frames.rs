use std::fs::File;
use std::io::{BufReader, BufWriter, Read as _, Write as _};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::foundation::core::{FrameIndex, FrameName};
use crate::foundation::error::{FlowError, FlowResult, IoContext as _};
use crate::foundation::files::{ensure_dir, sorted_files};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackSummary {
    pub name: FrameName,
    pub first: FrameIndex,
    pub count: usize,
}

/// Require `frames` (sorted) to be one contiguous run without duplicates.
fn check_contiguous(frames: &[FrameIndex], origin: &str) -> FlowResult<()> {
    for pair in frames.windows(2) {
        let (prev, cur) = (pair[0], pair[1]);
        if cur == prev {
            return Err(FlowError::archive(format!(
                "{origin}: frame {cur} appears more than once"
            )));
        }
        let Some(expected) = prev.next() else {
            return Err(FlowError::archive(format!(
                "{origin}: frame {cur} follows the last representable frame {prev}"
            )));
        };
        if cur != expected {
            return Err(FlowError::archive(format!(
                "{origin}: frame {expected} is missing (gap between {prev} and {cur})"
            )));
        }
    }
    Ok(())
}

/// Resolve the single naming scheme shared by `names` and return their frames sorted.
fn single_scheme<'a>(
    names: impl IntoIterator<Item = (FrameName, FrameIndex, &'a str)>,
    origin: &str,
) -> FlowResult<(FrameName, Vec<(FrameIndex, &'a str)>)> {
    let mut scheme: Option<FrameName> = None;
    let mut frames = Vec::new();
    for (name, frame, raw) in names {
        match &scheme {
            Some(s) if *s != name => {
                return Err(FlowError::archive(format!(
                    "{origin}: mixed file names '{}' and '{}'",
                    s.format(frame),
                    raw
                )));
            }
            Some(_) => {}
            None => scheme = Some(name),
        }
        frames.push((frame, raw));
    }
    let scheme = scheme.ok_or_else(|| FlowError::input(format!("{origin}: no per-frame files")))?;
    frames.sort_by_key(|(f, _)| *f);
    let indices: Vec<FrameIndex> = frames.iter().map(|(f, _)| *f).collect();
    check_contiguous(&indices, origin)?;
    Ok((scheme, frames))
}

fn entry_options(len: usize) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
        .large_file(len as u64 >= u32::MAX as u64)
}

/// Pack every `<prefix><N>.<ext>` file of `input_dir` into `archive`.
///
/// Frames must form one contiguous run with a single prefix; gaps are rejected.
/// Entries are written in frame order with fixed timestamps, so packing the same
/// directory twice gives byte-identical archives. The archive is written to a
/// temporary file next to its destination and renamed into place on success.
#[tracing::instrument(
    skip_all,
    fields(input_dir = %input_dir.display(), archive = %archive.display())
)]
pub fn pack_dir(input_dir: &Path, ext: &str, archive: &Path) -> FlowResult<PackSummary> {
    let files = sorted_files(input_dir)?;
    let file_names: Vec<(PathBuf, String)> = files
        .into_iter()
        .filter_map(|p| {
            let n = p.file_name()?.to_str()?.to_string();
            Some((p, n))
        })
        .collect();

    let parsed = file_names.iter().filter_map(|(_, n)| {
        let (name, frame) = FrameName::parse(n)?;
        (name.ext == ext).then_some((name, frame, n.as_str()))
    });
    let origin = input_dir.display().to_string();
    let (scheme, frames) = single_scheme(parsed, &origin)?;

    let parent = match archive.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    ensure_dir(&parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent).at_path(&parent)?;
    {
        let mut zw = ZipWriter::new(BufWriter::new(tmp.as_file_mut()));
        for (frame, raw) in &frames {
            let src = input_dir.join(raw);
            let bytes = std::fs::read(&src).at_path(&src)?;
            zw.start_file(scheme.format(*frame), entry_options(bytes.len()))
                .map_err(|e| FlowError::archive(format!("{}: {e}", archive.display())))?;
            zw.write_all(&bytes).at_path(archive)?;
        }
        let mut out = zw
            .finish()
            .map_err(|e| FlowError::archive(format!("{}: {e}", archive.display())))?;
        out.flush().at_path(archive)?;
    }
    tmp.persist(archive)
        .map_err(|e| FlowError::io(archive, e.error))?;

    let summary = PackSummary {
        name: scheme,
        first: frames[0].0,
        count: frames.len(),
    };
    tracing::info!(count = summary.count, first = %summary.first, "packed archive");
    Ok(summary)
}

/// Random-access reader over a packed archive.
pub struct FrameArchive {
    path: PathBuf,
    zip: ZipArchive<BufReader<File>>,
    name: FrameName,
    frames: Vec<FrameIndex>,
}

impl FrameArchive {
    /// Open an archive and validate its entry names (single scheme, no gaps).
    pub fn open(path: &Path) -> FlowResult<Self> {
        let file = File::open(path).at_path(path)?;
        let zip = ZipArchive::new(BufReader::new(file))
            .map_err(|e| FlowError::archive(format!("{}: {e}", path.display())))?;

        let origin = path.display().to_string();
        let entries: Vec<String> = zip.file_names().map(str::to_string).collect();
        let mut parsed = Vec::with_capacity(entries.len());
        for e in &entries {
            let (name, frame) = FrameName::parse(e).ok_or_else(|| {
                FlowError::archive(format!("{origin}: unexpected entry '{e}'"))
            })?;
            parsed.push((name, frame, e.as_str()));
        }
        let (name, frames) = single_scheme(parsed, &origin).map_err(|e| match e {
            FlowError::Input(msg) => FlowError::Archive(msg),
            other => other,
        })?;
        let frames = frames.into_iter().map(|(f, _)| f).collect();

        Ok(Self {
            path: path.to_path_buf(),
            zip,
            name,
            frames,
        })
    }

    pub fn name(&self) -> &FrameName {
        &self.name
    }

    pub fn frames(&self) -> &[FrameIndex] {
        &self.frames
    }

    /// Bytes of one frame's file; only that entry is decompressed.
    pub fn read_frame(&mut self, frame: FrameIndex) -> FlowResult<Vec<u8>> {
        let entry = self.name.format(frame);
        if self.frames.binary_search(&frame).is_err() {
            return Err(FlowError::archive(format!(
                "{}: no entry '{entry}'",
                self.path.display()
            )));
        }
        let mut file = self
            .zip
            .by_name(&entry)
            .map_err(|e| FlowError::archive(format!("{}: '{entry}': {e}", self.path.display())))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| {
            FlowError::archive(format!("{}: '{entry}': {e}", self.path.display()))
        })?;
        Ok(bytes)
    }

    /// Write one frame's file into `dir` under its archive entry name.
    pub fn extract_frame(&mut self, frame: FrameIndex, dir: &Path) -> FlowResult<PathBuf> {
        let bytes = self.read_frame(frame)?;
        ensure_dir(dir)?;
        let out = dir.join(self.name.format(frame));
        std::fs::write(&out, bytes).at_path(&out)?;
        Ok(out)
    }

    pub fn extract_all(&mut self, dir: &Path) -> FlowResult<Vec<PathBuf>> {
        let frames = self.frames.clone();
        let written = frames
            .into_iter()
            .map(|f| self.extract_frame(f, dir))
            .collect::<FlowResult<Vec<_>>>()?;
        tracing::info!(count = written.len(), archive = %self.path.display(), "unpacked archive");
        Ok(written)
    }
}

/// Unpack one frame, or every frame when `frame` is `None`.
pub fn unpack_archive(
    archive: &Path,
    out_dir: &Path,
    frame: Option<FrameIndex>,
) -> FlowResult<Vec<PathBuf>> {
    let mut ar = FrameArchive::open(archive)?;
    match frame {
        Some(f) => Ok(vec![ar.extract_frame(f, out_dir)?]),
        None => ar.extract_all(out_dir),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/archive/frames.rs"]
mod tests;
