use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::flow::occlusion::DEFAULT_OCCLUSION_THRESHOLD_PX;
use crate::foundation::core::{FrameIndex, Threading};
use crate::foundation::error::{FlowError, FlowResult};
use crate::foundation::plane::Plane;
use crate::sanity::debug::save_debug_image;
use crate::sanity::inputs::{FramePair, SanityPatterns, SequenceFiles};

/// Occlusion-map values above this mark a pixel occluded.
pub const OCCLUSION_MAP_THRESHOLD: u8 = 127;
pub const DEFAULT_CORRESP_TOLERANCE: f32 = 4.0;
/// Mismatching pixels kept per frame for the report.
pub const MAX_REPORTED_MISMATCHES: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSelection {
    #[default]
    EvenlySpaced,
    Random,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SanityConfig {
    /// Pixels sampled per frame.
    pub npixels: usize,
    /// Frames tested; `None` tests every testable frame.
    pub nframes: Option<usize>,
    pub min_sanity: f64,
    pub max_occlusion_frac: Option<f64>,
    /// Per-channel correspondence tolerance, in 8-bit color units.
    pub corresp_tolerance: f32,
    /// Per-channel tolerance of packed 8-bit object-ID colors. Keep 0 for 16-bit
    /// grayscale IDs.
    pub id_tolerance: u8,
    /// How far a destination may fall outside the frame and still be compared at
    /// the nearest in-frame position. Use the occlusion threshold of the masks.
    pub border_margin_px: f32,
    pub selection: FrameSelection,
    pub seed: u64,
    /// Restrict the check to this frame; it also becomes the debug frame.
    pub debug_frame: Option<FrameIndex>,
    pub debug_output: Option<PathBuf>,
    pub debug_only_on_failure: bool,
    pub threading: Threading,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            npixels: 1000,
            nframes: Some(20),
            min_sanity: 0.8,
            max_occlusion_frac: None,
            corresp_tolerance: DEFAULT_CORRESP_TOLERANCE,
            id_tolerance: 0,
            border_margin_px: DEFAULT_OCCLUSION_THRESHOLD_PX,
            selection: FrameSelection::EvenlySpaced,
            seed: 0,
            debug_frame: None,
            debug_output: None,
            debug_only_on_failure: false,
            threading: Threading::default(),
        }
    }
}

impl SanityConfig {
    pub fn validate(&self) -> FlowResult<()> {
        if self.npixels == 0 {
            return Err(FlowError::config("'npixels' must be >= 1"));
        }
        if self.nframes == Some(0) {
            return Err(FlowError::config("'nframes' must be >= 1 when set"));
        }
        if !(0.0..=1.0).contains(&self.min_sanity) {
            return Err(FlowError::config(format!(
                "'min_sanity' must be within [0, 1], got {}",
                self.min_sanity
            )));
        }
        if let Some(frac) = self.max_occlusion_frac
            && !(0.0..=1.0).contains(&frac)
        {
            return Err(FlowError::config(format!(
                "'max_occlusion_frac' must be within [0, 1], got {frac}"
            )));
        }
        if !self.corresp_tolerance.is_finite() || self.corresp_tolerance < 0.0 {
            return Err(FlowError::config(format!(
                "'corresp_tolerance' must be a non-negative number, got {}",
                self.corresp_tolerance
            )));
        }
        if !self.border_margin_px.is_finite() || self.border_margin_px < 0.0 {
            return Err(FlowError::config(format!(
                "'border_margin_px' must be a non-negative number, got {}",
                self.border_margin_px
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelVerdict {
    Sane,
    OutOfFrame,
    IdMismatch,
    CorrespMismatch,
    Occluded,
    /// Marked occluded although flow, IDs and correspondences agree.
    OccludedConsistent,
}

impl PixelVerdict {
    pub fn is_occluded(self) -> bool {
        matches!(self, Self::Occluded | Self::OccludedConsistent)
    }

    pub fn is_mismatch(self) -> bool {
        matches!(self, Self::OutOfFrame | Self::IdMismatch | Self::CorrespMismatch)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Sane => "sane",
            Self::OutOfFrame => "out of frame",
            Self::IdMismatch => "object id mismatch",
            Self::CorrespMismatch => "correspondence mismatch",
            Self::Occluded => "occluded",
            Self::OccludedConsistent => "occluded but consistent",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PixelMismatch {
    pub x: u32,
    pub y: u32,
    pub verdict: PixelVerdict,
}

/// Pixels worth testing: non-transparent and on a labelled object.
pub fn is_candidate(pair: &FramePair, x: u32, y: u32) -> bool {
    let alpha = pair.alpha.get(x, y).copied().unwrap_or(0);
    let id = pair.ids.get(x, y).copied().unwrap_or(0);
    alpha > 0 && id != 0
}

/// Where a flow destination is compared: itself inside the frame, the nearest
/// in-frame position when it lies within `margin` of the frame, `None` otherwise.
fn landing_position<T>(plane: &Plane<T>, x: f32, y: f32, margin: f32) -> Option<(f32, f32)> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    if plane.in_domain(x, y) {
        return Some((x, y));
    }
    if plane.distance_outside(x, y) > margin {
        return None;
    }
    Some((
        x.clamp(0.0, (plane.width - 1) as f32),
        y.clamp(0.0, (plane.height - 1) as f32),
    ))
}

/// Object IDs match when every 8-bit channel differs by at most `tolerance`.
fn same_object(a: u32, b: u32, tolerance: u8) -> bool {
    a.to_be_bytes()
        .iter()
        .zip(b.to_be_bytes())
        .all(|(&a, b)| a.abs_diff(b) <= tolerance)
}

/// Follow the flow of `(x, y)` into frame N+1 and judge the landing spot.
pub fn classify_pixel(pair: &FramePair, x: u32, y: u32, config: &SanityConfig) -> PixelVerdict {
    let occluded = pair
        .occlusion
        .get(x, y)
        .is_some_and(|&v| v > OCCLUSION_MAP_THRESHOLD);

    let [fx, fy] = pair.flow.get(x, y).copied().unwrap_or([f32::NAN, f32::NAN]);
    let landing = landing_position(
        &pair.flow,
        x as f32 + fx,
        y as f32 + fy,
        config.border_margin_px,
    );

    let mut mismatch = None;
    if let Some((tx, ty)) = landing {
        let id = pair.ids.get(x, y).copied();
        let next_id = pair.next_ids.get(tx.round() as u32, ty.round() as u32).copied();
        let same = match (id, next_id) {
            (Some(a), Some(b)) => same_object(a, b, config.id_tolerance),
            _ => false,
        };
        if !same {
            mismatch = Some(PixelVerdict::IdMismatch);
        } else {
            let here = pair.corresp.get(x, y);
            let there = pair.next_corresp.sample_bilinear(tx, ty);
            let agree = match (here, there) {
                (Some(a), Some(b)) => a
                    .iter()
                    .zip(b.iter())
                    .all(|(a, b)| (a - b).abs() <= config.corresp_tolerance),
                _ => false,
            };
            if !agree {
                mismatch = Some(PixelVerdict::CorrespMismatch);
            }
        }
    } else {
        mismatch = Some(PixelVerdict::OutOfFrame);
    }

    match (occluded, mismatch) {
        (true, None) => PixelVerdict::OccludedConsistent,
        (true, Some(_)) => PixelVerdict::Occluded,
        (false, None) => PixelVerdict::Sane,
        (false, Some(kind)) => kind,
    }
}

/// Per-frame tallies of a check.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FrameSanity {
    pub frame: FrameIndex,
    pub sampled: usize,
    pub sane: usize,
    pub occluded: usize,
    pub out_of_frame: usize,
    pub id_mismatch: usize,
    pub corresp_mismatch: usize,
    /// Occlusion fraction above `max_occlusion_frac`.
    pub flagged: bool,
    /// First mismatching pixels in raster order, at most [`MAX_REPORTED_MISMATCHES`].
    pub mismatches: Vec<PixelMismatch>,
}

impl FrameSanity {
    fn empty(frame: FrameIndex) -> Self {
        Self {
            frame,
            sampled: 0,
            sane: 0,
            occluded: 0,
            out_of_frame: 0,
            id_mismatch: 0,
            corresp_mismatch: 0,
            flagged: false,
            mismatches: Vec::new(),
        }
    }

    pub fn tested(&self) -> usize {
        self.sampled - self.occluded
    }

    pub fn occlusion_fraction(&self) -> f64 {
        if self.sampled == 0 {
            0.0
        } else {
            self.occluded as f64 / self.sampled as f64
        }
    }

    fn record(&mut self, x: u32, y: u32, verdict: PixelVerdict) {
        self.sampled += 1;
        if verdict.is_mismatch() && self.mismatches.len() < MAX_REPORTED_MISMATCHES {
            self.mismatches.push(PixelMismatch { x, y, verdict });
        }
        match verdict {
            PixelVerdict::Sane => self.sane += 1,
            PixelVerdict::Occluded | PixelVerdict::OccludedConsistent => self.occluded += 1,
            PixelVerdict::OutOfFrame => self.out_of_frame += 1,
            PixelVerdict::IdMismatch => self.id_mismatch += 1,
            PixelVerdict::CorrespMismatch => self.corresp_mismatch += 1,
        }
    }
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SanityReport {
    pub frames: Vec<FrameSanity>,
    pub sane: usize,
    pub tested: usize,
    pub occluded: usize,
    pub score: f64,
    pub min_sanity: f64,
    pub passed: bool,
    pub warnings: Vec<String>,
    pub debug_image: Option<PathBuf>,
}

impl SanityReport {
    pub fn flagged_frames(&self) -> Vec<FrameIndex> {
        self.frames.iter().filter(|f| f.flagged).map(|f| f.frame).collect()
    }

    /// Up to [`MAX_REPORTED_MISMATCHES`] mismatching pixels, earliest frames first.
    pub fn first_mismatches(&self) -> Vec<(FrameIndex, PixelMismatch)> {
        self.frames
            .iter()
            .flat_map(|f| f.mismatches.iter().map(move |m| (f.frame, *m)))
            .take(MAX_REPORTED_MISMATCHES)
            .collect()
    }

    pub fn summary_line(&self) -> String {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        let mut line = format!(
            "sanity {verdict}: score {:.4} ({} of {} visible samples sane, {} occluded, \
             {} frames, min {:.4})",
            self.score,
            self.sane,
            self.tested,
            self.occluded,
            self.frames.len(),
            self.min_sanity
        );
        let flagged = self.flagged_frames();
        if !flagged.is_empty() {
            let list: Vec<String> = flagged.iter().map(|f| f.to_string()).collect();
            line.push_str(&format!(
                "; occlusion fraction too high in frames {}",
                list.join(", ")
            ));
        }
        if !self.passed {
            let first: Vec<String> = self
                .first_mismatches()
                .iter()
                .map(|(frame, m)| {
                    format!("frame {frame} ({}, {}) {}", m.x, m.y, m.verdict.label())
                })
                .collect();
            if !first.is_empty() {
                line.push_str(&format!("; first mismatches: {}", first.join(", ")));
            }
        }
        line
    }
}

/// Pick the frames to test from the testable ones.
pub fn select_frames(testable: &[FrameIndex], config: &SanityConfig) -> Vec<FrameIndex> {
    if let Some(only) = config.debug_frame {
        return testable.iter().copied().filter(|&f| f == only).collect();
    }
    let len = testable.len();
    let k = config.nframes.map_or(len, |n| n.min(len));
    match config.selection {
        FrameSelection::EvenlySpaced => (0..k).map(|i| testable[i * len / k]).collect(),
        FrameSelection::Random => {
            let mut shuffled = testable.to_vec();
            shuffled.shuffle(&mut StdRng::seed_from_u64(config.seed));
            shuffled.truncate(k);
            shuffled
        }
    }
}

fn frame_rng(seed: u64, frame: FrameIndex) -> StdRng {
    StdRng::seed_from_u64(seed ^ u64::from(frame.0).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Candidate pixels of a frame in raster order, subsampled to `npixels`.
pub fn sample_pixels(pair: &FramePair, npixels: usize, seed: u64) -> Vec<(u32, u32)> {
    let mut candidates = Vec::new();
    for y in 0..pair.flow.height {
        for x in 0..pair.flow.width {
            if is_candidate(pair, x, y) {
                candidates.push((x, y));
            }
        }
    }
    if npixels >= candidates.len() {
        return candidates;
    }
    let mut rng = frame_rng(seed, pair.frame);
    let mut picked = rand::seq::index::sample(&mut rng, candidates.len(), npixels).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| candidates[i]).collect()
}

/// Sample and classify one frame pair.
pub fn check_frame(pair: &FramePair, config: &SanityConfig) -> FlowResult<FrameSanity> {
    pair.validate()?;
    let mut tally = FrameSanity::empty(pair.frame);
    for (x, y) in sample_pixels(pair, config.npixels, config.seed) {
        let verdict = classify_pixel(pair, x, y, config);
        if verdict.is_mismatch() {
            tracing::debug!(frame = %pair.frame, x, y, ?verdict, "flow mismatch");
        }
        tally.record(x, y, verdict);
    }
    if let Some(max) = config.max_occlusion_frac {
        tally.flagged = tally.occlusion_fraction() > max;
    }
    Ok(tally)
}

fn aggregate(
    results: Vec<FrameSanity>,
    expected_frames: usize,
    config: &SanityConfig,
) -> SanityReport {
    let mut warnings = Vec::new();
    let mut frames = Vec::with_capacity(results.len());
    for r in results {
        if r.sampled == 0 {
            tracing::warn!(frame = %r.frame, "no foreground pixels to test");
            warnings.push(format!("frame {} has no foreground pixels to test", r.frame));
            continue;
        }
        if r.flagged {
            warnings.push(format!(
                "frame {} occlusion fraction {:.4} exceeds {:.4}",
                r.frame,
                r.occlusion_fraction(),
                config.max_occlusion_frac.unwrap_or(1.0)
            ));
        }
        frames.push(r);
    }

    let sane: usize = frames.iter().map(|f| f.sane).sum();
    let tested: usize = frames.iter().map(FrameSanity::tested).sum();
    let occluded: usize = frames.iter().map(|f| f.occluded).sum();
    let sampled: usize = frames.iter().map(|f| f.sampled).sum();

    let score = if tested == 0 {
        warnings.push("no visible samples were tested; score defaults to 1.0".to_string());
        1.0
    } else {
        sane as f64 / tested as f64
    };

    let expected = expected_frames * config.npixels;
    if sampled * 2 < expected {
        warnings.push(format!("only {sampled} of {expected} expected samples were tested"));
    }

    let passed = score >= config.min_sanity && frames.iter().all(|f| !f.flagged);
    SanityReport {
        frames,
        sane,
        tested,
        occluded,
        score,
        min_sanity: config.min_sanity,
        passed,
        warnings,
        debug_image: None,
    }
}

fn evaluate<T: Sync>(
    items: &[T],
    config: &SanityConfig,
    eval: impl Fn(&T) -> FlowResult<FrameSanity> + Sync,
) -> FlowResult<Vec<FrameSanity>> {
    if config.threading.parallel {
        let pool = config.threading.build_pool()?;
        pool.install(|| items.par_iter().map(&eval).collect())
    } else {
        items.iter().map(eval).collect()
    }
}

fn maybe_debug_image(
    report: &mut SanityReport,
    config: &SanityConfig,
    pair: impl FnOnce() -> FlowResult<Option<FramePair>>,
) -> FlowResult<()> {
    let Some(path) = &config.debug_output else {
        return Ok(());
    };
    if config.debug_only_on_failure && report.passed {
        return Ok(());
    }
    if let Some(pair) = pair()? {
        save_debug_image(path, &pair, config)?;
        tracing::info!(frame = %pair.frame, path = %path.display(), "wrote debug image");
        report.debug_image = Some(path.clone());
    }
    Ok(())
}

/// Check frame pairs that are already in memory.
///
/// `debug_frame` and frame selection apply to the frames of `pairs`.
pub fn check_pairs(pairs: &[FramePair], config: &SanityConfig) -> FlowResult<SanityReport> {
    config.validate()?;
    let testable: Vec<FrameIndex> = pairs.iter().map(|p| p.frame).collect();
    let selected = select_frames(&testable, config);
    if selected.is_empty() {
        return Err(FlowError::input("no testable frame pair"));
    }
    let chosen: Vec<&FramePair> = selected
        .iter()
        .filter_map(|f| pairs.iter().find(|p| p.frame == *f))
        .collect();

    let results = evaluate(&chosen, config, |pair| check_frame(pair, config))?;
    let mut report = aggregate(results, chosen.len(), config);
    maybe_debug_image(&mut report, config, || Ok(chosen.first().map(|&p| p.clone())))?;
    Ok(report)
}

/// Load the inputs named by `patterns` and check them.
#[tracing::instrument(
    skip_all,
    fields(npixels = config.npixels, nframes = ?config.nframes, seed = config.seed)
)]
pub fn run_sanity_check(
    patterns: &SanityPatterns,
    config: &SanityConfig,
) -> FlowResult<SanityReport> {
    config.validate()?;
    let files = SequenceFiles::collect(patterns)?;
    let testable = files.testable_frames();
    if testable.is_empty() {
        return Err(FlowError::input(
            "no frame has all five sanity inputs plus ids and correspondences of a next frame",
        ));
    }
    let selected = select_frames(&testable, config);
    if selected.is_empty() {
        return Err(FlowError::input(format!(
            "debug frame {} is not testable",
            config.debug_frame.map_or_else(String::new, |f| f.to_string())
        )));
    }
    tracing::info!(testable = testable.len(), selected = selected.len(), "checking frames");

    let results = evaluate(&selected, config, |&frame| {
        let pair = files.load_pair(frame)?;
        let tally = check_frame(&pair, config)?;
        tracing::info!(
            frame = %frame,
            sane = tally.sane,
            tested = tally.tested(),
            occluded = tally.occluded,
            "checked frame"
        );
        for m in &tally.mismatches {
            tracing::info!(
                frame = %frame,
                x = m.x,
                y = m.y,
                verdict = m.verdict.label(),
                "flow mismatch"
            );
        }
        Ok(tally)
    })?;
    let mut report = aggregate(results, selected.len(), config);
    for w in &report.warnings {
        tracing::warn!("{w}");
    }
    maybe_debug_image(&mut report, config, || {
        selected.first().map(|&f| files.load_pair(f)).transpose()
    })?;
    Ok(report)
}

#[cfg(test)]
#[path = "../../tests/unit/sanity/check.rs"]
mod tests;
