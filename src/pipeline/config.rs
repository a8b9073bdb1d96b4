use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::archive::frames::{PackSummary, pack_dir, unpack_archive};
use crate::flow::occlusion::{OcclusionBatch, compute_occlusion_sequence};
use crate::foundation::core::FrameIndex;
use crate::foundation::error::{FlowError, FlowResult, IoContext as _};
use crate::meta::depth::render_depth_images;
use crate::pipeline::unpack::{UnpackConfig, UnpackSummary, unpack_sequence};
use crate::sanity::check::{SanityConfig, SanityReport, run_sanity_check};
use crate::sanity::inputs::SanityPatterns;

/// A dataset post-processing run: named stages with explicit dependencies.
///
/// ```json
/// {
///   "seed": 7,
///   "stages": [
///     { "name": "unpack", "stage": { "kind": "unpack", "params": { "input_dir": "exr" } } },
///     { "name": "pack", "after": ["unpack"],
///       "stage": { "kind": "pack",
///                  "params": { "input_dir": "flow", "ext": "flo", "archive": "flow.zip" } } }
///   ]
/// }
/// ```
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PipelineConfig {
    /// Seed for every randomized stage.
    #[serde(default)]
    pub seed: u64,
    pub stages: Vec<StageSpec>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct StageSpec {
    pub name: String,
    #[serde(default)]
    pub after: Vec<String>,
    pub stage: StageKind,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum StageKind {
    Unpack(UnpackConfig),
    Occlusions(OcclusionBatch),
    Pack {
        input_dir: PathBuf,
        ext: String,
        archive: PathBuf,
    },
    UnpackArchive {
        archive: PathBuf,
        out_dir: PathBuf,
        #[serde(default)]
        frame: Option<FrameIndex>,
    },
    DepthImages {
        array_dir: PathBuf,
        range_file: PathBuf,
        odir: PathBuf,
    },
    CheckSanity {
        patterns: SanityPatterns,
        #[serde(default)]
        settings: SanityConfig,
    },
}

#[derive(Clone, Debug)]
pub enum StageResult {
    Unpacked(UnpackSummary),
    Occlusions(Vec<PathBuf>),
    Packed(PackSummary),
    Extracted(Vec<PathBuf>),
    DepthImages(Vec<PathBuf>),
    Sanity(SanityReport),
}

#[derive(Clone, Debug)]
pub struct StageOutcome {
    pub name: String,
    pub result: StageResult,
}

impl StageOutcome {
    /// `false` only for a sanity check that failed its verdict.
    pub fn passed(&self) -> bool {
        match &self.result {
            StageResult::Sanity(report) => report.passed,
            _ => true,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> FlowResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| FlowError::config(format!("invalid pipeline config: {e}")))
    }

    pub fn load(path: &Path) -> FlowResult<Self> {
        let text = std::fs::read_to_string(path).at_path(path)?;
        Self::from_json(&text).map_err(|e| match e {
            FlowError::Config(msg) => FlowError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn validate(&self) -> FlowResult<()> {
        self.plan().map(|_| ())
    }

    /// Stage indices in execution order.
    ///
    /// Every stage runs after the stages it names in `after`; among stages that are
    /// ready at the same time, the one declared first runs first.
    pub fn plan(&self) -> FlowResult<Vec<usize>> {
        let mut index: BTreeMap<&str, usize> = BTreeMap::new();
        for (i, s) in self.stages.iter().enumerate() {
            if s.name.trim().is_empty() {
                return Err(FlowError::config(format!("stage #{i} has an empty name")));
            }
            if index.insert(s.name.as_str(), i).is_some() {
                return Err(FlowError::config(format!(
                    "stage name '{}' is used more than once",
                    s.name
                )));
            }
        }

        let mut blockers = vec![0usize; self.stages.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.stages.len()];
        for (i, s) in self.stages.iter().enumerate() {
            for dep in &s.after {
                let &d = index.get(dep.as_str()).ok_or_else(|| {
                    FlowError::config(format!(
                        "stage '{}' runs after unknown stage '{dep}'",
                        s.name
                    ))
                })?;
                blockers[i] += 1;
                dependents[d].push(i);
            }
        }

        let mut order = Vec::with_capacity(self.stages.len());
        let mut done = vec![false; self.stages.len()];
        while order.len() < self.stages.len() {
            let next = (0..self.stages.len()).find(|&i| !done[i] && blockers[i] == 0);
            let Some(i) = next else {
                let stuck: Vec<&str> = (0..self.stages.len())
                    .filter(|&i| !done[i])
                    .map(|i| self.stages[i].name.as_str())
                    .collect();
                return Err(FlowError::config(format!(
                    "stage dependencies form a cycle among: {}",
                    stuck.join(", ")
                )));
            };
            done[i] = true;
            order.push(i);
            for &j in &dependents[i] {
                blockers[j] -= 1;
            }
        }
        Ok(order)
    }

    /// Run every stage in plan order. Stops at the first stage error.
    #[tracing::instrument(skip_all, fields(stages = self.stages.len(), seed = self.seed))]
    pub fn run(&self) -> FlowResult<Vec<StageOutcome>> {
        let order = self.plan()?;
        let mut outcomes = Vec::with_capacity(order.len());
        for i in order {
            let spec = &self.stages[i];
            tracing::info!(stage = %spec.name, "running stage");
            let result = self.run_stage(&spec.stage).inspect_err(|e| {
                tracing::error!(stage = %spec.name, error = %e, "stage failed");
            })?;
            let outcome = StageOutcome {
                name: spec.name.clone(),
                result,
            };
            if !outcome.passed() {
                tracing::warn!(stage = %spec.name, "sanity check failed");
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn run_stage(&self, stage: &StageKind) -> FlowResult<StageResult> {
        Ok(match stage {
            StageKind::Unpack(cfg) => StageResult::Unpacked(unpack_sequence(cfg.clone())?),
            StageKind::Occlusions(batch) => {
                StageResult::Occlusions(compute_occlusion_sequence(batch)?)
            }
            StageKind::Pack {
                input_dir,
                ext,
                archive,
            } => StageResult::Packed(pack_dir(input_dir, ext, archive)?),
            StageKind::UnpackArchive {
                archive,
                out_dir,
                frame,
            } => StageResult::Extracted(unpack_archive(archive, out_dir, *frame)?),
            StageKind::DepthImages {
                array_dir,
                range_file,
                odir,
            } => StageResult::DepthImages(render_depth_images(array_dir, range_file, odir)?),
            StageKind::CheckSanity { patterns, settings } => {
                let cfg = SanityConfig {
                    seed: self.seed,
                    ..settings.clone()
                };
                StageResult::Sanity(run_sanity_check(patterns, &cfg)?)
            }
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/config.rs"]
mod tests;
