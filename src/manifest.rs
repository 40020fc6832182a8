//! Render Orchestrator - dispatches pictorial questions to their renderers
//!
//! Each rendered question yields `<q_id>.svg` and `<q_id>.meta.json` in the
//! output directory. A run renders into a staging directory inside the output
//! directory and moves its artifacts into place only once every question has
//! rendered; `manifest.json` is written last. A failed run leaves no artifacts
//! behind.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Result, WorksheetError};
use crate::hashing::{compute_run_hash, sha256_hex};
use crate::models::{q_id_order, Finding, OutputQuestion, Representation, VisualSpec, WorksheetOutput};
use crate::registry::ModelRegistry;
use crate::render::{self, RenderArtifact};
use crate::ENGINE_VERSION;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub q_id: String,
    pub model_id: String,
    /// Relative to the manifest's directory.
    pub svg_path: String,
    pub meta_path: String,
    pub width: f64,
    pub height: f64,
    pub svg_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderManifest {
    pub run_id: String,
    pub output_source: String,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<ManifestEntry>,
    #[serde(default)]
    pub errors: Vec<Finding>,
    pub content_hash: String,
}

impl RenderManifest {
    pub fn entry(&self, q_id: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| e.q_id == q_id)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|e| WorksheetError::io_at("reading manifest", path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    /// Manifests are readable across minor and patch engine versions only.
    pub fn check_engine_compat(&self) -> Result<()> {
        let parse = |v: &str| {
            semver::Version::parse(v)
                .map_err(|e| WorksheetError::Configuration(format!("invalid engine version '{v}': {e}")))
        };
        let (ours, theirs) = (parse(ENGINE_VERSION)?, parse(&self.engine_version)?);
        if ours.major != theirs.major {
            return Err(WorksheetError::Configuration(format!(
                "manifest written by engine {theirs}, this engine is {ours}"
            )));
        }
        Ok(())
    }

    /// Recompute the content hash over the stored entries.
    pub fn verify_hash(&self) -> Result<bool> {
        let hash = compute_run_hash(&self.run_id, &self.output_source, &self.entries, &self.engine_version)?;
        Ok(hash == self.content_hash)
    }
}

impl ManifestEntry {
    pub fn svg_file(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.svg_path)
    }

    pub fn meta_file(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.meta_path)
    }
}

/// Write via a temp file in the target directory, flushed and renamed into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| WorksheetError::io_at("creating temp file in", dir, e))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| WorksheetError::io_at("writing", path, e))?;
    tmp.persist(path)
        .map_err(|e| WorksheetError::io_at("persisting", path, e.error))?;
    Ok(())
}

pub fn load_artifact(path: &Path) -> Result<RenderArtifact> {
    let content =
        fs::read_to_string(path).map_err(|e| WorksheetError::io_at("reading render metadata", path, e))?;
    Ok(serde_json::from_str(&content)?)
}

/// File stem for a q_id; anything outside `[A-Za-z0-9_-]` becomes `_`.
fn file_stem(q_id: &str) -> String {
    q_id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// One stem per q_id, in order. Ids that sanitize to the same stem (ignoring
/// case) get a `-2`, `-3`, ... suffix.
fn assign_stems<'q>(q_ids: impl IntoIterator<Item = &'q str>) -> Vec<String> {
    let mut taken = HashSet::new();
    q_ids
        .into_iter()
        .map(|q_id| {
            let base = file_stem(q_id);
            let mut stem = base.clone();
            let mut n = 1;
            while !taken.insert(stem.to_ascii_lowercase()) {
                n += 1;
                stem = format!("{base}-{n}");
            }
            stem
        })
        .collect()
}

fn discard(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Could not remove artifact");
        }
    }
}

/// Move staged artifacts into `out_dir`. On failure the files already moved
/// are removed again.
fn promote(entries: &[ManifestEntry], staging: &Path, out_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut moved = vec![];
    for name in entries.iter().flat_map(|e| [&e.svg_path, &e.meta_path]) {
        let target = out_dir.join(name);
        if let Err(e) = fs::rename(staging.join(name), &target) {
            discard(&moved);
            return Err(WorksheetError::io_at("moving artifact to", &target, e));
        }
        moved.push(target);
    }
    Ok(moved)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub struct RenderOrchestrator<'a> {
    registry: &'a ModelRegistry,
    parallel: bool,
}

impl<'a> RenderOrchestrator<'a> {
    pub fn new(registry: &'a ModelRegistry, parallel: bool) -> Self {
        Self { registry, parallel }
    }

    /// Render one question. Renderer failures become a `render_error`
    /// finding; only I/O failures are returned as hard errors.
    fn render_one(
        &self,
        question: &OutputQuestion,
        spec: &VisualSpec,
        stem: &str,
        staging: &Path,
    ) -> Result<std::result::Result<ManifestEntry, Finding>> {
        let q_id = question.q_id.as_str();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| render::render(spec, self.registry)));
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Ok(Err(Finding::error(
                    "render_error",
                    Some(q_id),
                    format!("{}: {}", e.kind(), e),
                )))
            }
            Err(payload) => {
                return Ok(Err(Finding::error(
                    "render_error",
                    Some(q_id),
                    format!("Panic: {}", panic_message(payload.as_ref())),
                )))
            }
        };

        let svg_path = format!("{stem}.svg");
        let meta_path = format!("{stem}.meta.json");
        let meta = serde_json::to_string_pretty(&result.artifact())?;
        write_atomic(&staging.join(&svg_path), result.svg.as_bytes())?;
        write_atomic(&staging.join(&meta_path), meta.as_bytes())?;
        debug!(q_id, model = %spec.model_id, path = %svg_path, "Wrote render artifacts");

        Ok(Ok(ManifestEntry {
            q_id: q_id.to_string(),
            model_id: spec.model_id.clone(),
            svg_path,
            meta_path,
            width: result.width,
            height: result.height,
            svg_sha256: sha256_hex(result.svg.as_bytes()),
        }))
    }

    /// Render every PICTORIAL_MODEL question of `output` into `out_dir` and
    /// persist the manifest there. Entries come back sorted by q_id.
    pub fn render_output(
        &self,
        output: &WorksheetOutput,
        output_source: &str,
        run_id: &str,
        out_dir: &Path,
    ) -> Result<RenderManifest> {
        fs::create_dir_all(out_dir).map_err(|e| WorksheetError::io_at("creating", out_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".render-")
            .tempdir_in(out_dir)
            .map_err(|e| WorksheetError::io_at("creating staging directory in", out_dir, e))?;

        let mut errors = vec![];
        let mut jobs = vec![];
        for q in output.questions.iter().filter(|q| q.representation == Representation::PictorialModel) {
            match &q.visual_spec {
                Some(spec) => jobs.push((q, spec)),
                None => {
                    warn!(q_id = %q.q_id, "Pictorial question has no visual_spec");
                    errors.push(Finding::warning(
                        "missing_visual_spec",
                        Some(q.q_id.as_str()),
                        "PICTORIAL_MODEL question has no visual_spec; nothing rendered",
                    ));
                }
            }
        }

        let stems = assign_stems(jobs.iter().map(|(q, _)| q.q_id.as_str()));
        let jobs: Vec<_> = jobs.into_iter().zip(stems).collect();
        let outcomes: Vec<std::result::Result<ManifestEntry, Finding>> = if self.parallel {
            jobs.par_iter()
                .map(|((q, spec), stem)| self.render_one(q, spec, stem, staging.path()))
                .collect::<Result<_>>()?
        } else {
            jobs.iter()
                .map(|((q, spec), stem)| self.render_one(q, spec, stem, staging.path()))
                .collect::<Result<_>>()?
        };

        let mut entries = vec![];
        for outcome in outcomes {
            match outcome {
                Ok(entry) => entries.push(entry),
                Err(finding) => {
                    warn!(q_id = ?finding.q_id, message = %finding.message, "Render failed");
                    errors.push(finding);
                }
            }
        }
        entries.sort_by(|a, b| q_id_order(&a.q_id, &b.q_id));
        errors.sort_by(|a, b| {
            q_id_order(a.q_id.as_deref().unwrap_or(""), b.q_id.as_deref().unwrap_or(""))
        });

        let content_hash = compute_run_hash(run_id, output_source, &entries, ENGINE_VERSION)?;
        let manifest = RenderManifest {
            run_id: run_id.to_string(),
            output_source: output_source.to_string(),
            engine_version: ENGINE_VERSION.to_string(),
            created_at: Utc::now(),
            entries,
            errors,
            content_hash,
        };
        let moved = promote(&manifest.entries, staging.path(), out_dir)?;
        if let Err(e) = manifest.save(&out_dir.join(MANIFEST_FILE)) {
            discard(&moved);
            return Err(e);
        }

        info!(
            run_id,
            rendered = manifest.entries.len(),
            findings = manifest.errors.len(),
            "Render complete"
        );
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use serde_json::json;

    fn question(q_id: &str, spec: Option<VisualSpec>) -> OutputQuestion {
        OutputQuestion {
            q_id: q_id.to_string(),
            representation: Representation::PictorialModel,
            visual_model_ref: spec.iter().map(|s| s.model_id.clone()).collect(),
            visual_spec: spec,
            question_text: "What fraction is shaded?".to_string(),
            options: vec!["1/4".into(), "2/4".into(), "3/4".into(), "4/4".into()],
            answer: "C".to_string(),
            answer_value: None,
            explanation: None,
            objects: vec![],
        }
    }

    fn strips(numerators: serde_json::Value) -> Option<VisualSpec> {
        Some(VisualSpec::new(
            "FRACTION_STRIPS",
            json!({"whole_count": 2, "denominator": 4, "numerators": numerators}),
        ))
    }

    #[test]
    fn renders_sorted_entries_and_collects_failures() {
        let dir = tempfile::tempdir().unwrap();
        let output = WorksheetOutput {
            title: None,
            questions: vec![
                question("Q10", strips(json!([1, 1]))),
                question("Q2", strips(json!([3, 2]))),
                question("Q3", strips(json!([5, 2]))),
                question("Q4", None),
            ],
        };
        let registry = ModelRegistry::builtin();
        let manifest = RenderOrchestrator::new(&registry, true)
            .render_output(&output, "output.json", "run-1", dir.path())
            .unwrap();

        let ids: Vec<&str> = manifest.entries.iter().map(|e| e.q_id.as_str()).collect();
        assert_eq!(ids, vec!["Q2", "Q10"]);
        assert_eq!(manifest.errors.len(), 2);
        assert_eq!(manifest.errors[0].check, "render_error");
        assert!(manifest.errors[0].message.starts_with("NumeratorOutOfRange"));
        assert_eq!(manifest.errors[1].check, "missing_visual_spec");
        assert_eq!(manifest.errors[1].severity, Severity::Warning);

        let entry = manifest.entry("Q2").unwrap();
        assert!(entry.svg_file(dir.path()).exists());
        let artifact = load_artifact(&entry.meta_file(dir.path())).unwrap();
        assert_eq!(artifact.metadata.expected, artifact.metadata.rendered);
        assert!(manifest.verify_hash().unwrap());
    }

    #[test]
    fn manifest_round_trips_and_checks_engine() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ModelRegistry::builtin();
        let output = WorksheetOutput {
            title: None,
            questions: vec![question("Q1", strips(json!([0, 4])))],
        };
        let manifest = RenderOrchestrator::new(&registry, false)
            .render_output(&output, "out.json", "run-2", dir.path())
            .unwrap();

        let mut loaded = RenderManifest::load(&dir.path().join(MANIFEST_FILE)).unwrap();
        assert_eq!(loaded.entries, manifest.entries);
        assert!(loaded.check_engine_compat().is_ok());

        loaded.engine_version = "99.0.0".to_string();
        assert!(matches!(loaded.check_engine_compat(), Err(WorksheetError::Configuration(_))));
    }

    #[test]
    fn file_stems_are_sanitized() {
        assert_eq!(file_stem("Q1"), "Q1");
        assert_eq!(file_stem("../Q1"), "___Q1");
        assert_eq!(assign_stems(["Q/1", "Q_1", "q_1", "Q2"]), vec!["Q_1", "Q_1-2", "q_1-3", "Q2"]);
    }

    #[test]
    fn colliding_q_ids_keep_separate_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let output = WorksheetOutput {
            title: None,
            questions: vec![question("Q/1", strips(json!([1, 1]))), question("Q_1", strips(json!([3, 2])))],
        };
        let registry = ModelRegistry::builtin();
        let manifest = RenderOrchestrator::new(&registry, true)
            .render_output(&output, "output.json", "run-3", dir.path())
            .unwrap();

        let paths: Vec<&str> = manifest.entries.iter().map(|e| e.svg_path.as_str()).collect();
        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
        for entry in &manifest.entries {
            let svg = fs::read(entry.svg_file(dir.path())).unwrap();
            assert_eq!(sha256_hex(&svg), entry.svg_sha256);
        }
    }

    #[test]
    fn failed_run_leaves_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        // a directory in the way of Q3.svg makes the move fail after Q2 landed
        fs::create_dir(dir.path().join("Q3.svg")).unwrap();
        fs::write(dir.path().join("Q3.svg").join("keep"), "x").unwrap();
        let output = WorksheetOutput {
            title: None,
            questions: vec![question("Q2", strips(json!([1, 1]))), question("Q3", strips(json!([3, 2])))],
        };
        let registry = ModelRegistry::builtin();
        let result = RenderOrchestrator::new(&registry, false).render_output(&output, "output.json", "run-4", dir.path());

        assert!(matches!(result, Err(WorksheetError::Io { .. })));
        assert!(!dir.path().join("Q2.svg").exists());
        assert!(!dir.path().join("Q2.meta.json").exists());
        assert!(!dir.path().join(MANIFEST_FILE).exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["Q3.svg"]);
    }
}
