//! Visual Self-Check - geometric invariants over render metadata
//!
//! Works only from the `.meta.json` sidecars, never from the SVG. Four
//! independent checks per artifact, all accumulated:
//! - count fidelity: every expected quantity equals its rendered twin
//! - overlap: no two boxes of the same type intersect beyond epsilon
//! - label bounds: every label box stays inside the canvas plus tolerance
//! - negative coordinates: no primitive box starts left of or above the origin

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::SelfCheckConfig;
use crate::error::Result;
use crate::hashing::sha256_hex;
use crate::manifest::{load_artifact, ManifestEntry, RenderManifest};
use crate::models::Finding;
use crate::registry::{ARRAYS, BASE_TEN_REGROUPING, FRACTION_SHAPES, FRACTION_STRIPS, NUMBER_LINE};
use crate::render::{BoundingBox, RenderArtifact};

/// Exact comparison up to float noise.
const QUANTITY_TOLERANCE: f64 = 1e-6;

/// Quantities each built-in model must publish.
pub fn required_quantities(model_id: &str) -> &'static [&'static str] {
    match model_id {
        BASE_TEN_REGROUPING => &["minuend_blocks", "subtrahend_blocks"],
        NUMBER_LINE => &["tick_count", "points"],
        ARRAYS => &["total_items"],
        FRACTION_STRIPS | FRACTION_SHAPES => &["shaded_parts", "total_parts"],
        _ => &[],
    }
}

pub struct VisualSelfCheck {
    config: SelfCheckConfig,
}

impl VisualSelfCheck {
    pub fn new(config: SelfCheckConfig) -> Self {
        Self { config }
    }

    fn count_fidelity(&self, q_id: &str, artifact: &RenderArtifact) -> Vec<Finding> {
        let meta = &artifact.metadata;
        let mut findings = vec![];
        for key in required_quantities(&meta.model_id) {
            if !meta.expected.contains_key(*key) {
                findings.push(Finding::error(
                    "count_fidelity",
                    Some(q_id),
                    format!("{} metadata lacks expected '{key}'", meta.model_id),
                ));
            }
        }
        for (key, expected) in &meta.expected {
            match meta.rendered.get(key) {
                None => findings.push(Finding::error(
                    "count_fidelity",
                    Some(q_id),
                    format!("'{key}' was expected but never measured"),
                )),
                Some(rendered) if !expected.matches(rendered, QUANTITY_TOLERANCE) => {
                    findings.push(Finding::error(
                        "count_fidelity",
                        Some(q_id),
                        format!("'{key}': expected {expected}, rendered {rendered}"),
                    ))
                }
                Some(_) => {}
            }
        }
        findings
    }

    fn overlap(&self, q_id: &str, artifact: &RenderArtifact) -> Vec<Finding> {
        let mut by_type: BTreeMap<&str, Vec<&BoundingBox>> = BTreeMap::new();
        for b in &artifact.metadata.bounding_boxes {
            if !self.config.exempt_types.iter().any(|t| *t == b.kind) {
                by_type.entry(b.kind.as_str()).or_default().push(b);
            }
        }

        let eps = self.config.overlap_epsilon;
        let mut findings = vec![];
        for (kind, boxes) in by_type {
            let pairs: usize = boxes
                .iter()
                .enumerate()
                .map(|(i, a)| boxes[i + 1..].iter().filter(|b| a.intersects(b, eps)).count())
                .sum();
            if pairs > 0 {
                findings.push(Finding::error(
                    "overlap",
                    Some(q_id),
                    format!("{pairs} overlapping '{kind}' pair(s)"),
                ));
            }
        }
        findings
    }

    fn label_bounds(&self, q_id: &str, artifact: &RenderArtifact) -> Vec<Finding> {
        let tol = self.config.label_tolerance;
        artifact
            .metadata
            .label_boxes
            .iter()
            .filter(|l| l.x < -tol || l.y < -tol || l.right() > artifact.width + tol || l.bottom() > artifact.height + tol)
            .map(|l| {
                Finding::error(
                    "label_bounds",
                    Some(q_id),
                    format!(
                        "'{}' label at ({:.1}, {:.1}, {:.1}x{:.1}) leaves the {}x{} canvas",
                        l.kind, l.x, l.y, l.w, l.h, artifact.width, artifact.height
                    ),
                )
            })
            .collect()
    }

    fn negative_coordinates(&self, q_id: &str, artifact: &RenderArtifact) -> Vec<Finding> {
        artifact
            .metadata
            .bounding_boxes
            .iter()
            .chain(&artifact.metadata.label_boxes)
            .filter(|b| b.x < -1e-9 || b.y < -1e-9)
            .map(|b| {
                Finding::error(
                    "negative_coordinate",
                    Some(q_id),
                    format!("'{}' box starts at ({:.1}, {:.1})", b.kind, b.x, b.y),
                )
            })
            .collect()
    }

    /// All four checks over one artifact.
    pub fn check_artifact(&self, q_id: &str, artifact: &RenderArtifact) -> Vec<Finding> {
        let mut findings = self.count_fidelity(q_id, artifact);
        findings.extend(self.overlap(q_id, artifact));
        findings.extend(self.label_bounds(q_id, artifact));
        findings.extend(self.negative_coordinates(q_id, artifact));
        debug!(q_id, findings = findings.len(), "Checked artifact");
        findings
    }

    fn check_entry(&self, entry: &ManifestEntry, base_dir: &Path) -> Vec<Finding> {
        let q_id = Some(entry.q_id.as_str());
        let artifact = match load_artifact(&entry.meta_file(base_dir)) {
            Ok(a) => a,
            Err(e) => return vec![Finding::error("artifact_missing", q_id, e.to_string())],
        };

        let mut findings = vec![];
        if artifact.metadata.model_id != entry.model_id {
            findings.push(Finding::error(
                "model_mismatch",
                q_id,
                format!("manifest says {}, metadata says {}", entry.model_id, artifact.metadata.model_id),
            ));
        }
        match fs::read(entry.svg_file(base_dir)) {
            Ok(svg) if sha256_hex(&svg) != entry.svg_sha256 => findings.push(Finding::error(
                "artifact_modified",
                q_id,
                format!("{} does not match its recorded hash", entry.svg_path),
            )),
            Ok(_) => {}
            Err(e) => findings.push(Finding::error(
                "artifact_missing",
                q_id,
                format!("{}: {e}", entry.svg_path),
            )),
        }
        findings.extend(self.check_artifact(&entry.q_id, &artifact));
        findings
    }

    /// Check every manifest entry; artifact paths resolve against `base_dir`.
    /// Only an incompatible manifest is a hard error.
    pub fn check_manifest(&self, manifest: &RenderManifest, base_dir: &Path) -> Result<Vec<Finding>> {
        manifest.check_engine_compat()?;
        let findings: Vec<Finding> = manifest
            .entries
            .par_iter()
            .flat_map_iter(|entry| self.check_entry(entry, base_dir))
            .collect();
        info!(
            run_id = %manifest.run_id,
            entries = manifest.entries.len(),
            findings = findings.len(),
            "Self-check complete"
        );
        Ok(findings)
    }
}

impl Default for VisualSelfCheck {
    fn default() -> Self {
        Self::new(SelfCheckConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutputQuestion, Representation, VisualSpec, WorksheetOutput};
    use crate::manifest::RenderOrchestrator;
    use crate::registry::ModelRegistry;
    use crate::render::{self, Quantity};
    use serde_json::json;

    fn artifact(model: &str, params: serde_json::Value) -> RenderArtifact {
        render::render(&VisualSpec::new(model, params), &ModelRegistry::builtin())
            .unwrap()
            .artifact()
    }

    #[test]
    fn every_builtin_renderer_passes() {
        let check = VisualSelfCheck::default();
        let cases = [
            (BASE_TEN_REGROUPING, json!({"minuend": 432, "subtrahend": 158, "regroup_steps": [{"from": "tens", "to": "ones"}]})),
            (NUMBER_LINE, json!({"min": 0, "max": 30, "jumps": [-4, -4, -4]})),
            (NUMBER_LINE, json!({"denominator": 8, "point": {"num": 5, "den": 8}})),
            (ARRAYS, json!({"rows": 6, "cols": 7, "show_labels": true, "highlight_col": 2})),
            (ARRAYS, json!({"groups": 4, "items_per_group": 9, "show_equation": true})),
            (FRACTION_STRIPS, json!({"whole_count": 3, "denominator": 5, "numerators": [1, 5, 0]})),
            (FRACTION_SHAPES, json!({"shape_count": 5, "denominator": 8, "numerators": [1, 2, 3, 4, 8]})),
        ];
        for (model, params) in cases {
            let findings = check.check_artifact("Q1", &artifact(model, params));
            assert!(findings.is_empty(), "{model}: {findings:?}");
        }
    }

    #[test]
    fn tampered_counts_are_caught() {
        let mut a = artifact(ARRAYS, json!({"rows": 2, "cols": 3}));
        a.metadata.rendered.insert("total_items".into(), Quantity::Count(5));
        a.metadata.rendered.remove("cols");
        let findings = VisualSelfCheck::default().check_artifact("Q2", &a);
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.check == "count_fidelity" && f.is_error()));
    }

    #[test]
    fn overlap_is_reported_once_per_type_and_respects_exemptions() {
        let mut a = artifact(ARRAYS, json!({"rows": 1, "cols": 2}));
        let boxes = &mut a.metadata.bounding_boxes;
        boxes.push(BoundingBox::new("item", 21.0, 21.0, 24.0, 24.0));
        boxes.push(BoundingBox::new("item", 22.0, 22.0, 24.0, 24.0));
        boxes.push(BoundingBox::new("arrow", 0.0, 0.0, 50.0, 20.0));
        boxes.push(BoundingBox::new("arrow", 10.0, 0.0, 50.0, 20.0));
        let findings = VisualSelfCheck::default().check_artifact("Q3", &a);
        let overlaps: Vec<_> = findings.iter().filter(|f| f.check == "overlap").collect();
        assert_eq!(overlaps.len(), 1);
        assert!(overlaps[0].message.contains("'item'"));
    }

    #[test]
    fn labels_and_coordinates_stay_on_canvas() {
        let mut a = artifact(ARRAYS, json!({"rows": 1, "cols": 1}));
        let (w, h) = (a.width, a.height);
        a.metadata.label_boxes.push(BoundingBox::new("equation", w - 10.0, 10.0, 11.5, 10.0));
        a.metadata.label_boxes.push(BoundingBox::new("equation", w - 10.0, h - 5.0, 20.0, 10.0));
        a.metadata.bounding_boxes.push(BoundingBox::new("tick", -3.0, 5.0, 0.0, 10.0));
        let findings = VisualSelfCheck::default().check_artifact("Q4", &a);
        let checks: Vec<&str> = findings.iter().map(|f| f.check.as_str()).collect();
        assert_eq!(checks, vec!["label_bounds", "negative_coordinate"]);
    }

    #[test]
    fn labels_inside_tolerance_still_need_positive_coordinates() {
        let mut a = artifact(ARRAYS, json!({"rows": 1, "cols": 1}));
        a.metadata.label_boxes.push(BoundingBox::new("row_label", -1.0, 10.0, 8.0, 10.0));
        let findings = VisualSelfCheck::default().check_artifact("Q5", &a);
        let checks: Vec<&str> = findings.iter().map(|f| f.check.as_str()).collect();
        assert_eq!(checks, vec!["negative_coordinate"]);
        assert!(findings[0].message.contains("'row_label'"));
    }

    #[test]
    fn manifest_check_reports_missing_and_modified_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let question = |q_id: &str| OutputQuestion {
            q_id: q_id.to_string(),
            representation: Representation::PictorialModel,
            visual_model_ref: vec![ARRAYS.to_string()],
            visual_spec: Some(VisualSpec::new(ARRAYS, json!({"rows": 2, "cols": 2}))),
            question_text: "How many dots?".to_string(),
            options: vec![],
            answer: "A".to_string(),
            answer_value: None,
            explanation: None,
            objects: vec![],
        };
        let output = WorksheetOutput {
            title: None,
            questions: vec![question("Q1"), question("Q2"), question("Q3")],
        };
        let registry = ModelRegistry::builtin();
        let manifest = RenderOrchestrator::new(&registry, false)
            .render_output(&output, "out.json", "run", dir.path())
            .unwrap();

        let check = VisualSelfCheck::default();
        assert!(check.check_manifest(&manifest, dir.path()).unwrap().is_empty());

        fs::remove_file(manifest.entries[0].meta_file(dir.path())).unwrap();
        fs::write(manifest.entries[1].svg_file(dir.path()), "<svg/>").unwrap();
        let findings = check.check_manifest(&manifest, dir.path()).unwrap();
        let checks: Vec<(&str, &str)> = findings
            .iter()
            .map(|f| (f.q_id.as_deref().unwrap_or(""), f.check.as_str()))
            .collect();
        assert_eq!(checks, vec![("Q1", "artifact_missing"), ("Q2", "artifact_modified")]);
    }
}
