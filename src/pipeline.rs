//! Build Pipeline - single entry point from validated content to PDF
//!
//! VALIDATING -> RENDERING -> SELF_CHECKING -> EXPORTING -> DONE.
//! A stage advances only when it produced no ERROR findings; otherwise the
//! run stops in FAILED carrying that stage's errors. Warnings are logged and
//! collected but never block.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, WorksheetError};
use crate::export::{DocumentExporter, ExportSummary};
use crate::manifest::{RenderManifest, RenderOrchestrator};
use crate::models::{Finding, WorksheetOutput, WorksheetPlan};
use crate::registry::ModelRegistry;
use crate::self_check::VisualSelfCheck;
use crate::validation::OutputValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Validating,
    Rendering,
    SelfChecking,
    Exporting,
    Done,
    Failed,
}

impl PipelineState {
    /// Successor on a clean stage. Terminal states stay put.
    pub fn next(self) -> Self {
        match self {
            Self::Validating => Self::Rendering,
            Self::Rendering => Self::SelfChecking,
            Self::SelfChecking => Self::Exporting,
            Self::Exporting => Self::Done,
            Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "VALIDATING",
            Self::Rendering => "RENDERING",
            Self::SelfChecking => "SELF_CHECKING",
            Self::Exporting => "EXPORTING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs and destinations of one end-to-end build.
#[derive(Debug, Clone, Copy)]
pub struct BuildJob<'a> {
    pub plan: &'a WorksheetPlan,
    pub output: &'a WorksheetOutput,
    /// Recorded in the manifest, usually the output file path.
    pub output_source: &'a str,
    pub run_id: &'a str,
    pub out_dir: &'a Path,
    pub pdf_path: &'a Path,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub state: PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineState>,
    /// ERROR findings of the stage that stopped the run.
    pub errors: Vec<Finding>,
    /// WARNING findings from every stage that ran.
    pub warnings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest: Option<RenderManifest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<ExportSummary>,
}

impl PipelineReport {
    fn new() -> Self {
        Self {
            state: PipelineState::Validating,
            failed_stage: None,
            errors: vec![],
            warnings: vec![],
            manifest: None,
            document: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }

    /// Record one stage's findings and move to the next state.
    fn advance(&mut self, stage: PipelineState, findings: Vec<Finding>) {
        let (errors, warnings): (Vec<Finding>, Vec<Finding>) = findings.into_iter().partition(Finding::is_error);
        for w in &warnings {
            warn!(stage = %stage, "{}", w);
        }
        self.warnings.extend(warnings);

        if errors.is_empty() {
            self.state = stage.next();
        } else {
            warn!(stage = %stage, errors = errors.len(), "Stage failed");
            self.failed_stage = Some(stage);
            self.errors = errors;
            self.state = PipelineState::Failed;
        }
    }
}

/// Owns the registry and configuration shared by every stage.
pub struct WorksheetPipeline {
    registry: ModelRegistry,
    config: Config,
}

impl WorksheetPipeline {
    pub fn new(registry: ModelRegistry, config: Config) -> Self {
        Self { registry, config }
    }

    pub fn validate(&self, plan: &WorksheetPlan, output: &WorksheetOutput) -> Vec<Finding> {
        OutputValidator::new().validate(plan, output, &self.registry)
    }

    pub fn render(
        &self,
        output: &WorksheetOutput,
        output_source: &str,
        run_id: &str,
        out_dir: &Path,
    ) -> Result<RenderManifest> {
        RenderOrchestrator::new(&self.registry, self.config.render.parallel)
            .render_output(output, output_source, run_id, out_dir)
    }

    pub fn self_check(&self, manifest: &RenderManifest, manifest_dir: &Path) -> Result<Vec<Finding>> {
        VisualSelfCheck::new(self.config.self_check.clone()).check_manifest(manifest, manifest_dir)
    }

    pub fn export(
        &self,
        output: &WorksheetOutput,
        manifest: &RenderManifest,
        manifest_dir: &Path,
        plan: Option<&WorksheetPlan>,
        pdf_path: &Path,
    ) -> Result<ExportSummary> {
        DocumentExporter::new(self.config.export.clone()).export(output, manifest, manifest_dir, plan, pdf_path)
    }

    /// Drive every stage in order. Hard errors (I/O, incompatible manifest)
    /// abort the run with `Err`; findings end it in `FAILED`.
    pub fn run(&self, job: &BuildJob<'_>) -> Result<PipelineReport> {
        let mut report = PipelineReport::new();

        while !report.state.is_terminal() {
            let stage = report.state;
            info!(stage = %stage, run_id = job.run_id, "Entering stage");
            let findings = match stage {
                PipelineState::Validating => self.validate(job.plan, job.output),
                PipelineState::Rendering => {
                    let manifest = self.render(job.output, job.output_source, job.run_id, job.out_dir)?;
                    let findings = manifest.errors.clone();
                    report.manifest = Some(manifest);
                    findings
                }
                PipelineState::SelfChecking => {
                    let Some(manifest) = report.manifest.as_ref() else {
                        return Err(WorksheetError::Configuration("self-check reached without a manifest".into()));
                    };
                    self.self_check(manifest, job.out_dir)?
                }
                PipelineState::Exporting => {
                    let Some(manifest) = report.manifest.as_ref() else {
                        return Err(WorksheetError::Configuration("export reached without a manifest".into()));
                    };
                    let summary = self.export(job.output, manifest, job.out_dir, Some(job.plan), job.pdf_path)?;
                    report.document = Some(summary);
                    vec![]
                }
                PipelineState::Done | PipelineState::Failed => break,
            };
            report.advance(stage, findings);
        }

        info!(
            state = %report.state,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Pipeline finished"
        );
        Ok(report)
    }
}
