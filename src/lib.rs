//! Worksheet Visuals - Visual Compiler for Math Worksheets
//!
//! # Ground Rules
//! 1. Plans Are Deterministic: same request and node, same bytes
//! 2. Renderers Certify Themselves: every drawing ships its expected and rendered counts
//! 3. Findings Accumulate: validation and self-check report everything at once
//! 4. Errors Block: a stage with ERROR findings never hands off to the next
//! 5. Manifests Enable Reproduction

pub mod allocator;
pub mod config;
pub mod curriculum;
pub mod error;
pub mod export;
pub mod hashing;
pub mod manifest;
pub mod models;
pub mod page;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod self_check;
pub mod validation;

pub use allocator::PlanAllocator;
pub use config::Config;
pub use curriculum::CurriculumCatalog;
pub use error::{ParameterError, Result, WorksheetError};
pub use export::{DocumentExporter, ExportSummary};
pub use hashing::{canonical_json, content_fingerprint, compute_run_hash};
pub use manifest::{RenderManifest, RenderOrchestrator};
pub use models::{
    Finding, OutputQuestion, Representation, RepresentationMode, Severity, VisualSpec, WorksheetOutput,
    WorksheetPlan, WorksheetRequest,
};
pub use page::{PageSize, PageSpec};
pub use pipeline::{BuildJob, PipelineReport, PipelineState, WorksheetPipeline};
pub use registry::ModelRegistry;
pub use render::{RenderResult, Quantity};
pub use self_check::VisualSelfCheck;
pub use validation::{OutputValidator, ValidationRule};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
