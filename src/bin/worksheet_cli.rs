//! worksheet-cli - plan, render, check and export math worksheets
//!
//! Commands: plan, render, validate, visual-check, export, build, models, example-config
//! Findings go to stdout as text or JSON.
//! Exit code 1 when any stage reports an ERROR finding.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use worksheet_visuals::config::EXAMPLE_CONFIG;
use worksheet_visuals::manifest::MANIFEST_FILE;
use worksheet_visuals::models::{
    has_errors, Difficulty, NumericConstraints, RepresentationPreference, RequestedKind,
};
use worksheet_visuals::{
    BuildJob, Config, CurriculumCatalog, DocumentExporter, Finding, ModelRegistry, PlanAllocator,
    RenderManifest, RepresentationMode, VisualSelfCheck, WorksheetOutput, WorksheetPipeline,
    WorksheetPlan, WorksheetRequest,
};

#[derive(Parser)]
#[command(name = "worksheet-cli")]
#[command(version)]
#[command(about = "Worksheet Visual Compiler - plan, render, self-check and export math worksheets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory of JSON model schemas overlaid on the built-in registry
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// JSON curriculum node list overlaid on the built-in catalog
    #[arg(long, global = true)]
    curriculum: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate a worksheet plan
    Plan {
        /// Curriculum skill id, e.g. SUB-02
        #[arg(short, long)]
        skill: String,

        /// L1, L2 or L3
        #[arg(short, long, default_value = "L1")]
        difficulty: Difficulty,

        /// Number of questions (5-30)
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// AUTO, MODEL_HEAVY, WORD_HEAVY, NUMERIC_ONLY, OBJECT_ALLOWED or MIXED
        #[arg(short, long, default_value = "AUTO")]
        mode: RepresentationMode,

        /// Explicit per-slot representation (repeat once per question)
        #[arg(long = "override")]
        overrides: Vec<RequestedKind>,

        #[arg(long, default_value = "3")]
        grade: u8,

        #[arg(long, default_value = "math")]
        subject: String,

        #[arg(long)]
        theme: Option<String>,

        #[arg(long)]
        locale: Option<String>,

        /// Largest number answers should reach
        #[arg(long)]
        max_number: Option<i64>,

        #[arg(long)]
        allow_negative: bool,

        #[arg(long)]
        allow_decimals: bool,

        /// Write the plan here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Render every pictorial-model question of an output file
    Render {
        /// WorksheetOutput JSON
        #[arg(short, long)]
        output: PathBuf,

        /// Run id recorded in the manifest (random when omitted)
        #[arg(long)]
        run_id: Option<String>,

        /// Artifact directory (defaults to [render] output_dir)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Validate an output file against its plan
    Validate {
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Self-check rendered artifacts listed in a manifest
    VisualCheck {
        #[arg(short, long)]
        manifest: PathBuf,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Export a worksheet PDF
    Export {
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long)]
        manifest: PathBuf,

        /// Plan file; questions follow its order when given
        #[arg(short, long)]
        plan: Option<PathBuf>,

        #[arg(long)]
        pdf: PathBuf,

        #[arg(long)]
        no_answer_key: bool,
    },

    /// Validate, render, self-check and export in one run
    Build {
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(long)]
        run_id: Option<String>,

        #[arg(long)]
        out_dir: Option<PathBuf>,

        #[arg(long)]
        pdf: PathBuf,

        #[arg(long)]
        no_answer_key: bool,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// List registered visual models
    Models,

    /// Show example configuration
    ExampleConfig,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {what} {path:?}"))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {what} {path:?}"))
}

fn load_registry(cli_dir: Option<&Path>, config: &Config) -> Result<ModelRegistry> {
    match cli_dir.or(config.catalog.models_dir.as_deref()) {
        Some(dir) => ModelRegistry::load_from_dir(dir)
            .with_context(|| format!("Failed to load model schemas from {dir:?}")),
        None => Ok(ModelRegistry::builtin()),
    }
}

fn load_catalog(cli_file: Option<&Path>, config: &Config) -> Result<CurriculumCatalog> {
    match cli_file.or(config.catalog.curriculum_file.as_deref()) {
        Some(file) => CurriculumCatalog::load_from_file(file)
            .with_context(|| format!("Failed to load curriculum from {file:?}")),
        None => Ok(CurriculumCatalog::builtin()),
    }
}

/// Print findings; returns the exit code they imply.
fn report_findings(findings: &[Finding], format: Format) -> Result<ExitCode> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(findings)?),
        Format::Text => {
            for f in findings {
                println!("{f}");
            }
            if findings.is_empty() {
                println!("No findings");
            }
        }
    }
    Ok(exit_code(findings))
}

fn exit_code(findings: &[Finding]) -> ExitCode {
    if has_errors(findings) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn manifest_dir(manifest_path: &Path) -> PathBuf {
    match manifest_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    let mut config = Config::load_or_default(cli.config.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match cli.command {
        Commands::ExampleConfig => {
            println!("{EXAMPLE_CONFIG}");
            Ok(ExitCode::SUCCESS)
        }

        Commands::Models => {
            let registry = load_registry(cli.models_dir.as_deref(), &config)?;
            println!("{}", serde_json::to_string_pretty(&registry.list())?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Plan {
            skill,
            difficulty,
            count,
            mode,
            overrides,
            grade,
            subject,
            theme,
            locale,
            max_number,
            allow_negative,
            allow_decimals,
            out,
        } => {
            let registry = load_registry(cli.models_dir.as_deref(), &config)?;
            let catalog = load_catalog(cli.curriculum.as_deref(), &config)?;
            let request = WorksheetRequest {
                grade,
                subject,
                skill_id: skill,
                difficulty,
                question_count: count,
                representation_preference: RepresentationPreference {
                    mode,
                    overrides: (!overrides.is_empty()).then_some(overrides),
                },
                theme,
                locale,
                constraints: NumericConstraints {
                    allow_negative,
                    allow_decimals,
                    max_number,
                },
            };

            let plan = PlanAllocator::new(&registry)
                .plan(&request, &catalog)
                .context("Failed to allocate plan")?;
            let json = serde_json::to_string_pretty(&plan)?;
            match &out {
                Some(path) => std::fs::write(path, &json).with_context(|| format!("Failed to write {path:?}"))?,
                None => println!("{json}"),
            }

            eprintln!(
                "Plan {} ({:?}, {} questions, {})",
                plan.node.skill_id,
                plan.request.difficulty,
                plan.questions.len(),
                plan.request.representation_preference.mode.as_str()
            );
            for (representation, n) in plan.counts() {
                eprintln!("  {:<17} {}", representation.as_str(), n);
            }
            for w in &plan.warnings {
                eprintln!("  warning: {w}");
            }
            eprintln!("  fingerprint: {}", plan.fingerprint()?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Render {
            output,
            run_id,
            out_dir,
            format,
        } => {
            let registry = load_registry(cli.models_dir.as_deref(), &config)?;
            let content: WorksheetOutput = read_json(&output, "output")?;
            let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let out_dir = out_dir.unwrap_or_else(|| config.render.output_dir.clone());
            let pipeline = WorksheetPipeline::new(registry, config);

            let manifest = pipeline
                .render(&content, &output.display().to_string(), &run_id, &out_dir)
                .context("Render failed")?;
            info!(
                run_id = %manifest.run_id,
                rendered = manifest.entries.len(),
                manifest = %out_dir.join(MANIFEST_FILE).display(),
                "Artifacts written"
            );
            report_findings(&manifest.errors, format)
        }

        Commands::Validate { plan, output, format } => {
            let registry = load_registry(cli.models_dir.as_deref(), &config)?;
            let plan: WorksheetPlan = read_json(&plan, "plan")?;
            let content: WorksheetOutput = read_json(&output, "output")?;
            let findings = WorksheetPipeline::new(registry, config).validate(&plan, &content);
            report_findings(&findings, format)
        }

        Commands::VisualCheck { manifest, format } => {
            let loaded = RenderManifest::load(&manifest).context("Failed to load manifest")?;
            let findings = VisualSelfCheck::new(config.self_check.clone())
                .check_manifest(&loaded, &manifest_dir(&manifest))
                .context("Self-check failed")?;
            report_findings(&findings, format)
        }

        Commands::Export {
            output,
            manifest,
            plan,
            pdf,
            no_answer_key,
        } => {
            if no_answer_key {
                config.export.answer_key = false;
            }
            let content: WorksheetOutput = read_json(&output, "output")?;
            let loaded = RenderManifest::load(&manifest).context("Failed to load manifest")?;
            let plan: Option<WorksheetPlan> = plan.as_deref().map(|p| read_json(p, "plan")).transpose()?;

            let summary = DocumentExporter::new(config.export.clone())
                .export(&content, &loaded, &manifest_dir(&manifest), plan.as_ref(), &pdf)
                .context("Export failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Build {
            plan,
            output,
            run_id,
            out_dir,
            pdf,
            no_answer_key,
            format,
        } => {
            if no_answer_key {
                config.export.answer_key = false;
            }
            let registry = load_registry(cli.models_dir.as_deref(), &config)?;
            let plan_data: WorksheetPlan = read_json(&plan, "plan")?;
            let content: WorksheetOutput = read_json(&output, "output")?;
            let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let out_dir = out_dir.unwrap_or_else(|| config.render.output_dir.clone());
            let source = output.display().to_string();

            let pipeline = WorksheetPipeline::new(registry, config);
            let report = pipeline
                .run(&BuildJob {
                    plan: &plan_data,
                    output: &content,
                    output_source: &source,
                    run_id: &run_id,
                    out_dir: &out_dir,
                    pdf_path: &pdf,
                })
                .context("Build aborted")?;

            match format {
                Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                Format::Text => {
                    match report.failed_stage {
                        Some(stage) => println!("FAILED at {stage}"),
                        None => println!("{}: {}", report.state, pdf.display()),
                    }
                    for f in report.errors.iter().chain(&report.warnings) {
                        println!("{f}");
                    }
                }
            }
            Ok(if report.succeeded() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}
