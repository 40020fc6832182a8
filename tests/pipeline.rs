//! End-to-end pipeline runs against a temp directory.

use serde_json::json;

use worksheet_visuals::models::{NumericConstraints, OutputQuestion, RepresentationPreference, Difficulty};
use worksheet_visuals::{
    BuildJob, Config, CurriculumCatalog, ModelRegistry, PipelineState, PlanAllocator, Representation,
    RepresentationMode, VisualSpec, WorksheetOutput, WorksheetPipeline, WorksheetPlan, WorksheetRequest,
};

fn sub02_plan() -> WorksheetPlan {
    let request = WorksheetRequest {
        grade: 3,
        subject: "math".to_string(),
        skill_id: "SUB-02".to_string(),
        difficulty: Difficulty::L2,
        question_count: 10,
        representation_preference: RepresentationPreference::mode(RepresentationMode::ModelHeavy),
        theme: Some("space".to_string()),
        locale: None,
        constraints: NumericConstraints {
            max_number: Some(999),
            ..NumericConstraints::default()
        },
    };
    let registry = ModelRegistry::builtin();
    PlanAllocator::new(&registry)
        .plan(&request, &CurriculumCatalog::builtin())
        .unwrap()
}

fn output_for(plan: &WorksheetPlan, subtrahend: i64) -> WorksheetOutput {
    let questions = plan
        .questions
        .iter()
        .map(|entry| {
            let pictorial = entry.representation == Representation::PictorialModel;
            OutputQuestion {
                q_id: entry.q_id.clone(),
                representation: entry.representation,
                visual_model_ref: if pictorial { vec!["BASE_TEN_REGROUPING".to_string()] } else { vec![] },
                visual_spec: pictorial.then(|| {
                    VisualSpec::new(
                        "BASE_TEN_REGROUPING",
                        json!({
                            "minuend": 502,
                            "subtrahend": subtrahend,
                            "regroup_steps": [
                                {"from": "hundreds", "to": "tens"},
                                {"from": "tens", "to": "ones"}
                            ]
                        }),
                    )
                }),
                question_text: "What is 502 - 178?".to_string(),
                options: vec!["324".into(), "334".into(), "436".into(), "680".into()],
                answer: "A".to_string(),
                answer_value: Some(json!(324)),
                explanation: Some("Regroup 1 hundred into 10 tens, then 1 ten into 10 ones.".to_string()),
                objects: vec![],
            }
        })
        .collect();
    WorksheetOutput {
        title: Some("Subtraction with Regrouping".to_string()),
        questions,
    }
}

#[test]
fn clean_build_reaches_done() {
    let dir = tempfile::tempdir().unwrap();
    let plan = sub02_plan();
    let output = output_for(&plan, 178);
    let out_dir = dir.path().join("artifacts");
    let pdf = dir.path().join("worksheet.pdf");

    let pipeline = WorksheetPipeline::new(ModelRegistry::builtin(), Config::default());
    let report = pipeline
        .run(&BuildJob {
            plan: &plan,
            output: &output,
            output_source: "output.json",
            run_id: "run-e2e",
            out_dir: &out_dir,
            pdf_path: &pdf,
        })
        .unwrap();

    assert_eq!(report.state, PipelineState::Done, "{:?}", report.errors);
    assert!(report.errors.is_empty());
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);

    let manifest = report.manifest.as_ref().unwrap();
    assert_eq!(manifest.entries.len(), 7);
    assert!(manifest.verify_hash().unwrap());
    assert!(out_dir.join("manifest.json").exists());
    for entry in &manifest.entries {
        assert!(entry.svg_file(&out_dir).exists());
        assert!(entry.meta_file(&out_dir).exists());
    }

    let document = report.document.as_ref().unwrap();
    assert_eq!(document.questions, 10);
    assert!(document.pages >= 2);
    assert!(std::fs::read(&pdf).unwrap().starts_with(b"%PDF"));
}

#[test]
fn validation_errors_stop_before_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let plan = sub02_plan();
    let mut output = output_for(&plan, 178);
    output.questions.retain(|q| q.q_id != "Q4");
    let out_dir = dir.path().join("artifacts");

    let pipeline = WorksheetPipeline::new(ModelRegistry::builtin(), Config::default());
    let report = pipeline
        .run(&BuildJob {
            plan: &plan,
            output: &output,
            output_source: "output.json",
            run_id: "run-missing",
            out_dir: &out_dir,
            pdf_path: &dir.path().join("worksheet.pdf"),
        })
        .unwrap();

    assert_eq!(report.state, PipelineState::Failed);
    assert_eq!(report.failed_stage, Some(PipelineState::Validating));
    assert!(report.errors.iter().any(|f| f.check == "missing_question" && f.q_id.as_deref() == Some("Q4")));
    assert!(report.manifest.is_none());
    assert!(!out_dir.exists());
}

#[test]
fn renderer_failures_stop_at_rendering() {
    let dir = tempfile::tempdir().unwrap();
    let plan = sub02_plan();
    // subtrahend larger than minuend
    let output = output_for(&plan, 700);
    let out_dir = dir.path().join("artifacts");
    let pdf = dir.path().join("worksheet.pdf");

    let pipeline = WorksheetPipeline::new(ModelRegistry::builtin(), Config::default());
    let report = pipeline
        .run(&BuildJob {
            plan: &plan,
            output: &output,
            output_source: "output.json",
            run_id: "run-bad-spec",
            out_dir: &out_dir,
            pdf_path: &pdf,
        })
        .unwrap();

    assert_eq!(report.failed_stage, Some(PipelineState::Rendering));
    assert_eq!(report.errors.len(), 7);
    assert!(report.errors.iter().all(|f| f.check == "render_error"));
    assert!(report.manifest.as_ref().unwrap().entries.is_empty());
    assert!(!pdf.exists());
}
