//! Output Validator - cross-checks generated content against its plan
//!
//! Each rule inspects the plan/output pair and returns findings; the
//! validator runs every rule and accumulates. Nothing here raises.
//! Output questions with no plan entry are reported once, as
//! `extra_question`, and are not looked at by any other rule.


use crate::models::{
    q_id_order, Finding, OutputQuestion, QuestionPlanEntry, Representation, WorksheetOutput, WorksheetPlan,
};
use crate::registry::ModelRegistry;

pub const ANSWER_KEYS: [&str; 4] = ["A", "B", "C", "D"];
pub const OPTION_COUNT: usize = 4;
pub const ALLOWED_SHAPES: [&str; 6] = ["simple_circle", "square", "rectangle", "triangle", "star", "heart"];
pub const ALLOWED_COLORS: [&str; 7] = ["red", "blue", "green", "yellow", "orange", "purple", "black"];

/// Everything a rule may look at.
pub struct ValidationContext<'a> {
    pub plan: &'a WorksheetPlan,
    pub output: &'a WorksheetOutput,
    pub registry: &'a ModelRegistry,
}

impl<'a> ValidationContext<'a> {
    /// Planned entries paired with the first output question carrying their q_id.
    pub fn matched(&self) -> impl Iterator<Item = (&'a QuestionPlanEntry, &'a OutputQuestion)> + '_ {
        self.plan
            .questions
            .iter()
            .filter_map(move |entry| self.output.question(&entry.q_id).map(|q| (entry, q)))
    }
}

/// Validation rule trait - produces findings
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Finding>;
}

// --- Concrete Rules ---

/// Every planned question is answered exactly once.
pub struct PresenceRule;

impl ValidationRule for PresenceRule {
    fn name(&self) -> &'static str {
        "presence"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Finding> {
        let mut findings = vec![];
        for entry in &ctx.plan.questions {
            let copies = ctx.output.questions.iter().filter(|q| q.q_id == entry.q_id).count();
            match copies {
                0 => findings.push(Finding::error(
                    "missing_question",
                    Some(entry.q_id.as_str()),
                    "planned question has no output entry",
                )),
                1 => {}
                n => findings.push(Finding::error(
                    "duplicate_question",
                    Some(entry.q_id.as_str()),
                    format!("output contains {n} entries for this question"),
                )),
            }
        }
        if ctx.output.questions.len() < ctx.plan.questions.len() {
            findings.push(Finding::warning(
                "question_count",
                None,
                format!(
                    "output has {} questions, plan has {}",
                    ctx.output.questions.len(),
                    ctx.plan.questions.len()
                ),
            ));
        }
        findings
    }
}

pub struct ExtraQuestionRule;

impl ValidationRule for ExtraQuestionRule {
    fn name(&self) -> &'static str {
        "extra_question"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Finding> {
        ctx.output
            .questions
            .iter()
            .filter(|q| ctx.plan.entry(&q.q_id).is_none())
            .map(|q| Finding::error(self.name(), Some(q.q_id.as_str()), "question is not in the plan"))
            .collect()
    }
}

pub struct RepresentationRule;

impl ValidationRule for RepresentationRule {
    fn name(&self) -> &'static str {
        "representation_mismatch"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Finding> {
        ctx.matched()
            .filter(|(entry, q)| entry.representation != q.representation)
            .map(|(entry, q)| {
                Finding::error(
                    self.name(),
                    Some(q.q_id.as_str()),
                    format!("planned {}, got {}", entry.representation, q.representation),
                )
            })
            .collect()
    }
}

/// Model references of PICTORIAL_MODEL questions.
///
/// Unknown models and specs outside the candidate list are errors; a known
/// model the plan did not list is only a warning.
pub struct VisualReferenceRule;

impl ValidationRule for VisualReferenceRule {
    fn name(&self) -> &'static str {
        "visual_reference"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Finding> {
        let mut findings = vec![];
        for (entry, q) in ctx.matched() {
            if entry.representation != Representation::PictorialModel {
                continue;
            }
            let q_id = Some(q.q_id.as_str());
            if q.visual_model_ref.is_empty() {
                findings.push(Finding::error("visual_ref_missing", q_id, "no visual_model_ref given"));
            }
            for model in &q.visual_model_ref {
                if !ctx.registry.contains(model) {
                    findings.push(Finding::error(
                        "visual_ref_unknown",
                        q_id,
                        format!("'{model}' is not a registered visual model"),
                    ));
                } else if !entry.visual_model_refs.contains(model) {
                    findings.push(Finding::warning(
                        "visual_ref_not_planned",
                        q_id,
                        format!("'{model}' is not among the planned models {:?}", entry.visual_model_refs),
                    ));
                }
            }
            if let Some(spec) = &q.visual_spec {
                if !entry.visual_model_refs.contains(&spec.model_id) {
                    findings.push(Finding::error(
                        "visual_spec_model",
                        q_id,
                        format!("visual_spec model '{}' is not a planned candidate", spec.model_id),
                    ));
                }
            }
        }
        findings
    }
}

/// Numeric answers against the request's constraints.
pub struct NumericAnswerRule;

impl ValidationRule for NumericAnswerRule {
    fn name(&self) -> &'static str {
        "numeric_answer"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Finding> {
        let constraints = &ctx.plan.request.constraints;
        let mut findings = vec![];
        for (_, q) in ctx.matched() {
            let Some(value) = q.numeric_answer() else {
                continue;
            };
            let q_id = Some(q.q_id.as_str());
            if value < 0.0 && !constraints.allow_negative {
                findings.push(Finding::warning("negative_answer", q_id, format!("answer {value} is negative")));
            }
            if value.fract() != 0.0 && !constraints.allow_decimals {
                findings.push(Finding::error("decimal_answer", q_id, format!("answer {value} is not a whole number")));
            }
            if let Some(max) = constraints.max_number.filter(|m| value.abs() > *m as f64) {
                findings.push(Finding::warning(
                    "exceeds_max_number",
                    q_id,
                    format!("answer {value} exceeds max_number {max}"),
                ));
            }
        }
        findings
    }
}

/// Four options, a letter answer key, non-empty text.
pub struct MultipleChoiceRule;

impl ValidationRule for MultipleChoiceRule {
    fn name(&self) -> &'static str {
        "multiple_choice"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Finding> {
        let mut findings = vec![];
        for (_, q) in ctx.matched() {
            let q_id = Some(q.q_id.as_str());
            if q.question_text.trim().is_empty() {
                findings.push(Finding::error("question_text", q_id, "question text is empty"));
            }
            if q.options.len() != OPTION_COUNT {
                findings.push(Finding::error(
                    "option_count",
                    q_id,
                    format!("expected {OPTION_COUNT} options, got {}", q.options.len()),
                ));
            }
            if !ANSWER_KEYS.contains(&q.answer.trim()) {
                findings.push(Finding::error(
                    "answer_key",
                    q_id,
                    format!("answer '{}' is not one of {}", q.answer, ANSWER_KEYS.join(", ")),
                ));
            }
        }
        findings
    }
}

/// PICTORIAL_OBJECT questions draw only from the fixed asset pack.
pub struct PictorialObjectRule;

impl ValidationRule for PictorialObjectRule {
    fn name(&self) -> &'static str {
        "pictorial_object"
    }

    fn validate(&self, ctx: &ValidationContext<'_>) -> Vec<Finding> {
        let mut findings = vec![];
        for (_, q) in ctx.matched() {
            if q.representation != Representation::PictorialObject {
                continue;
            }
            let q_id = Some(q.q_id.as_str());
            if q.objects.is_empty() {
                findings.push(Finding::error("object_missing", q_id, "no objects to draw"));
            }
            for obj in &q.objects {
                if obj.shape == "circle" {
                    findings.push(Finding::error(
                        "object_shape",
                        q_id,
                        "generic 'circle' is not allowed; use 'simple_circle'",
                    ));
                } else if !ALLOWED_SHAPES.contains(&obj.shape.as_str()) {
                    findings.push(Finding::error(
                        "object_shape",
                        q_id,
                        format!("shape '{}' is not in the asset pack", obj.shape),
                    ));
                }
                if !ALLOWED_COLORS.contains(&obj.color.as_str()) {
                    findings.push(Finding::error(
                        "object_color",
                        q_id,
                        format!("color '{}' is not in the asset pack", obj.color),
                    ));
                }
                if obj.count == 0 {
                    findings.push(Finding::error("object_count", q_id, format!("'{}' has count 0", obj.shape)));
                }
            }
        }
        findings
    }
}

/// Validator orchestrates rules
pub struct OutputValidator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl OutputValidator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(PresenceRule),
                Box::new(ExtraQuestionRule),
                Box::new(RepresentationRule),
                Box::new(VisualReferenceRule),
                Box::new(NumericAnswerRule),
                Box::new(MultipleChoiceRule),
                Box::new(PictorialObjectRule),
            ],
        }
    }

    /// All findings, worksheet-level first, then by q_id.
    pub fn validate(
        &self,
        plan: &WorksheetPlan,
        output: &WorksheetOutput,
        registry: &ModelRegistry,
    ) -> Vec<Finding> {
        let ctx = ValidationContext { plan, output, registry };
        let mut findings: Vec<Finding> = self.rules.iter().flat_map(|rule| rule.validate(&ctx)).collect();
        findings.sort_by(|a, b| match (&a.q_id, &b.q_id) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(x), Some(y)) => q_id_order(x, y),
        });
        findings
    }
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::PlanAllocator;
    use crate::curriculum::CurriculumCatalog;
    use crate::models::{
        Difficulty, NumericConstraints, ObjectItem, RepresentationMode, RepresentationPreference, Severity,
        VisualSpec, WorksheetRequest,
    };
    use serde_json::json;

    fn plan(skill: &str, mode: RepresentationMode) -> WorksheetPlan {
        let request = WorksheetRequest {
            grade: 3,
            subject: "math".to_string(),
            skill_id: skill.to_string(),
            difficulty: Difficulty::L2,
            question_count: 5,
            representation_preference: RepresentationPreference::mode(mode),
            theme: None,
            locale: None,
            constraints: NumericConstraints { max_number: Some(100), ..Default::default() },
        };
        let registry = ModelRegistry::builtin();
        PlanAllocator::new(&registry)
            .plan(&request, &CurriculumCatalog::builtin())
            .unwrap()
    }

    fn answer_for(entry: &QuestionPlanEntry) -> OutputQuestion {
        let (refs, spec, objects) = match entry.representation {
            Representation::PictorialModel => (
                vec![entry.visual_model_refs[0].clone()],
                Some(VisualSpec::new(
                    entry.visual_model_refs[0].clone(),
                    json!({"rows": 3, "cols": 4}),
                )),
                vec![],
            ),
            Representation::PictorialObject => (
                vec![],
                None,
                vec![ObjectItem { shape: "star".into(), color: "red".into(), count: 4 }],
            ),
            _ => (vec![], None, vec![]),
        };
        OutputQuestion {
            q_id: entry.q_id.clone(),
            representation: entry.representation,
            visual_model_ref: refs,
            visual_spec: spec,
            question_text: "How many in all?".to_string(),
            options: vec!["10".into(), "12".into(), "14".into(), "7".into()],
            answer: "B".to_string(),
            answer_value: Some(json!(12)),
            explanation: Some("3 rows of 4 is 12.".to_string()),
            objects,
        }
    }

    fn output_for(plan: &WorksheetPlan) -> WorksheetOutput {
        WorksheetOutput {
            title: None,
            questions: plan.questions.iter().map(answer_for).collect(),
        }
    }

    fn checks(findings: &[Finding]) -> Vec<&str> {
        findings.iter().map(|f| f.check.as_str()).collect()
    }

    #[test]
    fn clean_output_has_no_findings() {
        let plan = plan("MUL-01", RepresentationMode::Mixed);
        let findings = OutputValidator::new().validate(&plan, &output_for(&plan), &ModelRegistry::builtin());
        assert!(findings.is_empty(), "{findings:?}");
    }

    #[test]
    fn extra_question_is_reported_once_and_alone() {
        let plan = plan("MUL-01", RepresentationMode::Mixed);
        let mut output = output_for(&plan);
        let mut extra = answer_for(&plan.questions[0]);
        extra.q_id = "Q99".to_string();
        extra.options.clear();
        output.questions.push(extra);

        let findings = OutputValidator::new().validate(&plan, &output, &ModelRegistry::builtin());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].check, "extra_question");
        assert_eq!(findings[0].q_id.as_deref(), Some("Q99"));
        assert_eq!(findings[0].severity, Severity::Error);
    }

    #[test]
    fn missing_and_mismatched_questions() {
        let plan = plan("MUL-01", RepresentationMode::Mixed);
        let mut output = output_for(&plan);
        output.questions.remove(0);
        let q = output.questions.iter_mut().find(|q| q.representation == Representation::WordProblem).unwrap();
        q.representation = Representation::Numeric;

        let findings = OutputValidator::new().validate(&plan, &output, &ModelRegistry::builtin());
        let found = checks(&findings);
        assert!(found.contains(&"missing_question"));
        assert!(found.contains(&"representation_mismatch"));
        assert!(found.contains(&"question_count"));
    }

    #[test]
    fn visual_refs_outside_candidates_warn_but_unknown_models_fail() {
        let plan = plan("SUB-02", RepresentationMode::ModelHeavy);
        let mut output = output_for(&plan);
        let pm = output
            .questions
            .iter_mut()
            .find(|q| q.representation == Representation::PictorialModel)
            .unwrap();
        pm.visual_model_ref = vec!["ARRAYS".into(), "PIE_CHART".into()];
        pm.visual_spec = Some(VisualSpec::new("ARRAYS", json!({"rows": 2, "cols": 2})));

        let findings = OutputValidator::new().validate(&plan, &output, &ModelRegistry::builtin());
        let not_planned = findings.iter().find(|f| f.check == "visual_ref_not_planned").unwrap();
        assert_eq!(not_planned.severity, Severity::Warning);
        let found = checks(&findings);
        assert!(found.contains(&"visual_ref_unknown"));
        assert!(found.contains(&"visual_spec_model"));
    }

    #[test]
    fn numeric_constraints_and_choice_shape() {
        let plan = plan("ADD-01", RepresentationMode::NumericOnly);
        let mut output = output_for(&plan);
        output.questions[0].answer_value = Some(json!(-3));
        output.questions[1].answer_value = Some(json!("2.5"));
        output.questions[2].answer_value = Some(json!(250));
        output.questions[3].answer = "E".to_string();
        output.questions[3].options.pop();
        output.questions[4].question_text = "  ".to_string();

        let findings = OutputValidator::new().validate(&plan, &output, &ModelRegistry::builtin());
        let by_check = |c: &str| findings.iter().find(|f| f.check == c).unwrap();
        assert_eq!(by_check("negative_answer").severity, Severity::Warning);
        assert_eq!(by_check("decimal_answer").severity, Severity::Error);
        assert_eq!(by_check("exceeds_max_number").q_id.as_deref(), Some("Q3"));
        assert_eq!(by_check("answer_key").q_id.as_deref(), Some("Q4"));
        assert_eq!(by_check("option_count").q_id.as_deref(), Some("Q4"));
        assert_eq!(by_check("question_text").q_id.as_deref(), Some("Q5"));
    }

    #[test]
    fn object_allow_list() {
        let plan = plan("NUM-01", RepresentationMode::Auto);
        let mut output = output_for(&plan);
        let q = output
            .questions
            .iter_mut()
            .find(|q| q.representation == Representation::PictorialObject)
            .unwrap();
        q.objects = vec![
            ObjectItem { shape: "circle".into(), color: "red".into(), count: 2 },
            ObjectItem { shape: "dragon".into(), color: "teal".into(), count: 0 },
        ];
        let findings = OutputValidator::new().validate(&plan, &output, &ModelRegistry::builtin());
        let found = checks(&findings);
        assert_eq!(found.iter().filter(|c| **c == "object_shape").count(), 2);
        assert!(found.contains(&"object_color"));
        assert!(found.contains(&"object_count"));
        assert!(findings.iter().any(|f| f.message.contains("simple_circle")));
    }
}
