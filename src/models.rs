//! Data Model - plans, requests, populated output and findings
//!
//! Every value here is created once by one stage and read by the next; none
//! of them is mutated after construction.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, WorksheetError};

pub const MIN_QUESTIONS: usize = 5;
pub const MAX_QUESTIONS: usize = 30;

/// Question category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Representation {
    Numeric,
    WordProblem,
    PictorialModel,
    PictorialObject,
}

impl Representation {
    /// Slot emission order for mode-based plans.
    pub const CANONICAL_ORDER: [Representation; 4] = [
        Representation::Numeric,
        Representation::WordProblem,
        Representation::PictorialModel,
        Representation::PictorialObject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "NUMERIC",
            Self::WordProblem => "WORD_PROBLEM",
            Self::PictorialModel => "PICTORIAL_MODEL",
            Self::PictorialObject => "PICTORIAL_OBJECT",
        }
    }

    pub fn is_pictorial(self) -> bool {
        matches!(self, Self::PictorialModel | Self::PictorialObject)
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Representation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::CANONICAL_ORDER
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown representation '{s}'"))
    }
}

/// A representation as requested by a caller or a weight table, before
/// resolution against a curriculum node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RequestedKind {
    /// `__DEFAULT__`: the node's default representation
    NodeDefault,
    Kind(Representation),
}

pub const DEFAULT_PLACEHOLDER: &str = "__DEFAULT__";

impl TryFrom<String> for RequestedKind {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for RequestedKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim() == DEFAULT_PLACEHOLDER {
            Ok(Self::NodeDefault)
        } else {
            s.parse().map(Self::Kind)
        }
    }
}

impl From<RequestedKind> for String {
    fn from(kind: RequestedKind) -> Self {
        match kind {
            RequestedKind::NodeDefault => DEFAULT_PLACEHOLDER.to_string(),
            RequestedKind::Kind(r) => r.as_str().to_string(),
        }
    }
}

impl fmt::Display for RequestedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(*self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
    L1,
    L2,
    L3,
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L1" => Ok(Self::L1),
            "L2" => Ok(Self::L2),
            "L3" => Ok(Self::L3),
            other => Err(format!("unknown difficulty '{other}' (expected L1, L2 or L3)")),
        }
    }
}

/// How the question count is split across representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepresentationMode {
    Auto,
    ModelHeavy,
    WordHeavy,
    NumericOnly,
    ObjectAllowed,
    Mixed,
}

impl RepresentationMode {
    pub const ALL: [RepresentationMode; 6] = [
        Self::Auto,
        Self::ModelHeavy,
        Self::WordHeavy,
        Self::NumericOnly,
        Self::ObjectAllowed,
        Self::Mixed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::ModelHeavy => "MODEL_HEAVY",
            Self::WordHeavy => "WORD_HEAVY",
            Self::NumericOnly => "NUMERIC_ONLY",
            Self::ObjectAllowed => "OBJECT_ALLOWED",
            Self::Mixed => "MIXED",
        }
    }
}

impl FromStr for RepresentationMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown representation mode '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepresentationPreference {
    pub mode: RepresentationMode,
    /// Explicit per-slot sequence; replaces the mode's weight table when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Vec<RequestedKind>>,
}

impl RepresentationPreference {
    pub fn mode(mode: RepresentationMode) -> Self {
        Self { mode, overrides: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumericConstraints {
    #[serde(default)]
    pub allow_negative: bool,
    #[serde(default)]
    pub allow_decimals: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetRequest {
    pub grade: u8,
    pub subject: String,
    pub skill_id: String,
    pub difficulty: Difficulty,
    pub question_count: usize,
    pub representation_preference: RepresentationPreference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default)]
    pub constraints: NumericConstraints,
}

impl WorksheetRequest {
    /// Range checks that must pass before allocation starts.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&self.question_count) {
            return Err(WorksheetError::InvalidRequest(format!(
                "question_count {} outside [{}, {}]",
                self.question_count, MIN_QUESTIONS, MAX_QUESTIONS
            )));
        }
        if self.skill_id.trim().is_empty() {
            return Err(WorksheetError::InvalidRequest("skill_id is empty".to_string()));
        }
        Ok(())
    }
}

/// Static descriptor of one curriculum skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumNode {
    pub skill_id: String,
    pub skill_name: String,
    pub category: String,
    pub default_representation: Representation,
    #[serde(alias = "allowed_representation_mix")]
    pub allowed_representation_kinds: BTreeSet<Representation>,
    #[serde(default)]
    pub visual_model_refs: Vec<String>,
}

impl CurriculumNode {
    pub fn allows(&self, representation: Representation) -> bool {
        self.allowed_representation_kinds.contains(&representation)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.allows(self.default_representation) {
            return Err(WorksheetError::Configuration(format!(
                "node {}: default representation {} is not in its allowed kinds",
                self.skill_id, self.default_representation
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionPlanEntry {
    pub q_id: String,
    pub representation: Representation,
    #[serde(rename = "visual_model_ref", default)]
    pub visual_model_refs: Vec<String>,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub rules: Vec<String>,
}

/// The resolved, ordered list of question slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorksheetPlan {
    pub request: WorksheetRequest,
    pub node: CurriculumNode,
    pub questions: Vec<QuestionPlanEntry>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl WorksheetPlan {
    pub fn entry(&self, q_id: &str) -> Option<&QuestionPlanEntry> {
        self.questions.iter().find(|q| q.q_id == q_id)
    }

    /// Number of slots per representation.
    pub fn counts(&self) -> BTreeMap<Representation, usize> {
        let mut counts = BTreeMap::new();
        for q in &self.questions {
            *counts.entry(q.representation).or_insert(0) += 1;
        }
        counts
    }

    /// SHA-256 over the canonical JSON form.
    pub fn fingerprint(&self) -> Result<String> {
        Ok(crate::hashing::content_fingerprint(self)?)
    }
}

/// Model identifier plus its drawing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualSpec {
    pub model_id: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl VisualSpec {
    pub fn new(model_id: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        Self {
            model_id: model_id.into(),
            params,
        }
    }
}

/// One drawable item of a PICTORIAL_OBJECT question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectItem {
    pub shape: String,
    pub color: String,
    #[serde(default = "default_object_count")]
    pub count: u32,
}

fn default_object_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputQuestion {
    pub q_id: String,
    pub representation: Representation,
    #[serde(default)]
    pub visual_model_ref: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_spec: Option<VisualSpec>,
    #[serde(default)]
    pub question_text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<ObjectItem>,
}

impl OutputQuestion {
    /// The answer value as a number, when it is one.
    pub fn numeric_answer(&self) -> Option<f64> {
        match self.answer_value.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Populated content produced by the external generator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorksheetOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub questions: Vec<OutputQuestion>,
}

impl WorksheetOutput {
    pub fn question(&self, q_id: &str) -> Option<&OutputQuestion> {
        self.questions.iter().find(|q| q.q_id == q_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
}

/// Structured finding produced by the validator, the render stage or the
/// self-check. Accumulated, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub check: String,
    pub q_id: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl Finding {
    pub fn error(check: &str, q_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            q_id: q_id.map(str::to_string),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(check: &str, q_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            q_id: q_id.map(str::to_string),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        match &self.q_id {
            Some(q) => write!(f, "{severity} [{q}] {}: {}", self.check, self.message),
            None => write!(f, "{severity} {}: {}", self.check, self.message),
        }
    }
}

pub fn has_errors(findings: &[Finding]) -> bool {
    findings.iter().any(Finding::is_error)
}

/// Natural ordering of question ids: alphabetic prefix, then numeric suffix,
/// so `Q2` sorts before `Q10`.
pub fn q_id_order(a: &str, b: &str) -> Ordering {
    let (pa, na) = split_q_id(a);
    let (pb, nb) = split_q_id(b);
    pa.cmp(pb).then(na.cmp(&nb)).then(a.cmp(b))
}

fn split_q_id(q_id: &str) -> (&str, Option<u64>) {
    let digits = q_id
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);
    match digits {
        Some(i) => (&q_id[..i], q_id[i..].parse().ok()),
        None => (q_id, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_kind_parses_placeholder() {
        assert_eq!("__DEFAULT__".parse::<RequestedKind>().unwrap(), RequestedKind::NodeDefault);
        assert_eq!(
            "word_problem".parse::<RequestedKind>().unwrap(),
            RequestedKind::Kind(Representation::WordProblem)
        );
        assert!("DIAGRAM".parse::<RequestedKind>().is_err());
    }

    #[test]
    fn representation_serializes_uppercase() {
        let json = serde_json::to_string(&Representation::PictorialModel).unwrap();
        assert_eq!(json, "\"PICTORIAL_MODEL\"");
        let kind: RequestedKind = serde_json::from_str("\"__DEFAULT__\"").unwrap();
        assert_eq!(kind, RequestedKind::NodeDefault);
    }

    #[test]
    fn q_ids_sort_naturally() {
        let mut ids = vec!["Q10", "Q2", "Q1", "Q21", "Q3"];
        ids.sort_by(|a, b| q_id_order(a, b));
        assert_eq!(ids, vec!["Q1", "Q2", "Q3", "Q10", "Q21"]);
    }

    #[test]
    fn finding_display_includes_question() {
        let f = Finding::error("extra_question", Some("Q9"), "not in plan");
        assert_eq!(f.to_string(), "ERROR [Q9] extra_question: not in plan");
        let w = Finding::warning("downgrade", None, "x");
        assert_eq!(w.to_string(), "WARNING downgrade: x");
    }

    #[test]
    fn numeric_answer_accepts_strings() {
        let q = OutputQuestion {
            q_id: "Q1".into(),
            representation: Representation::Numeric,
            visual_model_ref: vec![],
            visual_spec: None,
            question_text: "2+2".into(),
            options: vec![],
            answer: "A".into(),
            answer_value: Some(Value::String(" 4 ".into())),
            explanation: None,
            objects: vec![],
        };
        assert_eq!(q.numeric_answer(), Some(4.0));
    }
}
