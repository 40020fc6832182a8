//! Plan Allocator - deterministic split of a question count across representations
//!
//! No randomness anywhere: identical request + node + registry always yield a
//! byte-identical plan. Seats are assigned with largest-remainder rounding over
//! exact integer quotas, ties going to the earlier weight-table entry.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::curriculum::CurriculumCatalog;
use crate::error::{Result, WorksheetError};
use crate::models::{
    CurriculumNode, Difficulty, QuestionPlanEntry, Representation, RepresentationMode,
    RequestedKind, WorksheetPlan, WorksheetRequest,
};
use crate::registry::ModelRegistry;

pub const RULE_VISUAL_MATCHES_MODEL: &str = "visual must match model parameters";
pub const RULE_FIXED_ASSET_PACK: &str = "must use the fixed asset pack only";
pub const RULE_EXPLICIT_SHAPE_COLOR: &str = "shape/color must be explicit and drawn from the allow-list";
pub const RULE_MULTI_STEP: &str = "allow multi-step reasoning";

/// Fixed weight table of a mode, in tie-break order.
///
/// `Mixed` has no fixed table; it depends on the node (see [`PlanAllocator`]).
pub fn mode_weights(mode: RepresentationMode) -> Vec<(RequestedKind, u32)> {
    use Representation::*;
    use RequestedKind::{Kind, NodeDefault};

    match mode {
        RepresentationMode::Auto => vec![(NodeDefault, 50), (Kind(Numeric), 25), (Kind(WordProblem), 25)],
        RepresentationMode::ModelHeavy => {
            vec![(Kind(PictorialModel), 70), (Kind(Numeric), 15), (Kind(WordProblem), 15)]
        }
        RepresentationMode::WordHeavy => {
            vec![(Kind(WordProblem), 70), (Kind(Numeric), 15), (Kind(PictorialModel), 15)]
        }
        RepresentationMode::NumericOnly => vec![(Kind(Numeric), 100)],
        RepresentationMode::ObjectAllowed => vec![
            (Kind(PictorialObject), 30),
            (Kind(PictorialModel), 30),
            (Kind(Numeric), 20),
            (Kind(WordProblem), 20),
        ],
        RepresentationMode::Mixed => vec![],
    }
}

/// Largest-remainder apportionment of `count` seats over `weights`.
///
/// Floors every exact quota, then hands the leftover seats one at a time to
/// the largest fractional remainders; equal remainders go to the lower index.
/// The result always sums to `count` when at least one weight is positive.
pub fn allocate_seats(weights: &[u32], count: usize) -> Vec<usize> {
    let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
    if total == 0 {
        return vec![0; weights.len()];
    }

    let count64 = count as u64;
    let mut seats: Vec<usize> = weights
        .iter()
        .map(|w| (u64::from(*w) * count64 / total) as usize)
        .collect();
    let remainders: Vec<u64> = weights
        .iter()
        .map(|w| u64::from(*w) * count64 % total)
        .collect();

    let assigned: usize = seats.iter().sum();
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|a, b| remainders[*b].cmp(&remainders[*a]).then(a.cmp(b)));
    for idx in order.into_iter().take(count - assigned) {
        seats[idx] += 1;
    }
    seats
}

/// Default rule tags attached to every slot.
pub fn default_rules(representation: Representation, request: &WorksheetRequest) -> Vec<String> {
    let mut rules: Vec<String> = match representation {
        Representation::Numeric => vec!["answer must be a single number".to_string()],
        Representation::WordProblem => vec![
            "use a short real-world context".to_string(),
            "answer must follow from the story".to_string(),
        ],
        Representation::PictorialModel => vec![RULE_VISUAL_MATCHES_MODEL.to_string()],
        Representation::PictorialObject => vec![
            RULE_FIXED_ASSET_PACK.to_string(),
            RULE_EXPLICIT_SHAPE_COLOR.to_string(),
        ],
    };
    if let Some(max) = request.constraints.max_number {
        rules.push(format!("numbers must not exceed {max}"));
    }
    if request.difficulty == Difficulty::L3 {
        rules.push(RULE_MULTI_STEP.to_string());
    }
    rules
}

/// Turns a request and its node into a plan.
pub struct PlanAllocator<'a> {
    registry: &'a ModelRegistry,
}

struct Resolution<'n> {
    node: &'n CurriculumNode,
    candidates: Vec<String>,
}

impl Resolution<'_> {
    /// PICTORIAL_MODEL is only usable when something can draw it.
    fn allows(&self, representation: Representation) -> bool {
        self.node.allows(representation)
            && (representation != Representation::PictorialModel || !self.candidates.is_empty())
    }

    fn resolve(&self, kind: RequestedKind) -> (Representation, bool) {
        match kind {
            RequestedKind::NodeDefault => (self.node.default_representation, false),
            RequestedKind::Kind(r) if self.allows(r) => (r, false),
            RequestedKind::Kind(_) => (self.node.default_representation, true),
        }
    }
}

impl<'a> PlanAllocator<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self { registry }
    }

    /// Resolve the request's skill in `catalog`, then allocate.
    pub fn plan(&self, request: &WorksheetRequest, catalog: &CurriculumCatalog) -> Result<WorksheetPlan> {
        request.validate()?;
        let node = catalog.resolve(&request.skill_id)?;
        self.allocate(request, node)
    }

    pub fn allocate(&self, request: &WorksheetRequest, node: &CurriculumNode) -> Result<WorksheetPlan> {
        request.validate()?;
        node.validate()?;
        if request.skill_id != node.skill_id {
            return Err(WorksheetError::Configuration(format!(
                "request skill '{}' does not match node '{}'",
                request.skill_id, node.skill_id
            )));
        }

        let mut candidates: Vec<String> = Vec::new();
        for model in &node.visual_model_refs {
            if self.registry.contains(model) && !candidates.contains(model) {
                candidates.push(model.clone());
            }
        }
        let resolution = Resolution { node, candidates };
        if !resolution.allows(node.default_representation) {
            return Err(WorksheetError::Configuration(format!(
                "node {}: default PICTORIAL_MODEL has no registered visual model",
                node.skill_id
            )));
        }

        let mut warnings = Vec::new();
        let slots = match &request.representation_preference.overrides {
            Some(sequence) => self.override_slots(request, &resolution, sequence, &mut warnings),
            None => self.mode_slots(request, &resolution, &mut warnings),
        };

        let questions: Vec<QuestionPlanEntry> = slots
            .into_iter()
            .enumerate()
            .map(|(i, representation)| QuestionPlanEntry {
                q_id: format!("Q{}", i + 1),
                representation,
                visual_model_refs: if representation == Representation::PictorialModel {
                    resolution.candidates.clone()
                } else {
                    vec![]
                },
                difficulty: request.difficulty,
                rules: default_rules(representation, request),
            })
            .collect();

        for w in &warnings {
            warn!(skill = %node.skill_id, "{}", w);
        }
        info!(
            skill = %node.skill_id,
            count = questions.len(),
            mode = request.representation_preference.mode.as_str(),
            warnings = warnings.len(),
            "Allocated worksheet plan"
        );

        Ok(WorksheetPlan {
            request: request.clone(),
            node: node.clone(),
            questions,
            warnings,
        })
    }

    fn mode_slots(
        &self,
        request: &WorksheetRequest,
        resolution: &Resolution<'_>,
        warnings: &mut Vec<String>,
    ) -> Vec<Representation> {
        let mode = request.representation_preference.mode;
        let table: Vec<(RequestedKind, u32)> = match mode {
            RepresentationMode::Mixed => Representation::CANONICAL_ORDER
                .into_iter()
                .filter(|r| resolution.allows(*r))
                .map(|r| (RequestedKind::Kind(r), 1))
                .collect(),
            _ => mode_weights(mode),
        };

        let weights: Vec<u32> = table.iter().map(|(_, w)| *w).collect();
        let seats = allocate_seats(&weights, request.question_count);

        let mut per_type: BTreeMap<Representation, usize> = BTreeMap::new();
        for ((kind, _), n) in table.iter().zip(seats) {
            let (representation, downgraded) = resolution.resolve(*kind);
            if downgraded && n > 0 {
                warnings.push(format!(
                    "{} mode: {} is not allowed for {}; {} slot(s) use {}",
                    mode.as_str(),
                    kind,
                    resolution.node.skill_id,
                    n,
                    representation
                ));
            }
            *per_type.entry(representation).or_insert(0) += n;
        }

        Representation::CANONICAL_ORDER
            .into_iter()
            .flat_map(|r| std::iter::repeat(r).take(per_type.get(&r).copied().unwrap_or(0)))
            .collect()
    }

    fn override_slots(
        &self,
        request: &WorksheetRequest,
        resolution: &Resolution<'_>,
        sequence: &[RequestedKind],
        warnings: &mut Vec<String>,
    ) -> Vec<Representation> {
        let count = request.question_count;
        let mut slots: Vec<Representation> = sequence
            .iter()
            .take(count)
            .enumerate()
            .map(|(i, kind)| {
                let (representation, downgraded) = resolution.resolve(*kind);
                if downgraded {
                    warnings.push(format!(
                        "slot {}: {} is not allowed for {}; using {}",
                        i + 1,
                        kind,
                        resolution.node.skill_id,
                        representation
                    ));
                }
                representation
            })
            .collect();

        if sequence.len() > count {
            warnings.push(format!(
                "override sequence has {} entries; only the first {} are used",
                sequence.len(),
                count
            ));
        }
        if slots.len() < count {
            warnings.push(format!(
                "override sequence has {} entries; padded with {} to {}",
                slots.len(),
                resolution.node.default_representation,
                count
            ));
            slots.resize(count, resolution.node.default_representation);
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NumericConstraints, RepresentationPreference};

    fn request(skill: &str, count: usize, mode: RepresentationMode) -> WorksheetRequest {
        WorksheetRequest {
            grade: 3,
            subject: "math".to_string(),
            skill_id: skill.to_string(),
            difficulty: Difficulty::L2,
            question_count: count,
            representation_preference: RepresentationPreference::mode(mode),
            theme: None,
            locale: None,
            constraints: NumericConstraints::default(),
        }
    }

    #[test]
    fn seats_use_largest_remainder_with_table_order_ties() {
        assert_eq!(allocate_seats(&[70, 15, 15], 10), vec![7, 2, 1]);
        assert_eq!(allocate_seats(&[70, 15, 15], 5), vec![3, 1, 1]);
        assert_eq!(allocate_seats(&[1, 1, 1], 5), vec![2, 2, 1]);
        assert_eq!(allocate_seats(&[30, 30, 20, 20], 7), vec![2, 2, 2, 1]);
        assert_eq!(allocate_seats(&[100], 13), vec![13]);
    }

    #[test]
    fn model_heavy_sub02_matches_documented_split() {
        let registry = ModelRegistry::builtin();
        let catalog = CurriculumCatalog::builtin();
        let plan = PlanAllocator::new(&registry)
            .plan(&request("SUB-02", 10, RepresentationMode::ModelHeavy), &catalog)
            .unwrap();

        let counts = plan.counts();
        assert_eq!(counts[&Representation::PictorialModel], 7);
        assert_eq!(counts[&Representation::Numeric], 2);
        assert_eq!(counts[&Representation::WordProblem], 1);
        assert!(plan.warnings.is_empty());

        // canonical order: numeric first, then word problems, then models
        let order: Vec<_> = plan.questions.iter().map(|q| q.representation).collect();
        assert_eq!(order[0], Representation::Numeric);
        assert_eq!(order[2], Representation::WordProblem);
        assert_eq!(order[9], Representation::PictorialModel);
        assert_eq!(plan.questions[9].visual_model_refs, vec!["BASE_TEN_REGROUPING", "NUMBER_LINE"]);
        assert_eq!(plan.questions[9].rules, vec![RULE_VISUAL_MATCHES_MODEL]);
    }

    #[test]
    fn disallowed_type_is_downgraded_with_warning() {
        let registry = ModelRegistry::builtin();
        let catalog = CurriculumCatalog::builtin();
        // ADD-01 has no visual models
        let plan = PlanAllocator::new(&registry)
            .plan(&request("ADD-01", 10, RepresentationMode::ModelHeavy), &catalog)
            .unwrap();

        let counts = plan.counts();
        assert!(!counts.contains_key(&Representation::PictorialModel));
        assert_eq!(counts[&Representation::Numeric], 9);
        assert_eq!(counts[&Representation::WordProblem], 1);
        assert_eq!(plan.warnings.len(), 1);
        assert!(plan.warnings[0].contains("PICTORIAL_MODEL"));
    }

    #[test]
    fn overrides_keep_order_and_pad_with_default() {
        let registry = ModelRegistry::builtin();
        let catalog = CurriculumCatalog::builtin();
        let mut req = request("SUB-02", 5, RepresentationMode::Auto);
        req.representation_preference.overrides = Some(vec![
            RequestedKind::Kind(Representation::PictorialModel),
            RequestedKind::Kind(Representation::PictorialObject),
            RequestedKind::NodeDefault,
        ]);

        let plan = PlanAllocator::new(&registry).plan(&req, &catalog).unwrap();
        let order: Vec<_> = plan.questions.iter().map(|q| q.representation).collect();
        assert_eq!(
            order,
            vec![
                Representation::PictorialModel,
                Representation::Numeric,
                Representation::Numeric,
                Representation::Numeric,
                Representation::Numeric,
            ]
        );
        assert!(plan.warnings.iter().any(|w| w.starts_with("slot 2")));
        assert!(plan.warnings.iter().any(|w| w.contains("padded")));
    }

    #[test]
    fn l3_adds_multi_step_rule() {
        let registry = ModelRegistry::builtin();
        let catalog = CurriculumCatalog::builtin();
        let mut req = request("MUL-01", 6, RepresentationMode::ObjectAllowed);
        req.difficulty = Difficulty::L3;
        let plan = PlanAllocator::new(&registry).plan(&req, &catalog).unwrap();
        assert!(plan.questions.iter().all(|q| q.rules.iter().any(|r| r == RULE_MULTI_STEP)));
        let object = plan
            .questions
            .iter()
            .find(|q| q.representation == Representation::PictorialObject)
            .unwrap();
        assert!(object.rules.iter().any(|r| r == RULE_FIXED_ASSET_PACK));
        assert!(object.visual_model_refs.is_empty());
    }

    #[test]
    fn count_out_of_range_fails_before_allocation() {
        let registry = ModelRegistry::builtin();
        let catalog = CurriculumCatalog::builtin();
        let err = PlanAllocator::new(&registry)
            .plan(&request("SUB-02", 31, RepresentationMode::Auto), &catalog)
            .unwrap_err();
        assert!(matches!(err, WorksheetError::InvalidRequest(_)));

        let err = PlanAllocator::new(&registry)
            .plan(&request("NOPE-1", 10, RepresentationMode::Auto), &catalog)
            .unwrap_err();
        assert!(matches!(err, WorksheetError::Configuration(_)));
    }

    #[test]
    fn unregistered_models_make_pictorial_model_unavailable() {
        let registry = ModelRegistry::empty();
        let catalog = CurriculumCatalog::builtin();
        let plan = PlanAllocator::new(&registry)
            .plan(&request("SUB-02", 10, RepresentationMode::ModelHeavy), &catalog)
            .unwrap();
        assert!(!plan.counts().contains_key(&Representation::PictorialModel));

        // FRAC-01 defaults to PICTORIAL_MODEL, which nothing can draw here
        let err = PlanAllocator::new(&registry)
            .plan(&request("FRAC-01", 10, RepresentationMode::Auto), &catalog)
            .unwrap_err();
        assert!(matches!(err, WorksheetError::Configuration(_)));
    }
}
