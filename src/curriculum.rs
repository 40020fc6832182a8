//! Curriculum Node Resolver
//!
//! Maps a skill id to its static node descriptor. Loaded once, read-only.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::error::{Result, WorksheetError};
use crate::models::{CurriculumNode, Representation};
use crate::registry::{ARRAYS, BASE_TEN_REGROUPING, FRACTION_SHAPES, FRACTION_STRIPS, NUMBER_LINE};

#[derive(Debug, Clone)]
pub struct CurriculumCatalog {
    nodes: BTreeMap<String, CurriculumNode>,
}

fn node(
    skill_id: &str,
    skill_name: &str,
    category: &str,
    default_representation: Representation,
    allowed: &[Representation],
    models: &[&str],
) -> CurriculumNode {
    CurriculumNode {
        skill_id: skill_id.to_string(),
        skill_name: skill_name.to_string(),
        category: category.to_string(),
        default_representation,
        allowed_representation_kinds: allowed.iter().copied().collect::<BTreeSet<_>>(),
        visual_model_refs: models.iter().map(|m| m.to_string()).collect(),
    }
}

impl CurriculumCatalog {
    pub fn empty() -> Self {
        Self { nodes: BTreeMap::new() }
    }

    pub fn builtin() -> Self {
        use Representation::*;

        let mut catalog = Self::empty();
        for n in [
            node(
                "ADD-01",
                "Addition within 100",
                "operations",
                Numeric,
                &[Numeric, WordProblem, PictorialObject],
                &[],
            ),
            node(
                "SUB-02",
                "Subtraction with regrouping within 1000",
                "operations",
                Numeric,
                &[Numeric, WordProblem, PictorialModel],
                &[BASE_TEN_REGROUPING, NUMBER_LINE],
            ),
            node(
                "MUL-01",
                "Multiplication as arrays and equal groups",
                "operations",
                PictorialModel,
                &[Numeric, WordProblem, PictorialModel, PictorialObject],
                &[ARRAYS],
            ),
            node(
                "FRAC-01",
                "Fractions of a whole",
                "fractions",
                PictorialModel,
                &[Numeric, WordProblem, PictorialModel],
                &[FRACTION_STRIPS, FRACTION_SHAPES, NUMBER_LINE],
            ),
            node(
                "NUM-01",
                "Counting objects to 20",
                "number_sense",
                PictorialObject,
                &[Numeric, PictorialObject],
                &[],
            ),
            node(
                "NUM-03",
                "Rounding to the nearest ten and hundred",
                "number_sense",
                Numeric,
                &[Numeric, WordProblem, PictorialModel],
                &[NUMBER_LINE],
            ),
        ] {
            catalog.nodes.insert(n.skill_id.clone(), n);
        }
        catalog
    }

    /// Built-in nodes overlaid with a JSON array of nodes from `path`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| WorksheetError::io_at("reading curriculum file", path, e))?;
        let nodes: Vec<CurriculumNode> = serde_json::from_str(&content)?;
        let mut catalog = Self::builtin();
        for n in nodes {
            catalog.register(n)?;
        }
        Ok(catalog)
    }

    pub fn register(&mut self, node: CurriculumNode) -> Result<()> {
        node.validate()?;
        self.nodes.insert(node.skill_id.clone(), node);
        Ok(())
    }

    /// Look up a skill. Unknown ids are a configuration error.
    pub fn resolve(&self, skill_id: &str) -> Result<&CurriculumNode> {
        self.nodes
            .get(skill_id)
            .ok_or_else(|| WorksheetError::Configuration(format!("unknown skill_id '{skill_id}'")))
    }

    pub fn skill_ids(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }
}

impl Default for CurriculumCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
