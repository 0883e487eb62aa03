//! Configuration describing which sheets are merged, which are duplicated,
//! and which cleanup rules apply.
//!
//! The built-in [`SheetPlan::default`] carries the production sheet lists. A
//! JSON file may override any subset of the fields.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolError};

/// Rows preceding the header row in every source sheet.
pub const DEFAULT_HEADER_ROWS: usize = 8;

const MERGED_SHEETS: &[&str] = &[
    "ACTUALS_FOR_VISUALIZATION",
    "ACTUARIAL_AOM_IMPACT",
    "CF_T1_PVFC_LIC_CLO",
    "CF_T1_PVFC_LIC_INCEXP_LIC_INCR",
    "CF_T1_PVFC_LIC_INCLAIM_LIC_INCR",
    "CURVE_ID_PARAM",
    "INITIALIZATION",
    "MANDATORY_ACTUALS",
    "MP_GOC",
    "MP_GOC_SEG",
    "OCI_OPTION_DERECOG",
    "CF_T1_PVFC_LIC_CLO_FADJ_PY",
    "CF_T1_PVFC_LIC_OP",
    "CF_T1_PVFC_LIC_TEXPVAR_PY",
];

const GROUPS: &[(&str, &[&str])] = &[
    (
        "CF_T1_PVFC_LIC_CLO_FADJ_PY",
        &[
            "CF_T1_PVFC_LIC_CLO_TADJ_PY",
            "CF_T1_PVFC_LIC_DEREC",
            "CF_T1_PVFC_LIC_EXPCLO_PY",
        ],
    ),
    (
        "CF_T1_PVFC_LIC_OP",
        &["CF_T1_PVFC_LIC_OP_FADJ_PY", "CF_T1_PVFC_LIC_OP_TADJ_PY"],
    ),
    (
        "CF_T1_PVFC_LIC_TEXPVAR_PY",
        &[
            "CF_T1_PVFC_LIC_TASSCHG_PY",
            "CF_T1_PVFC_LIC_FASSCHG_PY",
            "CF_T1_PVFC_LIC_FEXPVAR_PY",
        ],
    ),
];

/// A set of sheet names whose output is copied from the first one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetGroup {
    /// Sheet whose merged output is reused.
    pub source: String,
    /// Names saved as byte-for-byte copies of `source`.
    pub copies: Vec<String>,
}

/// Removes one column from one output sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDrop {
    pub sheet: String,
    pub column: String,
}

/// Heuristic used to decide whether a column should be treated as numeric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericPolicy {
    /// Minimum share of numeric-looking values among the sampled ones.
    pub threshold: f64,
    /// Number of non-blank values inspected per column.
    pub sample_size: usize,
}

impl Default for NumericPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            sample_size: 1000,
        }
    }
}

/// Full description of a processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetPlan {
    pub header_rows: usize,
    /// Sheets read from every upload and concatenated.
    pub merged_sheets: Vec<String>,
    pub groups: Vec<SheetGroup>,
    pub column_drops: Vec<ColumnDrop>,
    pub numeric: NumericPolicy,
    /// Report sheets that are absent from an upload instead of skipping them
    /// silently.
    pub report_missing_sheets: bool,
}

impl Default for SheetPlan {
    fn default() -> Self {
        Self {
            header_rows: DEFAULT_HEADER_ROWS,
            merged_sheets: MERGED_SHEETS.iter().map(|name| name.to_string()).collect(),
            groups: GROUPS
                .iter()
                .map(|(source, copies)| SheetGroup {
                    source: source.to_string(),
                    copies: copies.iter().map(|name| name.to_string()).collect(),
                })
                .collect(),
            column_drops: vec![ColumnDrop {
                sheet: "ACTUARIAL_AOM_IMPACT".to_string(),
                column: "* MACRO_STEP_ID_DESCRIPTION".to_string(),
            }],
            numeric: NumericPolicy::default(),
            report_missing_sheets: false,
        }
    }
}

impl SheetPlan {
    /// Loads a plan from a JSON file and validates it. Missing fields fall back
    /// to the built-in plan.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let data = fs::read_to_string(path)?;
        let plan: SheetPlan = serde_json::from_str(&data)?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.numeric.threshold) {
            return Err(ToolError::InvalidPlan(format!(
                "numeric threshold {} is outside 0..=1",
                self.numeric.threshold
            )));
        }
        if self.numeric.sample_size == 0 {
            return Err(ToolError::InvalidPlan(
                "numeric sample size must be positive".into(),
            ));
        }

        let merged: HashSet<&str> = self.merged_sheets.iter().map(String::as_str).collect();
        let mut copies: HashSet<&str> = HashSet::new();
        for group in &self.groups {
            if !merged.contains(group.source.as_str()) {
                return Err(ToolError::InvalidPlan(format!(
                    "group source '{}' is not a merged sheet",
                    group.source
                )));
            }
            for copy in &group.copies {
                if merged.contains(copy.as_str()) {
                    return Err(ToolError::InvalidPlan(format!(
                        "sheet '{copy}' is both merged and copied"
                    )));
                }
                if !copies.insert(copy.as_str()) {
                    return Err(ToolError::InvalidPlan(format!(
                        "sheet '{copy}' is copied by more than one group"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Distinct output sheet names: merged sheets first, then group copies.
    pub fn processing_order(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.merged_sheets
            .iter()
            .chain(self.groups.iter().flat_map(|group| group.copies.iter()))
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect()
    }

    /// Source sheet a copy name is duplicated from.
    pub fn copy_source(&self, sheet: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|group| group.copies.iter().any(|copy| copy == sheet))
            .map(|group| group.source.as_str())
    }

    /// Columns to remove from the given sheet.
    pub fn drops_for<'a>(&'a self, sheet: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.column_drops
            .iter()
            .filter(move |rule| rule.sheet == sheet)
            .map(|rule| rule.column.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_is_valid_and_orders_copies_after_merged_sheets() {
        let plan = SheetPlan::default();
        plan.validate().expect("default plan valid");

        let order = plan.processing_order();
        assert_eq!(order.len(), 22);
        assert_eq!(order[0], "ACTUALS_FOR_VISUALIZATION");
        assert_eq!(order[14], "CF_T1_PVFC_LIC_CLO_TADJ_PY");
        assert_eq!(order.last().map(String::as_str), Some("CF_T1_PVFC_LIC_FEXPVAR_PY"));
        assert_eq!(
            plan.copy_source("CF_T1_PVFC_LIC_OP_TADJ_PY"),
            Some("CF_T1_PVFC_LIC_OP")
        );
        assert_eq!(plan.copy_source("CF_T1_PVFC_LIC_OP"), None);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let plan: SheetPlan =
            serde_json::from_str(r#"{"header_rows": 2, "numeric": {"threshold": 0.5}}"#)
                .expect("plan parsed");
        assert_eq!(plan.header_rows, 2);
        assert_eq!(plan.numeric.threshold, 0.5);
        assert_eq!(plan.numeric.sample_size, 1000);
        assert_eq!(plan.merged_sheets.len(), 14);
    }

    #[test]
    fn rejects_group_source_that_is_not_merged() {
        let mut plan = SheetPlan::default();
        plan.groups.push(SheetGroup {
            source: "UNKNOWN".into(),
            copies: vec!["OTHER".into()],
        });
        assert!(matches!(plan.validate(), Err(ToolError::InvalidPlan(_))));
    }

    #[test]
    fn rejects_copy_listed_twice() {
        let mut plan = SheetPlan::default();
        plan.groups[1].copies.push("CF_T1_PVFC_LIC_DEREC".into());
        assert!(matches!(plan.validate(), Err(ToolError::InvalidPlan(_))));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut plan = SheetPlan::default();
        plan.numeric.threshold = 1.5;
        assert!(matches!(plan.validate(), Err(ToolError::InvalidPlan(_))));
    }
}
