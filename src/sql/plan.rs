//! Query-plan rows and performance heuristics
//!
//! `PlanRow` uses MySQL `EXPLAIN` vocabulary (`ALL`, `index`, `Using
//! filesort`, ...) so the heuristics stay engine-neutral; the storage layer
//! maps its engine's plan output onto it.

use serde::{Deserialize, Serialize};

/// Full table scan
pub const JOIN_TYPE_ALL: &str = "ALL";
/// Full index scan
pub const JOIN_TYPE_INDEX: &str = "index";
/// Index lookup
pub const JOIN_TYPE_REF: &str = "ref";

pub const EXTRA_USING_TEMPORARY: &str = "Using temporary";
pub const EXTRA_USING_FILESORT: &str = "Using filesort";
pub const EXTRA_USING_JOIN_BUFFER: &str = "Using join buffer";

/// One row of a plan probe
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRow {
    /// Table the row reads; `None` for rows without a real table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(rename = "type", default)]
    pub join_type: String,
    #[serde(rename = "rows", default)]
    pub estimated_rows: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<String>,
    /// Engine-native description of the step
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl PlanRow {
    pub fn has_extra(&self, flag: &str) -> bool {
        self.extra.iter().any(|e| e.contains(flag))
    }
}

/// Heuristic verdict over a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanAnalysis {
    pub ok: bool,
    pub issues: Vec<String>,
    /// Plan rows rendered one JSON object per line
    pub raw: String,
}

/// Sum of estimated rows; lower is cheaper
pub fn plan_cost(rows: &[PlanRow]) -> u64 {
    rows.iter().map(|r| r.estimated_rows).sum()
}

/// Score plan rows against the performance heuristics
///
/// Rows without a table are skipped. A cartesian-product issue is added
/// once when more than one row is a full table scan, regardless of size.
pub fn analyze_plan(rows: &[PlanRow], max_rows: u64) -> PlanAnalysis {
    let mut issues = Vec::new();
    let mut full_scans = 0usize;

    for row in rows {
        let Some(table) = row.table.as_deref() else {
            continue;
        };

        if row.join_type == JOIN_TYPE_ALL && row.estimated_rows > max_rows {
            issues.push(format!(
                "Full table scan on {}, estimated {} rows",
                table, row.estimated_rows
            ));
        }

        if row.join_type == JOIN_TYPE_INDEX && row.estimated_rows > max_rows {
            issues.push(format!(
                "Full index scan on {}, estimated {} rows",
                table, row.estimated_rows
            ));
        }

        if row.has_extra(EXTRA_USING_TEMPORARY) && row.has_extra(EXTRA_USING_FILESORT) {
            issues.push(format!(
                "Table {} uses both a temporary table and a filesort",
                table
            ));
        }

        if row.has_extra(EXTRA_USING_JOIN_BUFFER) {
            issues.push(format!("Join on {} does not use an index", table));
        }

        if row.join_type == JOIN_TYPE_ALL {
            full_scans += 1;
        }
    }

    if full_scans > 1 {
        issues.push(format!(
            "Full scans on {} tables, cartesian product risk",
            full_scans
        ));
    }

    let raw = rows
        .iter()
        .filter_map(|r| serde_json::to_string(r).ok())
        .collect::<Vec<_>>()
        .join("\n");

    PlanAnalysis {
        ok: issues.is_empty(),
        issues,
        raw,
    }
}
