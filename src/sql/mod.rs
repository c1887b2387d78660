//! SQL analysis: static syntax checks, sample rewriting, plan heuristics.

pub mod parser;
pub mod plan;

pub use parser::{
    SyntaxCheck, SyntaxFailure, check_syntax, ensure_deterministic_sample, normalize_sql,
    table_aliases,
};
pub use plan::{PlanAnalysis, PlanRow, analyze_plan, plan_cost};
