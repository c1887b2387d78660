//! Query intermediate representation
//!
//! Structured form of what the user asked for, produced by intent parsing and
//! consumed by SQL generation. It is refined incrementally across follow-up
//! turns rather than regenerated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filter operators the model may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "NOT")]
    Not,
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">=")]
    GtEq,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "BETWEEN")]
    Between,
    #[serde(rename = "IS NULL")]
    IsNull,
    #[serde(rename = "IS NOT NULL")]
    IsNotNull,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "ILIKE")]
    ILike,
    #[serde(rename = "REGEXP")]
    Regexp,
    #[serde(rename = "EXISTS")]
    Exists,
    #[serde(rename = "NOT EXISTS")]
    NotExists,
    #[serde(rename = "JSON_CONTAINS")]
    JsonContains,
    #[serde(rename = "JSON_EXTRACT")]
    JsonExtract,
    #[serde(rename = "JSON_OVERLAPS")]
    JsonOverlaps,
}

impl FilterOp {
    pub const ALL: [&'static str; 22] = [
        "AND",
        "OR",
        "NOT",
        "=",
        "!=",
        "<",
        ">",
        "<=",
        ">=",
        "IN",
        "NOT IN",
        "BETWEEN",
        "IS NULL",
        "IS NOT NULL",
        "LIKE",
        "ILIKE",
        "REGEXP",
        "EXISTS",
        "NOT EXISTS",
        "JSON_CONTAINS",
        "JSON_EXTRACT",
        "JSON_OVERLAPS",
    ];
}

/// Operand of a filter: a nested filter or a literal/column reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterOperand {
    Filter(Box<FilterElement>),
    Value(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterElement {
    pub op: FilterOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operands: Option<Vec<FilterOperand>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderElement {
    pub fields: String,
    #[serde(default)]
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<OrderElement>>,
    /// Frame clause, e.g. `ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

/// Selected column or expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnElement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func_args: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitElement {
    #[serde(default)]
    pub offset: u64,
    pub count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinElement {
    pub join_type: JoinType,
    pub table: TableElement,
    pub on: FilterElement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableElement {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joins: Option<Vec<JoinElement>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQueryElement {
    pub query: Box<QueryElement>,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionElement {
    #[serde(default = "default_true")]
    pub all: bool,
    pub queries: Vec<QueryElement>,
}

fn default_true() -> bool {
    true
}

/// Root of the intermediate representation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryElement {
    #[serde(default)]
    pub select: Vec<ColumnElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_table: Option<TableElement>,
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<FilterElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<OrderElement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<LimitElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unions: Option<Vec<UnionElement>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subqueries: Option<Vec<SubQueryElement>>,
}

impl QueryElement {
    /// Pretty JSON for prompts
    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Output of intent parsing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentParseResult {
    #[serde(default)]
    pub need_follow_up: bool,
    #[serde(default)]
    pub need_retry_retrieve: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ir_ast: Option<QueryElement>,
}

impl IntentParseResult {
    /// Follow-up question, when one is requested and non-blank
    pub fn follow_up(&self) -> Option<&str> {
        if !self.need_follow_up {
            return None;
        }
        self.follow_up_question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_nested_filters() {
        let ir: QueryElement = serde_json::from_value(json!({
            "select": [{"name": "name"}, {"name": "*", "agg": "COUNT", "alias": "n"}],
            "from_table": {
                "name": "users",
                "alias": "u",
                "joins": [{
                    "join_type": "LEFT",
                    "table": {"name": "orders", "alias": "o"},
                    "on": {"op": "=", "operands": ["u.id", "o.user_id"]}
                }]
            },
            "where": {"op": "AND", "operands": [
                {"op": ">", "operands": ["u.age", 30]},
                {"op": "IS NOT NULL", "operands": ["u.name"]}
            ]},
            "group_by": ["name"],
            "order_by": [{"fields": "n", "direction": "DESC"}],
            "limit": {"count": 10}
        }))
        .unwrap();

        let filter = ir.filter.as_ref().unwrap();
        assert_eq!(filter.op, FilterOp::And);
        let operands = filter.operands.as_ref().unwrap();
        assert!(matches!(&operands[0], FilterOperand::Filter(f) if f.op == FilterOp::Gt));
        assert_eq!(ir.limit.as_ref().unwrap().offset, 0);
        assert_eq!(ir.order_by.as_ref().unwrap()[0].direction, Direction::Desc);

        let back = serde_json::to_value(&ir).unwrap();
        assert_eq!(back["where"]["op"], "AND");
    }

    #[test]
    fn test_literal_operands_stay_values() {
        let f: FilterElement =
            serde_json::from_value(json!({"op": "IN", "operands": ["status", ["a", "b"]]}))
                .unwrap();
        let operands = f.operands.unwrap();
        assert_eq!(operands[1], FilterOperand::Value(json!(["a", "b"])));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let result: Result<FilterElement, _> = serde_json::from_value(json!({"op": "SOUNDS LIKE"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_follow_up_requires_question() {
        let mut intent = IntentParseResult {
            need_follow_up: true,
            follow_up_question: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(intent.follow_up(), None);

        intent.follow_up_question = Some("Which year?".into());
        assert_eq!(intent.follow_up(), Some("Which year?"));

        intent.need_follow_up = false;
        assert_eq!(intent.follow_up(), None);
    }

    #[test]
    fn test_operator_list_matches_serde_names() {
        for name in FilterOp::ALL {
            let op: FilterOp = serde_json::from_value(json!(name)).unwrap();
            assert_eq!(serde_json::to_value(op).unwrap(), json!(name));
        }
    }
}
