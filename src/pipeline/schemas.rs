//! JSON schemas for stage outputs
//!
//! Sent with each structured completion; the typed result is deserialized
//! from the model's JSON.

use serde::Deserialize;
use serde_json::{Value, json};

use super::ir::FilterOp;

/// Output of one generation call
#[derive(Debug, Clone, Deserialize)]
pub struct SqlResult {
    #[serde(default)]
    pub sql: Option<String>,
}

/// Judge verdict; `choice` is 1-based
#[derive(Debug, Clone, Deserialize)]
pub struct JudgeResult {
    pub choice: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummaryResult {
    pub summary: String,
}

/// Schema provider for the pipeline stages
pub struct StageSchemas;

impl StageSchemas {
    pub fn intent_schema() -> Value {
        json!({
            "type": "object",
            "description": "Parsed user intent for a data question",
            "required": ["need_follow_up", "need_retry_retrieve"],
            "additionalProperties": false,
            "properties": {
                "need_follow_up": {"type": "boolean", "description": "Whether the user must be asked a clarifying question"},
                "need_retry_retrieve": {"type": "boolean", "description": "Whether the provided table schemas are insufficient"},
                "follow_up_question": {"type": ["string", "null"], "description": "The single clarifying question to ask"},
                "ir_ast": {
                    "anyOf": [{"$ref": "#/$defs/query"}, {"type": "null"}],
                    "description": "Structured representation of the requested query"
                }
            },
            "$defs": Self::query_defs()
        })
    }

    fn query_defs() -> Value {
        json!({
            "filter": {
                "type": "object",
                "required": ["op"],
                "properties": {
                    "op": {"type": "string", "enum": FilterOp::ALL},
                    "operands": {
                        "type": "array",
                        "description": "Nested filters, column references or literal values",
                        "items": {"anyOf": [{"$ref": "#/$defs/filter"}, {}]}
                    }
                }
            },
            "order": {
                "type": "object",
                "required": ["fields"],
                "properties": {
                    "fields": {"type": "string"},
                    "direction": {"type": "string", "enum": ["ASC", "DESC"]}
                }
            },
            "column": {
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string", "description": "Column name or expression"},
                    "table_alias": {"type": "string"},
                    "alias": {"type": "string"},
                    "agg": {"type": "string", "description": "Aggregate function, e.g. COUNT, SUM"},
                    "func_args": {"type": "array"},
                    "window": {
                        "type": "object",
                        "properties": {
                            "partition_by": {"type": "array", "items": {"type": "string"}},
                            "order_by": {"type": "array", "items": {"$ref": "#/$defs/order"}},
                            "frame": {"type": "string"}
                        }
                    }
                }
            },
            "table": {
                "type": "object",
                "required": ["name"],
                "properties": {
                    "name": {"type": "string"},
                    "alias": {"type": "string"},
                    "joins": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["join_type", "table", "on"],
                            "properties": {
                                "join_type": {"type": "string", "enum": ["INNER", "LEFT", "RIGHT", "FULL"]},
                                "table": {"$ref": "#/$defs/table"},
                                "on": {"$ref": "#/$defs/filter"}
                            }
                        }
                    }
                }
            },
            "query": {
                "type": "object",
                "properties": {
                    "select": {"type": "array", "items": {"$ref": "#/$defs/column"}},
                    "from_table": {"$ref": "#/$defs/table"},
                    "where": {"$ref": "#/$defs/filter"},
                    "group_by": {"type": "array", "items": {"type": "string"}},
                    "having": {"$ref": "#/$defs/filter"},
                    "order_by": {"type": "array", "items": {"$ref": "#/$defs/order"}},
                    "limit": {
                        "type": "object",
                        "required": ["count"],
                        "properties": {
                            "offset": {"type": "integer", "minimum": 0},
                            "count": {"type": "integer", "minimum": 0}
                        }
                    },
                    "unions": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["queries"],
                            "properties": {
                                "all": {"type": "boolean"},
                                "queries": {"type": "array", "items": {"$ref": "#/$defs/query"}}
                            }
                        }
                    },
                    "subqueries": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["query", "alias"],
                            "properties": {
                                "query": {"$ref": "#/$defs/query"},
                                "alias": {"type": "string"}
                            }
                        }
                    }
                }
            }
        })
    }

    pub fn sql_schema() -> Value {
        json!({
            "type": "object",
            "description": "One generated SQL query",
            "required": ["sql"],
            "additionalProperties": false,
            "properties": {
                "sql": {"type": "string", "description": "A single read-only SELECT statement"}
            }
        })
    }

    pub fn judge_schema() -> Value {
        json!({
            "type": "object",
            "description": "Choice among numbered candidate queries",
            "required": ["choice"],
            "additionalProperties": false,
            "properties": {
                "choice": {"type": "integer", "minimum": 1, "description": "1-based number of the chosen candidate"}
            }
        })
    }

    pub fn summary_schema() -> Value {
        json!({
            "type": "object",
            "required": ["summary"],
            "additionalProperties": false,
            "properties": {
                "summary": {"type": "string", "description": "Plain-language answer based on the result"}
            }
        })
    }
}
