//! Stage prompts
//!
//! Every prompt embeds the trimmed conversation as a transcript; the provider
//! appends the response schema.

use crate::ai::PromptBuilder;
use crate::types::{ChatMessage, render_transcript};

/// Prompt builders for the model-backed stages
pub struct StagePrompts;

impl StagePrompts {
    pub fn intent(
        messages: &[ChatMessage],
        schemas: &str,
        existing_ir: Option<&str>,
        performance_feedback: Option<&str>,
    ) -> String {
        PromptBuilder::new()
            .role(
                "query intent analyst",
                "turning natural-language data questions into a structured query representation",
            )
            .objectives(&[
                "Produce or update the QueryElement (`ir_ast`) describing what the user wants",
                "Decide whether the user must be asked a clarifying question",
                "Decide whether the available table schemas are sufficient",
            ])
            .section("Conversation", render_transcript(messages))
            .section("Available Table Schemas", schemas)
            .section_opt("Existing Representation", existing_ir)
            .section_opt("Performance Feedback", performance_feedback)
            .rules(&[
                "If an existing representation is given, refine it; do not start over",
                "Use only tables and columns present in the schemas above",
                "Set need_follow_up=true when the intent is vague, a required parameter is missing \
                 (e.g. 'recent orders' without a time range), or several readings are plausible",
                "Ask exactly one specific question in follow_up_question when need_follow_up is true",
                "Set need_retry_retrieve=true when a mentioned entity has no matching table, a needed \
                 join table is missing, or the schemas are clearly incomplete",
                "If performance feedback is given, tighten the representation (filters, limits, \
                 narrower joins) to address it",
            ])
            .build()
    }

    pub fn generate(schemas: &str, ir: &str, validation_feedback: Option<&str>) -> String {
        PromptBuilder::new()
            .role(
                "SQL engineer",
                "writing correct read-only SQLite queries from a structured query representation",
            )
            .section("Table Schemas", schemas)
            .code("json", ir)
            .section_opt("Previous Attempt Failed", validation_feedback)
            .rules(&[
                "Produce exactly one SELECT statement in the `sql` field",
                "Use only table and column names from the schemas above",
                "No comments, explanations or markdown inside the SQL",
                "Use GROUP BY correctly whenever the representation contains aggregates",
                "Derive join conditions from the key relationships in the schemas",
                "If a previous attempt failed, fix the reported error",
            ])
            .build()
    }

    pub fn judge(messages: &[ChatMessage], schemas: &str, candidates: &[&str]) -> String {
        let numbered = candidates
            .iter()
            .enumerate()
            .map(|(i, sql)| format!("{}. {}", i + 1, sql))
            .collect::<Vec<_>>()
            .join("\n");

        PromptBuilder::new()
            .role(
                "SQL reviewer",
                "judging which of several candidate queries answers the user's question",
            )
            .section("Conversation", render_transcript(messages))
            .section("Table Schemas", schemas)
            .section("Candidate Queries", numbered)
            .rules(&[
                "The candidates return different results; pick the one that matches the user's intent",
                "Answer with the 1-based number of the chosen candidate in `choice`",
            ])
            .build()
    }

    pub fn summarize(
        messages: &[ChatMessage],
        sql: &str,
        row_count: usize,
        result_sample: &str,
    ) -> String {
        PromptBuilder::new()
            .role(
                "data analyst",
                "explaining query results to the person who asked",
            )
            .section("Conversation", render_transcript(messages))
            .code("sql", sql)
            .section(
                "Result",
                format!("{} rows returned. Sample:\n{}", row_count, result_sample),
            )
            .rules(&[
                "Answer the user's question directly from the result",
                "Be brief; mention notable values, totals or trends",
                "Do not repeat the SQL",
                "If the result is empty, say that nothing matched",
            ])
            .build()
    }
}
