//! Intent parsing

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::Stage;
use super::graph::Node;
use super::ir::IntentParseResult;
use super::prompts::StagePrompts;
use super::schemas::StageSchemas;
use super::state::{PipelineState, StateUpdate};
use crate::ai::StructuredClient;
use crate::types::{AgentErrorCode, ChatMessage, trim_messages};

pub struct ParseIntentStage {
    client: StructuredClient,
    max_message_pairs: usize,
    temperature: Option<f32>,
}

impl ParseIntentStage {
    pub fn new(client: StructuredClient, max_message_pairs: usize, temperature: Option<f32>) -> Self {
        Self {
            client,
            max_message_pairs,
            temperature,
        }
    }

    fn prompt(&self, state: &PipelineState) -> String {
        let existing_ir = state
            .intent
            .as_ref()
            .and_then(|i| i.ir_ast.as_ref())
            .map(|ir| ir.to_prompt_json());
        let performance = state.feedback.performance_hint();

        StagePrompts::intent(
            &trim_messages(&state.messages, self.max_message_pairs),
            &state.schemas.join("\n\n"),
            existing_ir.as_deref(),
            performance.as_deref(),
        )
    }
}

#[async_trait]
impl Stage for ParseIntentStage {
    fn node(&self) -> Node {
        Node::ParseIntent
    }

    #[instrument(skip_all)]
    async fn run(&self, state: &PipelineState) -> StateUpdate {
        if state.is_terminal() {
            return StateUpdate::none();
        }

        let prompt = self.prompt(state);
        let result: IntentParseResult = match self
            .client
            .complete(
                "intent",
                &prompt,
                &StageSchemas::intent_schema(),
                self.temperature,
            )
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Intent parsing failed: {}", e);
                return StateUpdate::fail(AgentErrorCode::LlmError, e.to_string());
            }
        };

        info!(
            need_follow_up = result.need_follow_up,
            need_retry_retrieve = result.need_retry_retrieve,
            has_ir = result.ir_ast.is_some(),
            "Intent parsed"
        );

        let messages = result
            .follow_up()
            .map(|q| vec![ChatMessage::ai(q)])
            .unwrap_or_default();

        StateUpdate {
            intent: Some(result),
            messages,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{LlmProvider, LlmResponse};
    use crate::pipeline::state::Terminal;
    use crate::types::{QuorumError, Result};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct CapturingProvider {
        response: Option<Value>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmProvider for CapturingProvider {
        async fn generate(
            &self,
            prompt: &str,
            _schema: &Value,
            _temperature: Option<f32>,
        ) -> Result<LlmResponse> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.response
                .clone()
                .map(LlmResponse::content_only)
                .ok_or_else(|| QuorumError::LlmApi("boom".into()))
        }
        fn name(&self) -> &str {
            "capture"
        }
        fn model(&self) -> &str {
            "capture"
        }
        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn stage(response: Option<Value>) -> (ParseIntentStage, Arc<CapturingProvider>) {
        let provider = Arc::new(CapturingProvider {
            response,
            prompts: Mutex::new(Vec::new()),
        });
        let client = StructuredClient::new(provider.clone(), Duration::from_secs(5));
        (ParseIntentStage::new(client, 5, None), provider)
    }

    #[tokio::test]
    async fn test_follow_up_question_becomes_ai_message() {
        let (stage, _) = stage(Some(json!({
            "need_follow_up": true,
            "need_retry_retrieve": false,
            "follow_up_question": "For which year?"
        })));
        let state = PipelineState::new(vec![ChatMessage::human("sales totals")]);

        let update = stage.run(&state).await;
        assert_eq!(update.messages, vec![ChatMessage::ai("For which year?")]);
        assert!(update.intent.unwrap().need_follow_up);
    }

    #[tokio::test]
    async fn test_prompt_carries_ir_and_performance_feedback() {
        let (stage, provider) = stage(Some(json!({
            "need_follow_up": false,
            "need_retry_retrieve": false,
            "ir_ast": {"select": [{"name": "id"}]}
        })));
        let mut state = PipelineState::new(vec![ChatMessage::human("ids")]);
        state.schemas = vec!["CREATE TABLE t (id INT)".into()];
        state.intent = Some(IntentParseResult {
            ir_ast: Some(Default::default()),
            ..Default::default()
        });
        state.feedback.performance = Some(crate::sql::PlanAnalysis {
            ok: false,
            issues: vec!["Full table scan on t, estimated 20000 rows".into()],
            raw: String::new(),
        });

        let update = stage.run(&state).await;
        assert!(update.terminal.is_none());

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("# Existing Representation"));
        assert!(prompts[0].contains("Full table scan on t"));
        assert!(prompts[0].contains("CREATE TABLE t"));
    }

    #[tokio::test]
    async fn test_model_failure_is_fatal() {
        let (stage, _) = stage(None);
        let update = stage
            .run(&PipelineState::new(vec![ChatMessage::human("q")]))
            .await;
        assert!(matches!(
            update.terminal,
            Some(Terminal::Failure {
                code: AgentErrorCode::LlmError,
                ..
            })
        ));
    }
}
