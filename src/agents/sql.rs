//! The SQL-capable table agent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::agents::prompts;
use crate::model::{parse_structured, ChatRequest, ModelClient};
use crate::node::{AgentNode, NodeContext, NodeError, NodeOutcome};
use crate::state::{AgentId, ConversationState, QueryKind};
use crate::tools::QueryExecutor;

/// Answers table questions with a streamed model call, then tests any
/// generated retrieval query against the live table before the turn is
/// declared successful.
///
/// Manipulation queries are drafted and surfaced but never executed.
pub struct SqlAgentNode {
    model: Arc<dyn ModelClient>,
    query: Arc<dyn QueryExecutor>,
}

impl SqlAgentNode {
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>, query: Arc<dyn QueryExecutor>) -> Self {
        Self { model, query }
    }

    /// Cross-source preparation for combined runs: ground the analyst's
    /// document facts in actual table values, then rewrite the question.
    /// Returns the prompt for the main call, or a redirect to the user when
    /// the rewrite decides it needs clarification.
    async fn prepare_combined(
        &self,
        state: &mut ConversationState,
        ctx: &NodeContext,
        table: &str,
    ) -> Result<Option<String>, NodeError> {
        let document_data =
            state
                .document_relevant_data
                .clone()
                .ok_or(NodeError::MissingField {
                    field: "document_relevant_data",
                })?;

        let validated = match self.query.fuzzy_search(table, &document_data).await {
            Ok(matches) => matches
                .iter()
                .map(|m| format!("{} = {}", m.column, m.value))
                .collect::<Vec<_>>()
                .join(", "),
            Err(err) => {
                warn!(table, error = %err, "fuzzy value lookup failed, continuing without grounded values");
                String::new()
            }
        };

        let table_data = match &state.table_relevant_data {
            Some(columns) if !validated.is_empty() => {
                format!("{validated} (expected in columns: {columns})")
            }
            Some(columns) => format!("no confirmed values; expected columns: {columns}"),
            None => validated.clone(),
        };

        let request = ChatRequest::new(
            AgentId::SQL,
            prompts::augment_question(&state.question, &table_data, &document_data),
        );
        let output = ctx.stream_model(self.model.as_ref(), request).await?;
        state.apply_model_fields(&parse_structured(&output.text));

        if state.next_agent == Some(AgentId::human()) {
            debug!("question augmentation asked for user clarification");
            return Ok(None);
        }

        if !validated.is_empty() {
            state.table_relevant_data = Some(validated.clone());
        }
        let question = state
            .augmented_question
            .clone()
            .unwrap_or_else(|| state.question.clone());
        Ok(Some(prompts::sql_combined_retrieval(
            &question, table, &table_data,
        )))
    }

    /// Runs the generated query once so a broken statement is caught here
    /// instead of in the client. Failure is recorded into the state, never
    /// propagated: a bad query is a conversational outcome, not a crash.
    async fn test_generated_query(
        &self,
        state: &mut ConversationState,
        table: &str,
    ) -> Result<(), NodeError> {
        match state.query_kind {
            Some(QueryKind::Retrieval) => {
                let query = state
                    .retrieval_query
                    .clone()
                    .ok_or(NodeError::MissingField {
                        field: "retrieval_query",
                    })?;
                match self
                    .query
                    .execute(table, &query, QueryKind::Retrieval)
                    .await
                {
                    Ok(_) => {
                        state.query_failed = Some(false);
                        state.has_function_call = true;
                    }
                    Err(err) => {
                        warn!(table, error = %err, "generated retrieval query failed its test run");
                        state.record_answer(&format!(
                            "Query failed: {err} when executing: {query}"
                        ));
                        state.query_failed = Some(true);
                        state.has_function_call = false;
                    }
                }
            }
            Some(QueryKind::Manipulation) => {
                if state.manipulation_query.is_some() && state.manipulation_label.is_some() {
                    state.query_failed = Some(false);
                    state.has_function_call = true;
                } else {
                    state.record_answer(
                        "I could not derive a data-manipulation statement for this request.",
                    );
                    state.query_failed = Some(true);
                    state.has_function_call = false;
                }
            }
            None => {
                return Err(NodeError::MissingField {
                    field: "query_kind",
                })
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AgentNode for SqlAgentNode {
    #[instrument(skip_all, fields(session = %ctx.session_id))]
    async fn run(
        &self,
        mut state: ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeOutcome, NodeError> {
        state.current_agent = Some(AgentId::sql());
        let table = state.table_name.clone().ok_or(NodeError::MissingField {
            field: "table_name",
        })?;

        if state.query_kind.is_none() {
            let request =
                ChatRequest::new(AgentId::SQL, prompts::query_kind_probe(&state.question));
            let output = ctx.stream_model(self.model.as_ref(), request).await?;
            state.apply_model_fields(&parse_structured(&output.text));
        }

        let prompt = if state.is_multiagent && state.query_kind == Some(QueryKind::Retrieval) {
            match self.prepare_combined(&mut state, &ctx, &table).await? {
                Some(prompt) => prompt,
                None => {
                    return Ok(NodeOutcome::Redirect {
                        to: AgentId::human(),
                        state,
                    })
                }
            }
        } else {
            let last_answer = state
                .last_assistant_message()
                .map(|m| m.content.clone());
            match state.query_kind {
                Some(QueryKind::Retrieval) => {
                    prompts::sql_retrieval(&state.question, &table, last_answer.as_deref())
                }
                Some(QueryKind::Manipulation) => {
                    prompts::sql_manipulation(&state.question, &table)
                }
                None => {
                    return Err(NodeError::MissingField {
                        field: "query_kind",
                    })
                }
            }
        };

        let request =
            ChatRequest::new(AgentId::SQL, prompt).with_history(state.messages.clone());
        let output = ctx.stream_model(self.model.as_ref(), request).await?;
        state.apply_model_fields(&parse_structured(&output.text));

        self.test_generated_query(&mut state, &table).await?;

        if state.next_agent == Some(AgentId::human()) {
            return Ok(NodeOutcome::Redirect {
                to: AgentId::human(),
                state,
            });
        }
        state.next_agent = Some(AgentId::End);
        Ok(NodeOutcome::Continue(state))
    }
}
