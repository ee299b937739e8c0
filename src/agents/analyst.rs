//! The cross-source analyst that fronts combined runs.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::agents::prompts;
use crate::model::{parse_structured, ChatRequest, ModelClient};
use crate::node::{AgentNode, NodeContext, NodeError, NodeOutcome};
use crate::state::{AgentId, ConversationState};
use crate::tools::{DocumentStore, QueryExecutor};

/// First node of a combined run: reads the document, extracts the concrete
/// values the table lookup will need, and hands off to the SQL agent.
///
/// When only a document is active the analyst answers directly and ends the
/// run itself.
pub struct DataAnalystNode {
    model: Arc<dyn ModelClient>,
    query: Arc<dyn QueryExecutor>,
    documents: Arc<dyn DocumentStore>,
}

impl DataAnalystNode {
    #[must_use]
    pub fn new(
        model: Arc<dyn ModelClient>,
        query: Arc<dyn QueryExecutor>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            model,
            query,
            documents,
        }
    }
}

#[async_trait]
impl AgentNode for DataAnalystNode {
    #[instrument(skip_all, fields(session = %ctx.session_id))]
    async fn run(
        &self,
        mut state: ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeOutcome, NodeError> {
        state.current_agent = Some(AgentId::analyst());
        state.is_multiagent = state.table_name.is_some();
        let document = state
            .document_name
            .clone()
            .ok_or(NodeError::MissingField {
                field: "document_name",
            })?;

        let passage = match self.documents.retrieve(&document, &state.question).await {
            Ok(passage) => passage,
            Err(err) => {
                warn!(document, error = %err, "document retrieval failed");
                state.record_answer(&format!(
                    "I could not retrieve content from {document}: {err}"
                ));
                state.next_agent = Some(AgentId::End);
                return Ok(NodeOutcome::Continue(state));
            }
        };

        if !state.is_multiagent {
            // Document-only message routed through the combined graph:
            // answer directly, no handoff.
            let request = ChatRequest::new(
                AgentId::ANALYST,
                prompts::document_answer(&state.question, &document, &passage.text),
            )
            .with_history(state.messages.clone());
            let output = ctx.stream_model(self.model.as_ref(), request).await?;
            state.apply_model_fields(&parse_structured(&output.text));
            state.next_agent = Some(AgentId::End);
            return Ok(NodeOutcome::Continue(state));
        }

        let table = state.table_name.clone().ok_or(NodeError::MissingField {
            field: "table_name",
        })?;
        let columns = match self.query.column_catalog(&table).await {
            Ok(columns) => columns,
            Err(err) => {
                warn!(table, error = %err, "column catalog unavailable, analyst continues without it");
                Vec::new()
            }
        };

        let request = ChatRequest::new(
            AgentId::ANALYST,
            prompts::analyst_combined(&state.question, &columns, &passage.text),
        );
        let output = ctx.stream_model(self.model.as_ref(), request).await?;
        let fields = parse_structured(&output.text);
        state.apply_model_fields(&fields);

        if let Some(points) = fields.get("data_points").and_then(|v| v.as_str()) {
            state.document_relevant_data = Some(points.to_string());
        }
        if let Some(columns) = fields.get("relevant_columns").and_then(|v| v.as_str()) {
            state.table_relevant_data = Some(columns.to_string());
        }
        if let Some(note) = &state.answer {
            state
                .agent_scratchpads
                .push(format!("{}: {note}", AgentId::ANALYST));
        }

        state.next_agent = Some(AgentId::sql());
        Ok(NodeOutcome::Continue(state))
    }
}
