//! The document retrieval/answer agent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::agents::prompts;
use crate::model::{parse_structured, ChatRequest, ModelClient};
use crate::node::{AgentNode, NodeContext, NodeError, NodeOutcome};
use crate::state::{AgentId, ConversationState};
use crate::tools::DocumentStore;

/// Answers questions from the active document: retrieve a relevant passage,
/// then stream a grounded model answer.
pub struct DocumentAgentNode {
    model: Arc<dyn ModelClient>,
    documents: Arc<dyn DocumentStore>,
}

impl DocumentAgentNode {
    #[must_use]
    pub fn new(model: Arc<dyn ModelClient>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { model, documents }
    }
}

#[async_trait]
impl AgentNode for DocumentAgentNode {
    #[instrument(skip_all, fields(session = %ctx.session_id))]
    async fn run(
        &self,
        mut state: ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeOutcome, NodeError> {
        state.current_agent = Some(AgentId::document());
        let document = state
            .document_name
            .clone()
            .ok_or(NodeError::MissingField {
                field: "document_name",
            })?;

        // Retrieval failure ends the turn conversationally rather than
        // tearing down the session.
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

        let request = ChatRequest::new(
            AgentId::DOCUMENT,
            prompts::document_answer(&state.question, &document, &passage.text),
        )
        .with_history(state.messages.clone());
        let output = ctx.stream_model(self.model.as_ref(), request).await?;
        let fields = parse_structured(&output.text);
        state.apply_model_fields(&fields);
        if let Some(points) = fields.get("data_points").and_then(|v| v.as_str()) {
            state.document_relevant_data = Some(points.to_string());
        }

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
