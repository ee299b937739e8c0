use async_trait::async_trait;
use colloquy::model::{FinishReason, TokenChunk};
use colloquy::node::{AgentNode, NodeContext, NodeError, NodeOutcome};
use colloquy::state::{AgentId, ConversationState};

/// Streams fixed token fragments, then ends the run.
pub struct EchoTokensNode {
    pub fragments: Vec<&'static str>,
}

#[async_trait]
impl AgentNode for EchoTokensNode {
    async fn run(
        &self,
        mut state: ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeOutcome, NodeError> {
        let sink = ctx.token_sink();
        for fragment in &self.fragments {
            sink.send(TokenChunk::text(fragment)).map_err(NodeError::Model)?;
        }
        sink.send(TokenChunk::finish("", FinishReason::Stop))
            .map_err(NodeError::Model)?;
        state.next_agent = Some(AgentId::End);
        Ok(NodeOutcome::Continue(state))
    }
}

/// Suspends on first entry; on resume, records the resume text as the
/// answer and ends the run.
pub struct SuspendingNode;

#[async_trait]
impl AgentNode for SuspendingNode {
    async fn run(
        &self,
        mut state: ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeOutcome, NodeError> {
        match ctx.resume {
            Some(text) => {
                state.record_answer(&text);
                state.next_agent = Some(AgentId::End);
                Ok(NodeOutcome::Continue(state))
            }
            None => Ok(NodeOutcome::Suspend {
                reason: "waiting".to_string(),
                state,
            }),
        }
    }
}

/// Redirects straight to a fixed target, ignoring its own edges.
pub struct RedirectNode {
    pub to: AgentId,
}

#[async_trait]
impl AgentNode for RedirectNode {
    async fn run(
        &self,
        state: ConversationState,
        _ctx: NodeContext,
    ) -> Result<NodeOutcome, NodeError> {
        Ok(NodeOutcome::Redirect {
            to: self.to.clone(),
            state,
        })
    }
}

/// Appends a marker message and ends the run.
pub struct MarkerNode {
    pub marker: &'static str,
}

#[async_trait]
impl AgentNode for MarkerNode {
    async fn run(
        &self,
        mut state: ConversationState,
        _ctx: NodeContext,
    ) -> Result<NodeOutcome, NodeError> {
        state.record_answer(self.marker);
        state.next_agent = Some(AgentId::End);
        Ok(NodeOutcome::Continue(state))
    }
}
