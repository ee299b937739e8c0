//! The suspending human-in-the-loop node.

use async_trait::async_trait;
use tracing::debug;

use crate::message::Message;
use crate::node::{AgentNode, NodeContext, NodeError, NodeOutcome};
use crate::state::{AgentId, ConversationState};

/// Pauses the run until the user sends another message, then routes to its
/// configured resume target with that message as the new question.
///
/// Suspension is an ordinary return value: the node asks to be suspended and
/// the engine checkpoints the entering state. When a resume value arrives the
/// node runs again with `ctx.resume` set.
pub struct HumanInputNode {
    resume_target: AgentId,
}

impl HumanInputNode {
    #[must_use]
    pub fn new(resume_target: AgentId) -> Self {
        Self { resume_target }
    }
}

#[async_trait]
impl AgentNode for HumanInputNode {
    async fn run(
        &self,
        mut state: ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeOutcome, NodeError> {
        match ctx.resume {
            Some(text) => {
                debug!(session = %ctx.session_id, "resuming with user reply");
                state.question = text.clone();
                state.messages.push(Message::user(&text));
                state.current_agent = Some(AgentId::human());
                state.next_agent = Some(self.resume_target.clone());
                Ok(NodeOutcome::Continue(state))
            }
            None => Ok(NodeOutcome::Suspend {
                reason: "awaiting user input".to_string(),
                state,
            }),
        }
    }
}
