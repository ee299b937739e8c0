//! The workflow run engine.
//!
//! A run executes nodes one at a time, emitting [`StreamEvent`]s on a
//! channel as it goes: `RunStart`, the node's `Token`/`ModelCallEnd`
//! traffic, then `RunEnd`. Events for one run are strictly ordered. A
//! suspending node parks its state in the [`CheckpointStore`] and the run
//! ends quietly, without a terminal `RunEnd`; a later `RunInput::Resume`
//! picks it back up at the suspended node.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::graphs::Workflow;
use crate::node::{NodeContext, NodeError, NodeOutcome};
use crate::runtime::checkpoint::{CheckpointStore, InterruptTask};
use crate::state::{AgentId, ConversationState};
use crate::stream::{RunEntry, StreamEvent};

/// What starts a run.
#[derive(Debug)]
pub enum RunInput {
    /// A fresh turn with prepared conversation state.
    Fresh(ConversationState),
    /// Resume a suspended run; the text is handed to the suspended node.
    Resume(String),
}

/// Errors that abort a run.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Node(#[from] NodeError),

    #[error("no agent registered under `{agent}`")]
    #[diagnostic(
        code(colloquy::engine::unknown_agent),
        help("The run was routed to a node the workflow does not contain.")
    )]
    UnknownAgent { agent: String },

    #[error("resume requested but no run is suspended for thread `{thread}`")]
    #[diagnostic(
        code(colloquy::engine::nothing_suspended),
        help("Resume inputs are only valid while an interrupt is pending.")
    )]
    NothingSuspended { thread: String },

    #[error("run event channel closed by the consumer")]
    #[diagnostic(code(colloquy::engine::channel_closed))]
    ChannelClosed,
}

/// A launched run: its ordered event stream and the task driving it.
pub struct RunHandle {
    pub events: flume::Receiver<StreamEvent>,
    pub task: JoinHandle<Result<(), EngineError>>,
}

/// Executes one workflow for one session thread.
#[derive(Clone)]
pub struct WorkflowRunner {
    workflow: Arc<Workflow>,
    checkpoints: CheckpointStore,
    session_id: String,
    thread_id: String,
}

impl WorkflowRunner {
    #[must_use]
    pub fn new(
        workflow: Arc<Workflow>,
        checkpoints: CheckpointStore,
        session_id: String,
        thread_id: String,
    ) -> Self {
        Self {
            workflow,
            checkpoints,
            session_id,
            thread_id,
        }
    }

    /// Spawns the run. Events arrive on the returned receiver as the run
    /// progresses; the join handle resolves when the run ends, suspends, or
    /// fails.
    #[must_use]
    pub fn launch(&self, input: RunInput) -> RunHandle {
        let (tx, rx) = flume::unbounded();
        let runner = self.clone();
        let task = tokio::spawn(async move { runner.run_loop(input, tx).await });
        RunHandle { events: rx, task }
    }

    #[instrument(skip_all, fields(session = %self.session_id, thread = %self.thread_id))]
    async fn run_loop(
        &self,
        input: RunInput,
        tx: flume::Sender<StreamEvent>,
    ) -> Result<(), EngineError> {
        let (mut agent, mut state, mut resume) = match input {
            RunInput::Fresh(state) => (self.workflow.entry(), state, None),
            RunInput::Resume(text) => {
                let (task, state) = self.checkpoints.take_suspended(&self.thread_id).ok_or_else(
                    || EngineError::NothingSuspended {
                        thread: self.thread_id.clone(),
                    },
                )?;
                debug!(agent = %task.agent, "resuming suspended run");
                (task.agent, state, Some(text))
            }
        };

        loop {
            tx.send(StreamEvent::RunStart {
                agent: agent.clone(),
                entry: RunEntry::from_state(&state),
            })
            .map_err(|_| EngineError::ChannelClosed)?;

            let node = self
                .workflow
                .node(&agent)
                .ok_or_else(|| EngineError::UnknownAgent {
                    agent: agent.name().to_string(),
                })?;
            let ctx = NodeContext::new(agent.clone(), self.session_id.clone(), tx.clone())
                .with_resume(resume.take());

            match node.run(state, ctx).await? {
                NodeOutcome::Continue(out) => {
                    let next = self.workflow.route(&agent, &out);
                    tx.send(StreamEvent::RunEnd {
                        agent: agent.clone(),
                        state: Box::new(out.clone()),
                    })
                    .map_err(|_| EngineError::ChannelClosed)?;
                    if next == AgentId::End {
                        break;
                    }
                    agent = next;
                    state = out;
                }
                NodeOutcome::Redirect { to, state: out } => {
                    debug!(from = %agent, to = %to, "node redirected the run");
                    tx.send(StreamEvent::RunEnd {
                        agent: agent.clone(),
                        state: Box::new(out.clone()),
                    })
                    .map_err(|_| EngineError::ChannelClosed)?;
                    if to == AgentId::End {
                        break;
                    }
                    agent = to;
                    state = out;
                }
                NodeOutcome::Suspend { reason, state: out } => {
                    debug!(agent = %agent, reason, "run suspended");
                    self.checkpoints.record_suspend(
                        &self.thread_id,
                        InterruptTask {
                            agent: agent.clone(),
                            reason,
                        },
                        out,
                    );
                    break;
                }
            }
        }
        Ok(())
    }
}
