//! Streaming, interruptible multi-agent conversation orchestration.
//!
//! `colloquy` runs per-session conversations through small workflow graphs
//! of agent nodes. Model output streams token by token; a sentinel
//! demultiplexer separates the user-visible answer from structured control
//! JSON in the same stream. Runs can suspend mid-graph for human input and
//! resume with the user's next message, and every session keeps independent
//! per-context histories for the lifetime of the process.
//!
//! # Layers
//!
//! - [`state`] / [`message`]: the conversation state struct and the
//!   transport-boundary message types.
//! - [`node`] / [`graphs`] / [`agents`]: the `AgentNode` trait, the graph
//!   builder with compile-time validation, and the shipped agent nodes
//!   wired into three workflow profiles.
//! - [`model`] / [`tools`]: injected collaborator seams for the chat model,
//!   query execution, and document retrieval.
//! - [`runtime`]: the run engine, suspension checkpoints, per-session
//!   conversation store, and the session scheduler.
//! - [`stream`] / [`emitter`]: the run event types, the answer
//!   demultiplexer, and outbound event delivery.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use colloquy::agents::Collaborators;
//! use colloquy::emitter::ChannelTransport;
//! use colloquy::message::InboundMessage;
//! use colloquy::runtime::Scheduler;
//!
//! # fn demo(
//! #     model: Arc<dyn colloquy::model::ModelClient>,
//! #     query: Arc<dyn colloquy::tools::QueryExecutor>,
//! #     documents: Arc<dyn colloquy::tools::DocumentStore>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! colloquy::telemetry::init_tracing();
//!
//! let scheduler = Scheduler::new(Collaborators::new(model, query, documents))?;
//!
//! let (tx, rx) = flume::unbounded();
//! scheduler
//!     .registry()
//!     .connect("session-1", Arc::new(ChannelTransport::new(tx)));
//! scheduler.submit(
//!     "session-1",
//!     InboundMessage::for_table("How many orders shipped last week?", "orders"),
//! );
//! // Typed events for the client arrive on rx as the run progresses.
//! # drop(rx);
//! # Ok(())
//! # }
//! ```

pub mod agents;
pub mod emitter;
pub mod graphs;
pub mod message;
pub mod model;
pub mod node;
pub mod runtime;
pub mod state;
pub mod stream;
pub mod telemetry;
pub mod tools;

pub use graphs::{GraphBuilder, GraphError, GraphProfile, Workflow};
pub use message::{EventKind, InboundMessage, Message, OutboundMessage};
pub use node::{AgentNode, NodeContext, NodeError, NodeOutcome};
pub use runtime::{Scheduler, SessionRegistry};
pub use state::{AgentId, ConversationState, QueryKind};
