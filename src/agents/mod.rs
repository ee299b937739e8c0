//! The shipped agent nodes.
//!
//! Each node is a plain struct holding the collaborators it needs; nothing
//! here touches globals. The nodes are wired into workflows by
//! [`crate::graphs::profiles`].

mod analyst;
mod document;
mod human;
pub mod prompts;
mod sql;

use std::sync::Arc;

pub use analyst::DataAnalystNode;
pub use document::DocumentAgentNode;
pub use human::HumanInputNode;
pub use sql::SqlAgentNode;

use crate::model::ModelClient;
use crate::tools::{DocumentStore, QueryExecutor};

/// The injected seams every workflow needs: a model, a query executor, and a
/// document store. Cloning is cheap (all `Arc`s).
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn ModelClient>,
    pub query: Arc<dyn QueryExecutor>,
    pub documents: Arc<dyn DocumentStore>,
}

impl Collaborators {
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
