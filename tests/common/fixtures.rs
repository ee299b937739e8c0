use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use colloquy::model::{
    ChatRequest, FinishReason, ModelClient, ModelError, ModelOutput, TokenChunk, TokenUsage,
};
use colloquy::node::TokenSink;
use colloquy::state::QueryKind;
use colloquy::tools::{
    ColumnInfo, DocumentStore, Passage, QueryError, QueryExecutor, RankedMatch, Row,
};

/// One scripted model call: the fragments to stream and the consolidated
/// text the node will parse.
pub struct ScriptedCall {
    pub chunks: Vec<TokenChunk>,
    pub text: String,
}

impl ScriptedCall {
    /// A call streamed as the given fragments, ending with a natural stop.
    pub fn streamed(fragments: &[&str]) -> Self {
        let mut chunks: Vec<TokenChunk> = fragments.iter().map(|f| TokenChunk::text(f)).collect();
        chunks.push(TokenChunk::finish("", FinishReason::Stop));
        Self {
            chunks,
            text: fragments.concat(),
        }
    }

    /// A call delivered as a single fragment (structured-only responses).
    pub fn single(text: &str) -> Self {
        Self {
            chunks: vec![TokenChunk::finish(text, FinishReason::Stop)],
            text: text.to_string(),
        }
    }
}

/// Model client that replays scripted calls in order and records every
/// request it receives.
pub struct ScriptedModel {
    calls: Mutex<VecDeque<ScriptedCall>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(calls: Vec<ScriptedCall>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(calls.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn recorded_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        tokens: &TokenSink,
    ) -> Result<ModelOutput, ModelError> {
        self.requests.lock().unwrap().push(request);
        let call = self
            .calls
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::Provider {
                message: "no scripted call left".to_string(),
            })?;
        for chunk in &call.chunks {
            tokens.send(chunk.clone())?;
        }
        Ok(ModelOutput {
            text: call.text,
            usage: TokenUsage::new(100, 20),
            model_name: "scripted-model".to_string(),
            tool_name: None,
            run_id: "run-0001".to_string(),
        })
    }
}

/// Model client that answers with the scripted call whose keyword appears
/// in the prompt, so concurrent sessions get their own scripts regardless
/// of call order. A keyword can be gated: its next call then parks until
/// the gate is released, holding that session mid-call.
pub struct KeyedModel {
    routes: Mutex<HashMap<String, VecDeque<ScriptedCall>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl KeyedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            routes: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self, keyword: &str, call: ScriptedCall) {
        self.routes
            .lock()
            .unwrap()
            .entry(keyword.to_string())
            .or_default()
            .push_back(call);
    }

    /// Parks the keyword's next call until the returned gate is notified.
    pub fn gate(&self, keyword: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(keyword.to_string(), gate.clone());
        gate
    }

    pub fn recorded_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl ModelClient for KeyedModel {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        tokens: &TokenSink,
    ) -> Result<ModelOutput, ModelError> {
        let prompt = request.prompt.clone();
        self.requests.lock().unwrap().push(request);

        let keyword = {
            let routes = self.routes.lock().unwrap();
            routes.keys().find(|k| prompt.contains(k.as_str())).cloned()
        };
        let keyword = keyword.ok_or_else(|| ModelError::Provider {
            message: "no scripted route matches the prompt".to_string(),
        })?;

        let gate = self.gates.lock().unwrap().remove(&keyword);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let call = self
            .routes
            .lock()
            .unwrap()
            .get_mut(&keyword)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| ModelError::Provider {
                message: format!("no scripted call left for {keyword}"),
            })?;
        for chunk in &call.chunks {
            tokens.send(chunk.clone())?;
        }
        Ok(ModelOutput {
            text: call.text,
            usage: TokenUsage::new(100, 20),
            model_name: "scripted-model".to_string(),
            tool_name: None,
            run_id: "run-0001".to_string(),
        })
    }
}

/// Query executor with canned rows; queries containing the configured
/// marker fail. Every executed query is recorded.
pub struct FakeQuery {
    pub rows: Vec<Row>,
    pub fail_marker: Option<String>,
    pub executed: Mutex<Vec<String>>,
}

impl FakeQuery {
    pub fn with_rows(rows: Vec<Row>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            fail_marker: None,
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_on(marker: &str) -> Arc<Self> {
        Arc::new(Self {
            rows: Vec::new(),
            fail_marker: Some(marker.to_string()),
            executed: Mutex::new(Vec::new()),
        })
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

pub fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(c, v)| (c.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl QueryExecutor for FakeQuery {
    async fn execute(
        &self,
        _table: &str,
        query: &str,
        _kind: QueryKind,
    ) -> Result<Vec<Row>, QueryError> {
        self.executed.lock().unwrap().push(query.to_string());
        if let Some(marker) = &self.fail_marker {
            if query.contains(marker) {
                return Err(QueryError::execution("relation does not exist"));
            }
        }
        Ok(self.rows.clone())
    }

    async fn column_catalog(&self, _table: &str) -> Result<Vec<ColumnInfo>, QueryError> {
        Ok(vec![
            ColumnInfo {
                name: "id".to_string(),
                data_type: "integer".to_string(),
            },
            ColumnInfo {
                name: "customer".to_string(),
                data_type: "text".to_string(),
            },
        ])
    }

    async fn fuzzy_search(
        &self,
        _table: &str,
        _terms: &str,
    ) -> Result<Vec<RankedMatch>, QueryError> {
        Ok(vec![RankedMatch {
            column: "customer".to_string(),
            value: "ACME Corp".to_string(),
            score: 0.92,
        }])
    }
}

/// Document store returning one canned passage for every lookup.
pub struct FakeDocs {
    pub passage: String,
}

impl FakeDocs {
    pub fn with_passage(passage: &str) -> Arc<Self> {
        Arc::new(Self {
            passage: passage.to_string(),
        })
    }
}

#[async_trait]
impl DocumentStore for FakeDocs {
    async fn retrieve(&self, _document: &str, _question: &str) -> Result<Passage, QueryError> {
        Ok(Passage {
            text: self.passage.clone(),
        })
    }
}

/// Scripted probe response classifying the turn as retrieval.
pub fn probe_retrieval() -> ScriptedCall {
    ScriptedCall::single(r#"{"query_type": "retrieval"}"#)
}

/// Scripted main-call response: a streamed sentinel-wrapped answer followed
/// by the structured JSON block.
pub fn sql_answer(answer: &str, next_agent: &str, query: &str) -> ScriptedCall {
    let json = format!(
        "```json\n{{\"answer\": \"{answer}\", \"next_agent\": \"{next_agent}\", \
         \"answer_retrieval_query\": \"{query}\"}}\n```"
    );
    let fragments: Vec<&str> = vec!["<_START_>", answer, "<_END_>", &json];
    ScriptedCall::streamed(&fragments)
}
