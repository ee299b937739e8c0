mod common;

use std::sync::Arc;
use std::time::Duration;

use colloquy::agents::Collaborators;
use colloquy::emitter::ChannelTransport;
use colloquy::message::{EventKind, InboundMessage, OutboundMessage};
use colloquy::model::ModelClient;
use colloquy::runtime::Scheduler;
use colloquy::state::QueryKind;
use colloquy::tools::DocumentStore;

use common::fixtures::{
    probe_retrieval, row, sql_answer, FakeDocs, FakeQuery, KeyedModel, ScriptedCall, ScriptedModel,
};

fn scheduler_with(
    model: Arc<dyn ModelClient>,
    query: Arc<FakeQuery>,
) -> (Scheduler, Arc<dyn DocumentStore>) {
    let docs = FakeDocs::with_passage("unused");
    let scheduler = Scheduler::new(Collaborators::new(model, query, docs.clone())).unwrap();
    (scheduler, docs)
}

fn connect(scheduler: &Scheduler, session_id: &str) -> flume::Receiver<OutboundMessage> {
    let (tx, rx) = flume::unbounded();
    scheduler
        .registry()
        .connect(session_id, Arc::new(ChannelTransport::new(tx)));
    rx
}

async fn recv_until(
    rx: &flume::Receiver<OutboundMessage>,
    mut done: impl FnMut(&OutboundMessage) -> bool,
) -> Vec<OutboundMessage> {
    let mut events = Vec::new();
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
            .await
            .expect("timed out waiting for outbound event")
            .expect("outbound channel closed");
        let finished = done(&msg);
        events.push(msg);
        if finished {
            return events;
        }
    }
}

fn roles_of(events: &[OutboundMessage], kind: EventKind) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.event == kind)
        .map(|e| e.role.clone())
        .collect()
}

#[tokio::test]
async fn table_turn_streams_answer_and_reports_query_result() {
    let query_text = "SELECT count(*) FROM orders";
    let model = ScriptedModel::new(vec![
        probe_retrieval(),
        sql_answer("42 orders shipped last week.", "__end__", query_text),
    ]);
    let query = FakeQuery::with_rows(vec![row(&[("count", "42")])]);
    let (scheduler, _docs) = scheduler_with(model.clone(), query.clone());
    let rx = connect(&scheduler, "s1");

    scheduler.submit(
        "s1",
        InboundMessage::for_table("How many orders shipped last week?", "orders"),
    );
    let events = recv_until(&rx, |e| e.event == EventKind::QueryResult).await;

    assert_eq!(events[0].event, EventKind::AgentStart);
    assert_eq!(events[0].role, "sql_agent");
    assert_eq!(events[0].table_name.as_deref(), Some("orders"));

    let chunks: Vec<&OutboundMessage> = events
        .iter()
        .filter(|e| e.event == EventKind::AnswerChunk)
        .collect();
    assert!(!chunks.is_empty());
    assert_eq!(chunks.last().unwrap().message, "42 orders shipped last week.");

    // One usage report per model call (probe + main).
    assert_eq!(roles_of(&events, EventKind::Usage), vec!["sql_agent", "sql_agent"]);

    let result = events.last().unwrap();
    assert_eq!(result.role, "sql_agent");
    assert_eq!(result.query_kind, Some(QueryKind::Retrieval));
    assert!(result.message.contains(&format!("Query: {query_text}")));
    assert!(result.message.contains("Query Result: <br>count: 42<br/>"));

    // Once for the test run, once for the display fetch.
    assert_eq!(query.executed_queries(), vec![query_text, query_text]);
}

#[tokio::test]
async fn failed_query_echoes_without_rows_and_session_survives() {
    let model = ScriptedModel::new(vec![
        probe_retrieval(),
        sql_answer("Let me try.", "__end__", "SELECT broken"),
        sql_answer("All good now.", "__end__", "SELECT 1"),
    ]);
    let query = FakeQuery::failing_on("broken");
    let (scheduler, _docs) = scheduler_with(model, query);
    let rx = connect(&scheduler, "s1");

    scheduler.submit("s1", InboundMessage::for_table("first try", "orders"));
    let events = recv_until(&rx, |e| e.event == EventKind::QueryResult).await;
    let result = events.last().unwrap();
    assert_eq!(result.message, " <br><br> Query: SELECT broken");
    assert_eq!(result.visualization_query, None);
    assert_eq!(result.query_kind, Some(QueryKind::Retrieval));

    // A failed query is a conversational outcome; the next turn still runs.
    scheduler.submit("s1", InboundMessage::for_table("second try", "orders"));
    let events = recv_until(&rx, |e| e.event == EventKind::QueryResult).await;
    let result = events.last().unwrap();
    assert!(result.message.contains("Query: SELECT 1"));
    assert!(result.message.contains("Query Result"));
    assert!(scheduler.registry().is_active("s1"));
}

#[tokio::test]
async fn interleaved_sessions_do_not_cross_write() {
    let model = KeyedModel::new();
    model.script("orders", sql_answer("Alpha answer.", "__end__", "SELECT 1"));
    model.script("customers", sql_answer("Beta answer.", "__end__", "SELECT 2"));
    model.script("orders", sql_answer("Alpha again.", "__end__", "SELECT 3"));
    // Hold alpha inside its model call while beta runs to completion.
    let release_alpha = model.gate("orders");

    let query = FakeQuery::with_rows(vec![row(&[("n", "1")])]);
    let (scheduler, _docs) = scheduler_with(model.clone(), query);
    let rx_a = connect(&scheduler, "alpha");
    let rx_b = connect(&scheduler, "beta");

    let mut msg_a = InboundMessage::for_table("question a", "orders");
    msg_a.query_kind = Some(QueryKind::Retrieval);
    let mut msg_b = InboundMessage::for_table("question b", "customers");
    msg_b.query_kind = Some(QueryKind::Retrieval);

    scheduler.submit("alpha", msg_a);
    scheduler.submit("beta", msg_b);
    let events_b = recv_until(&rx_b, |e| e.event == EventKind::QueryResult).await;

    // Beta finished while alpha is still mid-call; alpha has produced no
    // answer yet.
    let early_a: Vec<OutboundMessage> = rx_a.try_iter().collect();
    assert!(early_a.iter().all(|e| e.event == EventKind::AgentStart));

    release_alpha.notify_one();
    let events_a = recv_until(&rx_a, |e| e.event == EventKind::QueryResult).await;

    assert!(events_a
        .iter()
        .any(|e| e.event == EventKind::AnswerChunk && e.message == "Alpha answer."));
    assert!(events_b
        .iter()
        .any(|e| e.event == EventKind::AnswerChunk && e.message == "Beta answer."));
    // Nothing leaked across transports.
    assert!(rx_b.try_recv().is_err());
    assert_eq!(scheduler.registry().active_sessions(), 2);

    // Alpha's follow-up sees only its own history, untouched by the
    // interleaved beta turn.
    scheduler.submit("alpha", InboundMessage::for_table("and again?", "orders"));
    recv_until(&rx_a, |e| e.event == EventKind::QueryResult).await;
    let prompts = model.recorded_prompts();
    let last = prompts.last().unwrap();
    assert!(last.contains("Alpha answer."));
    assert!(!last.contains("Beta answer."));
}

#[tokio::test]
async fn switching_context_restores_its_history() {
    let model = ScriptedModel::new(vec![
        probe_retrieval(),
        sql_answer("There are 42 orders.", "__end__", "SELECT count(*) FROM orders"),
        probe_retrieval(),
        sql_answer("Customers: 7.", "__end__", "SELECT count(*) FROM customers"),
        // Third turn returns to `orders`: its stored query kind skips the
        // probe, so this is the turn's only call.
        sql_answer("Still 42.", "__end__", "SELECT count(*) FROM orders"),
    ]);
    let query = FakeQuery::with_rows(vec![row(&[("count", "42")])]);
    let (scheduler, _docs) = scheduler_with(model.clone(), query);
    let rx = connect(&scheduler, "s1");

    for (question, table) in [
        ("how many orders?", "orders"),
        ("how many customers?", "customers"),
        ("and now?", "orders"),
    ] {
        scheduler.submit("s1", InboundMessage::for_table(question, table));
        recv_until(&rx, |e| e.event == EventKind::QueryResult).await;
    }

    let prompts = model.recorded_prompts();
    assert_eq!(prompts.len(), 5);
    // The returning turn sees the orders answer, not the customers one.
    assert!(prompts[4].contains("There are 42 orders."));
    assert!(prompts[4].contains("and now?"));
    assert!(!prompts[4].contains("Customers: 7."));
    // The customers turn never saw the orders history.
    assert!(!prompts[3].contains("There are 42 orders."));
}

#[tokio::test]
async fn histories_survive_a_fatal_turn_error() {
    let model = ScriptedModel::new(vec![
        probe_retrieval(),
        sql_answer("There are 42 orders.", "__end__", "SELECT count(*) FROM orders"),
        probe_retrieval(),
        // Structured block missing the generated query: fatal to this
        // session's task, but not to its stored histories.
        ScriptedCall::streamed(&["<_START_>", "Hmm.", "<_END_>"]),
        sql_answer("Still 42.", "__end__", "SELECT count(*) FROM orders"),
    ]);
    let query = FakeQuery::with_rows(vec![row(&[("count", "42")])]);
    let (scheduler, _docs) = scheduler_with(model.clone(), query);
    let rx = connect(&scheduler, "s1");

    scheduler.submit("s1", InboundMessage::for_table("how many orders?", "orders"));
    let events = recv_until(&rx, |e| e.event == EventKind::QueryResult).await;
    let first_thread = events.last().unwrap().thread_id.clone();
    assert!(first_thread.is_some());

    scheduler.submit("s1", InboundMessage::for_table("break please", "customers"));
    for _ in 0..100 {
        if !scheduler.registry().is_active("s1") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!scheduler.registry().is_active("s1"));

    // The respawned task resumes the same thread and the orders history;
    // the stored query kind means no second probe.
    scheduler.submit("s1", InboundMessage::for_table("and now?", "orders"));
    let events = recv_until(&rx, |e| e.event == EventKind::QueryResult).await;
    assert_eq!(events.last().unwrap().thread_id, first_thread);

    let prompts = model.recorded_prompts();
    assert_eq!(prompts.len(), 5);
    assert!(prompts[4].contains("There are 42 orders."));
    assert!(prompts[4].contains("and now?"));
}

#[tokio::test]
async fn message_without_context_is_ignored() {
    let model = ScriptedModel::new(vec![]);
    let query = FakeQuery::with_rows(vec![]);
    let (scheduler, _docs) = scheduler_with(model, query);
    let rx = connect(&scheduler, "s1");

    scheduler.submit("s1", InboundMessage::text("hello?"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert!(scheduler.registry().is_active("s1"));
}
