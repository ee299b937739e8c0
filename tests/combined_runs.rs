mod common;

use std::sync::Arc;
use std::time::Duration;

use colloquy::agents::Collaborators;
use colloquy::emitter::ChannelTransport;
use colloquy::message::{EventKind, InboundMessage, OutboundMessage};
use colloquy::runtime::Scheduler;
use colloquy::state::QueryKind;

use common::fixtures::{
    probe_retrieval, row, sql_answer, FakeDocs, FakeQuery, ScriptedCall, ScriptedModel,
};

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

#[tokio::test]
async fn combined_run_hands_off_analyst_findings_to_the_sql_agent() {
    let final_query = "SELECT count(*) FROM orders WHERE customer = 'ACME Corp'";
    let model = ScriptedModel::new(vec![
        // Analyst extracts the concrete values the table lookup needs.
        ScriptedCall::single(
            r#"{"answer": "The report references shipment X123 for ACME Corp.",
                "data_points": "X123, ACME Corp",
                "relevant_columns": "customer"}"#,
        ),
        probe_retrieval(),
        // Question rewrite grounded in the fuzzy-matched table values.
        ScriptedCall::single(
            r#"{"augmented_question": "How many orders for ACME Corp?",
                "next_agent": "sql_agent"}"#,
        ),
        sql_answer("ACME has 5 orders.", "__end__", final_query),
    ]);
    let query = FakeQuery::with_rows(vec![row(&[("count", "5")])]);
    let docs = FakeDocs::with_passage("Shipment X123 was sent to ACME Corp in March.");
    let scheduler = Scheduler::new(Collaborators::new(model.clone(), query, docs)).unwrap();

    let (tx, rx) = flume::unbounded();
    scheduler
        .registry()
        .connect("s1", Arc::new(ChannelTransport::new(tx)));

    let mut msg = InboundMessage::for_table("How many orders does the shipped customer have?", "orders");
    msg.document_name = Some("shipping-report.pdf".into());
    scheduler.submit("s1", msg);

    let events = recv_until(&rx, |e| e.event == EventKind::QueryResult).await;

    let starts: Vec<&str> = events
        .iter()
        .filter(|e| e.event == EventKind::AgentStart)
        .map(|e| e.role.as_str())
        .collect();
    assert_eq!(starts, vec!["data_analyst", "sql_agent"]);

    assert!(events
        .iter()
        .any(|e| e.event == EventKind::AnswerChunk && e.message == "ACME has 5 orders."));

    let result = events.last().unwrap();
    assert_eq!(result.query_kind, Some(QueryKind::Retrieval));
    assert!(result.message.contains(final_query));
    assert_eq!(result.table_name.as_deref(), Some("orders"));
    assert_eq!(result.document_name.as_deref(), Some("shipping-report.pdf"));

    // Each stage saw what the previous one produced.
    let prompts = model.recorded_prompts();
    assert_eq!(prompts.len(), 4);
    assert!(prompts[0].contains("Shipment X123 was sent to ACME Corp in March."));
    assert!(prompts[0].contains("customer (text)"));
    assert!(prompts[2].contains("X123, ACME Corp"));
    assert!(prompts[2].contains("customer = ACME Corp"));
    assert!(prompts[3].contains("How many orders for ACME Corp?"));
}
