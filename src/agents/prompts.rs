//! Prompt templates for the shipped agents.
//!
//! Every template that produces user-visible text instructs the model to
//! wrap that text in the answer sentinels so the stream demultiplexer can
//! separate it from the structured JSON that follows.

use crate::tools::ColumnInfo;

const ANSWER_FRAMING: &str = "Write the user-facing part of your reply between <_START_> and \
<_END_>. After the closing sentinel, emit exactly one JSON object (optionally in a ```json \
fence) with the fields described below and nothing else.";

/// Classifies a question as data retrieval or data manipulation.
#[must_use]
pub fn query_kind_probe(question: &str) -> String {
    format!(
        "Classify the user's request against a database table.\n\
         Request: {question}\n\n\
         Respond with one JSON object: {{\"query_type\": \"retrieval\" | \"manipulation\"}}. \
         Use \"retrieval\" for reads and aggregations, \"manipulation\" for inserts, updates \
         or deletes. Output only the JSON object."
    )
}

/// Single-context retrieval turn against a table.
#[must_use]
pub fn sql_retrieval(question: &str, table: &str, last_answer: Option<&str>) -> String {
    let prior = last_answer
        .map(|a| format!("Your previous answer, for follow-up context: {a}\n"))
        .unwrap_or_default();
    format!(
        "You answer questions about the SQL table `{table}`.\n\
         {prior}Question: {question}\n\n\
         {ANSWER_FRAMING}\n\
         JSON fields: \"answer\" (your full answer text), \"next_agent\" (\"__end__\", or \
         \"human_input\" if you must ask the user a clarifying question), \
         \"answer_retrieval_query\" (a SELECT that backs your answer), and optionally \
         \"visualize_retrieval_query\" plus \"visualize_query_label\" when a chart would \
         help."
    )
}

/// Single-context manipulation turn against a table.
#[must_use]
pub fn sql_manipulation(question: &str, table: &str) -> String {
    format!(
        "You draft data-manipulation SQL for the table `{table}`. Never claim the change was \
         applied; the statement is only proposed to the user.\n\
         Request: {question}\n\n\
         {ANSWER_FRAMING}\n\
         JSON fields: \"answer\", \"next_agent\" (\"__end__\" or \"human_input\"), \
         \"perform_manipulation_query\" (the statement), \"manipulation_query_label\" (a \
         short description of what it does)."
    )
}

/// Rewrites the question using facts gathered from both sources.
#[must_use]
pub fn augment_question(question: &str, table_data: &str, document_data: &str) -> String {
    format!(
        "Rewrite the user's question so it can be answered from a SQL table alone, folding in \
         the supporting facts below. If the facts are insufficient, route to the user instead.\n\
         Question: {question}\n\
         Facts from the document: {document_data}\n\
         Matching table values: {table_data}\n\n\
         Respond with one JSON object: {{\"augmented_question\": \"...\", \"next_agent\": \
         \"sql_agent\" | \"human_input\"}}. Output only the JSON object."
    )
}

/// Combined-run retrieval turn: the question was already augmented with
/// cross-source facts.
#[must_use]
pub fn sql_combined_retrieval(question: &str, table: &str, table_data: &str) -> String {
    format!(
        "You answer questions about the SQL table `{table}`. The question below was enriched \
         with facts from a related document; the listed table values are known to exist.\n\
         Question: {question}\n\
         Known matching values: {table_data}\n\n\
         {ANSWER_FRAMING}\n\
         JSON fields: \"answer\", \"next_agent\" (\"__end__\" or \"human_input\"), \
         \"answer_retrieval_query\", and optionally \"visualize_retrieval_query\" plus \
         \"visualize_query_label\"."
    )
}

/// Answers a question from retrieved document content.
#[must_use]
pub fn document_answer(question: &str, document: &str, passage: &str) -> String {
    format!(
        "You answer questions about the document `{document}` using only the retrieved \
         content below.\n\
         Question: {question}\n\
         Retrieved content:\n{passage}\n\n\
         {ANSWER_FRAMING}\n\
         JSON fields: \"answer\", \"next_agent\" (\"__end__\", or \"human_input\" to ask the \
         user a clarifying question)."
    )
}

/// Combined-run analyst turn: extract document facts relevant to the table.
#[must_use]
pub fn analyst_combined(question: &str, columns: &[ColumnInfo], passage: &str) -> String {
    format!(
        "You are a data analyst preparing a question that spans a document and a SQL table.\n\
         Question: {question}\n\
         Table columns: {}\n\
         Retrieved document content:\n{passage}\n\n\
         {ANSWER_FRAMING}\n\
         JSON fields: \"answer\" (a short note on what you found), \"data_points\" (the \
         concrete values from the document the table lookup will need, comma separated), \
         \"relevant_columns\" (which table columns those values likely live in, comma \
         separated).",
        format_columns(columns)
    )
}

/// `name (type)` listing for prompt embedding.
#[must_use]
pub fn format_columns(columns: &[ColumnInfo]) -> String {
    columns
        .iter()
        .map(|c| format!("{} ({})", c.name, c.data_type))
        .collect::<Vec<_>>()
        .join(", ")
}
