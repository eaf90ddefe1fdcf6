use crate::chunker::Chunk;

use super::session::Turn;

/// Turns of history included in a prompt.
pub const HISTORY_WINDOW: usize = 3;

/// Retrieved chunk texts, one after another.
pub fn render_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The last [`HISTORY_WINDOW`] turns as `Q:`/`A:` pairs, oldest first.
pub fn render_history(turns: &[Turn]) -> String {
    let start = turns.len().saturating_sub(HISTORY_WINDOW);
    turns[start..]
        .iter()
        .map(|turn| format!("Q: {}\nA: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_prompt(context: &str, chat_history: &str, question: &str) -> String {
    format!(
        "You are a helpful AI assistant. Using the following context, answer the user's question.\n\
         If you cannot answer the question based on the context, say so.\n\
         \n\
         Context: {context}\n\
         Chat History: {chat_history}\n\
         Question: {question}\n\
         \n\
         Answer the question based on the context provided. If uncertain, admit it.\n\
         Make your response clear and well-structured.\n"
    )
}
