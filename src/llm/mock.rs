//! Offline language model for tests and local runs.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{LanguageModel, LlmError};

enum Reply {
    Fixed(String),
    EchoContext,
    Fail(String),
}

/// Records every prompt it sees.
pub struct MockLanguageModel {
    reply: Reply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLanguageModel {
    /// Always answers `reply`.
    pub fn fixed(reply: impl Into<String>) -> Self {
        Self::with_reply(Reply::Fixed(reply.into()))
    }

    /// Answers with the prompt's context section, so answers carry retrieved text.
    pub fn echo_context() -> Self {
        Self::with_reply(Reply::EchoContext)
    }

    /// Fails every call with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_reply(Reply::Fail(message.into()))
    }

    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts
            .lock()
            .ok()
            .and_then(|prompts| prompts.last().cloned())
    }
}

fn context_section(prompt: &str) -> &str {
    let after = prompt
        .split_once("Context:")
        .map_or(prompt, |(_, rest)| rest);
    after
        .split_once("\nChat History:")
        .map_or(after, |(context, _)| context)
        .trim()
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        match &self.reply {
            Reply::Fixed(text) => Ok(text.clone()),
            Reply::EchoContext => Ok(format!("  {}\n", context_section(prompt))),
            Reply::Fail(message) => Err(LlmError::RequestFailed(message.clone())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_reply_counts_calls() {
        let model = MockLanguageModel::fixed("42");
        assert_eq!(model.generate("q").await.unwrap(), "42");
        assert_eq!(model.generate("q2").await.unwrap(), "42");
        assert_eq!(model.calls(), 2);
        assert_eq!(model.last_prompt().as_deref(), Some("q2"));
    }

    #[tokio::test]
    async fn test_echo_context() {
        let model = MockLanguageModel::echo_context();
        let prompt = "Intro\n\nContext: Paris is in France.\nChat History: \nQuestion: Where?";
        let answer = model.generate(prompt).await.unwrap();
        assert_eq!(answer.trim(), "Paris is in France.");
    }

    #[tokio::test]
    async fn test_failing_reply() {
        let model = MockLanguageModel::failing("quota exceeded");
        let err = model.generate("q").await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(model.calls(), 1);
    }
}
