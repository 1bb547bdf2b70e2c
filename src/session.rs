//! Interactive chat session state and turn execution
//!
//! A session owns the transcript plus the generation parameters that
//! accompany every request. Turns are all-or-nothing: either a turn
//! completes and exactly one assistant message is appended (or, for a
//! continuation, extended), or it fails and the transcript is left as
//! it was when generation started.

use futures_util::StreamExt;

use crate::llm::{GatewayError, GenerationRequest, InferenceBackend};
use crate::transcript::{Role, Transcript};

/// Session state for one interactive chat
///
/// Single-threaded by construction: there is exactly one mutator, and
/// the only suspension point is the backend call inside
/// [`Session::execute_turn`].
pub struct Session {
    pub transcript: Transcript,
    pub context_window: u32,
    pub model: String,
    pub seed: u32,
}

impl Session {
    pub fn new(model: impl Into<String>, context_window: u32, seed: u32) -> Self {
        Self {
            transcript: Transcript::new(),
            context_window,
            model: model.into(),
            seed,
        }
    }

    fn request(&self) -> GenerationRequest {
        GenerationRequest {
            model: self.model.clone(),
            messages: self.transcript.messages().to_vec(),
            seed: Some(self.seed),
            stream: true,
            num_ctx: Some(self.context_window),
            num_predict: None,
            temperature: None,
            think: None,
        }
    }

    /// Drive one conversation turn to completion
    ///
    /// `user_text` is `None` for a continuation turn, which asks the
    /// model to extend the transcript as-is. Each fragment is surfaced
    /// through `on_fragment` as soon as the backend produces it.
    ///
    /// On failure nothing is committed beyond the user message already
    /// appended; the accumulated partial answer is discarded.
    pub async fn execute_turn<F>(
        &mut self,
        backend: &dyn InferenceBackend,
        user_text: Option<&str>,
        mut on_fragment: F,
    ) -> Result<(), GatewayError>
    where
        F: FnMut(&str),
    {
        if let Some(text) = user_text {
            self.transcript.push_user(text);
        }

        let mut fragments = backend.stream(self.request()).await?;

        let mut answer = String::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            on_fragment(&fragment);
            answer.push_str(&fragment);
        }

        match self.transcript.last_role() {
            // Continuation: grow the assistant's last message in place
            Some(Role::Assistant) => self.transcript.extend_last_assistant(&answer),
            _ => self.transcript.push_assistant(answer.trim()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FragmentStream, ModelInfo};
    use crate::transcript::Message;
    use async_trait::async_trait;
    use futures_util::stream;

    /// Backend that replays a scripted fragment sequence
    struct ScriptedBackend {
        fragments: Vec<Result<String, &'static str>>,
    }

    impl ScriptedBackend {
        fn ok(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            }
        }

        fn failing_after(fragments: &[&str], error: &'static str) -> Self {
            let mut scripted: Vec<Result<String, &'static str>> =
                fragments.iter().map(|f| Ok(f.to_string())).collect();
            scripted.push(Err(error));
            Self { fragments: scripted }
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        async fn generate(&self, _request: GenerationRequest) -> Result<String, GatewayError> {
            let mut answer = String::new();
            for fragment in &self.fragments {
                match fragment {
                    Ok(f) => answer.push_str(f),
                    Err(e) => return Err(GatewayError::Generation(e.to_string())),
                }
            }
            Ok(answer)
        }

        async fn stream(&self, _request: GenerationRequest) -> Result<FragmentStream, GatewayError> {
            let items: Vec<Result<String, GatewayError>> = self
                .fragments
                .iter()
                .map(|f| match f {
                    Ok(s) => Ok(s.clone()),
                    Err(e) => Err(GatewayError::Generation(e.to_string())),
                })
                .collect();
            Ok(Box::pin(stream::iter(items)))
        }

        async fn models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
            Ok(Vec::new())
        }
    }

    fn session() -> Session {
        Session::new("test-model", 2048, 7)
    }

    #[tokio::test]
    async fn test_turn_appends_one_assistant_message() {
        let backend = ScriptedBackend::ok(&["Hel", "lo"]);
        let mut session = session();

        let mut seen = Vec::new();
        session
            .execute_turn(&backend, Some("hi there"), |f| seen.push(f.to_string()))
            .await
            .unwrap();

        // Fragments surfaced incrementally, not as one buffered answer
        assert_eq!(seen, vec!["Hel", "lo"]);
        assert_eq!(
            session.transcript.messages(),
            &[Message::user("hi there"), Message::assistant("Hello")]
        );
    }

    #[tokio::test]
    async fn test_answer_is_trimmed() {
        let backend = ScriptedBackend::ok(&["  Hello\n"]);
        let mut session = session();
        session
            .execute_turn(&backend, Some("hi"), |_| {})
            .await
            .unwrap();
        assert_eq!(session.transcript.messages()[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_failed_turn_commits_nothing() {
        let backend = ScriptedBackend::failing_after(&["one", "two"], "backend fell over");
        let mut session = session();

        let mut seen = Vec::new();
        let err = session
            .execute_turn(&backend, Some("hi"), |f| seen.push(f.to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Generation(_)));
        // Fragments already surfaced are not retracted
        assert_eq!(seen, vec!["one", "two"]);
        // But no partial assistant message is committed
        assert_eq!(session.transcript.messages(), &[Message::user("hi")]);
    }

    #[tokio::test]
    async fn test_continuation_extends_last_assistant() {
        let backend = ScriptedBackend::ok(&[" world"]);
        let mut session = session();
        session.transcript.push_user("hi");
        session.transcript.push_assistant("Hello");

        session.execute_turn(&backend, None, |_| {}).await.unwrap();

        assert_eq!(session.transcript.len(), 2);
        assert_eq!(session.transcript.messages()[1].content, "Hello world");
    }

    #[tokio::test]
    async fn test_failed_continuation_leaves_assistant_untouched() {
        let backend = ScriptedBackend::failing_after(&["par"], "gone");
        let mut session = session();
        session.transcript.push_user("hi");
        session.transcript.push_assistant("Hello");

        session.execute_turn(&backend, None, |_| {}).await.unwrap_err();

        assert_eq!(session.transcript.messages()[1].content, "Hello");
    }

    #[tokio::test]
    async fn test_request_snapshots_state() {
        let mut session = session();
        session.transcript.set_system("be brief");
        session.transcript.push_user("hi");
        session.context_window = 4096;

        let request = session.request();
        assert_eq!(request.model, "test-model");
        assert_eq!(request.num_ctx, Some(4096));
        assert_eq!(request.seed, Some(7));
        assert!(request.stream);
        assert_eq!(request.messages.len(), 2);
    }
}
