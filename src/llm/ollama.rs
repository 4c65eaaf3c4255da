use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    Ollama,
};
use tracing::debug;
use url::Url;

use super::{Answer, Completion, CompletionError, Message, Role, Usage};

/// A locally hosted model served by Ollama.
pub(crate) struct OllamaClient {
    client: Ollama,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub(crate) fn new(url: &str, model: &str, timeout: Duration) -> Result<Self, CompletionError> {
        let url = Url::parse(url).map_err(|e| CompletionError::Service(format!("{url}: {e}")))?;
        Ok(Self {
            client: Ollama::from_url(url),
            model: model.to_string(),
            timeout,
        })
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.clone()),
        Role::User => ChatMessage::user(message.content.clone()),
        Role::Assistant => ChatMessage::assistant(message.content.clone()),
    }
}

#[async_trait]
impl Completion for OllamaClient {
    async fn complete(&self, messages: &[Message]) -> Result<Answer, CompletionError> {
        let history = messages.iter().map(to_chat_message).collect();
        let request = ChatMessageRequest::new(self.model.clone(), history);
        let response = tokio::time::timeout(self.timeout, self.client.send_chat_messages(request))
            .await
            .map_err(|_| CompletionError::Timeout(self.timeout))?
            .map_err(|e| CompletionError::Service(e.to_string()))?;

        let usage = response
            .final_data
            .map(|data| {
                Usage::new(
                    u64::from(data.prompt_eval_count),
                    u64::from(data.eval_count),
                )
            })
            .unwrap_or_default();
        let text = response.message.content;
        if text.is_empty() {
            return Err(CompletionError::Empty);
        }
        debug!(model = %self.model, tokens = usage.total_tokens, "ollama answered");
        Ok(Answer { text, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_map_onto_ollama_messages() {
        let converted = to_chat_message(&Message::system("rules"));
        assert_eq!(converted.content, "rules");
        let converted = to_chat_message(&Message::user("red bra"));
        assert_eq!(converted.content, "red bra");
    }

    #[test]
    fn rejects_unparsable_url() {
        let timeout = Duration::from_secs(1);
        assert!(OllamaClient::new("not a url", "llama3.2", timeout).is_err());
        assert!(OllamaClient::new("http://127.0.0.1:11434", "llama3.2", timeout).is_ok());
    }

    #[tokio::test]
    async fn stalled_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = OllamaClient::new(
            &format!("http://{addr}"),
            "llama3.2",
            Duration::from_millis(200),
        )
        .unwrap();
        let err = client.complete(&[Message::user("bra")]).await.unwrap_err();
        assert!(matches!(err, CompletionError::Timeout(_)));
    }
}
