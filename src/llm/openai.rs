use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{Answer, Completion, CompletionError, Message, Usage};

const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
const DONE_MARKER: &str = "[DONE]";

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub(crate) struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    stream: bool,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// One piece of a streamed answer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamEvent {
    Delta(String),
    Usage(Usage),
}

impl OpenAiClient {
    pub(crate) fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        stream: bool,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            stream,
        })
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<Response, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status, body });
        }
        Ok(response)
    }

    #[instrument(skip(self, messages), fields(model = %self.model))]
    pub(crate) async fn chat(&self, messages: &[Message]) -> Result<Answer, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: None,
            stream_options: None,
        };
        let body = self.send(&request).await?.text().await?;
        let response: ChatResponse =
            serde_json::from_str(&body).map_err(|e| CompletionError::Parse(e.to_string()))?;
        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(CompletionError::Empty)?;
        Ok(Answer {
            text,
            usage: response.usage.unwrap_or_default(),
        })
    }

    /// Streams the answer as server-sent events.
    ///
    /// The usage counters arrive as the final event, after every delta.
    #[instrument(skip(self, messages), fields(model = %self.model))]
    pub(crate) async fn chat_stream(
        &self,
        messages: &[Message],
    ) -> Result<impl Stream<Item = Result<StreamEvent, CompletionError>>, CompletionError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: Some(true),
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        };
        let response = self.send(&request).await?;

        Ok(stream! {
            let mut buffer = Vec::new();
            let mut bytes = std::pin::pin!(response.bytes_stream());

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(CompletionError::Http(e));
                        return;
                    }
                };
                push_chunk(&mut buffer, &chunk);

                while let Some(event) = extract_sse_event(&mut buffer) {
                    let event = match event {
                        Ok(event) => event,
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    };
                    match parse_sse_event(&event) {
                        SseData::Done => return,
                        SseData::Skip => {}
                        SseData::Chunk(Ok(events)) => {
                            for event in events {
                                yield Ok(event);
                            }
                        }
                        SseData::Chunk(Err(e)) => yield Err(e),
                    }
                }
            }
        })
    }

    /// Drives a streamed answer to the end and folds it into one `Answer`.
    pub(crate) async fn chat_collected(
        &self,
        messages: &[Message],
    ) -> Result<Answer, CompletionError> {
        let events = self.chat_stream(messages).await?;
        collect_stream(events).await
    }
}

#[async_trait]
impl Completion for OpenAiClient {
    async fn complete(&self, messages: &[Message]) -> Result<Answer, CompletionError> {
        if self.stream {
            self.chat_collected(messages).await
        } else {
            self.chat(messages).await
        }
    }
}

pub(crate) async fn collect_stream<S>(events: S) -> Result<Answer, CompletionError>
where
    S: Stream<Item = Result<StreamEvent, CompletionError>>,
{
    let mut events = std::pin::pin!(events);
    let mut text = String::new();
    let mut usage = Usage::default();
    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::Delta(delta) => text.push_str(&delta),
            StreamEvent::Usage(u) => usage = u,
        }
    }
    if text.is_empty() {
        return Err(CompletionError::Empty);
    }
    debug!(chars = text.len(), "collected streamed answer");
    Ok(Answer { text, usage })
}

enum SseData {
    Chunk(Result<Vec<StreamEvent>, CompletionError>),
    Done,
    Skip,
}

/// Appends raw bytes, dropping carriage returns so events split on `\n\n`.
fn push_chunk(buffer: &mut Vec<u8>, chunk: &[u8]) {
    buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));
}

/// Removes and decodes the next complete event from `buffer`.
///
/// Bytes stay undecoded until the event is complete, so a character split
/// across network chunks is reassembled first.
fn extract_sse_event(buffer: &mut Vec<u8>) -> Option<Result<String, CompletionError>> {
    let idx = buffer.windows(2).position(|w| w == b"\n\n")?;
    let event: Vec<u8> = buffer.drain(..idx + 2).take(idx).collect();
    Some(String::from_utf8(event).map_err(|e| CompletionError::Parse(e.to_string())))
}

fn parse_sse_event(event: &str) -> SseData {
    let data: Vec<&str> = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();
    if data.is_empty() {
        return SseData::Skip;
    }
    let data = data.join("\n");
    if data.trim() == DONE_MARKER {
        return SseData::Done;
    }
    let chunk = match serde_json::from_str::<ChunkResponse>(&data) {
        Ok(chunk) => chunk,
        Err(e) => return SseData::Chunk(Err(CompletionError::Parse(e.to_string()))),
    };
    let mut events: Vec<StreamEvent> = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .filter(|content| !content.is_empty())
        .map(StreamEvent::Delta)
        .collect();
    if let Some(usage) = chunk.usage {
        events.push(StreamEvent::Usage(usage));
    }
    SseData::Chunk(Ok(events))
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use futures::stream;
    use warp::Filter;

    use super::*;

    #[test]
    fn extract_sse_event_splits_on_blank_line() {
        let mut buffer = Vec::new();
        push_chunk(&mut buffer, b"data: {\"a\":1}\r\n\r\ndata: [DONE]\n\n");
        assert_eq!(extract_sse_event(&mut buffer).unwrap().unwrap(), "data: {\"a\":1}");
        assert_eq!(extract_sse_event(&mut buffer).unwrap().unwrap(), "data: [DONE]");
        assert!(extract_sse_event(&mut buffer).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn extract_sse_event_keeps_partial_event() {
        let mut buffer = Vec::new();
        push_chunk(&mut buffer, b"data: {\"choices\":[");
        assert!(extract_sse_event(&mut buffer).is_none());
        assert_eq!(buffer, b"data: {\"choices\":[");
    }

    #[test]
    fn character_split_across_chunks_is_reassembled() {
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"\u{20b9}500 bra\"}}]}\n\n";
        let split = event.find('\u{20b9}').unwrap() + 1;
        let (first, second) = event.as_bytes().split_at(split);

        let mut buffer = Vec::new();
        push_chunk(&mut buffer, first);
        assert!(extract_sse_event(&mut buffer).is_none());
        push_chunk(&mut buffer, second);
        let decoded = extract_sse_event(&mut buffer).unwrap().unwrap();
        match parse_sse_event(&decoded) {
            SseData::Chunk(Ok(events)) => {
                assert_eq!(events, vec![StreamEvent::Delta("\u{20b9}500 bra".to_string())]);
            }
            _ => panic!("expected a delta"),
        }
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut buffer = Vec::new();
        push_chunk(&mut buffer, b"data: \xff\n\n");
        assert!(matches!(
            extract_sse_event(&mut buffer),
            Some(Err(CompletionError::Parse(_)))
        ));
    }

    #[test]
    fn parse_sse_event_reads_delta_and_usage() {
        let event = r#"data: {"choices":[{"delta":{"content":"Hello"}}],"usage":null}"#;
        match parse_sse_event(event) {
            SseData::Chunk(Ok(events)) => {
                assert_eq!(events, vec![StreamEvent::Delta("Hello".to_string())]);
            }
            _ => panic!("expected a delta"),
        }

        let event = r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#;
        match parse_sse_event(event) {
            SseData::Chunk(Ok(events)) => {
                assert_eq!(events, vec![StreamEvent::Usage(Usage::new(3, 2))]);
            }
            _ => panic!("expected usage"),
        }

        assert!(matches!(parse_sse_event("data: [DONE]"), SseData::Done));
        assert!(matches!(parse_sse_event(": keep-alive"), SseData::Skip));
    }

    #[tokio::test]
    async fn collect_stream_concatenates_deltas() {
        let events = stream::iter(vec![
            Ok(StreamEvent::Delta("https://host/".to_string())),
            Ok(StreamEvent::Delta("bra-online/".to_string())),
            Ok(StreamEvent::Usage(Usage::new(7, 4))),
        ]);
        let answer = collect_stream(events).await.unwrap();
        assert_eq!(answer.text, "https://host/bra-online/");
        assert_eq!(answer.usage, Usage::new(7, 4));
    }

    #[tokio::test]
    async fn collect_stream_propagates_failure() {
        let events = stream::iter(vec![
            Ok(StreamEvent::Delta("partial".to_string())),
            Err(CompletionError::Service("connection reset".to_string())),
        ]);
        assert!(collect_stream(events).await.is_err());
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn serve_once(status: u16, body: &'static str) -> String {
        let route = warp::path!("v1" / "chat" / "completions")
            .and(warp::post())
            .and_then(move || async move {
                Ok::<_, Infallible>(warp::reply::with_status(
                    body,
                    warp::http::StatusCode::from_u16(status).unwrap(),
                ))
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{addr}/v1")
    }

    #[tokio::test]
    async fn chat_returns_text_and_usage() {
        let url = serve_once(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"[here](https://www.shyaway.com/bra-online/?size=32b)"}}],"usage":{"prompt_tokens":120,"completion_tokens":30,"total_tokens":150}}"#,
        )
        .await;
        let client = OpenAiClient::new(&url, Some("key".to_string()), "gpt", false, TIMEOUT).unwrap();
        let answer = client.complete(&[Message::user("bra")]).await.unwrap();
        assert!(answer.text.contains("bra-online"));
        assert_eq!(answer.usage, Usage::new(120, 30));
    }

    #[tokio::test]
    async fn chat_streams_into_one_answer() {
        let url = serve_once(
            200,
            "data: {\"choices\":[{\"delta\":{\"content\":\"size=\"}}]}\n\n\
             data: {\"choices\":[{\"delta\":{\"content\":\"32b\"}}]}\n\n\
             data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":2,\"total_tokens\":11}}\n\n\
             data: [DONE]\n\n",
        )
        .await;
        let client = OpenAiClient::new(&url, None, "gpt", true, TIMEOUT).unwrap();
        let answer = client.complete(&[Message::user("bra")]).await.unwrap();
        assert_eq!(answer.text, "size=32b");
        assert_eq!(answer.usage.total_tokens, 11);
    }

    #[tokio::test]
    async fn service_error_is_reported() {
        let url = serve_once(503, "overloaded").await;
        let client = OpenAiClient::new(&url, None, "gpt", false, TIMEOUT).unwrap();
        match client.complete(&[Message::user("bra")]).await {
            Err(CompletionError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn streamed_character_split_across_writes_is_intact() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"\u{20b9}500 bra\"}}]}\n\ndata: [DONE]\n\n";
        let split = body.find('\u{20b9}').unwrap() + 1;
        let route = warp::path!("v1" / "chat" / "completions")
            .and(warp::post())
            .map(move || {
                let (first, second) = body.as_bytes().split_at(split);
                let (first, second) = (first.to_vec(), second.to_vec());
                let chunks = async_stream::stream! {
                    yield Ok::<_, Infallible>(first);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    yield Ok(second);
                };
                warp::http::Response::new(warp::hyper::Body::wrap_stream(chunks))
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let client =
            OpenAiClient::new(&format!("http://{addr}/v1"), None, "gpt", true, TIMEOUT).unwrap();
        let answer = client.complete(&[Message::user("bra")]).await.unwrap();
        assert_eq!(answer.text, "\u{20b9}500 bra");
    }

    #[tokio::test]
    async fn stalled_service_times_out() {
        let route = warp::path!("v1" / "chat" / "completions")
            .and(warp::post())
            .and_then(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, Infallible>("too late")
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let client = OpenAiClient::new(
            &format!("http://{addr}/v1"),
            None,
            "gpt",
            false,
            Duration::from_millis(200),
        )
        .unwrap();
        match client.complete(&[Message::user("bra")]).await {
            Err(CompletionError::Http(e)) => assert!(e.is_timeout()),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
