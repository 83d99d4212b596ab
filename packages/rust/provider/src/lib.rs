//! OpenRouter text generation provider.
//!
//! Implements the core's [`TextGenerator`] seam against the OpenRouter
//! chat-completions API with `stream: true`. The response is server-sent
//! events; each `data:` line carries one JSON chunk whose
//! `choices[0].delta.content` is the next content delta, and the literal
//! `data: [DONE]` line ends the stream.

use std::collections::VecDeque;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use storyloom_core::{DeltaStream, GenerationRequest, TextGenerator};
use storyloom_shared::{Result, StoryloomError};

/// Default OpenRouter API base.
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/";

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("Storyloom/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Streaming chat-completions client for OpenRouter.
pub struct OpenRouterClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl OpenRouterClient {
    /// Create a client against the public OpenRouter endpoint.
    pub fn new(api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoryloomError::Network(format!("failed to build HTTP client: {e}")))?;

        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|e| StoryloomError::Network(format!("invalid base URL: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    /// Point the client at a different API base (mock servers in tests,
    /// self-hosted gateways).
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }
}

/// One chat message in the request body.
#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Chat-completions request body. Sampling fields use OpenRouter's names.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    temperature: f64,
    top_p: f64,
    top_k: f64,
    min_p: f64,
    #[serde(rename = "repetition_penalty")]
    repeat_penalty: f64,
}

impl TextGenerator for OpenRouterClient {
    type Stream = OpenRouterStream;

    #[instrument(skip_all, fields(model = %request.model))]
    async fn start(&self, request: &GenerationRequest) -> Result<Self::Stream> {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &request.model,
            messages,
            stream: true,
            temperature: request.params.temperature,
            top_p: request.params.top_p,
            top_k: request.params.top_k,
            min_p: request.params.min_p,
            repeat_penalty: request.params.repeat_penalty,
        };

        let endpoint = self
            .base_url
            .join("chat/completions")
            .map_err(|e| StoryloomError::Network(format!("invalid endpoint: {e}")))?;

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoryloomError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, "generation request rejected");
            return Err(StoryloomError::Network(format!(
                "HTTP {status}: {}",
                detail.trim()
            )));
        }

        debug!("stream opened");
        Ok(OpenRouterStream {
            response,
            buffer: String::new(),
            pending: VecDeque::new(),
            done: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// An in-flight SSE response. Dropping it closes the connection, which is
/// the only cancellation this API offers.
#[derive(Debug)]
pub struct OpenRouterStream {
    response: reqwest::Response,
    /// Bytes received but not yet terminated by a newline.
    buffer: String,
    /// Deltas parsed but not yet handed to the caller.
    pending: VecDeque<String>,
    done: bool,
}

impl DeltaStream for OpenRouterStream {
    async fn next_delta(&mut self) -> Option<Result<String>> {
        loop {
            if let Some(delta) = self.pending.pop_front() {
                return Some(Ok(delta));
            }
            if self.done {
                return None;
            }

            match self.response.chunk().await {
                Ok(Some(bytes)) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for line in take_complete_lines(&mut self.buffer) {
                        match parse_sse_line(&line) {
                            Ok(Some(SseEvent::Delta(text))) => self.pending.push_back(text),
                            Ok(Some(SseEvent::Done)) => {
                                self.done = true;
                                break;
                            }
                            Ok(None) => {}
                            Err(e) => return Some(Err(e)),
                        }
                    }
                }
                Ok(None) => {
                    // Body ended. A missing [DONE] still means completion;
                    // anything buffered without a newline is dropped.
                    self.done = true;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(StoryloomError::Stream(e.to_string())));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SSE parsing
// ---------------------------------------------------------------------------

/// One meaningful event parsed from an SSE line.
#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Remove and return every newline-terminated line from `buffer`, leaving a
/// trailing partial line in place.
fn take_complete_lines(buffer: &mut String) -> Vec<String> {
    let Some(last_newline) = buffer.rfind('\n') else {
        return Vec::new();
    };
    let rest = buffer.split_off(last_newline + 1);
    let complete = std::mem::replace(buffer, rest);
    complete
        .lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect()
}

/// Parse one SSE line. Comment lines (OpenRouter sends `: OPENROUTER
/// PROCESSING` keep-alives), blank lines, and chunks without content are
/// ignored; a `data:` line with unparseable JSON is a stream error.
fn parse_sse_line(line: &str) -> Result<Option<SseEvent>> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }
    if data.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| StoryloomError::Stream(format!("malformed SSE chunk: {e}")))?;

    let content = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str());

    Ok(content.map(|c| SseEvent::Delta(c.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    use storyloom_shared::SamplingParams;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunk_json(content: &str) -> String {
        format!(
            r#"data: {{"choices":[{{"delta":{{"content":{}}}}}]}}"#,
            serde_json::to_string(content).unwrap()
        )
    }

    fn request(prompt: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.into(),
            system_prompt: "You are a novelist.".into(),
            model: "moonshotai/kimi-k2.5".into(),
            params: SamplingParams::default(),
        }
    }

    async fn collect(mut stream: OpenRouterStream) -> Result<String> {
        let mut out = String::new();
        while let Some(delta) = stream.next_delta().await {
            out.push_str(&delta?);
        }
        Ok(out)
    }

    // -- pure parsing --------------------------------------------------------

    #[test]
    fn parses_content_delta() {
        let event = parse_sse_line(&chunk_json("Once upon")).unwrap();
        assert_eq!(event, Some(SseEvent::Delta("Once upon".into())));
    }

    #[test]
    fn parses_done_marker() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), Some(SseEvent::Done));
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        assert_eq!(parse_sse_line(": OPENROUTER PROCESSING").unwrap(), None);
        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line("data:").unwrap(), None);
    }

    #[test]
    fn ignores_chunks_without_content() {
        // Role-only or finish_reason chunks carry no content delta.
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), None);

        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), None);
    }

    #[test]
    fn malformed_json_is_a_stream_error() {
        let err = parse_sse_line("data: {not json").unwrap_err();
        assert!(matches!(err, StoryloomError::Stream(_)));
    }

    #[test]
    fn take_complete_lines_keeps_partial_tail() {
        let mut buffer = String::from("data: a\r\ndata: b\ndata: par");
        let lines = take_complete_lines(&mut buffer);
        assert_eq!(lines, vec!["data: a", "data: b"]);
        assert_eq!(buffer, "data: par");

        buffer.push_str("tial\n");
        let lines = take_complete_lines(&mut buffer);
        assert_eq!(lines, vec!["data: partial"]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn take_complete_lines_without_newline_returns_nothing() {
        let mut buffer = String::from("data: incomplete");
        assert!(take_complete_lines(&mut buffer).is_empty());
        assert_eq!(buffer, "data: incomplete");
    }

    // -- mock server ---------------------------------------------------------

    #[tokio::test]
    async fn streams_deltas_until_done() {
        let server = MockServer::start().await;
        let body = format!(
            "{}\n{}\n{}\ndata: [DONE]\n",
            chunk_json("The rain "),
            chunk_json("had "),
            chunk_json("stopped."),
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "moonshotai/kimi-k2.5",
                "stream": true,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new("test-key")
            .unwrap()
            .with_base_url(Url::parse(&format!("{}/", server.uri())).unwrap());

        let stream = client.start(&request("continue the scene")).await.unwrap();
        let text = collect(stream).await.unwrap();
        assert_eq!(text, "The rain had stopped.");
    }

    #[tokio::test]
    async fn missing_done_marker_still_completes() {
        let server = MockServer::start().await;
        let body = format!("{}\n{}\n", chunk_json("only "), chunk_json("this"));

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new("test-key")
            .unwrap()
            .with_base_url(Url::parse(&format!("{}/", server.uri())).unwrap());

        let stream = client.start(&request("go")).await.unwrap();
        assert_eq!(collect(stream).await.unwrap(), "only this");
    }

    #[tokio::test]
    async fn http_error_surfaces_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(401).set_body_string(r#"{"error":"bad key"}"#),
            )
            .mount(&server)
            .await;

        let client = OpenRouterClient::new("wrong-key")
            .unwrap()
            .with_base_url(Url::parse(&format!("{}/", server.uri())).unwrap());

        let err = client.start(&request("go")).await.unwrap_err();
        assert!(matches!(err, StoryloomError::Network(_)));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn system_prompt_is_omitted_when_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{"role": "user", "content": "just write"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("data: [DONE]\n"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new("test-key")
            .unwrap()
            .with_base_url(Url::parse(&format!("{}/", server.uri())).unwrap());

        let mut req = request("just write");
        req.system_prompt.clear();
        let stream = client.start(&req).await.unwrap();
        assert_eq!(collect(stream).await.unwrap(), "");
    }
}
