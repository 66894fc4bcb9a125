//! Endpoint failover driver.
//!
//! Each call walks the model's candidate URLs strictly in order, one at a
//! time:
//!
//! ```text
//! Pending(0) -> Sending -+-> 200: decode stream ------------> Success
//!                        +-> 429 / 5xx / transport / timeout -> Pending(i+1)
//!                        |                                     (or Exhausted)
//!                        +-> any other status ---------------> Fatal
//! ```
//!
//! A 4xx other than 429 aborts the whole call: switching mirrors does not
//! fix a bad request or a rejected key.

use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::endpoints::{build_endpoints_for, redact_url};
use super::sse::SseDecoder;
use super::{DecodedEvent, EncodedRequest, ProviderProtocol};
use crate::error::LlmError;
use crate::types::{CompletionRequest, Delivery, ModelConfig, StreamChunk};

/// Per-attempt bound for content generation.
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-attempt bound for connectivity probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// LLM client shared by every call.
///
/// Holds one connection pool; calls never mutate shared state, so the
/// client can be cloned freely.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    generation_timeout: Duration,
    probe_timeout: Duration,
}

impl Default for LlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient {
    pub fn new() -> Self {
        Self::with_timeouts(GENERATION_TIMEOUT, PROBE_TIMEOUT)
    }

    /// `generation` bounds the wait for response headers and every gap
    /// between body chunks of a streaming call; `probe` bounds a whole
    /// connectivity probe attempt.
    pub fn with_timeouts(generation: Duration, probe: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            generation_timeout: generation,
            probe_timeout: probe,
        }
    }

    /// Stream a completion, trying each candidate endpoint in turn.
    ///
    /// Every fragment is sent on `chunk_tx` as soon as it is decoded; the
    /// stream ends with exactly one `Done` or `Error` chunk. Returns the
    /// concatenated text.
    pub async fn stream_completion(
        &self,
        config: &ModelConfig,
        request: &CompletionRequest,
        chunk_tx: &mpsc::UnboundedSender<StreamChunk>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let result = self.run_stream(config, request, chunk_tx, cancel).await;
        match &result {
            Ok(_) => {
                let _ = chunk_tx.send(StreamChunk::Done);
            }
            Err(e) => {
                let _ = chunk_tx.send(StreamChunk::Error(e.to_string()));
            }
        }
        result
    }

    async fn run_stream(
        &self,
        config: &ModelConfig,
        request: &CompletionRequest,
        chunk_tx: &mpsc::UnboundedSender<StreamChunk>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        ensure_credential(config)?;

        let protocol = config.provider.protocol();
        let encoded = protocol.encode(config, request);
        let candidates = build_endpoints_for(config, request.delivery);
        let total = candidates.len();
        let mut last_error = None;

        for (index, url) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(LlmError::Cancelled);
            }
            info!(
                attempt = index + 1,
                total,
                provider = protocol.name(),
                url = %redact_url(url),
                "Sending completion request"
            );

            let attempt = match self
                .send(url, &encoded, self.generation_timeout, cancel)
                .await
            {
                Ok(response) => self.read_stream(response, protocol, chunk_tx, cancel).await,
                Err(e) => Err(e),
            };

            match attempt {
                Ok(content) => {
                    debug!(attempt = index + 1, chars = content.len(), "Stream complete");
                    return Ok(content);
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt = index + 1, total, error = %e, "Endpoint failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(exhausted(total, last_error))
    }

    /// Decode the SSE body, forwarding fragments as they arrive.
    async fn read_stream(
        &self,
        response: reqwest::Response,
        protocol: &'static dyn ProviderProtocol,
        chunk_tx: &mpsc::UnboundedSender<StreamChunk>,
        cancel: &CancellationToken,
    ) -> Result<String, LlmError> {
        let mut byte_stream = response.bytes_stream();
        let mut decoder = SseDecoder::new(protocol);
        let mut content = String::new();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(LlmError::Cancelled),
                next = tokio::time::timeout(self.generation_timeout, byte_stream.next()) => next,
            };
            let bytes = match next {
                Ok(Some(Ok(bytes))) => bytes,
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    return Err(interrupted(
                        &content,
                        LlmError::Transport(e.without_url().to_string()),
                    ))
                }
                Err(_) => return Err(interrupted(&content, LlmError::Timeout(self.generation_timeout))),
            };

            for event in decoder.feed(&bytes) {
                if deliver(event, &mut content, chunk_tx) {
                    return Ok(content);
                }
            }
        }

        for event in decoder.finish() {
            deliver(event, &mut content, chunk_tx);
        }
        Ok(content)
    }

    /// Measure round-trip latency with a tiny non-streaming request.
    ///
    /// Returns elapsed milliseconds for the first candidate answering 200.
    pub async fn test_connection(&self, config: &ModelConfig, max_tokens: u32) -> Result<u64, LlmError> {
        ensure_credential(config)?;

        let protocol = config.provider.protocol();
        let encoded = protocol.encode(config, &CompletionRequest::probe(max_tokens));
        let candidates = build_endpoints_for(config, Delivery::Unary);
        let total = candidates.len();
        let never = CancellationToken::new();
        let mut last_error = None;

        for (index, url) in candidates.iter().enumerate() {
            info!(
                attempt = index + 1,
                total,
                provider = protocol.name(),
                url = %redact_url(url),
                "Probing endpoint"
            );
            let started = Instant::now();
            match self.send(url, &encoded, self.probe_timeout, &never).await {
                Ok(_) => {
                    let elapsed = started.elapsed().as_millis() as u64;
                    info!(attempt = index + 1, elapsed_ms = elapsed, "Probe succeeded");
                    return Ok(elapsed);
                }
                Err(e) if e.is_retryable() => {
                    warn!(attempt = index + 1, total, error = %e, "Probe failed, trying next");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(exhausted(total, last_error))
    }

    /// POST one encoded request and classify the status.
    async fn send(
        &self,
        url: &str,
        encoded: &EncodedRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, LlmError> {
        let mut builder = self.client.post(url);
        for (name, value) in &encoded.headers {
            builder = builder.header(*name, value);
        }
        let builder = builder.json(&encoded.body);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
            result = tokio::time::timeout(timeout, builder.send()) => match result {
                Err(_) => return Err(LlmError::Timeout(timeout)),
                Ok(Err(e)) => return Err(LlmError::Transport(e.without_url().to_string())),
                Ok(Ok(response)) => response,
            },
        };

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = tokio::time::timeout(timeout, response.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body));
        }
        Ok(response)
    }
}

fn ensure_credential(config: &ModelConfig) -> Result<(), LlmError> {
    if config.has_credential() {
        Ok(())
    } else {
        Err(LlmError::Configuration(format!(
            "API key is empty for model '{}'",
            config.name
        )))
    }
}

/// Append a fragment to the buffer and forward it. Returns true at the
/// end-of-stream sentinel.
fn deliver(event: DecodedEvent, content: &mut String, chunk_tx: &mpsc::UnboundedSender<StreamChunk>) -> bool {
    match event {
        DecodedEvent::Fragment(text) => {
            content.push_str(&text);
            let _ = chunk_tx.send(StreamChunk::TextDelta(text));
            false
        }
        DecodedEvent::Done => true,
        DecodedEvent::Skip => false,
    }
}

/// Once text has reached the caller a retry would duplicate it, so a
/// failure mid-stream becomes terminal.
fn interrupted(content: &str, err: LlmError) -> LlmError {
    if content.is_empty() {
        err
    } else {
        LlmError::StreamInterrupted(err.to_string())
    }
}

fn exhausted(attempts: usize, last_error: Option<LlmError>) -> LlmError {
    LlmError::ExhaustedEndpoints {
        attempts,
        last: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no endpoint attempted".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OPENAI_SSE: &str = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
        data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
        : keep-alive\n\n\
        data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
        data: [DONE]\n\n";

    fn sse(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
    }

    fn openai_config(base: String, backups: Vec<String>) -> ModelConfig {
        ModelConfig::new("test", ProviderKind::OpenaiCompatible, "gpt-test")
            .with_api_key("sk")
            .with_base_url(base)
            .with_backup_urls(backups)
    }

    fn client() -> LlmClient {
        LlmClient::with_timeouts(Duration::from_millis(500), Duration::from_millis(500))
    }

    /// Read one HTTP request (headers plus `Content-Length` body).
    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    return;
                }
            }
        }
    }

    /// Serve one chunked SSE response that writes `frames` and never sends
    /// the terminating chunk. With `hold_open` the connection stays idle,
    /// otherwise it is closed, which breaks the body mid-stream.
    async fn broken_sse_server(frames: &[&str], hold_open: bool) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut response = String::from(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n",
        );
        for frame in frames {
            response.push_str(&format!("{:x}\r\n{}\r\n", frame.len(), frame));
        }
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            let idle = if hold_open { 30_000 } else { 50 };
            tokio::time::sleep(Duration::from_millis(idle)).await;
        });
        format!("http://{}", addr)
    }

    const HEL_FRAME: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n";

    async fn run(
        client: &LlmClient,
        config: &ModelConfig,
        cancel: &CancellationToken,
    ) -> (Result<String, LlmError>, Vec<StreamChunk>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let request = CompletionRequest::new("hello", 256);
        let result = client.stream_completion(config, &request, &tx, cancel).await;
        drop(tx);
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        (result, chunks)
    }

    #[tokio::test]
    async fn test_retries_until_third_candidate_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/c/chat/completions"))
            .and(header("Authorization", "Bearer sk"))
            .respond_with(sse(OPENAI_SSE))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let config = openai_config(
            format!("{}/a", uri),
            vec![format!("{}/b/", uri), format!("{}/c", uri)],
        );
        let (result, chunks) = run(&client(), &config, &CancellationToken::new()).await;

        assert_eq!(result.unwrap(), "Hello");
        assert_eq!(
            chunks,
            vec![
                StreamChunk::TextDelta("Hel".into()),
                StreamChunk::TextDelta("lo".into()),
                StreamChunk::Done,
            ]
        );
        let paths: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(
            paths,
            vec!["/a/chat/completions", "/b/chat/completions", "/c/chat/completions"]
        );
    }

    #[tokio::test]
    async fn test_client_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b/chat/completions"))
            .respond_with(sse(OPENAI_SSE))
            .expect(0)
            .mount(&server)
            .await;

        let uri = server.uri();
        let config = openai_config(format!("{}/a", uri), vec![format!("{}/b", uri)]);
        let (result, chunks) = run(&client(), &config, &CancellationToken::new()).await;

        assert_eq!(
            result.unwrap_err(),
            LlmError::ClientRequest {
                status: 401,
                body: "bad key".into()
            }
        );
        assert_eq!(chunks.len(), 1);
        assert!(matches!(&chunks[0], StreamChunk::Error(msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_exhausted_endpoints_report_last_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a/chat/completions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let config = openai_config(format!("{}/a", uri), vec![format!("{}/b", uri)]);
        let (result, chunks) = run(&client(), &config, &CancellationToken::new()).await;

        match result.unwrap_err() {
            LlmError::ExhaustedEndpoints { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("503"));
                assert!(last.contains("unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(chunks.last(), Some(StreamChunk::Error(_))));
    }

    #[tokio::test]
    async fn test_transport_error_and_timeout_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/slow/chat/completions"))
            .respond_with(sse(OPENAI_SSE).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ok/chat/completions"))
            .respond_with(sse(OPENAI_SSE))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        // Port 1 refuses connections.
        let config = openai_config(
            "http://127.0.0.1:1".to_string(),
            vec![format!("{}/slow", uri), format!("{}/ok", uri)],
        );
        let (result, _) = run(&client(), &config, &CancellationToken::new()).await;
        assert_eq!(result.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn test_gemini_stream_without_terminator() {
        let server = MockServer::start().await;
        let body = "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"# Title\\n\"}],\"role\":\"model\"}}]}\r\n\r\n\
            data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"$x^2$\"}],\"role\":\"model\"}}]}\r\n\r\n";
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .and(query_param("key", "k"))
            .respond_with(sse(body))
            .expect(1)
            .mount(&server)
            .await;

        let config = ModelConfig::new("flash", ProviderKind::Gemini, "gemini-2.0-flash")
            .with_api_key("k")
            .with_base_url(format!("{}/", server.uri()));
        let (result, chunks) = run(&client(), &config, &CancellationToken::new()).await;

        assert_eq!(result.unwrap(), "# Title\n$x^2$");
        assert_eq!(
            chunks,
            vec![
                StreamChunk::TextDelta("# Title\n".into()),
                StreamChunk::TextDelta("$x^2$".into()),
                StreamChunk::Done,
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_credential_fails_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse(OPENAI_SSE))
            .expect(0)
            .mount(&server)
            .await;

        let config = openai_config(server.uri(), vec![]).with_api_key("  ");
        let (result, chunks) = run(&client(), &config, &CancellationToken::new()).await;
        assert!(matches!(result, Err(LlmError::Configuration(_))));
        assert!(matches!(&chunks[..], [StreamChunk::Error(_)]));

        let latency = client().test_connection(&config, 10).await;
        assert!(matches!(latency, Err(LlmError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse(OPENAI_SSE))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let config = openai_config(server.uri(), vec![]);
        let (result, _) = run(&client(), &config, &cancel).await;
        assert_eq!(result.unwrap_err(), LlmError::Cancelled);
    }

    #[tokio::test]
    async fn test_connection_skips_failed_mirror() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Hi"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let config = openai_config(format!("{}/a", uri), vec![format!("{}/b", uri)]);
        let elapsed = client().test_connection(&config, 10).await.unwrap();
        assert!(elapsed < 500);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert!(body.get("stream").is_none());
        assert_eq!(body["max_tokens"], 10);
    }

    #[tokio::test]
    async fn test_connection_uses_unary_gemini_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "Hi"}]}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = ModelConfig::new("flash", ProviderKind::Gemini, "gemini-2.0-flash")
            .with_api_key("k")
            .with_base_url(server.uri());
        assert!(client().test_connection(&config, 10).await.is_ok());
    }

    #[tokio::test]
    async fn test_broken_stream_after_text_is_not_retried() {
        let backup = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse(OPENAI_SSE))
            .expect(0)
            .mount(&backup)
            .await;

        let primary = broken_sse_server(&[HEL_FRAME], false).await;
        let config = openai_config(primary, vec![backup.uri()]);
        let (result, chunks) = run(&client(), &config, &CancellationToken::new()).await;

        assert!(matches!(result, Err(LlmError::StreamInterrupted(_))));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], StreamChunk::TextDelta("Hel".into()));
        assert!(matches!(&chunks[1], StreamChunk::Error(_)));
    }

    #[tokio::test]
    async fn test_broken_stream_before_text_is_retried() {
        let backup = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(sse(OPENAI_SSE))
            .expect(1)
            .mount(&backup)
            .await;

        let primary = broken_sse_server(&[": keep-alive\n\n"], false).await;
        let config = openai_config(primary, vec![backup.uri()]);
        let (result, chunks) = run(&client(), &config, &CancellationToken::new()).await;

        assert_eq!(result.unwrap(), "Hello");
        assert_eq!(chunks.last(), Some(&StreamChunk::Done));
    }

    #[tokio::test]
    async fn test_cancel_during_stream() {
        let backup = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(sse(OPENAI_SSE))
            .expect(0)
            .mount(&backup)
            .await;

        let primary = broken_sse_server(&[HEL_FRAME], true).await;
        let config = openai_config(primary, vec![backup.uri()]);
        let client = LlmClient::with_timeouts(Duration::from_secs(5), Duration::from_secs(5));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Cancel as soon as the first fragment arrives.
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut chunks = Vec::new();
                while let Some(chunk) = rx.recv().await {
                    if matches!(chunk, StreamChunk::TextDelta(_)) {
                        cancel.cancel();
                    }
                    chunks.push(chunk);
                }
                chunks
            })
        };

        let request = CompletionRequest::new("hello", 256);
        let result = client.stream_completion(&config, &request, &tx, &cancel).await;
        drop(tx);
        let chunks = watcher.await.unwrap();

        assert_eq!(result.unwrap_err(), LlmError::Cancelled);
        assert_eq!(
            chunks,
            vec![
                StreamChunk::TextDelta("Hel".into()),
                StreamChunk::Error(LlmError::Cancelled.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_connection_client_error_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b/chat/completions"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let uri = server.uri();
        let config = openai_config(format!("{}/a", uri), vec![format!("{}/b", uri)]);
        assert_eq!(
            client().test_connection(&config, 10).await.unwrap_err(),
            LlmError::ClientRequest {
                status: 401,
                body: "bad key".into()
            }
        );
    }

    #[tokio::test]
    async fn test_connection_exhausts_endpoints() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/a/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/b/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;

        let uri = server.uri();
        let config = openai_config(format!("{}/a", uri), vec![format!("{}/b", uri)]);
        match client().test_connection(&config, 10).await.unwrap_err() {
            LlmError::ExhaustedEndpoints { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("overloaded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
