//! Generation backend collaborator — Ollama-style HTTP client.
//!
//! The pipeline's decision is final before generation starts; this module
//! only turns grounding context into prose. Both a blocking call and a
//! buffered, cancellable streaming variant are provided. The request-level
//! timeout is owned by the caller.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Flush the stream buffer once this many characters accumulate.
const STREAM_FLUSH_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation backend request failed: {0}")]
    Backend(String),
    #[error("generation backend returned empty output")]
    Empty,
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub num_predict: u32,
    pub temperature: f32,
}

/// Receiving half of a token stream. The sender stops when the backend
/// finishes, errors, or the cancellation token fires.
pub type TokenStream = mpsc::Receiver<Result<String, GenerationError>>;

/// Language generation interface. Only called on the answer branch.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate the full answer text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Generate incrementally. Chunks are buffered so consumers are not fed
    /// word-by-word; concatenating them equals the non-stream response for
    /// the same prompt and options.
    async fn generate_stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, GenerationError>;
}

/// Ollama `/api/generate` client.
pub struct OllamaGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaGenerator {
    pub fn new(client: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    fn payload(&self, request: &GenerationRequest, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "prompt": request.prompt,
            "stream": stream,
            // Keep the model resident between requests.
            "keep_alive": "10m",
            "options": {
                "temperature": request.temperature,
                "num_predict": request.num_predict,
                "num_ctx": 4096,
            },
        })
    }

    async fn post(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        self.client
            .post(format!("{}/api/generate", self.base_url))
            .json(&self.payload(request, stream))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| GenerationError::Backend(e.to_string()))
    }
}

#[async_trait]
impl GenerationBackend for OllamaGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let resp = self.post(request, false).await?;
        let line: GenerateLine = resp
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        let answer = line.response.trim().to_string();
        if answer.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(answer)
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, GenerationError> {
        let resp = self.post(request, true).await?;
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut bytes = resp.bytes_stream();
            let mut line_buf = String::new();
            let mut out_buf = String::new();

            loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("generation stream cancelled");
                        return;
                    }
                    chunk = bytes.next() => chunk,
                };

                let Some(chunk) = chunk else { break };
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(GenerationError::Backend(e.to_string()))).await;
                        return;
                    }
                };

                line_buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = line_buf.find('\n') {
                    let line: String = line_buf.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let Ok(parsed) = serde_json::from_str::<GenerateLine>(line) else {
                        continue;
                    };
                    out_buf.push_str(&parsed.response);
                    if out_buf.len() >= STREAM_FLUSH_CHARS {
                        if tx.send(Ok(std::mem::take(&mut out_buf))).await.is_err() {
                            return;
                        }
                    }
                    if parsed.done {
                        if !out_buf.is_empty() {
                            let _ = tx.send(Ok(std::mem::take(&mut out_buf))).await;
                        }
                        return;
                    }
                }
            }

            if !out_buf.is_empty() {
                let _ = tx.send(Ok(out_buf)).await;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let generator = OllamaGenerator::new(
            reqwest::Client::new(),
            "http://localhost:11434/",
            "llama3.1:8b",
        );
        let payload = generator.payload(
            &GenerationRequest {
                prompt: "hello".to_string(),
                num_predict: 350,
                temperature: 0.4,
            },
            true,
        );
        assert_eq!(payload["model"], "llama3.1:8b");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["keep_alive"], "10m");
        assert_eq!(payload["options"]["num_predict"], 350);
        assert_eq!(payload["options"]["num_ctx"], 4096);
    }

    #[test]
    fn test_generate_line_parsing() {
        let line: GenerateLine =
            serde_json::from_str(r#"{"response":"hello ","done":false}"#).unwrap();
        assert_eq!(line.response, "hello ");
        assert!(!line.done);

        // Terminal lines may omit the response field
        let line: GenerateLine = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert!(line.done);
        assert!(line.response.is_empty());
    }
}
