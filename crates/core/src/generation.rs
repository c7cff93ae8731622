use crate::error::GenerationError;
use crate::traits::Generator;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "tinyllama";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Joins `path` under `base_url`, keeping any path prefix the base carries
/// (a proxy mounting Ollama under `/ollama`, for example).
pub(crate) fn api_endpoint(base_url: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base_url)?;
    if !base.path().ends_with('/') {
        let prefix = format!("{}/", base.path());
        base.set_path(&prefix);
    }
    base.join(path)
}

/// Non-streaming completions from Ollama's `/api/generate`.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaGenerator {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: api_endpoint(base_url, "api/generate")?,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<Option<String>, GenerationError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers exactly one request with `status_line` and `body`, then closes.
    async fn reply_once(status_line: &'static str, body: &'static str) -> std::io::Result<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            let mut request = Vec::new();
            let mut buffer = [0u8; 4096];
            loop {
                let Ok(read) = socket.read(&mut buffer).await else {
                    return;
                };
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buffer[..read]);
                if request_complete(&request) {
                    break;
                }
            }

            let reply = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(reply.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        Ok(format!("http://{addr}"))
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn generator(base_url: &str) -> Result<OllamaGenerator, GenerationError> {
        OllamaGenerator::new(base_url, DEFAULT_OLLAMA_MODEL, Duration::from_secs(5))
    }

    #[test]
    fn request_body_disables_streaming() -> Result<(), serde_json::Error> {
        let body = serde_json::to_value(GenerateRequest {
            model: "tinyllama",
            prompt: "Question?",
            stream: false,
        })?;
        assert_eq!(
            body,
            json!({"model": "tinyllama", "prompt": "Question?", "stream": false})
        );
        Ok(())
    }

    #[test]
    fn missing_response_field_is_none() -> Result<(), serde_json::Error> {
        let parsed: GenerateResponse = serde_json::from_value(json!({"done": true}))?;
        assert!(parsed.response.is_none());
        Ok(())
    }

    #[test]
    fn generate_endpoint_is_joined_onto_base_url() -> Result<(), GenerationError> {
        let generator = generator(DEFAULT_OLLAMA_URL)?;
        assert_eq!(generator.endpoint.as_str(), "http://localhost:11434/api/generate");
        assert_eq!(generator.model(), "tinyllama");
        Ok(())
    }

    #[test]
    fn base_path_prefix_is_kept() -> Result<(), url::ParseError> {
        assert_eq!(
            api_endpoint("http://gateway.local/ollama", "api/generate")?.as_str(),
            "http://gateway.local/ollama/api/generate"
        );
        assert_eq!(
            api_endpoint("http://gateway.local/ollama/", "api/generate")?.as_str(),
            "http://gateway.local/ollama/api/generate"
        );
        Ok(())
    }

    #[tokio::test]
    async fn error_status_carries_raw_body() -> Result<(), Box<dyn std::error::Error>> {
        let base_url = reply_once("500 Internal Server Error", "model not found").await?;

        let result = generator(&base_url)?.generate("Question?").await;
        let Err(error) = result else {
            return Err("a 500 reply must fail".into());
        };

        assert!(matches!(error, GenerationError::Status { status: 500, .. }));
        assert!(error.to_string().contains("model not found"));
        Ok(())
    }

    #[tokio::test]
    async fn ok_without_response_field_is_none() -> Result<(), Box<dyn std::error::Error>> {
        let base_url = reply_once("200 OK", r#"{"done":true}"#).await?;

        let reply = generator(&base_url)?.generate("Question?").await?;
        assert_eq!(reply, None);
        Ok(())
    }

    #[tokio::test]
    async fn ok_with_response_field_returns_text() -> Result<(), Box<dyn std::error::Error>> {
        let base_url = reply_once("200 OK", r#"{"response":"4.2 million","done":true}"#).await?;

        let reply = generator(&base_url)?.generate("Question?").await?;
        assert_eq!(reply.as_deref(), Some("4.2 million"));
        Ok(())
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_error() -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);

        let result = generator(&format!("http://{addr}"))?.generate("Question?").await;
        assert!(matches!(result, Err(GenerationError::Transport(_))));
        Ok(())
    }
}
