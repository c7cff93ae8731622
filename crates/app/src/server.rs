use crate::{AppContext, PROMPT_FOR_INPUT};
use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const INDEX_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Ask the documents</title></head>
<body>
<form id="ask">
  <input id="question" name="question" size="80" autofocus>
  <button type="submit">Ask</button>
</form>
<pre id="answer"></pre>
<script>
document.getElementById("ask").addEventListener("submit", async (event) => {
  event.preventDefault();
  const question = document.getElementById("question").value;
  const reply = await fetch("/ask", {
    method: "POST",
    headers: {"Content-Type": "application/json"},
    body: JSON.stringify({question}),
  });
  const body = await reply.json();
  document.getElementById("answer").textContent = body.response;
});
</script>
</body>
</html>
"#;

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    question: String,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AskResponse {
    response: String,
}

pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/ask", post(ask))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}

/// Binds only after the caller has finished ingestion.
pub async fn serve(context: Arc<AppContext>, bind: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "listening");
    axum::serve(listener, router(context))
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn ask(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, (StatusCode, Json<AskResponse>)> {
    if request.question.trim().is_empty() {
        return Ok(Json(AskResponse {
            response: PROMPT_FOR_INPUT.to_string(),
        }));
    }

    match context.answer(&request.question).await {
        Ok(response) => Ok(Json(AskResponse { response })),
        Err(error) => {
            error!(error = %error, "question failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AskResponse {
                    response: error.to_string(),
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_rag_core::{
        CharacterNgramEmbedder, Embedder, MemoryVectorStore, OllamaGenerator, RagContext,
        RagSettings, VectorStore, DEFAULT_OLLAMA_URL,
    };
    use std::time::Duration;

    fn context() -> anyhow::Result<Arc<AppContext>> {
        let generator =
            OllamaGenerator::new(DEFAULT_OLLAMA_URL, "tinyllama", Duration::from_secs(1))?;
        let embedder: Box<dyn Embedder + Send + Sync> = Box::new(CharacterNgramEmbedder::default());
        let store: Box<dyn VectorStore + Send + Sync> = Box::new(MemoryVectorStore::new());
        let context: AppContext =
            RagContext::new(RagSettings::default(), embedder, store, generator)?;
        Ok(Arc::new(context))
    }

    #[tokio::test]
    async fn blank_question_asks_for_input() -> anyhow::Result<()> {
        let reply = ask(
            State(context()?),
            Json(AskRequest {
                question: "   ".to_string(),
            }),
        )
        .await;

        let Ok(Json(body)) = reply else {
            anyhow::bail!("blank question should not fail");
        };
        assert_eq!(body.response, PROMPT_FOR_INPUT);
        Ok(())
    }

    #[tokio::test]
    async fn empty_index_answers_with_no_context() -> anyhow::Result<()> {
        let reply = ask(
            State(context()?),
            Json(AskRequest {
                question: "What was the revenue?".to_string(),
            }),
        )
        .await;

        let Ok(Json(body)) = reply else {
            anyhow::bail!("empty retrieval should not fail");
        };
        assert_eq!(body.response, pdf_rag_core::NO_CONTEXT_MESSAGE);
        Ok(())
    }

    #[test]
    fn missing_question_field_defaults_to_blank() -> Result<(), serde_json::Error> {
        let request: AskRequest = serde_json::from_str("{}")?;
        assert!(request.question.is_empty());
        Ok(())
    }
}
