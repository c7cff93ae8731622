use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::StoreHit;
use crate::traits::{Generator, VectorStore};
use tracing::{debug, warn};

pub const DEFAULT_TOP_K: usize = 5;
pub const NO_CONTEXT_MESSAGE: &str = "Sorry, I couldn't find relevant context to answer that.";
pub const NO_RESPONSE_MESSAGE: &str = "No response received from model.";
pub const GENERATION_ERROR_PREFIX: &str = "Error from language model:";

/// Terminal state of one question.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    NoContext,
    Answered { text: String, prompt: String },
    EmptyResponse { prompt: String },
    GenerationFailed { detail: String, prompt: String },
}

impl AnswerOutcome {
    pub fn prompt(&self) -> Option<&str> {
        match self {
            AnswerOutcome::NoContext => None,
            AnswerOutcome::Answered { prompt, .. }
            | AnswerOutcome::EmptyResponse { prompt }
            | AnswerOutcome::GenerationFailed { prompt, .. } => Some(prompt.as_str()),
        }
    }

    pub fn into_message(self) -> String {
        match self {
            AnswerOutcome::NoContext => NO_CONTEXT_MESSAGE.to_string(),
            AnswerOutcome::Answered { text, .. } => text,
            AnswerOutcome::EmptyResponse { .. } => NO_RESPONSE_MESSAGE.to_string(),
            AnswerOutcome::GenerationFailed { detail, .. } => {
                format!("{GENERATION_ERROR_PREFIX} {detail}")
            }
        }
    }
}

pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "\nYou are an intelligent assistant. Use the provided context to answer the user's question accurately and concisely.\n\nContext:\n{context}\n\nQuestion:\n{question}\n\nAnswer:\n"
    )
}

/// Joins retrieved texts with blank lines, or `None` when nothing usable came back.
pub fn assemble_context(hits: &[StoreHit]) -> Option<String> {
    if hits.iter().all(|hit| hit.text.trim().is_empty()) {
        return None;
    }

    Some(
        hits.iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

/// Embeds a question, retrieves the nearest chunks and asks the model.
pub struct Answerer<E, S, G> {
    embedder: E,
    store: S,
    generator: G,
    top_k: usize,
}

impl<E, S, G> Answerer<E, S, G>
where
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
    G: Generator + Send + Sync,
{
    pub fn new(embedder: E, store: S, generator: G, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            generator,
            top_k: top_k.max(1),
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Only embedding and store failures are errors; an empty retrieval or a
    /// failed model call come back as outcomes.
    pub async fn resolve(&self, question: &str) -> Result<AnswerOutcome, SearchError> {
        let embedding = self.embedder.embed(question).await?;
        let hits = self.store.query(&embedding, self.top_k).await?;
        debug!(
            retrieved = ?hits.iter().map(|hit| hit.text.as_str()).collect::<Vec<_>>(),
            "retrieved documents"
        );

        let Some(context) = assemble_context(&hits) else {
            return Ok(AnswerOutcome::NoContext);
        };

        let prompt = build_prompt(&context, question);
        debug!(prompt = %prompt, "prompt sent to language model");

        match self.generator.generate(&prompt).await {
            Ok(Some(text)) if !text.is_empty() => Ok(AnswerOutcome::Answered { text, prompt }),
            Ok(_) => Ok(AnswerOutcome::EmptyResponse { prompt }),
            Err(error) => {
                warn!(error = %error, "generation failed");
                Ok(AnswerOutcome::GenerationFailed {
                    detail: error.to_string(),
                    prompt,
                })
            }
        }
    }

    pub async fn answer(&self, question: &str) -> Result<String, SearchError> {
        Ok(self.resolve(question).await?.into_message())
    }
}
