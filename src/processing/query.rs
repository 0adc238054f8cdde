//! Retrieval-augmented answering of a single question.

use super::index::VectorIndex;
use super::types::QueryError;
use crate::embedding::{EmbeddingClient, EmbeddingClientError, embed_with_timeout};
use crate::generation::{GenerationClient, GenerationRequest, generate_with_timeout};
use std::sync::Arc;
use std::time::Duration;

/// Answers questions against a [`VectorIndex`] using an embedder and a generative model.
///
/// The embedder must be the one the index was built with.
#[derive(Clone)]
pub struct QueryEngine {
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn GenerationClient>,
    top_k: usize,
    embedding_timeout: Duration,
    generation_timeout: Duration,
}

impl QueryEngine {
    /// Create an engine retrieving `top_k` chunks per question.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        top_k: usize,
        embedding_timeout: Duration,
        generation_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            generator,
            top_k: top_k.max(1),
            embedding_timeout,
            generation_timeout,
        }
    }

    /// Answer `question` from the chunks of `index` most similar to it.
    pub async fn answer(&self, index: &VectorIndex, question: &str) -> Result<String, QueryError> {
        if self.embedder.model_id() != index.embedding_model() {
            return Err(QueryError::ModelMismatch {
                index: index.embedding_model().to_string(),
                query: self.embedder.model_id().to_string(),
            });
        }

        let mut vectors = embed_with_timeout(
            self.embedder.as_ref(),
            vec![question.to_string()],
            self.embedding_timeout,
        )
        .await?;
        let query_vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("no vector returned for the question".into())
        })?;
        if query_vector.len() != index.dimension() {
            return Err(QueryError::EmbeddingMismatch {
                index: index.embedding_model().to_string(),
                index_dimension: index.dimension(),
                query: self.embedder.model_id().to_string(),
                query_dimension: query_vector.len(),
            });
        }

        let hits = index.search(&query_vector, self.top_k);
        tracing::debug!(
            question,
            retrieved = hits.len(),
            top_score = hits.first().map(|hit| hit.score),
            "Retrieved context"
        );
        let context: Vec<&str> = hits.iter().map(|hit| hit.chunk.text.as_str()).collect();
        let prompt = build_prompt(&context, question);

        let answer = generate_with_timeout(
            self.generator.as_ref(),
            GenerationRequest { prompt },
            self.generation_timeout,
        )
        .await?;
        Ok(answer)
    }
}

/// Build the question-answering prompt from retrieved context.
pub(crate) fn build_prompt(context: &[&str], question: &str) -> String {
    let mut prompt = String::from(
        "Use the following pieces of context from a funding proposal to answer the question at the end.\n\
         If the context does not contain the answer, say that you don't know instead of guessing.\n\n",
    );
    for passage in context {
        prompt.push_str(passage.trim());
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!("Question: {question}\nHelpful Answer:"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::LocalHashEmbedder;
    use crate::processing::index::DEFAULT_EMBEDDING_BATCH_SIZE;
    use crate::generation::GenerationClientError;
    use crate::processing::types::{Chunk, Metadata};
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationClient for RecordingGenerator {
        fn model_id(&self) -> &str {
            "test:recording"
        }

        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<String, GenerationClientError> {
            self.prompts.lock().await.push(request.prompt.clone());
            if request.prompt.contains("500,000") {
                Ok("The budget is $500,000.".into())
            } else {
                Ok("I don't know.".into())
            }
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: Metadata::new(),
            segment_index: 0,
            start: 0,
        }
    }

    async fn budget_index(embedder: &LocalHashEmbedder) -> VectorIndex {
        VectorIndex::build(
            vec![
                chunk("Project budget: $500,000 for pipeline replacement."),
                chunk("Timeline: six months starting in spring."),
            ],
            embedder,
            DEFAULT_EMBEDDING_BATCH_SIZE,
            Duration::from_secs(1),
        )
        .await
        .expect("index")
    }

    #[test]
    fn prompt_places_context_before_question() {
        let prompt = build_prompt(&["Budget: $500,000", " Timeline: 6 months "], "What is the budget?");
        let context_at = prompt.find("Budget: $500,000").expect("context");
        let question_at = prompt.find("Question: What is the budget?").expect("question");
        assert!(context_at < question_at);
        assert!(prompt.contains("Timeline: 6 months\n\n"));
        assert!(prompt.ends_with("Helpful Answer:"));
    }

    #[tokio::test]
    async fn answers_from_retrieved_context() {
        let embedder = Arc::new(LocalHashEmbedder::new(256));
        let generator = Arc::new(RecordingGenerator::default());
        let index = budget_index(&embedder).await;
        let engine = QueryEngine::new(
            embedder,
            generator.clone(),
            1,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let answer = engine
            .answer(&index, "What is the project budget?")
            .await
            .expect("answer");

        assert!(answer.contains("500,000"));
        let prompts = generator.prompts.lock().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Question: What is the project budget?"));
        assert!(!prompts[0].contains("six months"));
    }

    #[tokio::test]
    async fn refuses_index_from_another_embedding_space() {
        let index = budget_index(&LocalHashEmbedder::new(64)).await;
        let engine = QueryEngine::new(
            Arc::new(LocalHashEmbedder::new(32)),
            Arc::new(RecordingGenerator::default()),
            3,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let error = engine
            .answer(&index, "What is the budget?")
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            QueryError::ModelMismatch { ref index, ref query }
                if index == "local:hash-64" && query == "local:hash-32"
        ));
    }

    /// Claims the index's embedding space but returns vectors of another width.
    struct NarrowEmbedder;

    #[async_trait]
    impl EmbeddingClient for NarrowEmbedder {
        fn model_id(&self) -> &str {
            "local:hash-64"
        }

        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(texts.iter().map(|_| vec![1.0; 8]).collect())
        }
    }

    #[tokio::test]
    async fn reports_question_vector_width_on_dimension_mismatch() {
        let index = budget_index(&LocalHashEmbedder::new(64)).await;
        let engine = QueryEngine::new(
            Arc::new(NarrowEmbedder),
            Arc::new(RecordingGenerator::default()),
            3,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let error = engine
            .answer(&index, "What is the budget?")
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            QueryError::EmbeddingMismatch {
                index_dimension: 64,
                query_dimension: 8,
                ..
            }
        ));
    }

    struct FailingGenerator;

    #[async_trait]
    impl GenerationClient for FailingGenerator {
        fn model_id(&self) -> &str {
            "test:failing"
        }

        async fn generate(&self, _: GenerationRequest) -> Result<String, GenerationClientError> {
            Err(GenerationClientError::Authentication("401".into()))
        }
    }

    #[tokio::test]
    async fn generation_failures_surface_as_query_errors() {
        let embedder = Arc::new(LocalHashEmbedder::new(16));
        let index = budget_index(&embedder).await;
        let engine = QueryEngine::new(
            embedder,
            Arc::new(FailingGenerator),
            2,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );

        let error = engine.answer(&index, "Who benefits?").await.expect_err("failure");
        assert!(matches!(
            error,
            QueryError::Generation(GenerationClientError::Authentication(_))
        ));
    }
}
