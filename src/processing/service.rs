//! Analysis service sequencing loading, splitting, indexing, and answering.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, build_embedding_client},
    generation::{GenerationClient, build_generation_client},
    metrics::{AnalysisMetrics, MetricsSnapshot},
    processing::{
        chunking::split,
        index::{DEFAULT_EMBEDDING_BATCH_SIZE, DEFAULT_TOP_K, VectorIndex},
        loader,
        query::QueryEngine,
        questions::QuestionSet,
        types::{AnalysisError, AnalysisResult, AnswerRecord, Stage, UploadedFile},
    },
};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Tunables for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Maximum questions answered concurrently.
    pub answer_concurrency: usize,
    /// Maximum chunks sent to the embedder per call.
    pub embedding_batch_size: usize,
    /// Bound on each embedding call.
    pub embedding_timeout: Duration,
    /// Bound on each generation call.
    pub generation_timeout: Duration,
    /// Questions used when the caller supplies none.
    pub default_questions: QuestionSet,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            top_k: DEFAULT_TOP_K,
            answer_concurrency: 4,
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            embedding_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(60),
            default_questions: QuestionSet::builtin(),
        }
    }
}

impl AnalysisSettings {
    /// Derive settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let default_questions = config
            .default_questions
            .clone()
            .and_then(|questions| QuestionSet::new(questions).ok())
            .unwrap_or_default();
        Self {
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            top_k: config.retrieval_top_k,
            answer_concurrency: config.answer_concurrency,
            embedding_batch_size: config.embedding_batch_size,
            embedding_timeout: config.embedding_timeout,
            generation_timeout: config.generation_timeout,
            default_questions,
        }
    }
}

/// Abstraction over the analysis pipeline used by the HTTP surface.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Analyze one uploaded document. Failures are reported inside the result.
    async fn analyze(
        &self,
        file: UploadedFile,
        custom_questions: Option<QuestionSet>,
    ) -> AnalysisResult;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Runs the full pipeline for one document per call.
///
/// Holds no per-request state: every run owns its segments, chunks, and index, and drops them
/// when it returns. Construct once and share through an `Arc`.
pub struct AnalysisService {
    embedder: Arc<dyn EmbeddingClient>,
    engine: QueryEngine,
    settings: AnalysisSettings,
    metrics: Arc<AnalysisMetrics>,
}

impl AnalysisService {
    /// Build a service over explicit provider clients.
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn GenerationClient>,
        settings: AnalysisSettings,
    ) -> Self {
        let engine = QueryEngine::new(
            embedder.clone(),
            generator,
            settings.top_k,
            settings.embedding_timeout,
            settings.generation_timeout,
        );
        Self {
            embedder,
            engine,
            settings,
            metrics: Arc::new(AnalysisMetrics::new()),
        }
    }

    /// Build a service with provider clients described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, AnalysisError> {
        let embedder = build_embedding_client(config)
            .map_err(|error| AnalysisError::Internal(format!("embedding client: {error}")))?;
        let generator = build_generation_client(config)
            .map_err(|error| AnalysisError::Internal(format!("generation client: {error}")))?;
        Ok(Self::new(
            embedder,
            generator,
            AnalysisSettings::from_config(config),
        ))
    }

    /// Analyze `file`, answering `custom_questions` or the default set.
    ///
    /// Failures before answering produce an `error` result. Failures while answering become
    /// error-marker answers, so a successful result always has one record per question.
    pub async fn run(
        &self,
        file: UploadedFile,
        custom_questions: Option<QuestionSet>,
    ) -> AnalysisResult {
        let questions =
            custom_questions.unwrap_or_else(|| self.settings.default_questions.clone());
        let filename = file.filename.clone();

        let index = match self.build_index(file).await {
            Ok(index) => index,
            Err((stage, error)) => {
                tracing::error!(
                    filename = %filename,
                    stage = stage.as_str(),
                    kind = ?error.kind(),
                    error = %error,
                    "Analysis failed"
                );
                self.metrics.record_failure();
                return AnalysisResult::failure(&error, Some(stage));
            }
        };

        tracing::debug!(
            stage = Stage::Answering.as_str(),
            questions = questions.len(),
            concurrency = self.settings.answer_concurrency,
            "Answering questions"
        );
        let records = self.answer_all(&index, &questions).await;
        let failed = records.iter().filter(|record| record.is_error_marker()).count();
        self.metrics
            .record_analysis(records.len() as u64, failed as u64);

        tracing::info!(
            filename = %filename,
            stage = Stage::Done.as_str(),
            chunks = index.len(),
            questions = records.len(),
            failed_answers = failed,
            "Analysis completed"
        );
        AnalysisResult::success(records)
    }

    async fn build_index(&self, file: UploadedFile) -> Result<VectorIndex, (Stage, AnalysisError)> {
        let fingerprint = hex::encode(Sha256::digest(&file.bytes));
        tracing::info!(
            stage = Stage::Loading.as_str(),
            filename = %file.filename,
            bytes = file.bytes.len(),
            sha256 = %fingerprint,
            "Loading document"
        );
        let segments = tokio::task::spawn_blocking(move || loader::load(&file))
            .await
            .map_err(|error| {
                (
                    Stage::Loading,
                    AnalysisError::Internal(format!("loader task failed: {error}")),
                )
            })?
            .map_err(|error| (Stage::Loading, AnalysisError::from(error)))?;

        tracing::debug!(
            stage = Stage::Splitting.as_str(),
            segments = segments.len(),
            "Splitting document"
        );
        let chunks = split(
            &segments,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
        )
        .map_err(|error| (Stage::Splitting, AnalysisError::from(error)))?;

        tracing::debug!(
            stage = Stage::Indexing.as_str(),
            chunks = chunks.len(),
            batch_size = self.settings.embedding_batch_size,
            embedding_model = self.embedder.model_id(),
            "Indexing chunks"
        );
        VectorIndex::build(
            chunks,
            self.embedder.as_ref(),
            self.settings.embedding_batch_size,
            self.settings.embedding_timeout,
        )
        .await
        .map_err(|error| (Stage::Indexing, AnalysisError::from(error)))
    }

    async fn answer_all(&self, index: &VectorIndex, questions: &QuestionSet) -> Vec<AnswerRecord> {
        // `buffered` yields in input order regardless of completion order.
        stream::iter(questions.as_slice().iter().cloned().enumerate())
            .map(|(position, question)| async move {
                let answer = match self.engine.answer(index, &question).await {
                    Ok(answer) => answer,
                    Err(error) => {
                        tracing::warn!(
                            stage = Stage::Answering.as_str(),
                            position,
                            question = %question,
                            error = %error,
                            "Question could not be answered"
                        );
                        error.marker()
                    }
                };
                AnswerRecord { question, answer }
            })
            .buffered(self.settings.answer_concurrency.max(1))
            .collect()
            .await
    }

    /// Return the current analysis metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl AnalysisApi for AnalysisService {
    async fn analyze(
        &self,
        file: UploadedFile,
        custom_questions: Option<QuestionSet>,
    ) -> AnalysisResult {
        AnalysisService::run(self, file, custom_questions).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        AnalysisService::metrics_snapshot(self)
    }
}
