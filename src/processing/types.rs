//! Core data types and error definitions for the analysis pipeline.

use crate::embedding::EmbeddingClientError;
use crate::generation::GenerationClientError;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Origin metadata attached to segments and inherited by chunks.
pub type Metadata = BTreeMap<String, String>;

/// Marker prefix used for answers whose generation failed.
pub const ANSWER_ERROR_PREFIX: &str = "Could not generate answer: ";

/// Uploaded document as received from the caller. Read once, never persisted.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename; its extension selects the parser.
    pub filename: String,
    /// Declared content type, kept for logging only.
    pub content_type: Option<String>,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Wrap raw bytes with their filename.
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }
}

/// Unit of extracted text plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    /// Extracted text.
    pub text: String,
    /// Origin metadata (`source`, and `page` for PDFs).
    pub metadata: Metadata,
}

/// Bounded window of a segment's text prepared for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Window text, at most `max_chunk_size` characters.
    pub text: String,
    /// Metadata inherited from the originating segment.
    pub metadata: Metadata,
    /// Position of the originating segment in loader output.
    pub segment_index: usize,
    /// Character offset of the window within its segment.
    pub start: usize,
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerRecord {
    /// Question exactly as asked.
    #[serde(rename = "Question")]
    pub question: String,
    /// Generated answer, or an error marker starting with [`ANSWER_ERROR_PREFIX`].
    #[serde(rename = "Answer")]
    pub answer: String,
}

impl AnswerRecord {
    /// Whether this record carries an error marker instead of an answer.
    pub fn is_error_marker(&self) -> bool {
        self.answer.starts_with(ANSWER_ERROR_PREFIX)
    }
}

/// Overall outcome of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Document was indexed and every question has a record.
    Success,
    /// Run aborted before answering.
    Error,
}

/// Pipeline stage, used for logging and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Extracting text from the uploaded bytes.
    Loading,
    /// Cutting segments into chunks.
    Splitting,
    /// Embedding chunks into the vector index.
    Indexing,
    /// Answering questions against the index.
    Answering,
    /// Result assembled.
    Done,
}

impl Stage {
    /// Lowercase stage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Splitting => "splitting",
            Self::Indexing => "indexing",
            Self::Answering => "answering",
            Self::Done => "done",
        }
    }
}

/// Fault classification driving HTTP status selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Caller supplied something unusable.
    #[serde(rename = "input_error")]
    Input,
    /// An external provider failed.
    #[serde(rename = "provider_error")]
    Provider,
    /// Anything unclassified.
    #[serde(rename = "internal_error")]
    Internal,
}

/// User-facing description of a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    /// Fault classification.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Stable snake_case error code.
    pub code: &'static str,
    /// Stage that failed, when the orchestrator was running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Human-readable summary with no provider internals.
    pub message: String,
    /// Optional remediation hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<&'static str>,
}

/// Result of one analysis run; the response body of `POST /analyze/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    /// Overall outcome.
    pub status: AnalysisStatus,
    /// One record per question, in question order.
    pub records: Vec<AnswerRecord>,
    /// Failure description when `status` is `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl AnalysisResult {
    /// Successful run carrying `records`.
    pub fn success(records: Vec<AnswerRecord>) -> Self {
        Self {
            status: AnalysisStatus::Success,
            records,
            error: None,
        }
    }

    /// Failed run described by `error`, optionally tagged with the failing stage.
    pub fn failure(error: &AnalysisError, stage: Option<Stage>) -> Self {
        Self {
            status: AnalysisStatus::Error,
            records: Vec::new(),
            error: Some(ErrorDetail {
                kind: error.kind(),
                code: error.code(),
                stage,
                message: error.public_message(),
                suggestion: error.suggestion(),
            }),
        }
    }
}

/// Errors raised while extracting text from an upload.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// Filename extension matches no supported format.
    #[error("Unsupported file format '{extension}'; supported formats are .txt, .pdf, .docx and .doc")]
    UnsupportedFormat {
        /// Lowercased extension, empty when the filename has none.
        extension: String,
    },
    /// Parser could not read the bytes.
    #[error("Could not read '{filename}': {reason}")]
    CorruptDocument {
        /// Uploaded filename.
        filename: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// Parser succeeded but found no text.
    #[error("'{filename}' contains no extractable text")]
    EmptyDocument {
        /// Uploaded filename.
        filename: String,
    },
}

/// Errors produced while splitting segments into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Window parameters violate `max_chunk_size > overlap >= 0`.
    #[error("chunk size ({chunk_size}) must be greater than overlap ({overlap})")]
    InvalidParameters {
        /// Requested window size.
        chunk_size: usize,
        /// Requested overlap.
        overlap: usize,
    },
}

/// Errors raised while answering a single question.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Question could not be embedded.
    #[error("Failed to embed question: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Question embedder is not the one the index was built with.
    #[error("Embedding model mismatch: index built with {index}, query uses {query}")]
    ModelMismatch {
        /// Embedding space identity recorded by the index.
        index: String,
        /// Embedding space identity of the query embedder.
        query: String,
    },
    /// Question vector width differs from the indexed vectors.
    #[error("Embedding mismatch: index built with {index} ({index_dimension} dims), query uses {query} ({query_dimension} dims)")]
    EmbeddingMismatch {
        /// Embedding space identity recorded by the index.
        index: String,
        /// Width of indexed vectors.
        index_dimension: usize,
        /// Embedding space identity of the query embedder.
        query: String,
        /// Width of the question vector.
        query_dimension: usize,
    },
    /// Generative provider failed.
    #[error("Failed to generate answer: {0}")]
    Generation(#[from] GenerationClientError),
}

impl QueryError {
    /// Short reason used in error-marker answers; never includes provider bodies.
    pub fn summary(&self) -> String {
        match self {
            Self::Embedding(EmbeddingClientError::Timeout(limit)) => {
                format!("embedding provider timed out after {}s", limit.as_secs())
            }
            Self::Embedding(_) => "the question could not be embedded".into(),
            Self::ModelMismatch { .. } | Self::EmbeddingMismatch { .. } => {
                "question embedding does not match the document index".into()
            }
            Self::Generation(error) => match error {
                GenerationClientError::Unavailable(_) => {
                    "generation provider is unreachable".into()
                }
                GenerationClientError::Authentication(_) => {
                    "generation provider rejected the API key".into()
                }
                GenerationClientError::GenerationFailed(_) => {
                    "generation provider returned an error".into()
                }
                GenerationClientError::InvalidResponse(_) => {
                    "generation provider returned a malformed response".into()
                }
                GenerationClientError::Timeout(limit) => {
                    format!("generation provider timed out after {}s", limit.as_secs())
                }
            },
        }
    }

    /// Render the error-marker answer for this failure.
    pub fn marker(&self) -> String {
        format!("{ANSWER_ERROR_PREFIX}{}", self.summary())
    }
}

/// Errors that abort an analysis request.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Upload request had no `file` field.
    #[error("No file provided")]
    MissingFile,
    /// `custom_questions` was not a JSON array of non-blank strings.
    #[error("Invalid format for custom_questions: {0}")]
    MalformedQuestions(String),
    /// Multipart body could not be read.
    #[error("Invalid upload request: {0}")]
    InvalidRequest(String),
    /// Document could not be turned into text.
    #[error(transparent)]
    Load(#[from] LoaderError),
    /// Chunk parameters were invalid.
    #[error("Failed to split document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed while indexing.
    #[error("Failed to index document: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Unclassified failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Fault classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingFile
            | Self::MalformedQuestions(_)
            | Self::InvalidRequest(_)
            | Self::Load(_) => ErrorKind::Input,
            Self::Embedding(_) => ErrorKind::Provider,
            Self::Chunking(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingFile => "missing_file",
            Self::MalformedQuestions(_) => "malformed_questions",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Load(LoaderError::UnsupportedFormat { .. }) => "unsupported_format",
            Self::Load(LoaderError::CorruptDocument { .. }) => "corrupt_document",
            Self::Load(LoaderError::EmptyDocument { .. }) => "empty_document",
            Self::Chunking(_) => "invalid_chunking",
            Self::Embedding(EmbeddingClientError::Timeout(_)) => "embedding_timeout",
            Self::Embedding(_) => "embedding_provider_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show the caller.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Input => self.to_string(),
            ErrorKind::Provider => match self {
                Self::Embedding(EmbeddingClientError::Timeout(limit)) => format!(
                    "The embedding provider did not respond within {}s",
                    limit.as_secs()
                ),
                _ => "The embedding provider could not process the document".into(),
            },
            ErrorKind::Internal => "Processing failed due to an internal error".into(),
        }
    }

    /// Remediation hint, when one applies.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingFile => Some("Attach the document in the multipart field named 'file'"),
            Self::MalformedQuestions(_) => {
                Some("Send custom_questions as a JSON array of non-empty strings")
            }
            Self::Load(LoaderError::UnsupportedFormat { .. }) => {
                Some("Upload a .txt, .pdf, .docx or .doc file")
            }
            Self::Load(LoaderError::CorruptDocument { .. }) => {
                Some("Check that the file opens correctly and is not password protected")
            }
            Self::Load(LoaderError::EmptyDocument { .. }) => {
                Some("Scanned documents need OCR before upload")
            }
            Self::Embedding(_) => {
                Some("Check network connectivity and the embedding provider configuration")
            }
            Self::Internal(_) | Self::Chunking(_) => Some("Check the server logs for details"),
            Self::InvalidRequest(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn answer_records_serialize_with_capitalized_keys() {
        let result = AnalysisResult::success(vec![AnswerRecord {
            question: "What is the budget?".into(),
            answer: "$500,000".into(),
        }]);
        let value = serde_json::to_value(&result).expect("json");
        assert_eq!(value["status"], "success");
        assert_eq!(value["records"][0]["Question"], "What is the budget?");
        assert_eq!(value["records"][0]["Answer"], "$500,000");
        assert!(value.get("error").is_none());
    }

    #[test]
    fn failure_carries_classification_without_provider_details() {
        let error = AnalysisError::Embedding(EmbeddingClientError::Unavailable(
            "connection refused at 10.0.0.7:11434".into(),
        ));
        let result = AnalysisResult::failure(&error, Some(Stage::Indexing));
        let value = serde_json::to_value(&result).expect("json");

        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["type"], "provider_error");
        assert_eq!(value["error"]["code"], "embedding_provider_error");
        assert_eq!(value["error"]["stage"], "indexing");
        assert!(!value["error"]["message"].as_str().unwrap().contains("10.0.0.7"));
        assert!(value["error"]["suggestion"].as_str().unwrap().contains("network"));
    }

    #[test]
    fn input_errors_are_classified_as_input() {
        let unsupported = AnalysisError::from(LoaderError::UnsupportedFormat {
            extension: "csv".into(),
        });
        assert_eq!(unsupported.kind(), ErrorKind::Input);
        assert_eq!(unsupported.code(), "unsupported_format");
        assert_eq!(AnalysisError::MissingFile.kind(), ErrorKind::Input);
        assert_eq!(
            AnalysisError::Internal("join".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn query_error_marker_hides_provider_body() {
        let error = QueryError::Generation(GenerationClientError::GenerationFailed(
            "503: upstream trace ...".into(),
        ));
        let marker = error.marker();
        assert!(marker.starts_with(ANSWER_ERROR_PREFIX));
        assert!(!marker.contains("upstream trace"));

        let timeout = QueryError::Generation(GenerationClientError::Timeout(Duration::from_secs(60)));
        assert!(timeout.summary().contains("60s"));
    }
}
