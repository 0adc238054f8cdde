//! Document analysis pipeline: loading, chunking, indexing, and answering.

pub mod chunking;
pub mod index;
pub mod loader;
pub mod query;
pub mod questions;
mod service;
pub mod types;

pub use questions::{DEFAULT_QUESTIONS, QuestionSet};
pub use service::{AnalysisApi, AnalysisService, AnalysisSettings};
pub use types::{
    ANSWER_ERROR_PREFIX, AnalysisError, AnalysisResult, AnalysisStatus, AnswerRecord, Chunk,
    ChunkingError, ErrorDetail, ErrorKind, LoaderError, QueryError, Stage, TextSegment,
    UploadedFile,
};
