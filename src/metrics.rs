use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing analysis activity since startup.
#[derive(Default)]
pub struct AnalysisMetrics {
    documents_analyzed: AtomicU64,
    documents_failed: AtomicU64,
    questions_answered: AtomicU64,
    answers_failed: AtomicU64,
}

impl AnalysisMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed analysis and how many of its answers were error markers.
    pub fn record_analysis(&self, questions: u64, failed_answers: u64) {
        self.documents_analyzed.fetch_add(1, Ordering::Relaxed);
        self.questions_answered
            .fetch_add(questions.saturating_sub(failed_answers), Ordering::Relaxed);
        self.answers_failed
            .fetch_add(failed_answers, Ordering::Relaxed);
    }

    /// Record an analysis that aborted before answering.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_analyzed: self.documents_analyzed.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            answers_failed: self.answers_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of analysis counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents that reached the answering stage.
    pub documents_analyzed: u64,
    /// Documents whose analysis aborted before answering.
    pub documents_failed: u64,
    /// Questions answered successfully.
    pub questions_answered: u64,
    /// Questions that produced an error-marker answer.
    pub answers_failed: u64,
}
