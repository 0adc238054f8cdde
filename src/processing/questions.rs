//! Question sets asked of every analyzed document.

use super::types::AnalysisError;

/// Questions asked when the caller supplies none.
pub const DEFAULT_QUESTIONS: &[&str] = &[
    "What is the name and overall purpose of the proposed project?",
    "What is the total budget requested for the project?",
    "How is the budget broken down across activities or cost categories?",
    "What is the timeline for the project, including start date, end date and key milestones?",
    "What are the main objectives of the project?",
    "Who are the intended beneficiaries and how many people will be served?",
    "Which organization or agency is responsible for implementing the project?",
    "How will progress and outcomes be measured?",
    "What risks or challenges does the proposal identify, and how will they be mitigated?",
];

/// Ordered, validated list of questions. Never empty, never contains blank entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSet(Vec<String>);

impl QuestionSet {
    /// Validate a list of questions, rejecting empty lists and blank entries.
    pub fn new(questions: Vec<String>) -> Result<Self, AnalysisError> {
        if questions.is_empty() {
            return Err(AnalysisError::MalformedQuestions(
                "expected at least one question".into(),
            ));
        }
        if let Some(position) = questions.iter().position(|q| q.trim().is_empty()) {
            return Err(AnalysisError::MalformedQuestions(format!(
                "question {position} is empty"
            )));
        }
        Ok(Self(questions))
    }

    /// Built-in funding-proposal questions.
    pub fn builtin() -> Self {
        Self(DEFAULT_QUESTIONS.iter().map(|q| q.to_string()).collect())
    }

    /// Parse the `custom_questions` form value: a JSON array of strings.
    ///
    /// An empty array yields `None` so the caller falls back to the default set.
    pub fn parse_custom(raw: &str) -> Result<Option<Self>, AnalysisError> {
        let questions: Vec<String> = serde_json::from_str(raw).map_err(|error| {
            AnalysisError::MalformedQuestions(format!("expected a JSON array of strings ({error})"))
        })?;
        if questions.is_empty() {
            return Ok(None);
        }
        Self::new(questions).map(Some)
    }

    /// Number of questions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Questions in order.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for QuestionSet {
    fn default() -> Self {
        Self::builtin()
    }
}
