//! Question sources
//!
//! A question set maps statement text to whether the statement is true. Sets
//! are stored as two-column CSV tables named after their topic:
//!
//! ```text
//! Question,Answer
//! "UDP is connectionless",true
//! TCP guarantees delivery order,yes
//! ```
//!
//! The answer column accepts the same literals players may answer with.

use log::warn;
use shared::parse_answer;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum QuestionError {
    #[error("no question set for topic '{0}'")]
    NotFound(String),

    #[error("failed to read {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("question set '{0}' has no usable questions")]
    Empty(String),
}

/// Supplies the question set for a topic.
pub trait QuestionSource: Send + Sync {
    fn load(&self, topic: &str) -> Result<HashMap<String, bool>, QuestionError>;
}

/// Reads `<dir>/<topic>.csv`.
#[derive(Debug, Clone)]
pub struct CsvQuestionSource {
    dir: PathBuf,
}

impl CsvQuestionSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl QuestionSource for CsvQuestionSource {
    fn load(&self, topic: &str) -> Result<HashMap<String, bool>, QuestionError> {
        // Topics name files directly, keep them inside the directory.
        if topic.is_empty() || topic.contains(['/', '\\']) || topic.starts_with('.') {
            return Err(QuestionError::NotFound(topic.to_string()));
        }

        let path = self.dir.join(format!("{}.csv", topic));
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(QuestionError::NotFound(topic.to_string()));
            }
            Err(source) => return Err(QuestionError::Io { path, source }),
        };

        let questions = parse_questions(&contents);
        if questions.is_empty() {
            return Err(QuestionError::Empty(topic.to_string()));
        }
        Ok(questions)
    }
}

/// An in-memory question set served for every topic it was built with.
#[derive(Debug, Clone, Default)]
pub struct StaticQuestions {
    topics: HashMap<String, HashMap<String, bool>>,
}

impl StaticQuestions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_topic<I, S>(mut self, topic: &str, questions: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        let questions = questions
            .into_iter()
            .map(|(question, answer)| (question.into(), answer))
            .collect();
        self.topics.insert(topic.to_string(), questions);
        self
    }
}

impl QuestionSource for StaticQuestions {
    fn load(&self, topic: &str) -> Result<HashMap<String, bool>, QuestionError> {
        match self.topics.get(topic) {
            Some(questions) if questions.is_empty() => Err(QuestionError::Empty(topic.to_string())),
            Some(questions) => Ok(questions.clone()),
            None => Err(QuestionError::NotFound(topic.to_string())),
        }
    }
}

/// Parses CSV rows of `question,answer`. The question may itself contain
/// commas, so each row is split on its last one.
pub fn parse_questions(contents: &str) -> HashMap<String, bool> {
    let mut questions = HashMap::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((question, answer)) = line.rsplit_once(',') else {
            warn!("Skipping question row {}: no answer column", index + 1);
            continue;
        };
        let question = unquote(question.trim());

        if index == 0 && question.eq_ignore_ascii_case("question") {
            continue;
        }

        match parse_answer(unquote(answer.trim())) {
            Some(answer) if !question.is_empty() => {
                questions.insert(question.to_string(), answer);
            }
            _ => warn!("Skipping question row {}: {:?}", index + 1, line),
        }
    }

    questions
}

fn unquote(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(field)
}
