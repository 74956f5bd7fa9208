use thiserror::Error;

use crate::parser::exam_type::ExamType;

/// Everything that can go wrong between fetching an exam page and having its
/// rows committed, plus the serving-side lookups.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("exam year not found in page")]
    MissingYear,

    #[error("subject name not found in page")]
    MissingSubjectName,

    #[error("questions found but no answer table matched any known encoding")]
    AnswerTableNotFound,

    #[error("malformed answer notation: {0:?}")]
    MalformedAnswer(String),

    #[error("intersession exam without a summer/winter marker: {0:?}")]
    AmbiguousExamType(String),

    #[error("final exam without a semester marker: {0:?}")]
    AmbiguousSemester(String),

    #[error("unrecognized exam type: {0:?}")]
    UnknownExamType(String),

    #[error("exam already stored (id {exam_id}, {title:?}, {year} {exam_type}); use --retry to replace it")]
    Conflict {
        exam_id: i64,
        title: String,
        year: i32,
        exam_type: ExamType,
    },

    #[error("exam {0} not found")]
    ExamNotFound(i64),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Category recorded in the crawl error log artifact.
    pub fn category(&self) -> &'static str {
        match self {
            CrawlError::MissingYear
            | CrawlError::MissingSubjectName
            | CrawlError::AnswerTableNotFound
            | CrawlError::MalformedAnswer(_)
            | CrawlError::AmbiguousExamType(_)
            | CrawlError::AmbiguousSemester(_)
            | CrawlError::UnknownExamType(_) => "parsing",
            _ => "exam",
        }
    }
}
