use std::fmt;

use crate::error::CrawlError;

/// Closed classification of an exam paper. Stored in the DB as its integer
/// code, matching the source site's numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamType {
    FirstSemesterFinal = 1,
    SecondSemesterFinal = 2,
    SummerSemester = 3,
    WinterSemester = 4,
}

impl ExamType {
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ExamType::FirstSemesterFinal),
            2 => Some(ExamType::SecondSemesterFinal),
            3 => Some(ExamType::SummerSemester),
            4 => Some(ExamType::WinterSemester),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExamType::FirstSemesterFinal => "1학기 기말",
            ExamType::SecondSemesterFinal => "2학기 기말",
            ExamType::SummerSemester => "하계 계절학기",
            ExamType::WinterSemester => "동계 계절학기",
        }
    }
}

impl fmt::Display for ExamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify free-form exam-type text into one of the four types.
///
/// Intersession ("계절") is checked before finals ("기말"); a phrase that
/// signals one group but not the sub-kind is an error, never a guess.
pub fn classify(text: &str) -> Result<ExamType, CrawlError> {
    if text.contains("계절") {
        if text.contains("하계") {
            return Ok(ExamType::SummerSemester);
        }
        if text.contains("동계") {
            return Ok(ExamType::WinterSemester);
        }
        return Err(CrawlError::AmbiguousExamType(text.to_string()));
    }

    if text.contains("기말") {
        if text.contains("2학기") || text.contains("2 학기") {
            return Ok(ExamType::SecondSemesterFinal);
        }
        if text.contains("1학기") || text.contains("1 학기") {
            return Ok(ExamType::FirstSemesterFinal);
        }
        return Err(CrawlError::AmbiguousSemester(text.to_string()));
    }

    Err(CrawlError::UnknownExamType(text.to_string()))
}

// ── Tests ──
