use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::CrawlError;
use crate::parser::exam_type::ExamType;
use crate::parser::questions::Choice;

/// Whether correct answers accompany the questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Study,
    Test,
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "study" => Ok(Mode::Study),
            "test" => Ok(Mode::Test),
            other => Err(format!("unknown mode {:?} (expected study or test)", other)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExamSummary {
    pub id: i64,
    pub subject: String,
    pub year: i32,
    pub exam_type: String,
    pub title: String,
    pub total_questions: i64,
}

#[derive(Debug, Serialize)]
pub struct QuestionView {
    pub id: i64,
    pub question_number: u32,
    pub question_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_image_url: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answers: Option<Vec<u8>>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub total_pages: u32,
}

#[derive(Debug, Serialize)]
pub struct QuestionSet {
    pub exam: ExamSummary,
    pub questions: Vec<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Fetch an exam's questions ordered by number. Test mode strips the
/// accepted answers; pagination applies only when both page and limit are
/// given (page is 1-based).
pub fn find_questions(
    conn: &Connection,
    exam_id: i64,
    mode: Mode,
    page: Option<u32>,
    limit: Option<u32>,
) -> Result<QuestionSet, CrawlError> {
    let exam = get_exam(conn, exam_id)?.ok_or(CrawlError::ExamNotFound(exam_id))?;

    let mut stmt = conn.prepare(
        "SELECT id, question_number, question_text, example_text, question_image_url,
                choices, correct_answers
         FROM questions WHERE exam_id = ?1 ORDER BY question_number",
    )?;
    let mut questions = stmt
        .query_map(params![exam_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .map(|(id, number, text, example, image, choices, answers)| {
            Ok(QuestionView {
                id,
                question_number: number,
                question_text: text,
                example_text: example,
                question_image_url: image,
                choices: serde_json::from_str(&choices)?,
                correct_answers: match mode {
                    Mode::Study => Some(serde_json::from_str(&answers)?),
                    Mode::Test => None,
                },
            })
        })
        .collect::<Result<Vec<_>, CrawlError>>()?;

    let pagination = match (page, limit) {
        (Some(page), Some(limit)) if limit > 0 => {
            let page = page.max(1);
            let total = questions.len();
            questions = questions
                .into_iter()
                .skip(((page - 1) * limit) as usize)
                .take(limit as usize)
                .collect();
            Some(Pagination {
                page,
                limit,
                total,
                total_pages: (total as u32).div_ceil(limit),
            })
        }
        _ => None,
    };

    Ok(QuestionSet {
        exam,
        questions,
        pagination,
    })
}

// ── Scoring ──

#[derive(Debug, Clone)]
pub struct SubmittedAnswer {
    pub question_id: i64,
    /// None models an unanswered question; it is always wrong.
    pub selected_answer: Option<u8>,
}

#[derive(Debug, Serialize)]
pub struct AnswerResult {
    pub question_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_answer: Option<u8>,
    pub is_correct: bool,
    pub correct_answers: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct ScoreReport {
    pub exam_id: i64,
    pub score: u32,
    pub correct_count: usize,
    pub total: usize,
    pub results: Vec<AnswerResult>,
}

/// Grade a submission: an answer is correct iff the selected number is a
/// member of the question's accepted set. Unknown question ids grade as
/// incorrect rather than failing the whole submission.
pub fn submit_exam(
    conn: &Connection,
    exam_id: i64,
    answers: &[SubmittedAnswer],
) -> Result<ScoreReport, CrawlError> {
    get_exam(conn, exam_id)?.ok_or(CrawlError::ExamNotFound(exam_id))?;

    let mut stmt =
        conn.prepare("SELECT id, correct_answers FROM questions WHERE exam_id = ?1")?;
    let accepted: HashMap<i64, Vec<u8>> = stmt
        .query_map(params![exam_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .map(|(id, json)| Ok((id, serde_json::from_str(&json)?)))
        .collect::<Result<_, CrawlError>>()?;

    let mut results = Vec::with_capacity(answers.len());
    let mut correct_count = 0usize;
    for answer in answers {
        let accepted_set = accepted.get(&answer.question_id);
        let is_correct = match (accepted_set, answer.selected_answer) {
            (Some(set), Some(selected)) => set.contains(&selected),
            _ => false,
        };
        if is_correct {
            correct_count += 1;
        }
        results.push(AnswerResult {
            question_id: answer.question_id,
            selected_answer: answer.selected_answer,
            is_correct,
            correct_answers: accepted_set.cloned().unwrap_or_default(),
        });
    }

    let total = results.len();
    let score = if total == 0 {
        0
    } else {
        (correct_count as f64 / total as f64 * 100.0).round() as u32
    };

    Ok(ScoreReport {
        exam_id,
        score,
        correct_count,
        total,
        results,
    })
}

fn get_exam(conn: &Connection, exam_id: i64) -> Result<Option<ExamSummary>, CrawlError> {
    let exam = conn
        .query_row(
            "SELECT e.id, s.name, e.year, e.exam_type, e.title, e.total_questions
             FROM exams e JOIN subjects s ON s.id = e.subject_id
             WHERE e.id = ?1",
            params![exam_id],
            |row| {
                Ok(ExamSummary {
                    id: row.get(0)?,
                    subject: row.get(1)?,
                    year: row.get(2)?,
                    exam_type: ExamType::from_code(row.get(3)?)
                        .map(|ty| ty.label().to_string())
                        .unwrap_or_default(),
                    title: row.get(4)?,
                    total_questions: row.get(5)?,
                })
            },
        )
        .optional()?;
    Ok(exam)
}

// ── Tests ──
