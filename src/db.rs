use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::error::CrawlError;
use crate::parser::answers::AnswerMap;
use crate::parser::exam_type::ExamType;
use crate::parser::questions::ScrapedQuestion;

const DB_PATH: &str = "data/exams.sqlite";

pub fn connect() -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS departments (
            id         INTEGER PRIMARY KEY,
            name       TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS subjects (
            id            INTEGER PRIMARY KEY,
            name          TEXT UNIQUE NOT NULL,
            department_id INTEGER REFERENCES departments(id) ON DELETE SET NULL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS exams (
            id              INTEGER PRIMARY KEY,
            subject_id      INTEGER NOT NULL REFERENCES subjects(id) ON DELETE CASCADE,
            year            INTEGER NOT NULL,
            exam_type       INTEGER NOT NULL,
            title           TEXT NOT NULL,
            total_questions INTEGER NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(subject_id, year, exam_type)
        );
        CREATE INDEX IF NOT EXISTS idx_exams_subject ON exams(subject_id);

        -- choices and correct_answers are embedded JSON arrays: a question is
        -- always read whole, never joined against a choices table.
        CREATE TABLE IF NOT EXISTS questions (
            id                 INTEGER PRIMARY KEY,
            exam_id            INTEGER NOT NULL REFERENCES exams(id) ON DELETE CASCADE,
            question_number    INTEGER NOT NULL,
            question_text      TEXT NOT NULL,
            example_text       TEXT,
            question_image_url TEXT,
            choices            TEXT NOT NULL,
            correct_answers    TEXT NOT NULL,
            created_at         TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_questions_exam ON questions(exam_id);
        ",
    )?;
    Ok(())
}

// ── Reconciliation & persistence ──

/// One scraped exam, ready to reconcile against the store.
pub struct ExamInput<'a> {
    pub subject_name: &'a str,
    pub year: Option<i32>,
    pub exam_type: ExamType,
    pub title: &'a str,
    pub questions: &'a [ScrapedQuestion],
    pub answers: &'a AnswerMap,
}

#[derive(Debug)]
pub struct SaveReport {
    pub exam_id: i64,
    pub title: String,
    pub saved_question_count: usize,
    pub total_scraped: usize,
    pub skipped_question_numbers: Vec<u32>,
    pub updated: bool,
}

/// Create-or-update one exam and its questions in a single transaction.
///
/// Keyed by (subject, year, exam type). An existing exam is replaced in
/// place only under `force_retry`: its questions are deleted and its row
/// updated so the id survives. Without the flag an existing key is a
/// `Conflict` and nothing is written. Questions with no decodable answer are
/// skipped and their numbers reported, never silently dropped.
pub fn save_exam(
    conn: &Connection,
    input: &ExamInput,
    force_retry: bool,
) -> Result<SaveReport, CrawlError> {
    let Some(year) = input.year else {
        return Err(CrawlError::MissingYear);
    };
    let subject_name = input.subject_name.trim();
    if subject_name.is_empty() {
        return Err(CrawlError::MissingSubjectName);
    }
    if !input.questions.is_empty() && input.answers.is_empty() {
        return Err(CrawlError::AnswerTableNotFound);
    }

    let tx = conn.unchecked_transaction()?;
    let subject_id = find_or_create_subject(&tx, subject_name)?;

    let existing = tx
        .query_row(
            "SELECT id, title FROM exams
             WHERE subject_id = ?1 AND year = ?2 AND exam_type = ?3",
            params![subject_id, year, input.exam_type.code()],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?;

    let (exam_id, updated) = match existing {
        Some((id, title)) => {
            if !force_retry {
                // Dropping the transaction rolls back the subject insert too.
                return Err(CrawlError::Conflict {
                    exam_id: id,
                    title,
                    year,
                    exam_type: input.exam_type,
                });
            }
            info!("replacing questions of existing exam {}", id);
            tx.execute("DELETE FROM questions WHERE exam_id = ?1", params![id])?;
            tx.execute(
                "UPDATE exams SET title = ?1, total_questions = ?2 WHERE id = ?3",
                params![input.title, input.questions.len() as i64, id],
            )?;
            (id, true)
        }
        None => {
            tx.execute(
                "INSERT INTO exams (subject_id, year, exam_type, title, total_questions)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    subject_id,
                    year,
                    input.exam_type.code(),
                    input.title,
                    input.questions.len() as i64
                ],
            )?;
            (tx.last_insert_rowid(), false)
        }
    };

    let mut skipped = Vec::new();
    let mut saved = 0usize;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO questions
             (exam_id, question_number, question_text, example_text, question_image_url, choices, correct_answers)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for question in input.questions {
            let Some(answers) = input
                .answers
                .get(&question.number)
                .filter(|numbers| !numbers.is_empty())
            else {
                warn!("question {}: no answer entry, skipping", question.number);
                skipped.push(question.number);
                continue;
            };
            stmt.execute(params![
                exam_id,
                question.number,
                question.text,
                question.example_text,
                question.image_url,
                serde_json::to_string(&question.choices)?,
                serde_json::to_string(answers)?,
            ])?;
            saved += 1;
        }
    }
    tx.commit()?;

    Ok(SaveReport {
        exam_id,
        title: input.title.to_string(),
        saved_question_count: saved,
        total_scraped: input.questions.len(),
        skipped_question_numbers: skipped,
        updated,
    })
}

/// Exact-name subject lookup, creating on first reference. The unique index
/// is the real guard: a create lost to a concurrent writer degrades to the
/// lookup instead of surfacing a constraint error.
fn find_or_create_subject(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.execute("INSERT OR IGNORE INTO subjects (name) VALUES (?1)", params![name])?;
    conn.query_row(
        "SELECT id FROM subjects WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
}

// ── Stats ──

pub struct Stats {
    pub subjects: usize,
    pub exams: usize,
    pub questions: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let subjects: usize = conn.query_row("SELECT COUNT(*) FROM subjects", [], |r| r.get(0))?;
    let exams: usize = conn.query_row("SELECT COUNT(*) FROM exams", [], |r| r.get(0))?;
    let questions: usize = conn.query_row("SELECT COUNT(*) FROM questions", [], |r| r.get(0))?;
    Ok(Stats {
        subjects,
        exams,
        questions,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::questions::Choice;

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn question(number: u32) -> ScrapedQuestion {
        ScrapedQuestion {
            number,
            text: format!("질문 {}", number),
            example_text: None,
            image_url: None,
            choices: (1..=4)
                .map(|n| Choice {
                    number: n,
                    text: format!("보기 {}", n),
                    image_url: None,
                })
                .collect(),
        }
    }

    fn answers(entries: &[(u32, &[u8])]) -> AnswerMap {
        entries
            .iter()
            .map(|(no, nums)| (*no, nums.to_vec()))
            .collect()
    }

    fn question_count(conn: &Connection) -> usize {
        conn.query_row("SELECT COUNT(*) FROM questions", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn first_save_creates_exam_and_questions() {
        let conn = memory_conn();
        let qs = vec![question(1), question(2)];
        let map = answers(&[(1, &[1, 2]), (2, &[3])]);
        let input = ExamInput {
            subject_name: "컴퓨터과학개론",
            year: Some(2023),
            exam_type: ExamType::SecondSemesterFinal,
            title: "컴퓨터과학개론",
            questions: &qs,
            answers: &map,
        };

        let report = save_exam(&conn, &input, false).unwrap();
        assert!(!report.updated);
        assert_eq!(report.saved_question_count, 2);
        assert_eq!(report.total_scraped, 2);
        assert!(report.skipped_question_numbers.is_empty());
        assert_eq!(question_count(&conn), 2);

        let stored: String = conn
            .query_row(
                "SELECT correct_answers FROM questions WHERE question_number = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stored, "[1,2]");
    }

    #[test]
    fn forced_retry_is_idempotent() {
        let conn = memory_conn();
        let qs = vec![question(1), question(2)];
        let map = answers(&[(1, &[1]), (2, &[2])]);
        let input = ExamInput {
            subject_name: "데이터베이스",
            year: Some(2020),
            exam_type: ExamType::FirstSemesterFinal,
            title: "데이터베이스",
            questions: &qs,
            answers: &map,
        };

        let first = save_exam(&conn, &input, true).unwrap();
        let second = save_exam(&conn, &input, true).unwrap();
        assert_eq!(first.exam_id, second.exam_id);
        assert!(second.updated);
        assert_eq!(second.saved_question_count, first.saved_question_count);
        assert_eq!(question_count(&conn), 2);
    }

    #[test]
    fn duplicate_without_retry_is_conflict_with_zero_writes() {
        let conn = memory_conn();
        let qs = vec![question(1)];
        let map = answers(&[(1, &[4])]);
        let input = ExamInput {
            subject_name: "경영학원론",
            year: Some(2021),
            exam_type: ExamType::WinterSemester,
            title: "경영학원론",
            questions: &qs,
            answers: &map,
        };

        let first = save_exam(&conn, &input, false).unwrap();
        let err = save_exam(&conn, &input, false).unwrap_err();
        match err {
            CrawlError::Conflict { exam_id, year, .. } => {
                assert_eq!(exam_id, first.exam_id);
                assert_eq!(year, 2021);
            }
            other => panic!("expected Conflict, got {:?}", other),
        }
        assert_eq!(question_count(&conn), 1);
    }

    #[test]
    fn unanswered_question_skipped_and_reported() {
        let conn = memory_conn();
        let qs = vec![question(1), question(2), question(3)];
        let map = answers(&[(1, &[1]), (3, &[2])]);
        let input = ExamInput {
            subject_name: "통계학",
            year: Some(2022),
            exam_type: ExamType::SummerSemester,
            title: "통계학",
            questions: &qs,
            answers: &map,
        };

        let report = save_exam(&conn, &input, false).unwrap();
        assert_eq!(report.saved_question_count, 2);
        assert_eq!(report.skipped_question_numbers, vec![2]);
        let numbers: Vec<u32> = {
            let mut stmt = conn
                .prepare("SELECT question_number FROM questions ORDER BY question_number")
                .unwrap();
            stmt.query_map([], |r| r.get(0))
                .unwrap()
                .collect::<rusqlite::Result<_>>()
                .unwrap()
        };
        assert_eq!(numbers, vec![1, 3]);
    }

    #[test]
    fn questions_without_any_answers_is_fatal() {
        let conn = memory_conn();
        let qs = vec![question(1), question(2)];
        let map = AnswerMap::new();
        let input = ExamInput {
            subject_name: "법학개론",
            year: Some(2023),
            exam_type: ExamType::FirstSemesterFinal,
            title: "법학개론",
            questions: &qs,
            answers: &map,
        };

        assert!(matches!(
            save_exam(&conn, &input, false),
            Err(CrawlError::AnswerTableNotFound)
        ));
        assert_eq!(question_count(&conn), 0);
        let exams: usize = conn
            .query_row("SELECT COUNT(*) FROM exams", [], |r| r.get(0))
            .unwrap();
        assert_eq!(exams, 0);
    }

    #[test]
    fn missing_year_and_subject_fail_fast() {
        let conn = memory_conn();
        let qs = vec![question(1)];
        let map = answers(&[(1, &[1])]);

        let no_year = ExamInput {
            subject_name: "국어",
            year: None,
            exam_type: ExamType::FirstSemesterFinal,
            title: "국어",
            questions: &qs,
            answers: &map,
        };
        assert!(matches!(
            save_exam(&conn, &no_year, false),
            Err(CrawlError::MissingYear)
        ));

        let no_subject = ExamInput {
            subject_name: "  ",
            year: Some(2020),
            exam_type: ExamType::FirstSemesterFinal,
            title: "",
            questions: &qs,
            answers: &map,
        };
        assert!(matches!(
            save_exam(&conn, &no_subject, false),
            Err(CrawlError::MissingSubjectName)
        ));
    }

    #[test]
    fn subject_reused_across_exams() {
        let conn = memory_conn();
        let qs = vec![question(1)];
        let map = answers(&[(1, &[1])]);
        for year in [2021, 2022] {
            let input = ExamInput {
                subject_name: "회계학",
                year: Some(year),
                exam_type: ExamType::SecondSemesterFinal,
                title: "회계학",
                questions: &qs,
                answers: &map,
            };
            save_exam(&conn, &input, false).unwrap();
        }
        let subjects: usize = conn
            .query_row("SELECT COUNT(*) FROM subjects", [], |r| r.get(0))
            .unwrap();
        assert_eq!(subjects, 1);
    }

    #[test]
    fn scraped_page_persists_end_to_end() {
        let conn = memory_conn();
        let html = std::fs::read_to_string("tests/fixtures/basic_exam.html").unwrap();
        let parsed = crate::parser::parse_exam_page(&html).unwrap();
        let input = ExamInput {
            subject_name: &parsed.subject_name,
            year: parsed.year,
            exam_type: parsed.exam_type,
            title: &parsed.subject_name,
            questions: &parsed.questions,
            answers: &parsed.answers,
        };

        let report = save_exam(&conn, &input, false).unwrap();
        assert_eq!(report.saved_question_count, 2);
        assert!(report.skipped_question_numbers.is_empty());

        let total: i64 = conn
            .query_row(
                "SELECT total_questions FROM exams WHERE id = ?1",
                params![report.exam_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(total, 2);
        let answers: String = conn
            .query_row(
                "SELECT correct_answers FROM questions
                 WHERE exam_id = ?1 AND question_number = 1",
                params![report.exam_id],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(answers, "[1,2]");
    }

    #[test]
    fn page_without_answer_table_writes_nothing() {
        let conn = memory_conn();
        let html = std::fs::read_to_string("tests/fixtures/no_answers.html").unwrap();
        let parsed = crate::parser::parse_exam_page(&html).unwrap();
        let input = ExamInput {
            subject_name: &parsed.subject_name,
            year: parsed.year,
            exam_type: parsed.exam_type,
            title: &parsed.subject_name,
            questions: &parsed.questions,
            answers: &parsed.answers,
        };

        assert!(matches!(
            save_exam(&conn, &input, false),
            Err(CrawlError::AnswerTableNotFound)
        ));
        assert_eq!(question_count(&conn), 0);
    }

    #[test]
    fn cascade_delete_subject_to_questions() {
        let conn = memory_conn();
        let qs = vec![question(1), question(2)];
        let map = answers(&[(1, &[1]), (2, &[2])]);
        let input = ExamInput {
            subject_name: "물리학",
            year: Some(2019),
            exam_type: ExamType::SummerSemester,
            title: "물리학",
            questions: &qs,
            answers: &map,
        };
        save_exam(&conn, &input, false).unwrap();
        assert_eq!(question_count(&conn), 2);

        conn.execute("DELETE FROM subjects WHERE name = '물리학'", [])
            .unwrap();
        let exams: usize = conn
            .query_row("SELECT COUNT(*) FROM exams", [], |r| r.get(0))
            .unwrap();
        assert_eq!(exams, 0);
        assert_eq!(question_count(&conn), 0);
    }
}
