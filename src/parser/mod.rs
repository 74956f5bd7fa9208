pub mod answers;
pub mod exam_type;
pub mod info;
pub mod layout;
pub mod questions;

use scraper::{ElementRef, Html};
use tracing::info;

use crate::error::CrawlError;

use answers::AnswerMap;
use exam_type::ExamType;
use questions::ScrapedQuestion;

/// Everything extracted from one exam page, ready for reconciliation.
pub struct ParsedExam {
    pub year: Option<i32>,
    pub semester: Option<u8>,
    pub subject_name: String,
    pub exam_type: ExamType,
    pub exam_type_text: String,
    pub question_count_hint: u32,
    pub questions: Vec<ScrapedQuestion>,
    pub answers: AnswerMap,
}

/// Parse a fetched exam page: detect the markup generation once, then run
/// the meta, question and answer extractors against it.
pub fn parse_exam_page(html: &str) -> Result<ParsedExam, CrawlError> {
    let doc = Html::parse_document(html);

    let mut meta = info::extract_info(&doc);
    // Some pages keep the semester only in the header line; fold it into the
    // exam-type text before classification.
    if let Some(semester) = meta.semester {
        if !meta.exam_type_text.contains("학기") {
            meta.exam_type_text = format!("{}학기 {}", semester, meta.exam_type_text);
        }
    }
    let exam_type = exam_type::classify(&meta.exam_type_text)?;

    let layout = layout::detect_question_layout(&doc);
    let questions: Vec<ScrapedQuestion> = questions::questions(&doc, layout).collect();
    let first_question_no = questions.first().map(|q| q.number).unwrap_or(1);
    let answers = answers::extract_answer_map(&doc, first_question_no);

    info!(
        "parsed {:?} ({}, year {:?}): {} questions, {} answers",
        meta.subject_name,
        exam_type,
        meta.year,
        questions.len(),
        answers.len()
    );

    Ok(ParsedExam {
        year: meta.year,
        semester: meta.semester,
        subject_name: meta.subject_name,
        exam_type,
        exam_type_text: meta.exam_type_text,
        question_count_hint: meta.question_count_hint,
        questions,
        answers,
    })
}

/// Trimmed text content of an element, descendants included.
pub(crate) fn text_of(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Parse the leading digit run of a scraped label ("12." → 12).
pub(crate) fn parse_leading_int(s: &str) -> Option<u32> {
    let digits: String = s
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn basic_page_end_to_end() {
        let parsed = parse_exam_page(&fixture("basic_exam")).unwrap();
        assert_eq!(parsed.year, Some(2023));
        assert_eq!(parsed.semester, Some(2));
        assert_eq!(parsed.exam_type, ExamType::SecondSemesterFinal);
        assert_eq!(parsed.subject_name, "컴퓨터과학개론");
        assert_eq!(parsed.questions.len(), 2);
        assert_eq!(parsed.answers[&1], vec![1, 2]);
        assert_eq!(parsed.answers[&2], vec![3]);
    }

    #[test]
    fn alla6_page_end_to_end() {
        let parsed = parse_exam_page(&fixture("alla6_exam")).unwrap();
        assert_eq!(parsed.year, Some(2019));
        assert_eq!(parsed.exam_type, ExamType::SummerSemester);
        assert_eq!(parsed.questions.len(), 3);
        assert_eq!(parsed.answers.len(), 3);
    }

    #[test]
    fn semester_folded_into_type_text() {
        let html = r#"
            <table class="allaTitleTbl"><tbody>
              <tr><td>2022학년도 1학기 3학년 30문항</td></tr>
              <tr><td>경영학원론</td></tr>
              <tr><td>기말</td></tr>
            </tbody></table>
            <div class="allaAnswerTableDiv"><table><tbody>
              <tr><th>번호</th><th>정답</th></tr>
              <tr><td>1</td><td>2</td></tr>
            </tbody></table></div>"#;
        let parsed = parse_exam_page(html).unwrap();
        assert_eq!(parsed.exam_type, ExamType::FirstSemesterFinal);
        assert_eq!(parsed.exam_type_text, "1학기 기말");
    }

    #[test]
    fn unclassifiable_type_is_fatal() {
        let html = r#"
            <table class="allaTitleTbl"><tbody>
              <tr><td>2022학년도</td></tr>
              <tr><td>과목명</td></tr>
              <tr><td>쪽지시험</td></tr>
            </tbody></table>"#;
        assert!(matches!(
            parse_exam_page(html),
            Err(CrawlError::UnknownExamType(_))
        ));
    }

    #[test]
    fn missing_answer_table_yields_empty_map() {
        let parsed = parse_exam_page(&fixture("no_answers")).unwrap();
        assert_eq!(parsed.questions.len(), 2);
        assert!(parsed.answers.is_empty());
    }

    #[test]
    fn leading_int() {
        assert_eq!(parse_leading_int("12."), Some(12));
        assert_eq!(parse_leading_int(" 3 "), Some(3));
        assert_eq!(parse_leading_int("문제 1"), None);
        assert_eq!(parse_leading_int(""), None);
    }
}
