use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::layout::{find_info_table, InfoTable};
use super::text_of;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4})\s*학년도").unwrap());
static SEMESTER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*학기").unwrap());
static QUESTION_COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"학년\s*(\d+)\s*문항").unwrap());

static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

/// Metadata scraped off the page's info table. Everything is best-effort
/// here; the persistence preconditions decide what is actually required.
#[derive(Debug, Default)]
pub struct ExamInfo {
    pub year: Option<i32>,
    pub semester: Option<u8>,
    pub question_count_hint: u32,
    pub subject_name: String,
    pub exam_type_text: String,
}

/// Extract exam metadata from whichever info table the page carries.
///
/// Both layouts put the year/semester/question-count line in the first row,
/// the subject name in row 1 and the exam-type text in row 2. There is no
/// other anchor for those two fields, so the row positions are load-bearing.
pub fn extract_info(doc: &Html) -> ExamInfo {
    let Some(table) = find_info_table(doc) else {
        return ExamInfo::default();
    };

    let (tbody, header_text, strip_label) = match table {
        InfoTable::Alla6(tbody) => (tbody, text_of(&tbody), true),
        InfoTable::Basic(tbody) => {
            // Only the first cell of the first row is reliable header text in
            // the classic layout; the rest of the tbody is question markup on
            // some pages.
            let first_cell = tbody
                .select(&TR)
                .next()
                .and_then(|row| row.select(&TD).next())
                .map(|cell| text_of(&cell))
                .unwrap_or_default();
            (tbody, first_cell, false)
        }
    };

    let rows: Vec<ElementRef> = tbody.select(&TR).collect();
    let subject_name = row_text(&rows, 1);
    let mut exam_type_text = row_text(&rows, 2);
    if strip_label {
        exam_type_text = exam_type_text
            .replacen("시험종류", "", 1)
            .replacen(':', "", 1)
            .trim()
            .to_string();
    }

    ExamInfo {
        year: capture_int(&YEAR_RE, &header_text),
        semester: capture_int(&SEMESTER_RE, &header_text),
        question_count_hint: capture_int(&QUESTION_COUNT_RE, &header_text).unwrap_or(0),
        subject_name,
        exam_type_text,
    }
}

/// Concatenated text of every `td` in row `index`, trimmed.
fn row_text(rows: &[ElementRef], index: usize) -> String {
    rows.get(index)
        .map(|row| {
            row.select(&TD)
                .flat_map(|cell| cell.text())
                .collect::<String>()
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

fn capture_int<T: std::str::FromStr>(re: &Regex, text: &str) -> Option<T> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Html {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        Html::parse_document(&html)
    }

    #[test]
    fn basic_info() {
        let info = extract_info(&fixture("basic_exam"));
        assert_eq!(info.year, Some(2023));
        assert_eq!(info.semester, Some(2));
        assert_eq!(info.question_count_hint, 35);
        assert_eq!(info.subject_name, "컴퓨터과학개론");
        assert_eq!(info.exam_type_text, "2학기 기말");
    }

    #[test]
    fn alla6_info_strips_type_label() {
        let info = extract_info(&fixture("alla6_exam"));
        assert_eq!(info.year, Some(2019));
        assert_eq!(info.semester, None);
        assert_eq!(info.question_count_hint, 25);
        assert_eq!(info.subject_name, "데이터베이스");
        assert_eq!(info.exam_type_text, "하계 계절학기");
    }

    #[test]
    fn missing_markers_default() {
        let doc = Html::parse_document(
            "<table><tbody><tr><td>no markers here</td></tr></tbody></table>",
        );
        let info = extract_info(&doc);
        assert_eq!(info.year, None);
        assert_eq!(info.semester, None);
        assert_eq!(info.question_count_hint, 0);
        assert!(info.subject_name.is_empty());
    }

    #[test]
    fn no_table_at_all() {
        let info = extract_info(&Html::parse_document("<div>plain page</div>"));
        assert_eq!(info.year, None);
        assert!(info.subject_name.is_empty());
        assert!(info.exam_type_text.is_empty());
    }
}
