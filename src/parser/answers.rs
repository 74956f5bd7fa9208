use std::collections::BTreeMap;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::error::CrawlError;

use super::{parse_leading_int, text_of};

/// Combined-answer notation used by the source site: one letter stands for a
/// fixed set of accepted choice numbers.
const MULTI_ANSWER_CODES: &[(&str, &[u8])] = &[
    ("A", &[1, 2]),
    ("B", &[1, 3]),
    ("C", &[1, 4]),
    ("D", &[2, 3]),
    ("E", &[2, 4]),
    ("F", &[3, 4]),
    ("G", &[1, 2, 3]),
    ("H", &[1, 2, 4]),
    ("I", &[1, 3, 4]),
    ("J", &[2, 3, 4]),
    ("K", &[1, 2, 3, 4]),
];

/// Question number → accepted choice numbers.
pub type AnswerMap = BTreeMap<u32, Vec<u8>>;

static ANSWER_DIV_ROWS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".allaAnswerTableDiv table tr").unwrap());
static TBODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table tbody").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static TH: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());

/// Decode one answer cell: a multi-answer letter A–K, or a single choice
/// number 1–4. Anything else is malformed.
pub fn decode_answer(text: &str) -> Result<Vec<u8>, CrawlError> {
    let trimmed = text.trim();
    if let Some((_, numbers)) = MULTI_ANSWER_CODES.iter().find(|(code, _)| *code == trimmed) {
        return Ok(numbers.to_vec());
    }
    match trimmed.parse::<u8>() {
        Ok(n @ 1..=4) => Ok(vec![n]),
        _ => Err(CrawlError::MalformedAnswer(text.to_string())),
    }
}

/// Locate and decode the page's answer table.
///
/// The three known encodings are tried in fixed priority order; the first
/// strategy producing a non-empty map wins. An empty result means no answer
/// table was found anywhere; the caller decides whether that is fatal.
pub fn extract_answer_map(doc: &Html, first_question_no: u32) -> AnswerMap {
    let strategies: [fn(&Html, u32) -> Option<AnswerMap>; 3] =
        [from_answer_div, from_header_table, from_answer_string];
    for strategy in strategies {
        if let Some(map) = strategy(doc, first_question_no) {
            return map;
        }
    }
    AnswerMap::new()
}

/// Structured (number, answer) table under `.allaAnswerTableDiv`.
///
/// Some of these tables renumber from 1 even when the exam's first question
/// is elsewhere; in that case every listed number is shifted by the first
/// scraped question's number minus one. A table whose first number already
/// matches real numbering is taken as-is.
fn from_answer_div(doc: &Html, first_question_no: u32) -> Option<AnswerMap> {
    let rows: Vec<ElementRef> = doc.select(&ANSWER_DIV_ROWS).collect();
    if rows.len() < 2 {
        return None;
    }

    let table_first = rows.iter().skip(1).find_map(|row| {
        let cells: Vec<ElementRef> = row.select(&TD).collect();
        if cells.len() < 2 {
            return None;
        }
        parse_leading_int(&text_of(&cells[0]))
    });
    let offset = match table_first {
        Some(1) if first_question_no != 1 => first_question_no.saturating_sub(1),
        _ => 0,
    };

    let mut map = AnswerMap::new();
    for row in rows.iter().skip(1) {
        let cells: Vec<ElementRef> = row.select(&TD).collect();
        if cells.len() < 2 {
            continue;
        }
        let Some(listed_no) = parse_leading_int(&text_of(&cells[0])) else {
            continue;
        };
        let answer_text = text_of(&cells[1]);
        if answer_text.is_empty() {
            continue;
        }
        let number = listed_no + offset;
        match decode_answer(&answer_text) {
            Ok(numbers) => {
                map.insert(number, numbers);
            }
            Err(_) => warn!("question {}: undecodable answer {:?}", number, answer_text),
        }
    }
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

/// Table body whose header cell literally says "정답". Rows with fewer than
/// two data cells are extra header/spacer rows. Listed numbers are trusted.
fn from_header_table(doc: &Html, _first_question_no: u32) -> Option<AnswerMap> {
    for tbody in doc.select(&TBODY) {
        let has_answer_header = tbody.select(&TH).any(|th| text_of(&th).contains("정답"));
        if !has_answer_header {
            continue;
        }

        let mut map = AnswerMap::new();
        for row in tbody.select(&TR) {
            let cells: Vec<ElementRef> = row.select(&TD).collect();
            if cells.len() < 2 {
                continue;
            }
            let Some(number) = parse_leading_int(&text_of(&cells[0])) else {
                continue;
            };
            let answer_text = text_of(&cells[1]);
            if answer_text.is_empty() {
                continue;
            }
            match decode_answer(&answer_text) {
                Ok(numbers) => {
                    map.insert(number, numbers);
                }
                Err(_) => warn!("question {}: undecodable answer {:?}", number, answer_text),
            }
        }
        if !map.is_empty() {
            return Some(map);
        }
    }
    None
}

/// Run-length string after a "문제답안" marker row: character i answers
/// question `first_question_no + i`. Characters decode independently.
fn from_answer_string(doc: &Html, first_question_no: u32) -> Option<AnswerMap> {
    for tbody in doc.select(&TBODY) {
        let rows: Vec<ElementRef> = tbody.select(&TR).collect();
        let Some(marker) = rows.iter().position(|row| text_of(row).contains("문제답안")) else {
            continue;
        };
        let Some(next_row) = rows.get(marker + 1) else {
            continue;
        };
        let answer_string = next_row
            .select(&TD)
            .flat_map(|cell| cell.text())
            .collect::<String>()
            .trim()
            .to_string();

        let mut map = AnswerMap::new();
        for (i, ch) in answer_string.chars().enumerate() {
            let number = first_question_no + i as u32;
            match decode_answer(&ch.to_string()) {
                Ok(numbers) => {
                    map.insert(number, numbers);
                }
                Err(_) => warn!("question {}: undecodable answer char {:?}", number, ch),
            }
        }
        if !map.is_empty() {
            return Some(map);
        }
    }
    None
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
    fn multi_answer_codes() {
        for (code, expected) in MULTI_ANSWER_CODES {
            assert_eq!(decode_answer(code).unwrap(), expected.to_vec());
        }
    }

    #[test]
    fn single_answers() {
        for n in 1..=4u8 {
            assert_eq!(decode_answer(&n.to_string()).unwrap(), vec![n]);
        }
        assert_eq!(decode_answer(" 3 ").unwrap(), vec![3]);
    }

    #[test]
    fn malformed_answers() {
        for bad in ["", "0", "5", "12", "L", "a", "1.5", "정답"] {
            assert!(matches!(
                decode_answer(bad),
                Err(CrawlError::MalformedAnswer(_))
            ));
        }
    }

    #[test]
    fn answer_div_without_offset() {
        let map = extract_answer_map(&fixture("basic_exam"), 1);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1], vec![1, 2]);
        assert_eq!(map[&2], vec![3]);
    }

    #[test]
    fn answer_div_offset_correction() {
        // Table lists 1.. while the first scraped question is 5: every row
        // shifts by 4, and the undecodable third row is dropped.
        let map = extract_answer_map(&fixture("offset_answers"), 5);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&5], vec![1]);
        assert_eq!(map[&6], vec![2, 3]);
    }

    #[test]
    fn answer_div_matching_numbers_untouched() {
        // Same table, but the exam also starts at question 1: no shift.
        let map = extract_answer_map(&fixture("offset_answers"), 1);
        assert_eq!(map[&1], vec![1]);
        assert_eq!(map[&2], vec![2, 3]);
    }

    #[test]
    fn header_keyed_table() {
        let map = extract_answer_map(&fixture("alla6_exam"), 1);
        assert_eq!(map.len(), 3);
        assert_eq!(map[&1], vec![2]);
        assert_eq!(map[&2], vec![1, 2, 3, 4]);
        assert_eq!(map[&3], vec![4]);
    }

    #[test]
    fn run_length_string() {
        let map = extract_answer_map(&fixture("string_answers"), 1);
        assert_eq!(map.len(), 4);
        assert_eq!(map[&1], vec![1, 2, 3, 4]);
        assert_eq!(map[&2], vec![2]);
        assert_eq!(map[&3], vec![3]);
        assert_eq!(map[&4], vec![4]);
    }

    #[test]
    fn run_length_string_offset_start() {
        let map = extract_answer_map(&fixture("string_answers"), 10);
        assert_eq!(map[&10], vec![1, 2, 3, 4]);
        assert_eq!(map[&13], vec![4]);
    }

    #[test]
    fn no_answer_table_is_empty() {
        let map = extract_answer_map(&fixture("no_answers"), 1);
        assert!(map.is_empty());
    }
}
