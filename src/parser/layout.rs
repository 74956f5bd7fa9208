use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

static ALLA6_INFO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.alla6TitleTbl tbody").unwrap());
static ALLA_INFO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.allaTitleTbl tbody").unwrap());
static ANY_TBODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table tbody").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

/// The source site ships two generations of question markup, distinguished
/// only by their CSS class prefixes (`alla*` vs `alla6*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Basic,
    Alla6,
}

/// Selector profile for one markup generation's question blocks.
pub struct QuestionSelectors {
    pub table: Selector,
    pub number: Selector,
    pub question_row: Selector,
    pub choice_row: Selector,
}

impl Layout {
    pub fn question_selectors(self) -> &'static QuestionSelectors {
        static BASIC: LazyLock<QuestionSelectors> = LazyLock::new(|| QuestionSelectors {
            table: Selector::parse("table.allaBasicTbl").unwrap(),
            number: Selector::parse("span.allaQuestionNo").unwrap(),
            question_row: Selector::parse("tr.allaQuestionTr td").unwrap(),
            choice_row: Selector::parse("tr.allaAnswerTr").unwrap(),
        });
        static ALLA6: LazyLock<QuestionSelectors> = LazyLock::new(|| QuestionSelectors {
            table: Selector::parse("table.alla6BasicTbl").unwrap(),
            number: Selector::parse("span.alla6QuestionNo").unwrap(),
            question_row: Selector::parse("tr.alla6QuestionTr td").unwrap(),
            choice_row: Selector::parse("tr.alla6AnswerTr").unwrap(),
        });
        match self {
            Layout::Basic => &BASIC,
            Layout::Alla6 => &ALLA6,
        }
    }
}

/// Pick the question-block generation present in the page. The classic
/// `alla*` classes are probed first; anything else falls through to `alla6*`.
pub fn detect_question_layout(doc: &Html) -> Layout {
    if doc
        .select(&Layout::Basic.question_selectors().table)
        .next()
        .is_some()
    {
        Layout::Basic
    } else {
        Layout::Alla6
    }
}

/// The info table carrying year/subject/exam-type, tagged with the layout it
/// was found under. Text extraction differs between the two.
pub enum InfoTable<'a> {
    Alla6(ElementRef<'a>),
    Basic(ElementRef<'a>),
}

/// Locate the info table: `alla6TitleTbl` first, then `allaTitleTbl`, then
/// the first table body with at least one row.
pub fn find_info_table(doc: &Html) -> Option<InfoTable<'_>> {
    if let Some(tbody) = doc.select(&ALLA6_INFO).next() {
        return Some(InfoTable::Alla6(tbody));
    }
    if let Some(tbody) = doc.select(&ALLA_INFO).next() {
        if tbody.select(&TR).next().is_some() {
            return Some(InfoTable::Basic(tbody));
        }
    }
    doc.select(&ANY_TBODY)
        .find(|tbody| tbody.select(&TR).next().is_some())
        .map(InfoTable::Basic)
}

// ── Tests ──
