use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::layout::Layout;
use super::{parse_leading_int, text_of};

// The example row kept its `alla*` inner class even on `alla6*` pages, so one
// combined selector covers both generations.
static EXAMPLE_TEXT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("tr.alla6ExampleTr_Txt .allaExampleList_p, tr.allaExampleTr_Txt .allaExampleList_p")
        .unwrap()
});
static RADIO: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[type="radio"]"#).unwrap());
static LABEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("label").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());

/// One answer option of a question. Stored embedded in the question row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub number: u8,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScrapedQuestion {
    pub number: u32,
    pub text: String,
    pub example_text: Option<String>,
    pub image_url: Option<String>,
    pub choices: Vec<Choice>,
}

/// Walk the page's question blocks in DOM order.
///
/// Lazy: blocks parse as the iterator advances, and a block whose number
/// label does not parse is dropped without disturbing the rest. Numbers are
/// kept as scraped, not renumbered.
pub fn questions<'a>(doc: &'a Html, layout: Layout) -> impl Iterator<Item = ScrapedQuestion> + 'a {
    doc.select(&layout.question_selectors().table)
        .filter_map(move |table| parse_question_block(table, layout))
}

fn parse_question_block(table: ElementRef<'_>, layout: Layout) -> Option<ScrapedQuestion> {
    let sels = layout.question_selectors();

    let label = table
        .select(&sels.number)
        .next()
        .map(|el| text_of(&el))
        .unwrap_or_default();
    let number = parse_leading_int(&label)?;

    let example_text = table
        .select(&EXAMPLE_TEXT)
        .next()
        .map(|el| text_of(&el))
        .filter(|text| !text.is_empty());

    // The question row's text still contains the number label; strip its
    // first occurrence only, in case the label text recurs in the body.
    let cells: Vec<ElementRef> = table.select(&sels.question_row).collect();
    let full_text = cells
        .iter()
        .flat_map(|cell| cell.text())
        .collect::<String>()
        .trim()
        .to_string();
    let text = full_text.replacen(&label, "", 1).trim().to_string();
    let image_url = cells
        .iter()
        .flat_map(|cell| cell.select(&IMG))
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);

    let mut choices = Vec::new();
    for row in table.select(&sels.choice_row) {
        let value = row
            .select(&RADIO)
            .next()
            .and_then(|input| input.value().attr("value"))
            .and_then(parse_leading_int)
            .unwrap_or(0);
        // 5 is the site's "don't know" option, 0 a broken control.
        if value == 0 || value == 5 {
            continue;
        }
        let label_el = row.select(&LABEL).next();
        choices.push(Choice {
            number: value as u8,
            text: label_el.map(|el| text_of(&el)).unwrap_or_default(),
            image_url: label_el
                .and_then(|el| el.select(&IMG).next())
                .and_then(|img| img.value().attr("src"))
                .map(str::to_string),
        });
    }

    Some(ScrapedQuestion {
        number,
        text,
        example_text,
        image_url,
        choices,
    })
}

// ── Tests ──
