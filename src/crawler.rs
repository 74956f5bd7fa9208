use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use rusqlite::Connection;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::db::{self, ExamInput, SaveReport};
use crate::error::CrawlError;
use crate::fetch;
use crate::parser;

const LOG_DIR: &str = "logs/crawl";

static SUBJECT_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#allaGmObjectList li a").unwrap());
static EXAM_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article#content div.inner div.post-item a").unwrap());

/// Hangul index separators on the subject list page, not real subjects.
const INDEX_SEPARATORS: &[&str] = &[
    "가", "나", "다", "라", "마", "바", "사", "아", "자", "차", "카", "타", "파", "하", "기타",
];

/// One failure (or partial success) recorded for offline retry tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlErrorLog {
    pub timestamp: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_name: Option<String>,
    pub error_type: String,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_questions: Option<Vec<u32>>,
}

impl CrawlErrorLog {
    fn from_error(url: &str, subject_name: Option<&str>, error_type: &str, err: &CrawlError) -> Self {
        CrawlErrorLog {
            timestamp: Utc::now().to_rfc3339(),
            url: url.to_string(),
            subject_name: subject_name.map(str::to_string),
            error_type: error_type.to_string(),
            error_message: err.to_string(),
            stack_trace: Some(format!("{:?}", err)),
            skipped_questions: None,
        }
    }

    fn skipped(url: &str, subject_name: Option<&str>, numbers: &[u32]) -> Self {
        CrawlErrorLog {
            timestamp: Utc::now().to_rfc3339(),
            url: url.to_string(),
            subject_name: subject_name.map(str::to_string),
            error_type: "missing_answer".to_string(),
            error_message: format!("{} questions without answers skipped", numbers.len()),
            stack_trace: None,
            skipped_questions: Some(numbers.to_vec()),
        }
    }
}

// ── Single exam ──

/// Fetch, parse and persist one exam page. Errors propagate to the caller;
/// only `crawl_all` converts them into log entries.
pub async fn crawl_exam(
    client: &Client,
    conn: &Connection,
    url: &str,
    force_retry: bool,
) -> Result<SaveReport, CrawlError> {
    info!("fetching {}", url);
    let html = fetch::fetch_html(client, url).await?;
    let parsed = parser::parse_exam_page(&html)?;
    if parsed.question_count_hint > 0 && parsed.question_count_hint as usize != parsed.questions.len()
    {
        warn!(
            "page advertises {} questions, scraped {}",
            parsed.question_count_hint,
            parsed.questions.len()
        );
    }

    let input = ExamInput {
        subject_name: &parsed.subject_name,
        year: parsed.year,
        exam_type: parsed.exam_type,
        title: &parsed.subject_name,
        questions: &parsed.questions,
        answers: &parsed.answers,
    };
    let report = db::save_exam(conn, &input, force_retry)?;
    if !report.skipped_question_numbers.is_empty() {
        warn!(
            "exam {}: skipped unanswered questions {:?}",
            report.exam_id, report.skipped_question_numbers
        );
    }
    Ok(report)
}

// ── Link harvesting ──

#[derive(Debug, Clone)]
pub struct SubjectLink {
    pub name: String,
    pub url: String,
}

/// Subject links off the main index page, index separators excluded.
pub fn subject_links(html: &str) -> Vec<SubjectLink> {
    let doc = Html::parse_document(html);
    doc.select(&SUBJECT_LINKS)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let name = parser::text_of(&a);
            if INDEX_SEPARATORS.contains(&name.as_str()) {
                return None;
            }
            Some(SubjectLink {
                name,
                url: href.to_string(),
            })
        })
        .collect()
}

/// Exam page links off a subject page, relative hrefs resolved against the
/// page's origin.
pub fn exam_links(html: &str, page_url: &str) -> Vec<String> {
    let origin = reqwest::Url::parse(page_url)
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_default();
    let doc = Html::parse_document(html);
    doc.select(&EXAM_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| {
            if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{}{}", origin, href)
            }
        })
        .collect()
}

// ── Batch ──

pub struct CrawlAllOptions {
    pub force_retry: bool,
    pub subject_filter: Vec<String>,
    pub delay_ms: u64,
}

pub struct BatchReport {
    pub success_count: usize,
    pub fail_count: usize,
    pub error_logs: Vec<CrawlErrorLog>,
    pub failed_urls: Vec<String>,
}

/// Crawl every exam linked from the subject index, one URL at a time.
///
/// Strictly sequential with a sleep between exam fetches: politeness toward
/// the origin site over throughput. Failures at the subject or exam level
/// are recorded and never unwind the batch.
pub async fn crawl_all(
    client: &Client,
    conn: &Connection,
    main_url: &str,
    opts: &CrawlAllOptions,
) -> Result<BatchReport, CrawlError> {
    info!("collecting subject list from {}", main_url);
    let html = fetch::fetch_html(client, main_url).await?;
    let mut subjects = subject_links(&html);
    info!("{} subjects found", subjects.len());

    if !opts.subject_filter.is_empty() {
        subjects.retain(|s| opts.subject_filter.iter().any(|f| f == &s.name));
        info!("subject filter kept {} subjects", subjects.len());
    }

    let delay = Duration::from_millis(opts.delay_ms);
    let mut report = BatchReport {
        success_count: 0,
        fail_count: 0,
        error_logs: Vec::new(),
        failed_urls: Vec::new(),
    };

    for (i, subject) in subjects.iter().enumerate() {
        info!("[{}/{}] subject {}", i + 1, subjects.len(), subject.name);

        let links = match fetch::fetch_html(client, &subject.url).await {
            Ok(page) => exam_links(&page, &subject.url),
            Err(err) => {
                error!("subject page failed: {}", err);
                report.fail_count += 1;
                report.error_logs.push(CrawlErrorLog::from_error(
                    &subject.url,
                    Some(&subject.name),
                    "subject",
                    &err,
                ));
                report.failed_urls.push(subject.url.clone());
                continue;
            }
        };
        info!("  {} exam pages", links.len());

        let pb = ProgressBar::new(links.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap()
                .progress_chars("=> "),
        );

        for (j, link) in links.iter().enumerate() {
            match crawl_exam(client, conn, link, opts.force_retry).await {
                Ok(saved) => {
                    report.success_count += 1;
                    if !saved.skipped_question_numbers.is_empty() {
                        report.error_logs.push(CrawlErrorLog::skipped(
                            link,
                            Some(&subject.name),
                            &saved.skipped_question_numbers,
                        ));
                        report.failed_urls.push(link.clone());
                    }
                }
                Err(err) => {
                    warn!("  failed: {}", err);
                    report.fail_count += 1;
                    report.error_logs.push(CrawlErrorLog::from_error(
                        link,
                        Some(&subject.name),
                        err.category(),
                        &err,
                    ));
                    report.failed_urls.push(link.clone());
                }
            }
            pb.inc(1);

            if j + 1 < links.len() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        pb.finish_and_clear();
    }

    info!(
        "batch done: {} ok, {} failed",
        report.success_count, report.fail_count
    );
    if !report.error_logs.is_empty() {
        let log_file = append_error_logs(&report.error_logs)?;
        info!("error log: {}", log_file.display());
    }
    if !report.failed_urls.is_empty() {
        let url_file = write_failed_urls(&report.failed_urls)?;
        info!("failed URLs for retry: {}", url_file.display());
    }

    Ok(report)
}

// ── Log artifacts ──

/// Append entries to today's (UTC) error log, creating it if needed. An
/// unreadable existing file is replaced rather than appended to.
fn append_error_logs(entries: &[CrawlErrorLog]) -> Result<PathBuf, CrawlError> {
    std::fs::create_dir_all(LOG_DIR)?;
    let path = PathBuf::from(LOG_DIR).join(format!(
        "crawl-errors-{}.json",
        Utc::now().format("%Y-%m-%d")
    ));

    let mut logs: Vec<CrawlErrorLog> = match std::fs::read_to_string(&path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|_| {
            warn!("existing log file unreadable, starting fresh");
            Vec::new()
        }),
        Err(_) => Vec::new(),
    };
    logs.extend(entries.iter().cloned());

    std::fs::write(&path, serde_json::to_string_pretty(&logs)?)?;
    Ok(path)
}

/// Newline-delimited failed-URL list, one file per batch run.
fn write_failed_urls(urls: &[String]) -> Result<PathBuf, CrawlError> {
    std::fs::create_dir_all(LOG_DIR)?;
    let now = Utc::now();
    let path = PathBuf::from(LOG_DIR).join(format!(
        "failed-urls-{}-{}.txt",
        now.format("%Y-%m-%d"),
        now.format("%H-%M-%S")
    ));
    std::fs::write(&path, urls.join("\n"))?;
    Ok(path)
}

// ── Tests ──
