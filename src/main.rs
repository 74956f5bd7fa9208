mod crawler;
mod db;
mod error;
mod fetch;
mod parser;
mod service;

use std::time::Instant;

use clap::{Parser, Subcommand};

use service::{Mode, SubmittedAnswer};

#[derive(Parser)]
#[command(name = "exam_scraper", about = "Archived exam paper crawler and CBT store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a single exam page and store it
    Crawl {
        url: String,
        /// Replace an already-stored exam instead of reporting a conflict
        #[arg(short, long)]
        retry: bool,
    },
    /// Crawl every exam linked from the subject index page
    CrawlAll {
        main_url: String,
        #[arg(short, long)]
        retry: bool,
        /// Only crawl subjects with these exact names
        #[arg(short, long = "subject")]
        subjects: Vec<String>,
        /// Pause between exam page fetches (politeness toward the source)
        #[arg(long, default_value = "1000")]
        delay_ms: u64,
    },
    /// List a stored exam's questions
    Questions {
        exam_id: i64,
        /// study includes correct answers, test hides them
        #[arg(short, long, default_value = "test")]
        mode: String,
        #[arg(short, long)]
        page: Option<u32>,
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Grade submitted answers, given as QUESTION_ID:CHOICE pairs
    Submit {
        exam_id: i64,
        #[arg(required = true)]
        answers: Vec<String>,
    },
    /// Show store statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Crawl { url, retry } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let client = fetch::build_client();
            let report = crawler::crawl_exam(&client, &conn, &url, retry).await?;

            println!(
                "{} exam {} ({})",
                if report.updated { "Updated" } else { "Saved" },
                report.exam_id,
                report.title
            );
            println!(
                "Questions: {} saved of {} scraped",
                report.saved_question_count, report.total_scraped
            );
            if !report.skipped_question_numbers.is_empty() {
                println!(
                    "Skipped (no answer): {:?}; answer table numbering may be off, check manually",
                    report.skipped_question_numbers
                );
            }
            Ok(())
        }
        Commands::CrawlAll {
            main_url,
            retry,
            subjects,
            delay_ms,
        } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let client = fetch::build_client();
            let opts = crawler::CrawlAllOptions {
                force_retry: retry,
                subject_filter: subjects,
                delay_ms,
            };
            let report = crawler::crawl_all(&client, &conn, &main_url, &opts).await?;

            println!(
                "Done: {} exams saved, {} failures.",
                report.success_count, report.fail_count
            );
            for entry in &report.error_logs {
                println!(
                    "  [{}] {}: {}",
                    entry.error_type,
                    entry.subject_name.as_deref().unwrap_or(&entry.url),
                    entry.error_message
                );
            }
            Ok(())
        }
        Commands::Questions {
            exam_id,
            mode,
            page,
            limit,
        } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let mode: Mode = mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let set = service::find_questions(&conn, exam_id, mode, page, limit)?;

            println!(
                "{} | {} {} ({} questions)",
                set.exam.subject, set.exam.year, set.exam.exam_type, set.exam.total_questions
            );
            for question in &set.questions {
                println!(
                    "\n{:>3}. {} [id {}]",
                    question.question_number,
                    truncate(&question.question_text, 70),
                    question.id
                );
                if let Some(example) = &question.example_text {
                    println!("     [{}]", truncate(example, 66));
                }
                for choice in &question.choices {
                    println!("     {}) {}", choice.number, truncate(&choice.text, 64));
                }
                if let Some(answers) = &question.correct_answers {
                    println!("     = {:?}", answers);
                }
            }
            if let Some(p) = &set.pagination {
                println!(
                    "\nPage {}/{} ({} questions total)",
                    p.page, p.total_pages, p.total
                );
            }
            Ok(())
        }
        Commands::Submit { exam_id, answers } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let answers = answers
                .iter()
                .map(|pair| parse_answer_pair(pair))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let report = service::submit_exam(&conn, exam_id, &answers)?;

            println!(
                "Score: {} ({}/{} correct)",
                report.score, report.correct_count, report.total
            );
            for result in &report.results {
                println!(
                    "  question {}: {} (accepted {:?})",
                    result.question_id,
                    if result.is_correct { "correct" } else { "wrong" },
                    result.correct_answers
                );
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let stats = db::get_stats(&conn)?;
            println!("Subjects:  {}", stats.subjects);
            println!("Exams:     {}", stats.exams);
            println!("Questions: {}", stats.questions);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Parse a "QUESTION_ID:CHOICE" CLI argument.
fn parse_answer_pair(pair: &str) -> anyhow::Result<SubmittedAnswer> {
    let (id, choice) = pair
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("expected QUESTION_ID:CHOICE, got {:?}", pair))?;
    Ok(SubmittedAnswer {
        question_id: id.trim().parse()?,
        selected_answer: Some(choice.trim().parse()?),
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
