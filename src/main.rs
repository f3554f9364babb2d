//! Command line front end for the diary analysis service.

use anyhow::Context;
use cbt_diary_lib::config::AnalysisConfig;
use cbt_diary_lib::{logging, DiaryAnalysisService};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

/// CBT diary: emotion analysis of journal entries.
#[derive(Parser)]
#[command(name = "cbt-diary", version, about)]
struct Cli {
    /// User the command acts for.
    #[arg(short, long)]
    user: i64,

    /// Database file (overrides DATABASE_PATH).
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store a diary entry and analyze it. Reads stdin when no text is given.
    Write { text: Option<String> },

    /// Analyze one diary.
    Analyze { diary_id: i64 },

    /// Analyze several diaries.
    Batch {
        #[arg(required = true)]
        diary_ids: Vec<i64>,
    },

    /// Show the stored analysis of a diary.
    Show { diary_id: i64 },

    /// Daily emotion trend.
    Trend {
        #[arg(long, default_value_t = 30)]
        days: u32,
    },

    /// Improvement statistics over recent confident analyses.
    Improvement,

    /// Paginated analysis history.
    History {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Diary and analysis counts.
    Overview,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AnalysisConfig::from_env()?;
    if let Some(path) = cli.database {
        config = config.with_database_path(path);
    }

    if let Err(e) = logging::init_logging(&config.log_dir) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let service = DiaryAnalysisService::open(&config)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let user = cli.user;

    match cli.command {
        Command::Write { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let diary = service.write_diary(user, text.trim())?;
            print_json(&service.analyze_diary(user, diary.id).await?)
        }
        Command::Analyze { diary_id } => print_json(&service.analyze_diary(user, diary_id).await?),
        Command::Batch { diary_ids } => print_json(&service.batch_analyze(user, &diary_ids).await?),
        Command::Show { diary_id } => print_json(&service.get_analysis(user, diary_id)?),
        Command::Trend { days } => print_json(&service.emotion_trend(user, days)?),
        Command::Improvement => print_json(&service.improvement_stats(user)?),
        Command::History { page, limit } => print_json(&service.analysis_history(user, page, limit)?),
        Command::Overview => print_json(&service.analysis_overview(user)?),
    }
}
