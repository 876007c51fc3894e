use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod config;
mod courses;
mod db;
mod error;
mod models;
mod progression;
mod report;

use config::PolicyConfig;
use models::{CourseStatus, MemberProgress, MemberRecord, MemberSnapshot};

#[derive(Parser)]
#[command(name = "clan-ranks")]
#[command(about = "Rank progression and course tracking for clan members", long_about = None)]
struct Cli {
    /// Policy file with the rank table and course alert settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample members and attendance
    Seed,
    /// Upsert members from a CSV file
    ImportMembers {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import attendance events from a CSV file
    ImportAttendance {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show rank progress for the roster or a single member
    Progress {
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// List members whose attendance qualifies them for the next rank
    Promotions {
        #[arg(long)]
        json: bool,
    },
    /// List outstanding course alerts
    Alerts {
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value_t = 56)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Evaluate a single member snapshot without touching the database
    Evaluate {
        #[arg(long)]
        rank: String,
        #[arg(long, allow_hyphen_values = true)]
        attendances: i64,
        #[arg(long, value_enum, default_value_t = CourseStatus::Unset)]
        esa: CourseStatus,
        #[arg(long, value_enum, default_value_t = CourseStatus::Unset)]
        cfo: CourseStatus,
        #[arg(long)]
        merit: bool,
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    // CLAN_LOG_FORMAT=json switches to machine-readable logs.
    let log_format = std::env::var("CLAN_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "clan_rank_progression=info,sqlx=warn".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to the clan Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_progress_line(entry: &MemberProgress) {
    let marker = if entry.promotion_suggested { " [promote]" } else { "" };
    println!(
        "- {} ({}, {}) {}{}",
        entry.member.nickname,
        entry.member.email,
        entry.progress.current_rank,
        report::describe_progress(entry),
        marker
    );
    if let Some(alert) = &entry.course_alert {
        println!("    ! {}", alert.message);
    }
}

async fn load_roster(
    pool: &PgPool,
    policy: &PolicyConfig,
    email: Option<&str>,
) -> anyhow::Result<Vec<MemberProgress>> {
    let members = db::fetch_members(pool, email).await?;
    info!(members = members.len(), "loaded member snapshots");
    Ok(progression::evaluate_roster(members, policy))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let policy = PolicyConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::ImportMembers { csv } => {
            let pool = connect().await?;
            let upserted = db::import_members(&pool, &csv).await?;
            println!("Upserted {upserted} members from {}.", csv.display());
        }
        Commands::ImportAttendance { csv } => {
            let pool = connect().await?;
            let inserted = db::import_attendance(&pool, &csv).await?;
            println!("Inserted {inserted} attendances from {}.", csv.display());
        }
        Commands::Progress { email, limit, json } => {
            let pool = connect().await?;
            let roster = load_roster(&pool, &policy, email.as_deref()).await?;

            if json {
                let shown: Vec<&MemberProgress> = roster.iter().take(limit).collect();
                return print_json(&shown);
            }
            if roster.is_empty() {
                println!("No members found.");
                return Ok(());
            }

            println!("Rank progress:");
            for entry in roster.iter().take(limit) {
                print_progress_line(entry);
            }
        }
        Commands::Promotions { json } => {
            let pool = connect().await?;
            let roster = load_roster(&pool, &policy, None).await?;
            let candidates: Vec<&MemberProgress> = roster
                .iter()
                .filter(|entry| entry.promotion_suggested)
                .collect();

            if json {
                return print_json(&candidates);
            }
            if candidates.is_empty() {
                println!("No members have reached their next threshold.");
                return Ok(());
            }

            println!("Promotion candidates:");
            for entry in candidates {
                print_progress_line(entry);
            }
        }
        Commands::Alerts { json } => {
            let pool = connect().await?;
            let roster = load_roster(&pool, &policy, None).await?;
            let alerted: Vec<&MemberProgress> = roster
                .iter()
                .filter(|entry| entry.course_alert.is_some())
                .collect();

            if json {
                return print_json(&alerted);
            }
            if alerted.is_empty() {
                println!("No outstanding course alerts.");
                return Ok(());
            }

            println!("Course alerts:");
            for entry in alerted {
                if let Some(alert) = &entry.course_alert {
                    println!("- {} ({}): {}", entry.member.nickname, entry.member.email, alert.message);
                }
            }
        }
        Commands::Report {
            email,
            since_days,
            out,
        } => {
            let pool = connect().await?;
            let since_date = chrono::Utc::now().date_naive() - chrono::Duration::days(since_days.max(1));
            let members = db::fetch_members(&pool, email.as_deref()).await?;
            let trends = db::fetch_weekly_attendance(&pool, since_date, email.as_deref()).await?;
            let report = report::build_report(email.as_deref(), since_date, &members, &trends, &policy);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Evaluate {
            rank,
            attendances,
            esa,
            cfo,
            merit,
            json,
        } => {
            let member = MemberRecord {
                id: Uuid::nil(),
                nickname: "member".to_string(),
                email: String::new(),
                snapshot: MemberSnapshot {
                    rank,
                    total_attendances: attendances,
                    esa_course: esa,
                    cfo_course: cfo,
                    merit_promotion: merit,
                },
            };
            let entry = progression::evaluate_member(member, &policy);

            if json {
                return print_json(&entry);
            }
            println!("Current rank: {}", entry.progress.current_rank);
            println!("Next rank: {}", entry.progress.next_rank);
            println!("Progress: {}", report::describe_progress(&entry));
            println!(
                "Promotion suggested: {}",
                if entry.promotion_suggested { "yes" } else { "no" }
            );
            match &entry.course_alert {
                Some(alert) => println!("Course alert: {}", alert.message),
                None => println!("Course alert: none"),
            }
        }
    }

    Ok(())
}
