use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod db;
mod error;
mod exchange;
mod ids;
mod models;
mod period;
mod progress;
mod report;
mod sync;
mod tracker;

use config::AppConfig;
use ids::UuidGenerator;
use models::{Grade, SessionDraft, StudentDraft, Subject, SubjectMinutes};
use period::MonthKey;
use progress::PeriodFilter;
use sync::Envelope;
use tracker::Tracker;

#[derive(Parser)]
#[command(name = "iep-minutes")]
#[command(about = "IEP service-minute tracker for special education teams", long_about = None)]
struct Cli {
    /// SQLite database holding students, logs and settings
    #[arg(long, global = true, env = "IEP_DATABASE_URL", default_value = config::DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Seconds before a sync request is abandoned
    #[arg(long, global = true, env = "IEP_SYNC_TIMEOUT", default_value_t = 30)]
    sync_timeout: u64,

    /// Body shape used when pushing logs to the sync endpoint
    #[arg(long, global = true, value_enum, default_value_t = Envelope::Bare)]
    envelope: Envelope,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct PeriodArgs {
    /// Month to view, e.g. "January 2025" or 2025-01 (defaults to the current month)
    #[arg(long)]
    month: Option<MonthKey>,
    /// Narrow to the week containing this date (YYYY-MM-DD)
    #[arg(long)]
    week: Option<NaiveDate>,
}

impl PeriodArgs {
    fn resolve(self, today: NaiveDate) -> PeriodFilter {
        let month = self
            .month
            .or_else(|| self.week.map(MonthKey::of))
            .unwrap_or_else(|| MonthKey::of(today));
        match self.week {
            Some(week) => PeriodFilter::week(month, week),
            None => PeriodFilter::month(month),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the demo roster
    Seed,
    /// Add a student with weekly goals in minutes
    AddStudent {
        #[arg(long)]
        name: String,
        #[arg(long, value_enum)]
        grade: Grade,
        #[arg(long, default_value_t = 30)]
        math: u64,
        #[arg(long, default_value_t = 30)]
        english: u64,
        #[arg(long, default_value_t = 0)]
        task_completion: u64,
    },
    /// Change a student's name, grade or goals
    EditStudent {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_enum)]
        grade: Option<Grade>,
        #[arg(long)]
        math: Option<u64>,
        #[arg(long)]
        english: Option<u64>,
        #[arg(long)]
        task_completion: Option<u64>,
    },
    /// List students
    Students {
        #[arg(long, value_enum)]
        grade: Option<Grade>,
    },
    /// Log a service session for one or more students
    Log {
        /// Student id; repeat or comma-separate for a group session
        #[arg(long = "student", value_delimiter = ',')]
        students: Vec<String>,
        #[arg(long, value_enum)]
        subject: Option<Subject>,
        #[arg(long, default_value = "50")]
        minutes: String,
        /// Session date (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Staff name (defaults to the last one used)
        #[arg(long)]
        staff: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Goal progress per student for a month or week
    Dashboard {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long, value_enum)]
        grade: Option<Grade>,
        #[arg(long, value_enum)]
        subject: Option<Subject>,
        /// Include each student's session notes under every subject
        #[arg(long)]
        notes: bool,
        /// Write the markdown report here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List logs for a month or week
    History {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Months that have logs
    Months,
    /// Weeks available in a month
    Weeks {
        #[arg(long)]
        month: Option<MonthKey>,
    },
    /// Export the logs of a period as CSV
    ExportCsv {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Export students and logs as a team setup file
    ExportBackup {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace local students and logs with a team setup file
    ImportBackup {
        file: PathBuf,
        #[arg(long)]
        yes: bool,
    },
    /// Set the spreadsheet sync endpoint (empty string disables sync)
    SetSyncUrl { url: String },
    /// Replace local logs with the sync endpoint's copy
    Pull {
        #[arg(long)]
        yes: bool,
    },
    /// Clear all students and logs
    Reset {
        #[arg(long)]
        yes: bool,
    },
}

fn confirm_flag(yes: bool, action: &str) -> bool {
    if !yes {
        println!("{action} overwrites local data. Re-run with --yes to proceed.");
    }
    yes
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig {
        database_url: cli.database_url,
        sync_timeout: Duration::from_secs(cli.sync_timeout.max(1)),
        envelope: cli.envelope,
        verbose: cli.verbose,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let pool = db::connect(&config.database_url)
        .await
        .context("failed to open the local database")?;
    db::init_db(&pool).await?;

    let mut tracker = Tracker::open(pool, config.sync_client()?, UuidGenerator).await?;
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            println!("Schema ready.");
        }
        Commands::Seed => {
            let added = tracker.seed().await?;
            println!("Added {added} demo students.");
        }
        Commands::AddStudent {
            name,
            grade,
            math,
            english,
            task_completion,
        } => {
            let student = tracker
                .add_student(StudentDraft {
                    name,
                    grade,
                    subject_goals: SubjectMinutes {
                        math,
                        english,
                        task_completion,
                    },
                })
                .await?;
            println!("Added {} ({} grade) as {}.", student.name, student.grade, student.id);
        }
        Commands::EditStudent {
            id,
            name,
            grade,
            math,
            english,
            task_completion,
        } => {
            let current = tracker
                .student(&id)
                .cloned()
                .ok_or_else(|| error::ValidationError::UnknownStudent(id.clone()))?;
            let goals = current.subject_goals;
            let student = tracker
                .update_student(
                    &id,
                    StudentDraft {
                        name: name.unwrap_or(current.name),
                        grade: grade.unwrap_or(current.grade),
                        subject_goals: SubjectMinutes {
                            math: math.unwrap_or(goals.math),
                            english: english.unwrap_or(goals.english),
                            task_completion: task_completion.unwrap_or(goals.task_completion),
                        },
                    },
                )
                .await?;
            println!("Updated {}.", student.name);
        }
        Commands::Students { grade } => {
            let grades = grade.map_or(Grade::ALL.to_vec(), |g| vec![g]);
            for grade in grades {
                for student in tracker.students_in_grade(grade) {
                    let goals = student.subject_goals;
                    println!(
                        "{}  {:<24} {}  Math {}m/wk, English {}m/wk, Task Completion {}m/wk",
                        student.id, student.name, student.grade, goals.math, goals.english, goals.task_completion
                    );
                }
            }
        }
        Commands::Log {
            students,
            subject,
            minutes,
            date,
            staff,
            notes,
        } => {
            let staff_name = staff.unwrap_or_else(|| tracker.staff_name().to_string());
            let created = tracker
                .record_session(
                    SessionDraft {
                        student_ids: students,
                        subject,
                        minutes: tracker::coerce_minutes(&minutes),
                        date: date.unwrap_or(today),
                        staff_name,
                        notes,
                    },
                    Utc::now().timestamp_millis(),
                )
                .await?;
            println!("Logged {} session(s).", created.len());
        }
        Commands::Dashboard {
            period,
            grade,
            subject,
            notes,
            out,
        } => {
            let filter = period.resolve(today);
            let dashboard = report::build_dashboard(
                tracker.students(),
                tracker.logs(),
                &filter,
                grade,
                subject,
                notes,
            );
            match out {
                Some(out) => {
                    std::fs::write(&out, dashboard)?;
                    println!("Report written to {}.", out.display());
                }
                None => print!("{dashboard}"),
            }
        }
        Commands::History { period } => {
            let filter = period.resolve(today);
            let logs = progress::filter_logs(tracker.logs(), &filter);
            println!("Logs for {}:", filter.label());
            print!("{}", report::format_history(&logs, tracker.students()));
        }
        Commands::Months => {
            let months = period::months_available(today, tracker.logs().iter().map(|l| l.date));
            print!("{}", report::format_months(&months, MonthKey::of(today)));
        }
        Commands::Weeks { month } => {
            let month = month.unwrap_or_else(|| MonthKey::of(today));
            println!("Weeks in {month}:");
            for week in period::weeks_in_month(month, tracker.logs().iter().map(|l| l.date)) {
                println!("- {} to {} ({})", week.start, week.end, week.label);
            }
        }
        Commands::ExportCsv { period, out } => {
            let filter = period.resolve(today);
            let out = out.unwrap_or_else(|| PathBuf::from(exchange::csv_file_name(filter.month)));
            let logs = progress::filter_logs(tracker.logs(), &filter);
            let rows = exchange::export_csv(&out, logs, tracker.students())?;
            println!("Exported {rows} logs to {}.", out.display());
        }
        Commands::ExportBackup { out } => {
            let out = out.unwrap_or_else(|| PathBuf::from(exchange::backup_file_name(today)));
            let backup = exchange::Backup::new(
                tracker.students(),
                tracker.logs(),
                Utc::now().timestamp_millis(),
            );
            exchange::write_backup(&out, &backup)?;
            println!("Team setup written to {}.", out.display());
        }
        Commands::ImportBackup { file, yes } => {
            let backup = exchange::read_backup(&file)?;
            if confirm_flag(yes, "Importing a setup file") {
                let (students, logs) = (backup.students.len(), backup.logs.len());
                tracker.replace_all(backup.students, backup.logs).await?;
                println!("Imported {students} students and {logs} logs.");
            }
        }
        Commands::SetSyncUrl { url } => {
            tracker.set_sync_url(&url).await?;
            if tracker.sync_url().is_empty() {
                println!("Sync disabled.");
            } else {
                println!("New logs will be pushed to {}.", tracker.sync_url());
            }
        }
        Commands::Pull { yes } => {
            if confirm_flag(yes, "Pulling from the sync endpoint") {
                match tracker.pull().await? {
                    Some(count) => println!("Replaced local logs with {count} remote logs."),
                    None => println!("Sync endpoint unavailable; local logs kept."),
                }
            }
        }
        Commands::Reset { yes } => {
            if confirm_flag(yes, "Reset") {
                tracker.reset().await?;
                println!("All students and logs cleared.");
            }
        }
    }

    Ok(())
}
