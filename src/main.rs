mod accounts;
mod attendance;
mod catalog;
mod config;
mod db;
mod enrollment;
mod error;
mod export;
mod ipc;
mod logging;
mod model;
mod offerings;
mod reports;
mod workbook;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rusqlite::Connection;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::attendance::StatusMode;
use crate::config::SchoolConfig;

#[derive(Parser)]
#[command(name = "schoold")]
#[command(about = "School attendance and accounts sidecar")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-line requests on stdin (the default)
    Serve,
    /// Backfill attendance for every offering over a date range
    PopulateAttendance {
        #[arg(long)]
        workspace: PathBuf,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        start_date: String,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        end_date: String,
        /// present, absent, late or random
        #[arg(long, default_value = "random")]
        status: String,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Spread teachers over subject offerings
    AssignTeachers {
        #[arg(long)]
        workspace: PathBuf,
        #[arg(long)]
        school_year: Option<String>,
        /// Leave offerings that already have a teacher alone
        #[arg(long)]
        unassigned_only: bool,
    },
    /// Create one offering per subject, year level and section
    CreateOfferings {
        #[arg(long)]
        workspace: PathBuf,
        #[arg(long)]
        school_year: Option<String>,
    },
    /// Write every account with its initial password to an .xlsx workbook
    ExportAccounts {
        #[arg(long)]
        workspace: PathBuf,
        #[arg(long, default_value = export::DEFAULT_EXPORT_FILE)]
        out: PathBuf,
    },
}

fn open_workspace(workspace: &Path) -> anyhow::Result<(Connection, SchoolConfig)> {
    let conn = db::open_db(workspace)
        .with_context(|| format!("failed to open workspace {}", workspace.display()))?;
    let cfg = SchoolConfig::load(workspace)?;
    Ok((conn, cfg))
}

fn serve() {
    let mut state = ipc::AppState::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "schoold ready");

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to reply to.
                tracing::warn!(error = %e, "unparseable request");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() },
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}

fn populate_attendance(
    workspace: &Path,
    start_date: &str,
    end_date: &str,
    status: &str,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    let (conn, cfg) = open_workspace(workspace)?;
    let start = model::parse_date("start-date", start_date)?;
    let end = model::parse_date("end-date", end_date)?;
    let mode = StatusMode::parse(status)
        .with_context(|| format!("unknown status {:?}; use present, absent, late or random", status))?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let summary = attendance::populate(&conn, &cfg, start, end, mode, &mut rng)?;
    println!(
        "Populated attendance for {} students across {} offerings over {} days: {} created, {} updated.",
        summary.students, summary.offerings, summary.days, summary.created, summary.updated
    );
    Ok(())
}

fn assign_teachers(workspace: &Path, school_year: Option<&str>, unassigned_only: bool) -> anyhow::Result<()> {
    let (conn, _) = open_workspace(workspace)?;
    let summary = offerings::auto_assign(&conn, school_year, unassigned_only)?;
    for line in &summary.lines {
        println!("{}", line);
    }
    println!(
        "Assigned {} offerings, reassigned {}.",
        summary.newly_assigned, summary.updated
    );
    Ok(())
}

fn create_offerings(workspace: &Path, school_year: Option<&str>) -> anyhow::Result<()> {
    let (conn, cfg) = open_workspace(workspace)?;
    let school_year = school_year.unwrap_or(&cfg.default_school_year).to_string();
    let summary = offerings::generate(&conn, &cfg, &school_year)?;
    for line in &summary.lines {
        println!("{}", line);
    }
    println!(
        "Created {} offerings, assigned {} existing, skipped {}; {} subjects have no course; {} enrollments added.",
        summary.created,
        summary.assigned_existing,
        summary.skipped,
        summary.subjects_without_course,
        summary.enrolled
    );
    Ok(())
}

fn export_accounts(workspace: &Path, out: &Path) -> anyhow::Result<()> {
    let (conn, _) = open_workspace(workspace)?;
    let out = if out.is_relative() {
        workspace.join(out)
    } else {
        out.to_path_buf()
    };
    let summary = export::export_accounts(&conn, &out)?;
    println!(
        "Exported {} students, {} parents and {} teachers to {} ({} sheets).",
        summary.students,
        summary.parents,
        summary.teachers,
        summary.path,
        summary.sheets.len()
    );
    Ok(())
}

fn main() {
    logging::init_logging();
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            serve();
            Ok(())
        }
        Commands::PopulateAttendance {
            workspace,
            start_date,
            end_date,
            status,
            seed,
        } => populate_attendance(&workspace, &start_date, &end_date, &status, seed),
        Commands::AssignTeachers {
            workspace,
            school_year,
            unassigned_only,
        } => assign_teachers(&workspace, school_year.as_deref(), unassigned_only),
        Commands::CreateOfferings {
            workspace,
            school_year,
        } => create_offerings(&workspace, school_year.as_deref()),
        Commands::ExportAccounts { workspace, out } => export_accounts(&workspace, &out),
    };

    if let Err(e) = result {
        tracing::error!(error = ?e, "command failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
