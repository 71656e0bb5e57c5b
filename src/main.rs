use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskcal::application::bootstrap::default_workspace_root;
use taskcal::application::commands::{
    add_task_impl, auth_login_impl, auth_logout_impl, auth_status_impl, remove_task_impl,
    rename_task_impl, run_daemon_impl, set_status_impl, show_month_impl, toggle_status_impl,
    AppState, AuthStatus, CommandError,
};
use taskcal::domain::calendar_grid::{MAX_YEAR, MIN_YEAR};
use taskcal::domain::models::{IntervalUnit, RecurrenceRequest, TaskStatus};
use taskcal::infrastructure::logging::init_logging;

#[derive(Parser)]
#[command(name = "taskcal", version, about = "Month calendar backed by Google Tasks")]
struct Cli {
    /// Workspace root holding config/, state/ and logs/
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the calendar in sync until interrupted
    Run,
    /// Sync and print one month
    Show {
        #[arg(
            long,
            value_parser = clap::value_parser!(i32).range(i64::from(MIN_YEAR)..=i64::from(MAX_YEAR))
        )]
        year: Option<i32>,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
    },
    /// Create a task, optionally repeating
    Add {
        title: String,
        #[arg(long, value_parser = parse_date)]
        date: NaiveDate,
        #[arg(long, default_value = "")]
        notes: String,
        /// Gap between occurrences, in units
        #[arg(long, default_value_t = 1)]
        every: u32,
        #[arg(long, value_parser = parse_unit, default_value = "day")]
        unit: IntervalUnit,
        /// Number of occurrences
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Mark a task completed
    Complete { task_id: String },
    /// Mark a task as needing action
    Reopen { task_id: String },
    /// Flip a task between completed and needs-action
    Toggle { task_id: String },
    /// Change a task's title and notes
    Rename {
        task_id: String,
        title: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Delete a task
    Remove { task_id: String },
    /// Google account authorization
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Run the browser consent flow now
    Login,
    /// Forget the stored credential
    Logout,
    /// Show the stored credential without contacting Google
    Status,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Show { .. } => "show",
            Self::Add { .. } => "add",
            Self::Complete { .. } => "complete",
            Self::Reopen { .. } => "reopen",
            Self::Toggle { .. } => "toggle",
            Self::Rename { .. } => "rename",
            Self::Remove { .. } => "remove",
            Self::Auth { .. } => "auth",
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|error| format!("expected YYYY-MM-DD: {error}"))
}

fn parse_unit(value: &str) -> Result<IntervalUnit, String> {
    IntervalUnit::parse(value).ok_or_else(|| format!("unknown unit '{value}' (day, week, month)"))
}

fn print_auth_status(status: &AuthStatus) {
    if !status.signed_in {
        println!("signed out");
        return;
    }
    let expiry = status
        .expiry
        .map(|value| value.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "signed in; token {} (expires {expiry}); refreshable: {}",
        if status.token_valid { "valid" } else { "expired" },
        status.can_refresh
    );
}

async fn execute(state: &AppState, command: Commands) -> Result<(), CommandError> {
    match command {
        Commands::Run => run_daemon_impl(state).await,
        Commands::Show { year, month } => {
            print!("{}", show_month_impl(state, year, month).await?);
            Ok(())
        }
        Commands::Add {
            title,
            date,
            notes,
            every,
            unit,
            count,
        } => {
            let request = RecurrenceRequest {
                title,
                notes,
                start_date: date,
                interval_count: every,
                interval_unit: unit,
                occurrences: count,
            };
            for id in add_task_impl(state, &request).await? {
                println!("{id}");
            }
            Ok(())
        }
        Commands::Complete { task_id } => {
            set_status_impl(state, &task_id, TaskStatus::Completed).await
        }
        Commands::Reopen { task_id } => {
            set_status_impl(state, &task_id, TaskStatus::NeedsAction).await
        }
        Commands::Toggle { task_id } => {
            let status = toggle_status_impl(state, &task_id).await?;
            println!("{}", status.as_str());
            Ok(())
        }
        Commands::Rename {
            task_id,
            title,
            notes,
        } => rename_task_impl(state, &task_id, &title, &notes).await,
        Commands::Remove { task_id } => remove_task_impl(state, &task_id).await,
        Commands::Auth { action } => match action {
            AuthAction::Login => {
                print_auth_status(&auth_login_impl(state).await?);
                Ok(())
            }
            AuthAction::Logout => auth_logout_impl(state).await,
            AuthAction::Status => {
                print_auth_status(&auth_status_impl(state).await?);
                Ok(())
            }
        },
    }
}

async fn run(cli: Cli) -> Result<(), CommandError> {
    let root = match cli.root {
        Some(root) => root,
        None => default_workspace_root()?,
    };
    let fallback_filter = match cli.command {
        Commands::Run => "info",
        _ => "warn",
    };
    let _log_guard = init_logging(&root.join("logs"), Some(fallback_filter))?;

    let state = AppState::new(&root)?;
    let name = cli.command.name();
    execute(&state, cli.command).await.map_err(|error| {
        state.command_error(name, &error);
        error
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
