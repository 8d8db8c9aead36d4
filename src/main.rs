use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use studyplan::application::insights::InsightsService;
use studyplan::application::planner::{BackgroundOutcome, PlannerController, WriteOutcome};
use studyplan::application::runtime::{PlannerCommand, PlannerUpdate, run_planner};
use studyplan::application::session::SessionManager;
use studyplan::domain::models::{
    AvatarUpload, NewTask, ProfileUpdate, SortOrder, Task, TaskPriority, TaskQuery, TaskStatus,
};
use studyplan::domain::timer::{TimerPhase, format_remaining};
use studyplan::infrastructure::config::AppConfig;
use studyplan::infrastructure::credential_store::InMemoryCredentialStore;
use studyplan::infrastructure::gemini_client::ReqwestGeminiClient;
use studyplan::infrastructure::notifier::TerminalNotifier;
use studyplan::infrastructure::task_api::{ReqwestTaskApi, TaskApi};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Study planner: tasks, calendar, focus timer and study insights.
#[derive(Debug, Parser)]
#[command(name = "studyplan", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List tasks
    Tasks {
        #[arg(long, value_parser = TaskStatus::parse)]
        status: Option<TaskStatus>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, value_parser = TaskPriority::parse)]
        priority: Option<TaskPriority>,
        /// Field to sort by, e.g. `priority` or `startDate`
        #[arg(long)]
        sort_field: Option<String>,
        #[arg(long)]
        desc: bool,
    },
    /// Count tasks due today
    DueToday,
    /// List upcoming tasks
    Upcoming,
    /// Create a task
    Add {
        title: String,
        #[arg(long, value_parser = parse_time)]
        start: DateTime<Utc>,
        #[arg(long, value_parser = parse_time)]
        end: DateTime<Utc>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = TaskPriority::parse, default_value = "Medium")]
        priority: TaskPriority,
        #[arg(long, value_parser = TaskStatus::parse, default_value = "Todo")]
        status: TaskStatus,
    },
    /// Delete a task
    Delete { id: String },
    /// Mark a task completed
    Complete { id: String },
    /// Show calendar events with their current status
    Calendar,
    /// Move or resize a task on the calendar
    Move {
        id: String,
        #[arg(value_parser = parse_time)]
        start: DateTime<Utc>,
        #[arg(value_parser = parse_time)]
        end: DateTime<Utc>,
        #[arg(long)]
        all_day: bool,
    },
    /// Run a focus timer bound to a task
    Focus {
        id: String,
        #[arg(long)]
        minutes: Option<u32>,
        #[arg(long)]
        break_minutes: Option<u32>,
    },
    /// Show or update the profile
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        avatar: Option<PathBuf>,
    },
    /// Ask the model for feedback on the schedule
    AnalyzeSchedule,
    /// Ask the model for feedback on recent progress
    AnalyzeProgress,
    /// Log out and forget the session token
    Logout,
}

type Planner = PlannerController<ReqwestTaskApi, TerminalNotifier<std::io::Stderr>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("studyplan=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let api = Arc::new(ReqwestTaskApi::new(config.api_base_url.clone()));
    let session = SessionManager::new(Arc::new(InMemoryCredentialStore::default()), Arc::clone(&api));
    session.sign_in(config.require_id_token()?)?;
    let token = session.access_token()?;

    match cli.command {
        Command::Tasks {
            status,
            search,
            priority,
            sort_field,
            desc,
        } => {
            let query = TaskQuery {
                status,
                search,
                priority,
                sort_field,
                sort_order: Some(if desc { SortOrder::Desc } else { SortOrder::Asc }),
            };
            let list = api.list_tasks(&token, &query).await?;
            print_tasks(&list.tasks);
            if list.skipped > 0 {
                eprintln!("{} task(s) could not be read", list.skipped);
            }
        }
        Command::DueToday => {
            println!("{}", api.count_due_today(&token).await?);
        }
        Command::Upcoming => print_tasks(&api.upcoming_tasks(&token).await?),
        Command::Add {
            title,
            start,
            end,
            description,
            priority,
            status,
        } => {
            let task = NewTask {
                title,
                description,
                priority,
                status,
                start_date: start,
                end_date: end,
            };
            match api.create_task(&token, &task).await? {
                Some(created) => println!("created {}", created.id),
                None => println!("created"),
            }
        }
        Command::Delete { id } => {
            api.delete_task(&token, &id).await?;
            println!("deleted {id}");
        }
        Command::Complete { id } => {
            let mut planner = planner(&api, &token, &config, None, None).await?;
            planner.mark_completed(&id)?;
            report_outcomes(planner.drain().await)?;
        }
        Command::Calendar => {
            let planner = planner(&api, &token, &config, None, None).await?;
            if planner.board().is_empty() {
                println!("no scheduled tasks");
            }
            for event in planner.display_events() {
                println!(
                    "{:<26} {:<12} {} -> {}{}  {}",
                    event.id,
                    event.status,
                    event.start.to_rfc3339(),
                    event.end.to_rfc3339(),
                    if event.all_day { " (all day)" } else { "" },
                    event.title
                );
            }
        }
        Command::Move {
            id,
            start,
            end,
            all_day,
        } => {
            let mut planner = planner(&api, &token, &config, None, None).await?;
            let event = planner.reschedule(&id, start, end, all_day)?;
            println!("{} is now {}", event.id, event.status);
            report_outcomes(planner.drain().await)?;
        }
        Command::Focus {
            id,
            minutes,
            break_minutes,
        } => {
            let planner = planner(&api, &token, &config, minutes, break_minutes).await?;
            run_focus(planner, id).await?;
        }
        Command::Profile { name, bio, avatar } => {
            let profile = api.fetch_profile(&token).await?;
            if name.is_none() && bio.is_none() && avatar.is_none() {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                let update = ProfileUpdate {
                    name: name.unwrap_or(profile.name),
                    bio: bio.or(profile.bio),
                    avatar: avatar.as_deref().map(read_avatar).transpose()?,
                };
                api.update_profile(&token, update).await?;
                println!("profile updated");
            }
        }
        Command::AnalyzeSchedule => {
            let insights = insights(&api, &config)?;
            println!("{}", insights.analyze_schedule(&token).await?);
        }
        Command::AnalyzeProgress => {
            let insights = insights(&api, &config)?;
            let report = insights.analyze_progress(&token, Utc::now()).await?;
            println!(
                "progress {}% ({} of {} tasks completed)\n",
                report.snapshot.progress_percentage,
                report.snapshot.status_breakdown.completed,
                report.snapshot.status_breakdown.total()
            );
            println!("{}", report.feedback);
        }
        Command::Logout => {
            session.sign_out().await?;
            println!("logged out");
        }
    }

    Ok(())
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| format!("expected an RFC 3339 timestamp: {error}"))
}

fn print_tasks(tasks: &[Task]) {
    for task in tasks {
        let window = task
            .window()
            .map(|window| format!("{} -> {}", window.start.to_rfc3339(), window.end.to_rfc3339()))
            .unwrap_or_else(|| "unscheduled".to_string());
        println!(
            "{:<26} {:<12} {:<7} {}  {}",
            task.id, task.status, task.priority, window, task.title
        );
    }
}

fn read_avatar(path: &Path) -> anyhow::Result<AvatarUpload> {
    let mime_type = match path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => bail!("avatar must be a png, jpeg, gif or webp image"),
    };
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("avatar")
        .to_string();
    Ok(AvatarUpload {
        file_name,
        mime_type: mime_type.to_string(),
        bytes,
    })
}

async fn planner(
    api: &Arc<ReqwestTaskApi>,
    token: &str,
    config: &AppConfig,
    focus_minutes: Option<u32>,
    break_minutes: Option<u32>,
) -> anyhow::Result<Planner> {
    let mut planner = PlannerController::new(
        Arc::clone(api),
        Arc::new(TerminalNotifier::stderr()),
        token,
        focus_minutes.unwrap_or(config.focus_minutes),
        break_minutes.unwrap_or(config.break_minutes),
    )?;
    if let BackgroundOutcome::RefreshFailed { message } = planner.refresh().await {
        bail!("could not load tasks: {message}");
    }
    Ok(planner)
}

fn insights(
    api: &Arc<ReqwestTaskApi>,
    config: &AppConfig,
) -> anyhow::Result<InsightsService<ReqwestTaskApi, ReqwestGeminiClient>> {
    let model = ReqwestGeminiClient::new(config.require_gemini_api_key()?, config.gemini_model.clone())?;
    Ok(InsightsService::new(Arc::clone(api), Arc::new(model)))
}

/// Prints write results; any failure turns into a non-zero exit.
fn report_outcomes(outcomes: Vec<BackgroundOutcome>) -> anyhow::Result<()> {
    let mut failed = false;
    for outcome in outcomes {
        match outcome {
            BackgroundOutcome::Write(WriteOutcome::Persisted { event_id }) => println!("saved {event_id}"),
            BackgroundOutcome::Write(WriteOutcome::Completed { event_id }) => println!("completed {event_id}"),
            BackgroundOutcome::Write(WriteOutcome::Superseded { event_id }) => {
                println!("{event_id}: superseded by a newer change")
            }
            BackgroundOutcome::Write(WriteOutcome::Failed { event_id, message }) => {
                eprintln!("{event_id}: not saved: {message}");
                failed = true;
            }
            BackgroundOutcome::Refreshed { .. } | BackgroundOutcome::RefreshFailed { .. } => {}
        }
    }
    if failed {
        bail!("some changes were not saved");
    }
    Ok(())
}

const FOCUS_HELP: &str =
    "commands: end | yes | no | break [minutes] | restart | complete | refresh | quit";

fn parse_focus_input(line: &str, event_id: &str) -> Result<Option<PlannerCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Err(FOCUS_HELP.to_string());
    };
    let command = match word.to_ascii_lowercase().as_str() {
        "end" => PlannerCommand::RequestEndEarly,
        "yes" | "y" => PlannerCommand::ConfirmEndEarly,
        "no" | "n" => PlannerCommand::CancelEndEarly,
        "break" => PlannerCommand::StartBreak {
            minutes: words
                .next()
                .map(|raw| raw.parse::<u32>().map_err(|_| format!("not a number of minutes: {raw}")))
                .transpose()?,
        },
        "restart" => PlannerCommand::RestartFocus,
        "complete" => PlannerCommand::MarkCompleted {
            event_id: event_id.to_string(),
        },
        "refresh" => PlannerCommand::Refresh,
        "quit" | "q" => return Ok(None),
        _ => return Err(FOCUS_HELP.to_string()),
    };
    Ok(Some(command))
}

async fn run_focus(planner: Planner, event_id: String) -> anyhow::Result<()> {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (update_tx, mut update_rx) = mpsc::channel(64);
    command_tx
        .send(PlannerCommand::StartFocus {
            event_id: event_id.clone(),
            minutes: None,
        })
        .await?;
    let runtime = tokio::spawn(run_planner(planner, command_rx, update_tx));

    eprintln!("{FOCUS_HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_focus_input(&line, &event_id) {
                    Ok(Some(command)) => {
                        if command_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(help) => eprintln!("{help}"),
                }
            }
            update = update_rx.recv() => {
                let Some(update) = update else { break };
                render_update(update)?;
            }
        }
    }

    drop(command_tx);
    let mut planner = runtime.await?;
    report_outcomes(planner.drain().await)
}

fn render_update(update: PlannerUpdate) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    match update {
        PlannerUpdate::Timer(view) => {
            let label = match view.phase {
                TimerPhase::Idle => "idle",
                TimerPhase::FocusRunning => "focus",
                TimerPhase::BreakPending => "break ready (type `break`)",
                TimerPhase::BreakRunning => "break",
            };
            write!(stdout, "\r\x1b[2K{label} {}", format_remaining(view.remaining_seconds))?;
            stdout.flush()?;
        }
        PlannerUpdate::Notice(notice) => {
            writeln!(stdout)?;
            writeln!(stdout, "{}: {}", notice.title(), notice.body())?;
        }
        PlannerUpdate::EndEarlyRequested => {
            writeln!(stdout)?;
            writeln!(stdout, "End the timer early? (yes/no)")?;
        }
        PlannerUpdate::EventMoved(event) => {
            writeln!(stdout)?;
            writeln!(stdout, "{} is now {}", event.id, event.status)?;
        }
        PlannerUpdate::Background(outcome) => {
            writeln!(stdout)?;
            match outcome {
                BackgroundOutcome::Refreshed { events, .. } => writeln!(stdout, "{events} events loaded")?,
                BackgroundOutcome::RefreshFailed { message } => writeln!(stdout, "refresh failed: {message}")?,
                BackgroundOutcome::Write(outcome) => writeln!(stdout, "{outcome:?}")?,
            }
        }
        PlannerUpdate::Rejected { message, .. } => {
            writeln!(stdout)?;
            writeln!(stdout, "{message}")?;
        }
    }
    Ok(())
}
