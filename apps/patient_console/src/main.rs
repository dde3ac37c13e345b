use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, locale, workout::DEFAULT_TARGET_SETS, ApiClient, ChatMessage, ChatSession,
    Phase, SendOutcome, WorkoutError, WorkoutEvent, WorkoutSession,
};
use shared::domain::{ExerciseKind, Language, Severity, DEFAULT_TARGET_REPS};
use tokio::{
    io::{self, AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SEVERITY_BAR_WIDTH: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "patient_console", about = "ReviveCare patient client")]
struct Cli {
    /// Backend origin; overrides the settings file and environment.
    #[arg(long)]
    server_url: Option<String>,
    /// Log in with this email before running the command.
    #[arg(long)]
    email: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Talk to the medical assistant.
    Chat {
        #[arg(long, default_value_t = Language::English)]
        language: Language,
    },
    /// Run a guided workout for one exercise.
    Workout {
        exercise: ExerciseKind,
        #[arg(long)]
        reps: Option<u32>,
        #[arg(long, default_value_t = DEFAULT_TARGET_SETS)]
        sets: u32,
        #[arg(long, default_value_t = 30)]
        rest: u32,
    },
    Login {
        email: String,
    },
    /// List the exercise catalog with demo video links.
    Exercises,
    /// Save frames from the live tracking camera as JPEG files.
    Feed {
        #[arg(long, default_value_t = 10)]
        frames: usize,
        #[arg(long, default_value = "frames")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.api_base_url = server_url;
    }
    let client = Arc::new(ApiClient::from_settings(&settings).context("invalid client settings")?);
    info!(base_url = %client.base_url(), "using backend");

    if let Some(email) = &cli.email {
        login(&client, email).await?;
    }

    match cli.command {
        Command::Chat { language } => run_chat(client, language).await,
        Command::Workout {
            exercise,
            reps,
            sets,
            rest,
        } => {
            let reps = reps.unwrap_or(DEFAULT_TARGET_REPS);
            let session = WorkoutSession::new_with_poll_interval(
                client.clone(),
                Some(exercise),
                settings.poll_interval(),
            );
            session
                .update_config(reps, sets, rest)
                .await
                .context("invalid workout settings")?;
            println!(
                "{} - demo: {}",
                exercise.display_name(),
                client.demo_video_url(exercise)
            );
            let result = run_workout(&session).await;
            session.close().await;
            result
        }
        Command::Login { email } => login(&client, &email).await,
        Command::Exercises => {
            for exercise in ExerciseKind::ALL {
                println!(
                    "{:<20} {:<20} {}",
                    exercise.id(),
                    exercise.display_name(),
                    client.demo_video_url(exercise)
                );
            }
            Ok(())
        }
        Command::Feed { frames, out } => save_frames(&client, frames, out).await,
    }
}

async fn login(client: &ApiClient, email: &str) -> Result<()> {
    client
        .login(email)
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))
        .context("login failed")?;
    if client.is_authenticated().await {
        println!("Logged in as {email}");
    } else {
        warn!(email, "login finished but the dashboard is still not accessible");
        println!("Login was not accepted for {email}");
    }
    Ok(())
}

fn render_message(message: &ChatMessage) {
    let who = if message.is_assistant() {
        "assistant"
    } else {
        "you"
    };
    println!("[{}] {who}: {}", message.timestamp, message.text);

    if let Some(score) = message.displayed_severity() {
        let filled = score.filled_cells(SEVERITY_BAR_WIDTH);
        println!(
            "        severity [{}{}] {}% {}",
            "#".repeat(filled),
            "-".repeat(SEVERITY_BAR_WIDTH - filled),
            score.percent(),
            score.level().label()
        );
        if score.level() == Severity::High {
            println!("        {}", locale::HIGH_SEVERITY_NOTICE);
        }
    }
}

async fn run_chat(client: Arc<ApiClient>, language: Language) -> Result<()> {
    let session = ChatSession::new(client, language);
    println!("{}", locale::info_banner(language));
    for message in session.messages().await {
        render_message(&message);
    }
    println!("Try: {}", locale::quick_suggestions(language).join(" | "));
    println!("Commands: /lang <english|hindi>, /quit");

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input == "/quit" {
            break;
        }
        if let Some(code) = input.strip_prefix("/lang") {
            match code.parse::<Language>() {
                Ok(language) => {
                    session.set_language(language).await;
                    println!("Language: {}", language.label());
                    println!("{}", locale::input_placeholder(language));
                }
                Err(err) => println!("{err}"),
            }
            continue;
        }

        match session.send_user_message(input).await {
            SendOutcome::Ignored => {}
            SendOutcome::Busy => println!("Still waiting for the previous reply."),
            SendOutcome::Replied(reply) | SendOutcome::FellBack(reply) => render_message(&reply),
        }
    }
    Ok(())
}

fn print_workout_help() {
    println!("Commands: start, skip, reset, status, quit");
}

async fn run_workout(session: &Arc<WorkoutSession>) -> Result<()> {
    let mut events = session.subscribe();
    let mut lines = BufReader::new(io::stdin()).lines();
    let snapshot = session.snapshot().await;
    println!(
        "{} sets x {} reps, {}s rest",
        snapshot.config.target_sets, snapshot.config.target_reps, snapshot.config.rest_seconds
    );
    print_workout_help();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(WorkoutEvent::PhaseChanged { phase, current_set }) => {
                    match phase {
                        Phase::Active => println!("Set {current_set} started"),
                        Phase::Resting => println!("Set {current_set} complete, resting"),
                        Phase::SetComplete => println!("Rest over, starting set {current_set}"),
                        Phase::Idle => println!("Set {current_set} reset"),
                        Phase::AllComplete => {
                            println!("All sets complete. Great work!");
                            return Ok(());
                        }
                    }
                }
                Ok(WorkoutEvent::RepsUpdated { reps_completed, target_reps }) => {
                    println!("reps {reps_completed}/{target_reps}");
                }
                Ok(WorkoutEvent::RestTick { remaining }) => {
                    if remaining % 5 == 0 {
                        println!("rest {remaining}s");
                    }
                }
                Ok(WorkoutEvent::ConfigUpdated(_)) => {}
                Ok(WorkoutEvent::Error(message)) => println!("error: {message}"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "workout events dropped"),
                Err(RecvError::Closed) => return Ok(()),
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let outcome = match line.trim() {
                    "start" => session.start_set().await,
                    "skip" => session.skip_rest().await,
                    "reset" => session.reset_set().await,
                    "status" => {
                        let snapshot = session.snapshot().await;
                        println!(
                            "set {}/{} {} reps {}/{}",
                            snapshot.current_set.min(snapshot.config.target_sets),
                            snapshot.config.target_sets,
                            snapshot.phase,
                            snapshot.reps_completed,
                            snapshot.config.target_reps
                        );
                        Ok(())
                    }
                    "quit" => return Ok(()),
                    "" => Ok(()),
                    _ => {
                        print_workout_help();
                        Ok(())
                    }
                };
                match outcome {
                    // Already reported through the event stream.
                    Err(WorkoutError::Remote(_) | WorkoutError::NoExercise) => {
                        session.clear_error().await;
                    }
                    Err(err) => println!("{err}"),
                    Ok(()) => {}
                }
            }
        }
    }
}

async fn save_frames(client: &ApiClient, limit: usize, out: PathBuf) -> Result<()> {
    tokio::fs::create_dir_all(&out)
        .await
        .with_context(|| format!("failed to create {}", out.display()))?;
    let mut feed = client
        .open_video_feed()
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))
        .context("could not open the camera feed")?;

    let mut saved = 0;
    while saved < limit {
        let Some(frame) = feed.next_frame().await else {
            break;
        };
        let frame = frame.context("camera feed interrupted")?;
        saved += 1;
        let path = out.join(format!("frame_{saved:04}.jpg"));
        tokio::fs::write(&path, &frame)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    println!("saved {saved} frames to {}", out.display());
    Ok(())
}
