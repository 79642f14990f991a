//! DialogSim CLI - scripted two-agent conversations
//!
//! Runs a conversation between two AI agents, saves the transcript, and
//! renders it to speech.

use clap::{Parser, Subcommand};
use colored::Colorize;
use dialogsim_core::{
    ApiConfig, ConversationEvent, DialogueBackends, DialogueOrchestrator, EvaluationOutcome,
    EvaluatorCredentials, HttpEvaluator, OpenAiBackend, QualityEvaluator, Role, Settings,
    audio::render_transcript,
    load_transcript, save_transcript,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_EVALUATOR_URL: &str = "https://api.futureagi.com/sdk/api/v1/new-eval/";

#[derive(Parser)]
#[command(
    name = "dialogsim",
    version,
    about = "Agentic call simulator - two AI agents talk, then speak",
    long_about = "Runs a turn-based conversation between two AI agents using OpenAI-compatible APIs, \
                  labels each turn with an inferred emotion, and renders the transcript to audio."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a conversation, save the transcript and generate audio
    Run {
        /// Settings file (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "outputs", value_name = "DIR")]
        out: PathBuf,

        /// Skip audio generation
        #[arg(long)]
        no_audio: bool,
    },
    /// Render audio for a previously saved transcript
    Audio {
        /// Settings file (TOML) providing voices and TTS provider
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,

        /// transcript.json written by `run`
        #[arg(short, long, value_name = "FILE")]
        transcript: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "outputs", value_name = "DIR")]
        out: PathBuf,
    },
    /// Check that the environment is configured
    Check {
        /// Settings file (TOML) to validate
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            out,
            no_audio,
        } => run(&config, &out, no_audio).await,
        Command::Audio {
            config,
            transcript,
            out,
        } => {
            let settings = Settings::load(&config)?;
            let lines = load_transcript(&transcript)?;
            render_audio(&settings, &lines, &out).await
        }
        Command::Check { config } => check(config.as_deref()),
    }
}

async fn run(config: &Path, out: &Path, no_audio: bool) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load(config)?;
    let api = api_config()?;

    let backends = DialogueBackends {
        agent_a: Arc::new(OpenAiBackend::new(&api, settings.model(Role::AgentA))?),
        agent_b: Arc::new(OpenAiBackend::new(&api, settings.model(Role::AgentB))?),
        classifier: Arc::new(OpenAiBackend::new(&api, settings.classifier_model())?),
    };
    let evaluator = quality_evaluator(&settings)?;

    print_header(&settings, evaluator.is_enabled());

    let mut orchestrator = DialogueOrchestrator::new(settings.clone(), backends, evaluator)
        .with_callback(create_console_callback());

    let messages = orchestrator.run().await?;

    let metrics = orchestrator.metrics();
    println!(
        "{} {} messages processed",
        "Final metrics:".bold(),
        metrics.total_messages
    );

    let saved = save_transcript(&messages, out)?;
    println!(
        "{} {}",
        "Transcript saved to:".bold(),
        saved.text.display().to_string().bright_white()
    );

    if !no_audio {
        let lines = orchestrator.state().rendered_messages();
        render_audio(&settings, &lines, out).await?;
    }

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  Conversation completed.".bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

async fn render_audio(
    settings: &Settings,
    lines: &[String],
    out: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "Generating audio for conversation...".bright_cyan());

    let report = render_transcript(settings, lines, out).await?;

    if !report.failed_turns.is_empty() {
        eprintln!(
            "{}",
            format!(
                "Warning: audio failed for turn(s) {:?}; they are missing from the track.",
                report.failed_turns
            )
            .yellow()
        );
    }

    match report.merged {
        Some(track) => println!(
            "{} {}",
            "Conversation audio saved to:".bold(),
            track.path.display().to_string().bright_white()
        ),
        None => eprintln!(
            "{}",
            "No audio files were generated successfully.".red().bold()
        ),
    }

    Ok(())
}

/// Get API configuration from environment.
fn api_config() -> Result<ApiConfig, Box<dyn std::error::Error>> {
    let api_base = env::var("OPENAI_API_BASE")
        .or_else(|_| env::var("OPENAI_BASE_URL"))
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

    let api_key = env::var("OPENAI_API_KEY").map_err(|_| {
        "OPENAI_API_KEY environment variable is required. Set it in your environment or .env file"
    })?;

    Ok(ApiConfig::new(api_base, api_key))
}

fn evaluator_credentials() -> Option<EvaluatorCredentials> {
    let api_key = env::var("FI_API_KEY")
        .or_else(|_| env::var("FUTUREAGI_API_KEY"))
        .ok();
    let secret_key = env::var("FI_SECRET_KEY")
        .or_else(|_| env::var("FUTUREAGI_SECRET_KEY"))
        .ok();
    EvaluatorCredentials::from_parts(api_key, secret_key)
}

/// Missing credentials disable evaluation rather than failing the run.
fn quality_evaluator(settings: &Settings) -> Result<QualityEvaluator, Box<dyn std::error::Error>> {
    let Some(credentials) = evaluator_credentials() else {
        log::info!("Evaluator credentials not set; quality evaluation disabled");
        return Ok(QualityEvaluator::disabled());
    };

    let endpoint = env::var("FI_BASE_URL").unwrap_or_else(|_| DEFAULT_EVALUATOR_URL.to_string());
    let http = HttpEvaluator::new(endpoint, credentials, settings.evaluation_timeout())?;

    Ok(QualityEvaluator::new(
        Arc::new(http),
        settings.evaluator_models.clone(),
        settings.evaluation_timeout(),
    ))
}

fn check(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut ok = true;

    match env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() && key != "your_openai_api_key_here" => {
            println!("{} OPENAI_API_KEY is set", "✓".green());
        }
        _ => {
            println!(
                "{} OPENAI_API_KEY not set. Add it to your environment or .env file.",
                "✗".red()
            );
            ok = false;
        }
    }

    if evaluator_credentials().is_some() {
        println!("{} Evaluator credentials found", "✓".green());
    } else {
        println!(
            "{} Evaluator credentials not set (FI_API_KEY / FI_SECRET_KEY); evaluation will be skipped",
            "-".yellow()
        );
    }

    if let Some(path) = config {
        match Settings::load(path) {
            Ok(settings) => println!(
                "{} {} parsed: {} turns on \"{}\"",
                "✓".green(),
                path.display(),
                settings.turns,
                settings.topic
            ),
            Err(e) => {
                println!("{} {}: {}", "✗".red(), path.display(), e);
                ok = false;
            }
        }
    }

    if ok {
        println!();
        println!("{}", "Setup complete.".bright_green().bold());
        Ok(())
    } else {
        Err("Setup incomplete. Please fix the issues above.".into())
    }
}

fn print_header(settings: &Settings, evaluation_enabled: bool) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  DialogSim".bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Topic:".bold(), settings.topic.bright_white());
    println!("{} {}", "Tone:".bold(), settings.tone);
    println!("{} {}", "Turns:".bold(), settings.turns);
    println!();
    println!("{}", "Participants:".bold());
    for role in [Role::AgentA, Role::AgentB] {
        let participant = settings.participant(role);
        println!(
            "  {} - {} ({}) voice {}",
            role.display_name().bright_cyan(),
            participant.persona,
            participant.model.dimmed(),
            settings.voice(role).yellow()
        );
    }
    if !evaluation_enabled {
        println!();
        println!("{}", "Quality evaluation disabled.".dimmed());
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

/// Create a callback that prints conversation events to the console.
fn create_console_callback() -> Box<dyn Fn(ConversationEvent) + Send + Sync> {
    Box::new(move |event| match event {
        ConversationEvent::ConversationStarted {
            topic, max_turns, ..
        } => {
            println!(
                "{}",
                format!("Conversation started - {} turns on \"{}\"", max_turns, topic)
                    .bright_magenta()
                    .bold()
            );
            println!();
        }
        ConversationEvent::TurnStarted { turn, role } => {
            println!(
                "{} {} {}",
                "▶".bright_cyan(),
                role.display_name().bright_cyan().bold(),
                format!("(turn {})", turn).dimmed()
            );
        }
        ConversationEvent::MessageProcessed { utterance, .. } => {
            println!("  {}", format!("[{}]", utterance.emotion).yellow());
            let wrapped = textwrap(&utterance.text, 66);
            for line in wrapped.lines() {
                println!("  {}", line);
            }
            println!();
        }
        ConversationEvent::Evaluation { outcome, .. } => match outcome {
            EvaluationOutcome::Scored {
                template, label, ..
            } => {
                println!(
                    "  {}",
                    format!("{}: {}", template.template_name(), label).dimmed()
                );
            }
            EvaluationOutcome::Unavailable { .. } => {}
        },
        ConversationEvent::ConversationCompleted {
            total_messages,
            final_turn,
        } => {
            println!(
                "{}",
                format!(
                    "Conversation finished - {} messages, {} turns",
                    total_messages, final_turn
                )
                .bright_green()
            );
        }
        ConversationEvent::ConversationFailed { turn, error } => {
            eprintln!(
                "{} turn {}: {}",
                "Error:".red().bold(),
                turn,
                error
            );
        }
    })
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}
