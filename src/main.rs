use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use kiosk_speech::speech::{EchoFilter, RecentOutputLog, normalize};
use kiosk_speech::{Config, console};

/// Kiosk Speech - speech coordination engine for a voice ordering kiosk
#[derive(Parser)]
#[command(name = "kiosk-speech", version, about)]
struct Cli {
    /// Recognition and synthesis language (e.g. "ko-KR")
    #[arg(long, env = "KIOSK_SPEECH_LANG")]
    lang: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive console session (default)
    Run,
    /// Evaluate the echo filter against a transcript
    CheckEcho {
        /// Recently spoken sentences, oldest first
        #[arg(long, required = true)]
        spoken: Vec<String>,
        /// Transcript to test
        #[arg(long)]
        heard: String,
        /// Milliseconds since the last utterance ended
        #[arg(long, default_value = "5000")]
        elapsed_ms: u64,
    },
    /// Print the resolved configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,kiosk_speech=info",
        1 => "info,kiosk_speech=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(lang) = cli.lang {
        config.speech.lang = lang;
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!(lang = %config.speech.lang, "starting console session");
            console::run_session(config).await?;
        }
        Command::CheckEcho {
            spoken,
            heard,
            elapsed_ms,
        } => check_echo(&config, &spoken, &heard, elapsed_ms),
        Command::ShowConfig => show_config(&config),
    }

    Ok(())
}

fn check_echo(config: &Config, spoken: &[String], heard: &str, elapsed_ms: u64) {
    let filter = EchoFilter::from_config(&config.echo);
    let elapsed = Duration::from_millis(elapsed_ms);

    // Replay the spoken sentences as if they ended `elapsed` ago
    let ended = Instant::now();
    let now = ended + elapsed;
    let mut recent = RecentOutputLog::with_capacity(config.echo.history_capacity);
    for text in spoken {
        recent.record(normalize(text), ended);
    }

    let verdict = filter.check(heard, now, Some(ended), &recent);
    println!("policy:  {}", filter.policy().as_str());
    println!("heard:   {heard}");
    println!("verdict: {verdict:?}");
    println!(
        "result:  {}",
        if verdict.is_suppressed() {
            "suppressed"
        } else {
            "delivered"
        }
    );
}

fn show_config(config: &Config) {
    let speech = &config.speech;
    println!("[speech]");
    println!("lang = {:?}", speech.lang);
    println!("interim_results = {}", speech.interim_results);
    println!("debounce_ms = {}", speech.debounce.as_millis());
    println!("voice_ready_timeout_ms = {}", speech.voice_ready_timeout.as_millis());
    println!("rate = {}", speech.rate);
    println!("pitch = {}", speech.pitch);
    println!("volume = {}", speech.volume);

    let echo = &config.echo;
    println!();
    println!("[echo]");
    println!("recency_window_ms = {}", echo.recency_window.as_millis());
    println!("similarity_threshold = {}", echo.similarity_threshold);
    println!("history_capacity = {}", echo.history_capacity);
    println!("protected_keywords = {:?}", echo.protected_keywords);
    println!("recency_policy = {:?}", echo.recency_policy.as_str());

    let log = &config.transcript_log;
    println!();
    println!("[transcript_log]");
    println!("enabled = {}", log.enabled);
    if let Some(url) = &log.url {
        println!("url = {url:?}");
    }
    println!("source = {:?}", log.source);
    println!("timeout_ms = {}", log.timeout.as_millis());

    if let Some(path) = kiosk_speech::config::file::config_file_path() {
        println!();
        println!("# file: {}", path.display());
    }
}
