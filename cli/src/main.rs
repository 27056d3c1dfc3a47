//! Quill CLI - binary entry point.
//!
//! Adapts files on disk as documents and drives [`quill_engine::Assistant`]:
//!
//! ```text
//! main() -> init_tracing() -> load config -> Assistant<GeminiTransport, EnvSecretStore>
//!                                                  |
//!                          review | quick-review | explain | fix | refactor | tests
//!                          apply-fix | chat | set-key
//! ```
//!
//! Ctrl-C cancels the request in flight through its [`StreamHandle`].

mod crash_hardening;
mod render;

use std::fs::{self, OpenOptions};
use std::future::Future;
use std::io::{Write, stdout};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use quill_config::{API_KEY_SECRET, EnvSecretStore, FileSecretStore, QuillConfig};
use quill_engine::{
    ApiConfig, Assistant, CancellationToken, ChatOutcome, Document, EventSink, FixOutcome,
    LineSpan, StreamHandle, TaskKind, TextDocument,
};
use quill_providers::gemini::GeminiTransport;

type CliAssistant = Assistant<GeminiTransport, EnvSecretStore<FileSecretStore>>;

#[derive(Parser, Debug)]
#[command(
    name = "quill",
    version,
    about = "AI code review and chat backed by Gemini"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Review a file, or only the selected lines
    Review {
        file: PathBuf,
        /// 1-based inclusive line range, e.g. 10:24
        #[arg(long, value_parser = parse_lines)]
        lines: Option<LineSpan>,
    },
    /// Stricter review that only reports definite problems
    QuickReview {
        file: PathBuf,
        #[arg(long, value_parser = parse_lines)]
        lines: Option<LineSpan>,
    },
    /// Explain what the code does
    Explain {
        file: PathBuf,
        #[arg(long, value_parser = parse_lines)]
        lines: Option<LineSpan>,
    },
    /// Suggest a fixed version of the code
    Fix {
        file: PathBuf,
        #[arg(long, value_parser = parse_lines)]
        lines: Option<LineSpan>,
    },
    /// Suggest a refactored version of the code
    Refactor {
        file: PathBuf,
        #[arg(long, value_parser = parse_lines)]
        lines: Option<LineSpan>,
    },
    /// Generate unit tests for the code
    Tests {
        file: PathBuf,
        #[arg(long, value_parser = parse_lines)]
        lines: Option<LineSpan>,
    },
    /// Review the file, then fix one finding in place
    ApplyFix {
        file: PathBuf,
        /// Which finding to fix, as numbered in the review output
        #[arg(long, default_value_t = 1)]
        index: usize,
    },
    /// Interactive chat. `/clear` resets the conversation, `/exit` leaves
    Chat,
    /// Store the Gemini API key (prompts on stdin when omitted)
    SetKey { key: Option<String> },
}

/// `A:B` (or a single `N`), 1-based inclusive.
fn parse_lines(raw: &str) -> Result<LineSpan, String> {
    let (start, end) = raw.split_once(':').unwrap_or((raw, raw));
    let number = |s: &str| {
        s.trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid line number `{}`", s.trim()))
    };
    let (start, end) = (number(start)?, number(end)?);
    LineSpan::new(start - 1, end - 1).map_err(|e| e.to_string())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // No log file: stay silent rather than interleave logs with command output.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, fs::File)>, Vec<String>) {
    let mut candidates = Vec::new();
    if let Some(path) = quill_config::log_path() {
        candidates.push(path);
    }
    candidates.push(PathBuf::from(".quill").join("logs").join("quill.log"));

    let mut warnings = Vec::new();
    for candidate in candidates {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new().create(true).append(true).open(&candidate) {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn load_config() -> QuillConfig {
    match QuillConfig::load() {
        Ok(Some(config)) => config,
        Ok(None) => QuillConfig::default(),
        Err(err) => {
            eprintln!("Ignoring config at {}: {err}", err.path().display());
            QuillConfig::default()
        }
    }
}

fn build_assistant(config: &QuillConfig) -> Result<CliAssistant> {
    let mut api = ApiConfig::new(config.model());
    if let Some(endpoint) = config.endpoint() {
        api = api.with_base_url(endpoint);
    }
    tracing::info!(model = %api.model(), base_url = api.base_url(), "Using Gemini endpoint");

    let file_store = FileSecretStore::at_default_location().context("no home directory")?;
    let mut secrets = EnvSecretStore::new(file_store);
    if let Some(key) = config.google_api_key() {
        secrets = secrets.with_default(API_KEY_SECRET, key.expose_secret());
    }

    Ok(
        Assistant::new(GeminiTransport::new(api), secrets, EventSink::disconnected())
            .with_review_settings(config.review_settings())
            .with_chat_settings(config.chat_settings()),
    )
}

/// Run `future` until it finishes, cancelling its request on Ctrl-C.
async fn cancellable<F: Future>(handle: StreamHandle, future: F) -> F::Output {
    tokio::pin!(future);
    loop {
        tokio::select! {
            output = &mut future => break output,
            Ok(()) = signal::ctrl_c() => {
                tracing::info!("Cancel requested");
                handle.cancel();
            }
        }
    }
}

fn open_file(path: &Path) -> Result<TextDocument> {
    Ok(TextDocument::from_path(path)?)
}

fn whole_or(document: &TextDocument, lines: Option<LineSpan>) -> Result<LineSpan> {
    if let Some(span) = lines {
        return Ok(span);
    }
    match document.line_count() {
        0 => bail!("{} is empty", document.id()),
        n => Ok(LineSpan::new(0, n - 1)?),
    }
}

async fn review(
    assistant: &mut CliAssistant,
    path: &Path,
    lines: Option<LineSpan>,
    quick: bool,
) -> Result<()> {
    let document = open_file(path)?;
    let token = CancellationToken::new();
    let handle = token.handle();
    let report = match (lines, quick) {
        (Some(span), false) => {
            cancellable(handle, assistant.review_selection(&document, span, Some(token))).await?
        }
        (None, false) => cancellable(handle, assistant.review_document(&document, Some(token))).await?,
        (span, true) => {
            let span = whole_or(&document, span)?;
            cancellable(
                handle,
                assistant.quick_review_selection(&document, span, Some(token)),
            )
            .await?
        }
    };

    print!(
        "{}",
        render::diagnostics(document.id().as_str(), assistant.diagnostics(document.id()))
    );
    println!("{}", render::review_summary(&report));
    Ok(())
}

async fn task(
    assistant: &CliAssistant,
    kind: TaskKind,
    path: &Path,
    lines: Option<LineSpan>,
) -> Result<()> {
    let document = open_file(path)?;
    let span = whole_or(&document, lines)?;
    let token = CancellationToken::new();
    let handle = token.handle();
    let token = Some(token);
    let reply = match kind {
        TaskKind::Explain => cancellable(handle, assistant.explain(&document, span, token)).await,
        TaskKind::Fix => cancellable(handle, assistant.fix(&document, span, token)).await,
        TaskKind::Refactor => cancellable(handle, assistant.refactor(&document, span, token)).await,
        TaskKind::GenerateTests => {
            cancellable(handle, assistant.generate_tests(&document, span, token)).await
        }
        other => bail!("{} is not a free-text task", other.as_str()),
    }?;
    print!("{}", render::task_reply(&reply));
    Ok(())
}

async fn apply_fix(assistant: &mut CliAssistant, path: &Path, index: usize) -> Result<()> {
    let mut document = open_file(path)?;
    let token = CancellationToken::new();
    cancellable(token.handle(), assistant.review_document(&document, Some(token))).await?;

    let findings = assistant.diagnostics(document.id());
    print!("{}", render::diagnostics(document.id().as_str(), findings));
    if findings.is_empty() {
        return Ok(());
    }
    let Some(target) = index.checked_sub(1).and_then(|i| findings.get(i)) else {
        bail!("no finding #{index}; the review reported {}", findings.len());
    };
    let id = target.id();

    let token = CancellationToken::new();
    let outcome = cancellable(token.handle(), assistant.apply_fix(&mut document, id, Some(token))).await?;
    match outcome {
        FixOutcome::Applied {
            fixed,
            replaced,
            inserted_lines,
        } => {
            fs::write(path, document.contents())
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!(
                "Fixed \"{}\": replaced lines {replaced} with {inserted_lines} line(s).",
                fixed.message()
            );
        }
        FixOutcome::NotApplied { reason } => println!("Fix not applied: {reason}"),
    }
    Ok(())
}

async fn chat(assistant: &mut CliAssistant) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Chatting with Gemini. /clear resets, /exit leaves, Ctrl-C cancels a reply.");

    loop {
        print!("> ");
        stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        match line.trim() {
            "/exit" | "/quit" => break,
            "/clear" => {
                assistant.clear_chat();
                println!("[conversation cleared]");
                continue;
            }
            _ => {}
        }

        let token = CancellationToken::new();
        let outcome = cancellable(token.handle(), assistant.send_chat_message(&line, token)).await;
        match outcome {
            Ok(ChatOutcome::Rejected) => {}
            Ok(ChatOutcome::Replied(_) | ChatOutcome::Cancelled | ChatOutcome::Failed(_)) => {
                if let Some(entry) = assistant.chat().transcript().last() {
                    println!("{}", render::transcript_entry(entry));
                }
            }
            Err(err) => eprintln!("Error: {err}"),
        }
    }
    Ok(())
}

async fn set_key(assistant: &CliAssistant, key: Option<String>) -> Result<()> {
    let key = match key {
        Some(key) => key,
        None => {
            print!("Gemini API key: ");
            stdout().flush()?;
            BufReader::new(tokio::io::stdin())
                .lines()
                .next_line()
                .await?
                .unwrap_or_default()
        }
    };
    assistant.set_api_key(&key)?;
    println!("API key saved.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Err(err) = crash_hardening::apply() {
        tracing::warn!("{err:#}");
    }

    let config = load_config();
    let mut assistant = build_assistant(&config)?;

    match cli.command {
        Command::Review { file, lines } => review(&mut assistant, &file, lines, false).await,
        Command::QuickReview { file, lines } => review(&mut assistant, &file, lines, true).await,
        Command::Explain { file, lines } => task(&assistant, TaskKind::Explain, &file, lines).await,
        Command::Fix { file, lines } => task(&assistant, TaskKind::Fix, &file, lines).await,
        Command::Refactor { file, lines } => {
            task(&assistant, TaskKind::Refactor, &file, lines).await
        }
        Command::Tests { file, lines } => {
            task(&assistant, TaskKind::GenerateTests, &file, lines).await
        }
        Command::ApplyFix { file, index } => apply_fix(&mut assistant, &file, index).await,
        Command::Chat => chat(&mut assistant).await,
        Command::SetKey { key } => set_key(&assistant, key).await,
    }
}
