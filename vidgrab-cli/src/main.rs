//! `vidgrab` command-line front end.

mod cli;
mod error;
mod logging;

use std::io::{Read, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use vidgrab_core::{
    AppConfig, DownloadJob, DownloadManager, DownloadTicket, HistoryRecord, HistoryStore,
    ManagerOptions, ProgressEvent, SessionEvent, SessionOutcome, YtDlpEngine, format_duration,
    format_size,
};

use crate::cli::{BatchArgs, Cli, Command, DownloadArgs, HistoryCommand, OutputArgs};
use crate::error::{CliError, CliResult};

/// Exit status for a download stopped by the user (128 + SIGINT).
const EXIT_CANCELLED: u8 = 130;

/// Maximum characters of a failure message shown per download.
const FAILURE_MESSAGE_CHARS: usize = 120;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match logging::init(&cli.logging.to_config(cli.verbose)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: {e}");
            None
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    match cli.command {
        Command::Download(args) => download(&mut config, args).await,
        Command::Batch(args) => batch(&mut config, args).await,
        Command::Info { url } => {
            show_info(&config, &url).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::History { action } => {
            history(&config, action);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Apply per-invocation overrides on top of the loaded configuration.
fn apply_output_args(config: &mut AppConfig, args: &OutputArgs) -> CliResult<()> {
    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    if let Some(container) = args.container {
        config.container = container;
    }
    if let Some(dir) = &args.output {
        let dir = std::path::absolute(dir).map_err(|source| CliError::Input {
            path: dir.clone(),
            source,
        })?;
        config.set_download_directory(dir)?;
    }
    if args.subs || args.embed_subs {
        config.subtitles.enabled = true;
        config.subtitles.embed = args.embed_subs;
    }
    if !args.sub_langs.is_empty() {
        config.subtitles.languages = args.sub_langs.iter().cloned().collect();
    }
    Ok(())
}

fn build_manager(config: &AppConfig) -> CliResult<DownloadManager> {
    let engine = YtDlpEngine::from_config(&config.engine)?;
    let history = HistoryStore::open(config.history.path()).into_shared();
    Ok(DownloadManager::new(
        Arc::new(engine),
        history,
        ManagerOptions::from_config(config),
    ))
}

async fn download(config: &mut AppConfig, args: DownloadArgs) -> CliResult<ExitCode> {
    apply_output_args(config, &args.output)?;
    let manager = build_manager(config)?;

    let media = manager.preview(&args.url).await?;
    eprintln!("{}", media.title);

    let mut job = DownloadJob::new(args.url, config.quality).with_media(media);
    if let Some(name) = args.name {
        job = job.with_filename(name);
    }
    let ticket = manager.submit(job).await?;
    if ticket.muxer_missing() {
        eprintln!("warning: ffmpeg not found; merging or conversion may fail");
    }
    let outcome = follow(&manager, ticket).await;

    Ok(report_outcome(&outcome))
}

/// Print progress for one download until it ends. Ctrl-C cancels it.
async fn follow(manager: &DownloadManager, mut ticket: DownloadTicket) -> SessionOutcome {
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = ticket.recv() => match event {
                Some(SessionEvent::Progress(progress)) => render_progress(&progress),
                Some(SessionEvent::Outcome(outcome)) => return outcome,
                None => {
                    return SessionOutcome::Failed {
                        message: "download ended without a result".to_string(),
                    };
                }
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("\nCancelling...");
                manager.cancel(ticket.id()).await;
            }
        }
    }
}

fn render_progress(event: &ProgressEvent) {
    match event {
        ProgressEvent::Downloading {
            bytes_total,
            bytes_per_second,
            eta_seconds,
            ..
        } => {
            let percent = event
                .percent()
                .map_or_else(|| "  ?  ".to_string(), |p| format!("{p:5.1}%"));
            let total = bytes_total.map_or_else(|| "?".to_string(), format_size);
            let speed = bytes_per_second
                .map(|rate| format!(" at {}/s", format_size(rate as u64)))
                .unwrap_or_default();
            let eta = eta_seconds
                .map(|s| format!(" ETA {}", format_duration(s)))
                .unwrap_or_default();
            eprint!("\r{percent} of {total}{speed}{eta}    ");
            let _ = std::io::stderr().flush();
        }
        ProgressEvent::PostProcessing { step } => eprintln!("\rPost-processing: {step}"),
        ProgressEvent::Finished { .. } => eprintln!(),
    }
}

fn report_outcome(outcome: &SessionOutcome) -> ExitCode {
    match outcome {
        SessionOutcome::Succeeded { file_path } => {
            println!("{}", file_path.display());
            ExitCode::SUCCESS
        }
        SessionOutcome::Cancelled => {
            eprintln!("Download cancelled");
            ExitCode::from(EXIT_CANCELLED)
        }
        SessionOutcome::Failed { .. } => {
            let message = outcome
                .short_message(FAILURE_MESSAGE_CHARS)
                .unwrap_or_default();
            eprintln!("Download failed: {message}");
            ExitCode::FAILURE
        }
    }
}

fn read_batch_input(path: &Path) -> CliResult<String> {
    let input_error = |source: std::io::Error| CliError::Input {
        path: path.to_path_buf(),
        source,
    };

    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(input_error)?;
        Ok(text)
    } else {
        std::fs::read_to_string(path).map_err(input_error)
    }
}

async fn batch(config: &mut AppConfig, args: BatchArgs) -> CliResult<ExitCode> {
    apply_output_args(config, &args.output)?;
    let input = read_batch_input(&args.file)?;
    let manager = Arc::new(build_manager(config)?);

    let submission = manager.submit_batch(&input, config.quality).await;
    for (url, e) in &submission.rejected {
        eprintln!("skipped {url}: {e}");
    }
    if submission.accepted.is_empty() {
        return Err(CliError::EmptyBatch(args.file));
    }

    let total = submission.accepted.len();
    eprintln!("Downloading {total} item(s)");

    let mut tasks = JoinSet::new();
    for ticket in submission.accepted {
        let url = ticket.url().to_string();
        tasks.spawn(async move {
            let outcome = ticket.wait(|_| {}).await;
            (url, outcome)
        });
    }

    let mut succeeded = 0usize;
    let mut interrupted = false;
    loop {
        tokio::select! {
            joined = tasks.join_next() => {
                let Some(joined) = joined else { break };
                match joined {
                    Ok((url, outcome)) => {
                        match &outcome {
                            SessionOutcome::Succeeded { file_path } => {
                                succeeded += 1;
                                println!("{}", file_path.display());
                            }
                            SessionOutcome::Cancelled => eprintln!("cancelled {url}"),
                            SessionOutcome::Failed { .. } => eprintln!(
                                "failed {url}: {}",
                                outcome.short_message(FAILURE_MESSAGE_CHARS).unwrap_or_default()
                            ),
                        }
                    }
                    Err(e) => warn!(error = %e, "Download task panicked"),
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                let cancelled = manager.cancel_all().await;
                eprintln!("\nCancelling {cancelled} download(s)...");
            }
        }
    }

    info!(succeeded, total, "Batch finished");
    eprintln!("{succeeded}/{total} download(s) succeeded");

    Ok(if interrupted {
        ExitCode::from(EXIT_CANCELLED)
    } else if succeeded == total {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn show_info(config: &AppConfig, url: &str) -> CliResult<()> {
    let manager = build_manager(config)?;
    let media = manager.preview(url).await?;

    println!("Title:    {}", media.title);
    if let Some(uploader) = &media.uploader {
        println!("Uploader: {uploader}");
    }
    if let Some(duration) = media.duration_seconds {
        println!("Duration: {}", format_duration(duration));
    }
    if let Some(views) = media.view_count {
        println!("Views:    {views}");
    }
    println!("Platform: {}", vidgrab_core::platform_name(url));

    println!("Qualities:");
    for option in media.quality_options() {
        let size = option
            .estimated_size
            .map(|bytes| format!(" (~{})", format_size(bytes)))
            .unwrap_or_default();
        println!("  {:<8} {}{size}", option.quality.label(), option.label);
    }
    Ok(())
}

fn history(config: &AppConfig, action: HistoryCommand) {
    let mut store = HistoryStore::open(config.history.path());

    match action {
        HistoryCommand::List { limit, search } => {
            let records: Vec<&HistoryRecord> = match &search {
                Some(keyword) => store.search(keyword).into_iter().take(limit).collect(),
                None => store.list(limit).iter().collect(),
            };
            if records.is_empty() {
                println!("No downloads recorded");
            }
            for record in records {
                print_record(record);
            }
        }
        HistoryCommand::Delete { id } => {
            let persisted = store.delete_by_id(id);
            if let Some(warning) = &persisted.warning {
                eprintln!("warning: {warning}");
            }
            if persisted.value {
                println!("Deleted record {id}");
            } else {
                println!("No record with id {id}");
            }
        }
        HistoryCommand::Clear => {
            let persisted = store.clear();
            if let Some(warning) = &persisted.warning {
                eprintln!("warning: {warning}");
            }
            println!("Removed {} record(s)", persisted.value);
        }
    }
}

fn print_record(record: &HistoryRecord) {
    println!(
        "{:>4}  {}  {:<9} {:<10} {:<6} {}",
        record.id,
        record.downloaded_at.format("%Y-%m-%d %H:%M"),
        record.status,
        record.platform,
        record.quality,
        record.title
    );
    if !record.file_path.is_empty() {
        println!("      {}", record.file_path);
    }
}
