//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::Level;
use vidgrab_core::{ContainerFormat, DEFAULT_LIST_LIMIT, QualityRequest};

use crate::logging::{LogRotation, LoggingConfig};

/// Download videos and audio from YouTube, Bilibili and other sites.
#[derive(Debug, Parser)]
#[command(name = "vidgrab", version, about)]
pub struct Cli {
    /// Print debug logs to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging options.
    #[command(flatten)]
    pub logging: LoggingArgs,

    /// Use this configuration file instead of the default one.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Logging flags.
#[derive(Debug, Args)]
pub struct LoggingArgs {
    /// Only print errors to stderr.
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write log files into this directory.
    #[arg(long, global = true, value_name = "DIR", conflicts_with = "no_log_file")]
    pub log_dir: Option<PathBuf>,

    /// Do not write a log file.
    #[arg(long, global = true)]
    pub no_log_file: bool,

    /// How often the log file is rotated.
    #[arg(long, global = true, value_enum)]
    pub log_rotation: Option<LogRotation>,
}

impl LoggingArgs {
    /// Apply the flags on top of the preset picked by `verbose`.
    #[must_use]
    pub fn to_config(&self, verbose: bool) -> LoggingConfig {
        let mut config = LoggingConfig::for_verbosity(verbose);
        if self.quiet {
            config = config.with_console_level(Level::ERROR);
        }
        if let Some(dir) = &self.log_dir {
            config = config.with_log_directory(dir);
        }
        if self.no_log_file {
            config = config.without_file();
        }
        if let Some(rotation) = self.log_rotation {
            config = config.with_rotation(rotation);
        }
        config
    }
}

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download a single URL.
    Download(DownloadArgs),

    /// Download every URL listed in a file, one per line.
    Batch(BatchArgs),

    /// Show metadata and quality options without downloading.
    Info {
        /// Media URL.
        url: String,
    },

    /// Inspect or edit the download history.
    History {
        /// History action.
        #[command(subcommand)]
        action: HistoryCommand,
    },
}

/// Options shared by `download` and `batch`.
#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Quality: best, audio, or a height cap such as 720p.
    #[arg(short, long, value_parser = parse_quality)]
    pub quality: Option<QualityRequest>,

    /// Directory to save into.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Output container for video downloads.
    #[arg(long, value_parser = parse_container)]
    pub container: Option<ContainerFormat>,

    /// Download subtitles.
    #[arg(long)]
    pub subs: bool,

    /// Embed downloaded subtitles into the video.
    #[arg(long)]
    pub embed_subs: bool,

    /// Subtitle languages, comma separated.
    #[arg(long, value_delimiter = ',', value_name = "LANGS")]
    pub sub_langs: Vec<String>,
}

/// Arguments of `download`.
#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Media URL.
    pub url: String,

    /// Save under this file name instead of the media title.
    #[arg(long)]
    pub name: Option<String>,

    /// Output options.
    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments of `batch`.
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// File with one URL per line; `-` reads stdin.
    pub file: PathBuf,

    /// Output options.
    #[command(flatten)]
    pub output: OutputArgs,
}

/// History actions.
#[derive(Debug, Subcommand)]
pub enum HistoryCommand {
    /// List recent records, newest first.
    List {
        /// Maximum number of records.
        #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,

        /// Only records whose title or platform contains this keyword.
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Delete one record.
    Delete {
        /// Record id.
        id: u64,
    },

    /// Delete all records.
    Clear,
}

fn parse_quality(value: &str) -> Result<QualityRequest, String> {
    value.parse().map_err(|e: vidgrab_core::Error| e.to_string())
}

fn parse_container(value: &str) -> Result<ContainerFormat, String> {
    value.parse().map_err(|e: vidgrab_core::Error| e.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "vidgrab",
            "download",
            "https://youtu.be/abc",
            "-q",
            "720p",
            "--container",
            "mkv",
            "--subs",
            "--sub-langs",
            "en,ja",
            "--name",
            "clip",
        ])
        .unwrap();

        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.url, "https://youtu.be/abc");
        assert_eq!(args.name.as_deref(), Some("clip"));
        assert_eq!(args.output.quality, Some(QualityRequest::CappedHeight(720)));
        assert_eq!(args.output.container, Some(ContainerFormat::Mkv));
        assert!(args.output.subs);
        assert!(!args.output.embed_subs);
        assert_eq!(args.output.sub_langs, vec!["en", "ja"]);
    }

    #[test]
    fn test_rejects_bad_quality() {
        let parsed =
            Cli::try_parse_from(["vidgrab", "download", "https://youtu.be/a", "-q", "huge"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_logging_flags() {
        let cli = Cli::try_parse_from([
            "vidgrab",
            "history",
            "clear",
            "--quiet",
            "--log-dir",
            "/tmp/vidgrab-logs",
            "--log-rotation",
            "hourly",
        ])
        .unwrap();
        let config = cli.logging.to_config(cli.verbose);
        assert_eq!(config.console_level, Level::ERROR);
        assert_eq!(config.log_directory, Some(PathBuf::from("/tmp/vidgrab-logs")));
        assert_eq!(config.rotation, LogRotation::Hourly);

        let cli = Cli::try_parse_from(["vidgrab", "-v", "--no-log-file", "history", "clear"])
            .unwrap();
        let config = cli.logging.to_config(cli.verbose);
        assert_eq!(config.console_level, Level::DEBUG);
        assert!(config.log_directory.is_none());

        assert!(Cli::try_parse_from(["vidgrab", "-v", "--quiet", "history", "clear"]).is_err());
        assert!(
            Cli::try_parse_from(["vidgrab", "--no-log-file", "--log-dir", "/x", "history", "clear"])
                .is_err()
        );
    }

    #[test]
    fn test_parse_history_list_defaults() {
        let cli = Cli::try_parse_from(["vidgrab", "--verbose", "history", "list"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::History {
                action: HistoryCommand::List { limit, search },
            } => {
                assert_eq!(limit, DEFAULT_LIST_LIMIT);
                assert!(search.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
