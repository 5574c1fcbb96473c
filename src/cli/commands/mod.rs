//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod batch;
mod config_cmd;
mod single;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use ocrlens::config::{Config, PdfPolicy};
use ocrlens::{Exporter, GeminiClient, OcrEngine};

#[derive(Parser)]
#[command(name = "ocrlens")]
#[command(about = "Extract text from documents with a vision LLM")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Model to use (overrides config)
    #[arg(long, global = true, env = "OCRLENS_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

/// Options shared by the single-document commands.
#[derive(Args)]
struct SingleArgs {
    /// Also write the text to an export file
    #[arg(short, long)]
    save: bool,

    /// Directory for exported text (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the raw extraction instead of the corrected text
    #[arg(long)]
    raw: bool,
}

/// Options shared by the batch commands.
#[derive(Args)]
struct BatchArgs {
    /// Directory for exported text (overrides config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Do not export automatically when the batch completes
    #[arg(long)]
    no_export: bool,

    /// Print the consolidated text to stdout when done
    #[arg(short, long)]
    print: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a single image or PDF
    File {
        /// Image or PDF to read
        path: PathBuf,
        #[command(flatten)]
        args: SingleArgs,
    },

    /// Extract text from a camera capture (encoded image bytes)
    Capture {
        /// Image file, or "-" to read from stdin
        #[arg(default_value = "-")]
        input: String,
        /// Media type of the capture
        #[arg(long, default_value = ocrlens::sources::DEFAULT_CAPTURE_TYPE)]
        media_type: String,
        #[command(flatten)]
        args: SingleArgs,
    },

    /// Process a local folder (recursively) or a list of files as one batch
    Folder {
        /// A folder, or several files
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// How PDFs are sent (overrides config)
        #[arg(long, value_enum)]
        pdf_policy: Option<PdfPolicy>,
        #[command(flatten)]
        args: BatchArgs,
    },

    /// Process a Google Drive folder as one batch
    Drive {
        /// Folder URL or id (prompted for when omitted)
        folder: Option<String>,
        #[command(flatten)]
        args: BatchArgs,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration (secrets masked)
    Show,
    /// Print the path of the loaded config file
    Path,
    /// Check credentials and external tools
    Check,
}

/// Build the OCR engine, failing early when it cannot run.
fn build_engine(config: &Config) -> anyhow::Result<Arc<dyn OcrEngine>> {
    let client = GeminiClient::from_settings(&config.ocr)?;
    if !client.is_available() {
        anyhow::bail!(
            "GEMINI_API_KEY not set. Get an API key from https://ai.google.dev/ \
             and export it or add it to .env"
        );
    }
    Ok(Arc::new(client))
}

fn build_exporter(config: &Config, output: Option<PathBuf>) -> Exporter {
    match output {
        Some(dir) => Exporter::new(dir),
        None => Exporter::from_settings(&config.export),
    }
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_with(cli.config.as_deref()).await?;
    if let Some(model) = cli.model {
        config.ocr.model = model;
    }

    match cli.command {
        Commands::File { path, args } => single::cmd_file(&config, &path, args).await,
        Commands::Capture {
            input,
            media_type,
            args,
        } => single::cmd_capture(&config, &input, media_type, args).await,
        Commands::Folder {
            paths,
            pdf_policy,
            args,
        } => {
            if let Some(policy) = pdf_policy {
                config.sources.pdf_policy = policy;
            }
            batch::cmd_folder(&config, &paths, args).await
        }
        Commands::Drive { folder, args } => {
            batch::cmd_drive(&config, folder.as_deref(), args).await
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => config_cmd::cmd_config_show(&config),
            ConfigCommands::Path => config_cmd::cmd_config_path(&config),
            ConfigCommands::Check => config_cmd::cmd_config_check(&config),
        },
    }
}
