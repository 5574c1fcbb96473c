//! Single-document commands: `file` and `capture`.

use std::path::Path;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncReadExt;

use ocrlens::config::Config;
use ocrlens::sources::{BatchItem, Capture, LocalSource};
use ocrlens::utils::TextStats;
use ocrlens::workflow::Workflow;
use ocrlens::OcrResult;

use super::{build_engine, build_exporter, SingleArgs};
use crate::cli::icons::Icon;

/// OCR one local image or PDF.
pub async fn cmd_file(config: &Config, path: &Path, args: SingleArgs) -> anyhow::Result<()> {
    let item = LocalSource::new(&config.sources).single_file(path).await?;
    process(config, item, args).await
}

/// OCR a camera capture read from a file or stdin.
pub async fn cmd_capture(
    config: &Config,
    input: &str,
    media_type: String,
    args: SingleArgs,
) -> anyhow::Result<()> {
    let bytes = if input == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        tokio::fs::read(input).await?
    };

    let item = Capture::new(bytes).with_media_type(media_type).into_item(1)?;
    process(config, item, args).await
}

async fn process(config: &Config, item: BatchItem, args: SingleArgs) -> anyhow::Result<()> {
    let engine = build_engine(config)?;
    let exporter = build_exporter(config, args.output);
    let workflow = Workflow::new(engine, exporter);

    let name = item.name.clone();
    workflow.load_single(item);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Reading {}...", name));
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let outcome = workflow.process_single().await;
    spinner.finish_and_clear();

    let Some(result) = outcome? else {
        anyhow::bail!("Document was replaced before processing finished");
    };

    print_summary(&name, &result, workflow.stats());
    if args.raw {
        println!("{}", result.raw_text);
    } else {
        println!("{}", result.corrected_text);
    }

    if args.save {
        let path = workflow.export().await?;
        eprintln!("{} Saved to {}", Icon::Done, path.display());
    }

    Ok(())
}

fn print_summary(name: &str, result: &OcrResult, stats: TextStats) {
    let confidence = result
        .confidence
        .map(|c| format!(", {:.0}% confidence", c * 100.0))
        .unwrap_or_default();
    eprintln!(
        "{} {} ({}, {} characters, {} paragraphs{})",
        Icon::Done,
        style(name).bold(),
        result.language,
        stats.characters,
        stats.paragraphs,
        confidence
    );

    if result.corrections.is_empty() {
        return;
    }
    eprintln!("{} {} correction(s):", Icon::Warn, result.corrections.len());
    for correction in &result.corrections {
        eprintln!(
            "  {} {} {} {}",
            style(&correction.original).red(),
            Icon::Detail,
            style(&correction.fixed).green(),
            style(format!("({})", correction.reason)).dim()
        );
    }
}
