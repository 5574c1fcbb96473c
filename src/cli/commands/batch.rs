//! Batch commands: `folder` and `drive`.

use std::path::PathBuf;

use tokio::sync::mpsc;

use ocrlens::config::Config;
use ocrlens::export::ExportError;
use ocrlens::sources::drive::{DriveAdapter, FixedFolder, FolderRef};
use ocrlens::sources::{LocalSource, SourceListing};
use ocrlens::workflow::Workflow;
use ocrlens::{PipelineError, PipelineEvent, StartOutcome};

use super::{build_engine, build_exporter, BatchArgs};
use crate::cli::icons::Icon;
use crate::cli::picker::{confirm, PromptPicker};
use crate::cli::progress::ProgressView;

/// Process a local folder, or an explicit list of files.
pub async fn cmd_folder(config: &Config, paths: &[PathBuf], args: BatchArgs) -> anyhow::Result<()> {
    let workflow = build_workflow(config, &args)?;
    let source = LocalSource::new(&config.sources);

    let listing = match paths {
        [dir] if tokio::fs::metadata(dir).await?.is_dir() => source.folder(dir).await?,
        _ => source.files(paths).await?,
    };
    run_batch(workflow, listing, args).await
}

/// Process a Google Drive folder.
pub async fn cmd_drive(config: &Config, folder: Option<&str>, args: BatchArgs) -> anyhow::Result<()> {
    let workflow = build_workflow(config, &args)?;
    let adapter = DriveAdapter::from_settings(&config.drive)?;

    let listing = match folder {
        Some(folder) => {
            let picker = FixedFolder(FolderRef::parse(folder)?);
            adapter.collect(&picker).await?
        }
        None => adapter.collect(&PromptPicker).await?,
    };
    run_batch(workflow, listing, args).await
}

struct BatchWorkflow {
    workflow: Workflow,
    events: mpsc::Receiver<PipelineEvent>,
    save_on_abort: bool,
}

fn build_workflow(config: &Config, args: &BatchArgs) -> anyhow::Result<BatchWorkflow> {
    let engine = build_engine(config)?;
    let exporter = build_exporter(config, args.output.clone());
    let export = config.export.auto_export && !args.no_export;

    let (tx, rx) = mpsc::channel(64);
    let workflow = Workflow::new(engine, exporter)
        .with_auto_export(export)
        .with_events(tx);

    Ok(BatchWorkflow {
        workflow,
        events: rx,
        save_on_abort: export,
    })
}

async fn run_batch(
    mut batch: BatchWorkflow,
    listing: SourceListing,
    args: BatchArgs,
) -> anyhow::Result<()> {
    let workflow = &batch.workflow;
    workflow.load_batch(listing);

    let state = workflow.snapshot();
    for line in &state.pipeline.log {
        eprintln!("  {} {}", Icon::Bullet, line);
    }

    let mut view = ProgressView::default();
    loop {
        match drive(workflow, &mut batch.events, &mut view).await? {
            Ok(StartOutcome::Completed { .. }) => break,
            Ok(StartOutcome::AlreadyRunning) | Ok(StartOutcome::Superseded) => {
                eprintln!("{} Batch was not run to completion", Icon::Warn);
                break;
            }
            Err(err) => {
                let state = workflow.snapshot();
                eprintln!(
                    "{} {} after {} of {} item(s)",
                    Icon::Fail,
                    state.error.as_deref().unwrap_or("Batch failed"),
                    state.pipeline.processed(),
                    state.pipeline.total()
                );

                if state.pipeline.can_resume()
                    && confirm(format!(
                        "Resume from item {}?",
                        state.pipeline.cursor + 1
                    ))
                    .await?
                {
                    continue;
                }

                if batch.save_on_abort {
                    save_partial(workflow).await?;
                }
                return Err(err.into());
            }
        }
    }

    let stats = workflow.stats();
    eprintln!(
        "{} {} characters, {} paragraphs",
        Icon::Step,
        stats.characters,
        stats.paragraphs
    );
    if args.print {
        println!("{}", workflow.snapshot().edited_text);
    }
    Ok(())
}

/// Run (or resume) the batch while rendering its events in order.
async fn drive(
    workflow: &Workflow,
    events: &mut mpsc::Receiver<PipelineEvent>,
    view: &mut ProgressView,
) -> anyhow::Result<Result<StartOutcome, PipelineError>> {
    let run = workflow.start_batch();
    tokio::pin!(run);

    let outcome = loop {
        tokio::select! {
            biased;
            Some(event) = events.recv() => view.handle(event)?,
            outcome = &mut run => break outcome,
        }
    };

    while let Ok(event) = events.try_recv() {
        view.handle(event)?;
    }
    Ok(outcome)
}

async fn save_partial(workflow: &Workflow) -> anyhow::Result<()> {
    match workflow.export().await {
        Ok(path) => {
            eprintln!(
                "{} Partial text saved to {}",
                Icon::Done,
                path.display()
            );
            Ok(())
        }
        Err(ExportError::Empty) => Ok(()),
        Err(e) => Err(e.into()),
    }
}
