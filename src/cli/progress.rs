//! Progress rendering for pipeline events.

use indicatif::{ProgressBar, ProgressStyle};

use ocrlens::PipelineEvent;

use super::icons::Icon;

/// Turns pipeline events into a progress bar and status lines.
#[derive(Default)]
pub struct ProgressView {
    bar: Option<ProgressBar>,
}

impl ProgressView {
    pub fn handle(&mut self, event: PipelineEvent) -> anyhow::Result<()> {
        match event {
            PipelineEvent::Started { total, resume_from } => {
                if resume_from > 0 {
                    eprintln!(
                        "{} Resuming at item {} of {}",
                        Icon::Step,
                        resume_from + 1,
                        total
                    );
                } else {
                    eprintln!("{} Processing {} item(s)", Icon::Step, total);
                }
                let bar = ProgressBar::new(total as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}",
                        )?
                        .progress_chars("#>-"),
                );
                bar.set_position(resume_from as u64);
                bar.enable_steady_tick(std::time::Duration::from_millis(120));
                self.bar = Some(bar);
            }
            PipelineEvent::ItemStarted { name, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_message(name);
                }
            }
            PipelineEvent::ItemCompleted {
                name, characters, ..
            } => {
                if let Some(bar) = &self.bar {
                    bar.println(format!("{} {} ({} characters)", Icon::Done, name, characters));
                    bar.inc(1);
                }
            }
            PipelineEvent::Failed {
                index, name, error: message, ..
            } => {
                if let Some(bar) = self.bar.take() {
                    bar.abandon();
                }
                eprintln!("{} Item {} ({}) failed: {}", Icon::Fail, index + 1, name, message);
            }
            PipelineEvent::Completed { total, exported } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                eprintln!("{} Processed {} item(s)", Icon::Done, total);
                if let Some(path) = exported {
                    eprintln!("  {} Saved to {}", Icon::Step, path.display());
                }
            }
        }
        Ok(())
    }
}
