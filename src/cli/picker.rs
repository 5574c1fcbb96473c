//! Terminal stand-ins for interactive pickers and prompts.

use async_trait::async_trait;
use console::{style, Term};

use ocrlens::sources::drive::{FolderPicker, FolderRef};
use ocrlens::sources::SourceError;

/// Asks for a Drive folder URL or id on the terminal. An empty answer
/// dismisses the picker.
pub struct PromptPicker;

#[async_trait]
impl FolderPicker for PromptPicker {
    async fn pick(&self) -> Result<FolderRef, SourceError> {
        let answer = tokio::task::spawn_blocking(|| {
            let term = Term::stderr();
            term.write_str(&format!(
                "{} Drive folder URL or id: ",
                style("?").cyan().bold()
            ))?;
            term.read_line()
        })
        .await
        .map_err(|e| SourceError::Adapter(format!("Folder prompt failed: {}", e)))?
        .map_err(|e| SourceError::Adapter(format!("Folder prompt failed: {}", e)))?;

        if answer.trim().is_empty() {
            return Err(SourceError::Adapter("Folder selection cancelled".to_string()));
        }
        FolderRef::parse(&answer)
    }
}

/// Ask a yes/no question, defaulting to yes. Returns false when nobody is
/// attending the terminal.
pub async fn confirm(question: String) -> anyhow::Result<bool> {
    if !console::user_attended_stderr() {
        return Ok(false);
    }

    let answer = tokio::task::spawn_blocking(move || {
        let term = Term::stderr();
        term.write_str(&format!("{} {} [Y/n] ", style("?").cyan().bold(), question))?;
        term.read_line()
    })
    .await??;

    let answer = answer.trim();
    Ok(answer.is_empty() || answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}
