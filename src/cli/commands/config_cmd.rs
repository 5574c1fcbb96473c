//! Configuration management commands.

use console::style;

use ocrlens::config::{Config, PdfPolicy};
use ocrlens::sources::pdftoppm_available;

use crate::cli::icons::Icon;

/// Print the effective configuration as TOML with secrets masked.
pub fn cmd_config_show(config: &Config) -> anyhow::Result<()> {
    print!("{}", config.redacted().to_toml()?);
    Ok(())
}

/// Print where the configuration came from.
pub fn cmd_config_path(config: &Config) -> anyhow::Result<()> {
    match &config.source_path {
        Some(path) => println!("{}", path.display()),
        None => eprintln!(
            "{} No config file found, using defaults and environment",
            Icon::Warn
        ),
    }
    Ok(())
}

/// Report which features are usable with the current settings.
pub fn cmd_config_check(config: &Config) -> anyhow::Result<()> {
    let check = |ok: bool, label: &str, hint: &str| {
        if ok {
            eprintln!("{} {}", Icon::Done, label);
        } else {
            eprintln!("{} {}", Icon::Fail, label);
            eprintln!("  {} {}", Icon::Detail, style(hint).dim());
        }
    };

    check(
        config.ocr.api_key.is_some(),
        &format!("Gemini API key ({})", config.ocr.model),
        "set GEMINI_API_KEY",
    );

    let drive = &config.drive;
    check(
        drive.has_refresh_credentials() || drive.access_token.is_some(),
        "Google Drive credentials",
        "set GOOGLE_DRIVE_TOKEN, or GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REFRESH_TOKEN",
    );

    let needs_pdftoppm = config.sources.pdf_policy == PdfPolicy::PerPage;
    if needs_pdftoppm || pdftoppm_available() {
        check(
            pdftoppm_available(),
            "pdftoppm (per-page PDF splitting)",
            "install poppler-utils or set pdf_policy = \"whole\"",
        );
    }

    eprintln!(
        "{} Exports go to {}",
        Icon::Detail,
        config.export.resolved_output_dir().display()
    );
    Ok(())
}
