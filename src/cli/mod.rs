//! Terminal front end.

mod commands;
pub mod icons;
mod picker;
mod progress;

pub use commands::{is_verbose, run};
