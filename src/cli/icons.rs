//! Status glyphs that lead every line the front end prints.

use std::fmt;

use console::style;

/// Leading glyph of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    /// An item or a command finished.
    Done,
    /// Progress or neutral information.
    Step,
    /// Something was skipped or needs attention.
    Warn,
    /// A failure.
    Fail,
    /// Secondary detail under the previous line.
    Detail,
    /// Entry of a list, e.g. the batch log.
    Bullet,
}

impl fmt::Display for Icon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let glyph = match self {
            Self::Done => style("✓").green(),
            Self::Step => style("→").cyan(),
            Self::Warn => style("!").yellow(),
            Self::Fail => style("✗").red(),
            Self::Detail => style("→").dim(),
            Self::Bullet => style("•").dim(),
        };
        write!(f, "{}", glyph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icons_render_their_glyph() {
        console::set_colors_enabled(false);
        assert_eq!(Icon::Done.to_string(), "✓");
        assert_eq!(Icon::Fail.to_string(), "✗");
        assert_eq!(Icon::Step.to_string(), Icon::Detail.to_string());
        assert_ne!(Icon::Warn.to_string(), Icon::Bullet.to_string());
    }
}
