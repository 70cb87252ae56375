//! Terminal palette
//!
//! Output helpers ask for a `Role` instead of a concrete color, so the whole
//! CLI switches between colored and plain output in one place.

use owo_colors::{OwoColorize, Style};
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// What a piece of text means on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Title,
    Ok,
    Failure,
    Caution,
    Note,
    Label,
    Aside,
    /// Value went up
    Rise,
    /// Value went down
    Fall,
}

impl Role {
    /// `Rise` or `Fall` by the sign of `change`; `None` when flat
    pub fn for_change(change: f64) -> Option<Role> {
        if change > 0.0 {
            Some(Role::Rise)
        } else if change < 0.0 {
            Some(Role::Fall)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    colored: bool,
}

impl Theme {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    /// Colored unless quiet mode is on or stdout is redirected
    pub fn detect() -> Self {
        Self::new(!crate::output::is_quiet() && console::Term::stdout().is_term())
    }

    pub fn style(&self, role: Role) -> Style {
        if !self.colored {
            return Style::new();
        }
        match role {
            Role::Title => Style::new().cyan().bold(),
            Role::Ok => Style::new().green().bold(),
            Role::Failure => Style::new().red().bold(),
            Role::Caution => Style::new().yellow().bold(),
            Role::Note => Style::new().blue(),
            Role::Label => Style::new().dimmed(),
            Role::Aside => Style::new().bright_black(),
            Role::Rise => Style::new().red(),
            Role::Fall => Style::new().blue(),
        }
    }

    pub fn paint(&self, role: Role, text: &str) -> String {
        if !self.colored {
            return text.to_string();
        }
        text.style(self.style(role)).to_string()
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
