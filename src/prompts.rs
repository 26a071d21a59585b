//! Versioned prompt templates.
//!
//! Wording lives in `templates/<name>.v<N>.txt`; code only supplies named
//! placeholders. Bump the version suffix when a contract-relevant change is
//! made to a template so old and new wording can be told apart in logs.

use minijinja::{Environment, UndefinedBehavior};
use once_cell::sync::Lazy;
use serde::Serialize;

/// Trailing token the companion appends to journal-worthy replies
pub const JOURNAL_TOKEN: &str = "[JOURNAL_WORTHY]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    CompanionSystem,
    Crisis,
    JournalAnalysis,
    JournalCapture,
    WeeklySummary,
    MessageWriter,
    WeeklyReport,
}

impl Template {
    pub const ALL: [Template; 7] = [
        Template::CompanionSystem,
        Template::Crisis,
        Template::JournalAnalysis,
        Template::JournalCapture,
        Template::WeeklySummary,
        Template::MessageWriter,
        Template::WeeklyReport,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Template::CompanionSystem => "companion_system.v1",
            Template::Crisis => "crisis.v1",
            Template::JournalAnalysis => "journal_analysis.v1",
            Template::JournalCapture => "journal_capture.v1",
            Template::WeeklySummary => "weekly_summary.v1",
            Template::MessageWriter => "message_writer.v1",
            Template::WeeklyReport => "weekly_report.v1",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Template::CompanionSystem => include_str!("../templates/companion_system.v1.txt"),
            Template::Crisis => include_str!("../templates/crisis.v1.txt"),
            Template::JournalAnalysis => include_str!("../templates/journal_analysis.v1.txt"),
            Template::JournalCapture => include_str!("../templates/journal_capture.v1.txt"),
            Template::WeeklySummary => include_str!("../templates/weekly_summary.v1.txt"),
            Template::MessageWriter => include_str!("../templates/message_writer.v1.txt"),
            Template::WeeklyReport => include_str!("../templates/weekly_report.v1.txt"),
        }
    }
}

// Shared, immutable rendering environment
static ENV: Lazy<Environment<'static>> = Lazy::new(|| {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env
});

/// Render a template. A placeholder missing from `ctx` is an error, never a blank.
pub fn render<S: Serialize>(template: Template, ctx: S) -> Result<String, minijinja::Error> {
    ENV.render_named_str(template.name(), template.source(), ctx)
}

#[derive(Serialize)]
struct SystemContext<'a> {
    journal_token: &'a str,
    search_enabled: bool,
}

/// System instruction for the general-purpose companion chat
pub fn companion_system(search_enabled: bool) -> Result<String, minijinja::Error> {
    render(
        Template::CompanionSystem,
        SystemContext {
            journal_token: JOURNAL_TOKEN,
            search_enabled,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_template_names_are_versioned() {
        for template in Template::ALL {
            assert!(template.name().contains(".v"), "{} lacks a version", template.name());
        }
    }

    #[test]
    fn test_companion_system_mentions_token() {
        let with_search = companion_system(true).unwrap();
        assert!(with_search.contains(JOURNAL_TOKEN));
        assert!(with_search.contains("search tool"));

        let without_search = companion_system(false).unwrap();
        assert!(!without_search.contains("search tool"));
    }

    #[test]
    fn test_missing_placeholder_is_an_error() {
        let err = render(Template::JournalAnalysis, context! { title => "Only a title" });
        assert!(err.is_err());
    }

    #[test]
    fn test_writer_template_renders_fields() {
        let prompt = render(
            Template::MessageWriter,
            context! {
                recipient => "Teacher",
                goal => "Set a boundary",
                relationship => "Formal",
                tone => "Direct but Kind",
                key_points => "I need more time on the essay",
            },
        )
        .unwrap();
        assert!(prompt.contains("Recipient: Teacher"));
        assert!(prompt.contains("\"I need more time on the essay\""));
    }
}
