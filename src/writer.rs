//! Message drafting assistant: helps write a hard message to someone.

use crate::error::{AppError, OracleError};
use crate::logging;
use crate::oracle::Oracle;
use crate::prompts::{self, Template};
use serde::Serialize;

const NO_KEY_POINTS: &str = "No specific points provided, focus on the main goal.";

/// Closed option list with display labels
macro_rules! options {
    ($name:ident { $($variant:ident => $label:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn from_label(label: &str) -> Option<Self> {
                Self::ALL.iter().copied().find(|o| o.label().eq_ignore_ascii_case(label.trim()))
            }
        }
    };
}

options!(Recipient {
    Parent => "Parent",
    Friend => "Friend",
    Teacher => "Teacher",
    Therapist => "Therapist",
    Other => "Other",
});

options!(Goal {
    Struggling => "Tell them I'm struggling",
    FindTherapist => "Ask for help finding a therapist",
    CancelPlans => "Cancel plans due to my mental health",
    ExplainFeelings => "Explain my feelings",
    SetBoundary => "Set a boundary",
    Apologize => "Apologize for my behavior",
    Other => "Other",
});

options!(Relationship {
    Close => "Close",
    Complicated => "Complicated",
    Formal => "Formal",
    New => "New",
});

options!(Tone {
    GentleSerious => "Gentle & Serious",
    DirectKind => "Direct but Kind",
    CasualSupportive => "Casual & Supportive",
    FormalRespectful => "Formal & Respectful",
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBrief {
    pub recipient: Recipient,
    pub goal: Goal,
    pub relationship: Relationship,
    pub tone: Tone,
    pub key_points: String,
}

impl Default for MessageBrief {
    fn default() -> Self {
        Self {
            recipient: Recipient::Parent,
            goal: Goal::Struggling,
            relationship: Relationship::Close,
            tone: Tone::GentleSerious,
            key_points: String::new(),
        }
    }
}

#[derive(Serialize)]
struct WriterPrompt<'a> {
    recipient: &'a str,
    goal: &'a str,
    relationship: &'a str,
    tone: &'a str,
    key_points: &'a str,
}

pub fn writer_prompt(brief: &MessageBrief) -> Result<String, minijinja::Error> {
    let key_points = brief.key_points.trim();
    prompts::render(
        Template::MessageWriter,
        WriterPrompt {
            recipient: brief.recipient.label(),
            goal: brief.goal.label(),
            relationship: brief.relationship.label(),
            tone: brief.tone.label(),
            key_points: if key_points.is_empty() { NO_KEY_POINTS } else { key_points },
        },
    )
}

/// Generate a draft. Calling again with the same brief regenerates.
pub async fn draft_message(oracle: &dyn Oracle, brief: &MessageBrief) -> Result<String, AppError> {
    let prompt = writer_prompt(brief)?;
    let draft = oracle.generate(&prompt).await?;
    let draft = draft.trim();
    if draft.is_empty() {
        return Err(OracleError::Schema("empty draft".to_string()).into());
    }

    logging::log_oracle(&format!(
        "Drafted message for {} ({} chars)",
        brief.recipient.label(),
        draft.len()
    ));
    Ok(draft.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::{Call, ScriptedOracle};

    #[test]
    fn test_defaults() {
        let brief = MessageBrief::default();
        assert_eq!(brief.recipient.label(), "Parent");
        assert_eq!(brief.goal.label(), "Tell them I'm struggling");
        assert_eq!(brief.relationship.label(), "Close");
        assert_eq!(brief.tone.label(), "Gentle & Serious");
    }

    #[test]
    fn test_from_label() {
        assert_eq!(Tone::from_label("direct but kind"), Some(Tone::DirectKind));
        assert_eq!(Goal::from_label(" Set a boundary "), Some(Goal::SetBoundary));
        assert_eq!(Recipient::from_label("Coach"), None);
        assert_eq!(Goal::ALL.len(), 7);
    }

    #[test]
    fn test_empty_key_points_fall_back() {
        let prompt = writer_prompt(&MessageBrief::default()).unwrap();
        assert!(prompt.contains(NO_KEY_POINTS));
    }

    #[tokio::test]
    async fn test_draft_is_trimmed() {
        let oracle = ScriptedOracle::new().then_ok("\n  Hey Mum, can we talk tonight?  \n");
        let brief = MessageBrief {
            key_points: "I've been really low lately".into(),
            ..Default::default()
        };

        let draft = draft_message(&oracle, &brief).await.unwrap();
        assert_eq!(draft, "Hey Mum, can we talk tonight?");
        assert!(matches!(&oracle.calls()[0], Call::Generate { prompt } if prompt.contains("I've been really low lately")));
    }

    #[tokio::test]
    async fn test_draft_failure() {
        let oracle = ScriptedOracle::new().then_ok("   ");
        let err = draft_message(&oracle, &MessageBrief::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Oracle(OracleError::Schema(_))));
    }
}
