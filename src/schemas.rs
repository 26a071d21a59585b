//! Response schemas for the structured oracle calls.
//!
//! Written in the model API's OpenAPI subset (upper-case type names). The
//! field names here must match the serde shapes that parse the replies.

use serde_json::{json, Value};

/// Crisis escalation reply: `CrisisReply` in `crisis.rs`
pub fn crisis_response() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "is_crisis": { "type": "BOOLEAN", "description": "Should always be true." },
            "response": {
                "type": "STRING",
                "description": "A direct, empathetic 1-2 sentence response addressed to the user."
            },
            "resource": {
                "type": "OBJECT",
                "properties": {
                    "name": { "type": "STRING" },
                    "description": { "type": "STRING" },
                    "contact": { "type": "STRING" },
                    "url": { "type": "STRING" }
                },
                "required": ["name", "description", "contact", "url"]
            },
            "friend_message_draft": {
                "type": "STRING",
                "description": "A short, simple message the user can send to a friend to ask for support."
            }
        },
        "required": ["is_crisis", "response", "resource", "friend_message_draft"]
    })
}

fn analysis_properties() -> serde_json::Map<String, Value> {
    let props = json!({
        "summary": {
            "type": "STRING",
            "description": "A concise, 1-2 sentence summary of the user's emotional state and main topics."
        },
        "observations": {
            "type": "ARRAY",
            "description": "A list of 2-3 gentle, non-judgmental observations about potential patterns or themes.",
            "items": { "type": "STRING" }
        },
        "followUpQuestions": {
            "type": "ARRAY",
            "description": "A list of 2-3 open-ended, reflective questions to encourage deeper thought.",
            "items": { "type": "STRING" }
        },
        "mood": {
            "type": "OBJECT",
            "properties": {
                "label": {
                    "type": "STRING",
                    "description": "A single descriptive word for the overall mood (e.g. 'Reflective', 'Anxious', 'Hopeful')."
                },
                "positivity": {
                    "type": "INTEGER",
                    "description": "An integer from 1 (very negative) to 5 (very positive)."
                }
            },
            "required": ["label", "positivity"]
        }
    });

    match props {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// Journal analysis for an entry that already has a title
pub fn journal_analysis() -> Value {
    json!({
        "type": "OBJECT",
        "properties": Value::Object(analysis_properties()),
        "required": ["summary", "observations", "followUpQuestions", "mood"]
    })
}

/// Journal analysis that also names the entry (entries captured from chat)
pub fn titled_journal_analysis() -> Value {
    let mut props = analysis_properties();
    props.insert(
        "title".to_string(),
        json!({
            "type": "STRING",
            "description": "A short, 4-6 word descriptive title for the journal entry, based on its content."
        }),
    );

    json!({
        "type": "OBJECT",
        "properties": Value::Object(props),
        "required": ["title", "summary", "observations", "followUpQuestions", "mood"]
    })
}

/// Weekly dashboard summary
pub fn weekly_summary() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": {
                "type": "STRING",
                "description": "A 2-3 sentence compassionate summary of the user's weekly emotional state, addressed to the user as 'you'."
            },
            "themes": {
                "type": "ARRAY",
                "description": "A list of 2-3 key themes or anxieties, each with an actionable reflection point.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "theme": { "type": "STRING", "description": "A concise name for the theme or anxiety." },
                        "reflection": { "type": "STRING", "description": "A simple, gentle question or reflection point." }
                    },
                    "required": ["theme", "reflection"]
                }
            },
            "isSufficient": {
                "type": "BOOLEAN",
                "description": "True if there is enough content to create a meaningful summary, otherwise false."
            }
        },
        "required": ["summary", "themes", "isSufficient"]
    })
}
