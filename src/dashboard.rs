//! Dashboard: profile, cached weekly summary, mood chart, activity streak
//! and the resource hub.

use crate::error::{AppError, StoreError};
use crate::journal::{self, Journal, JournalEntry, MoodDay};
use crate::logging;
use crate::oracle::{self, Oracle};
use crate::prompts::{self, Template};
use crate::schemas;
use crate::store::{self, Store};
use chrono::{Duration, NaiveDate};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const KEY_LIFE_AREAS: [&str; 8] = [
    "Work / Career",
    "Academics / School",
    "Family & Home Life",
    "Friendships & Social Life",
    "Romantic Relationships",
    "Health & Fitness",
    "Personal Growth",
    "Finances",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub profession: String,
    pub key_life_areas: Vec<String>,
}

/// "Welcome back", with the name when one is set
pub fn greeting(profile: &UserProfile) -> String {
    let name = profile.name.trim();
    if name.is_empty() {
        "Welcome back".to_string()
    } else {
        format!("Welcome back, {}", name)
    }
}

// ============ Resource hub ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubResource {
    pub name: &'static str,
    pub description: &'static str,
    pub url: &'static str,
}

pub const RESOURCE_HUB: [HubResource; 4] = [
    HubResource {
        name: "The Trevor Project",
        description: "Provides crisis intervention and suicide prevention services to lesbian, gay, bisexual, transgender, queer & questioning (LGBTQ) young people under 25.",
        url: "https://www.thetrevorproject.org/",
    },
    HubResource {
        name: "Kids Help Phone",
        description: "A Canadian 24/7, national, bilingual, professional counselling, information and referrals and text-based support for young people.",
        url: "https://kidshelpphone.ca/",
    },
    HubResource {
        name: "NAMI (National Alliance on Mental Illness)",
        description: "The largest grassroots mental health organization in the U.S. dedicated to building better lives for millions of Americans affected by mental illness.",
        url: "https://www.nami.org/",
    },
    HubResource {
        name: "The Jed Foundation (JED)",
        description: "A nonprofit that protects emotional health and prevents suicide for our nation's teens and young adults.",
        url: "https://www.jedfoundation.org/",
    },
];

/// One hub resource picked at random
pub fn spotlight() -> &'static HubResource {
    RESOURCE_HUB.choose(&mut rand::rng()).unwrap_or(&RESOURCE_HUB[0])
}

// ============ Weekly summary ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub theme: String,
    pub reflection: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub summary: String,
    pub themes: Vec<Theme>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryReply {
    summary: String,
    themes: Vec<Theme>,
    is_sufficient: bool,
}

/// Stored summary plus what it was computed from
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedSummary {
    entry_ids: Vec<String>,
    content_hash: u64,
    summary: Option<WeeklySummary>,
}

// Only used to notice edits; a hash change across toolchains just costs a regeneration
fn content_hash(entries: &[JournalEntry]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for entry in entries {
        entry.title.hash(&mut hasher);
        entry.content.hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Serialize)]
struct SummaryPrompt<'a> {
    entries: &'a [JournalEntry],
}

// ============ Activity ============

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Last 7 days, oldest first, with whether anything was written
    pub days: Vec<(NaiveDate, bool)>,
    /// Consecutive days with an entry, counted back from today (or yesterday
    /// when nothing has been written yet today)
    pub streak: u32,
}

pub fn activity(entries: &[JournalEntry], today: NaiveDate) -> Activity {
    let written: HashSet<NaiveDate> = entries.iter().map(|e| e.date.date_naive()).collect();

    let days = (0..7)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            (date, written.contains(&date))
        })
        .collect();

    let start = if written.contains(&today) {
        today
    } else {
        today - Duration::days(1)
    };
    let streak = (0..7)
        .take_while(|back| written.contains(&(start - Duration::days(*back))))
        .count() as u32;

    Activity { days, streak }
}

/// Mood averages for the dashboard chart: today and the six days before
pub fn mood_chart(entries: &[JournalEntry], today: NaiveDate) -> Vec<MoodDay> {
    journal::mood_by_day(entries, today, 7)
}

// ============ Service ============

#[derive(Clone)]
pub struct Dashboard {
    store: Store,
    oracle: Arc<dyn Oracle>,
    journal: Journal,
    user_id: String,
}

impl Dashboard {
    pub fn new(store: Store, oracle: Arc<dyn Oracle>, journal: Journal, user_id: impl Into<String>) -> Self {
        Self {
            store,
            oracle,
            journal,
            user_id: user_id.into(),
        }
    }

    /// Saved profile, or an empty one
    pub fn load_profile(&self) -> Result<UserProfile, StoreError> {
        Ok(self
            .store
            .get_json(&store::profile_key(&self.user_id))?
            .unwrap_or_default())
    }

    /// Persist a profile. Life areas outside `KEY_LIFE_AREAS` are dropped.
    pub fn save_profile(&self, profile: &UserProfile) -> Result<UserProfile, StoreError> {
        let mut profile = profile.clone();
        let mut seen = HashSet::new();
        profile
            .key_life_areas
            .retain(|area| KEY_LIFE_AREAS.contains(&area.as_str()) && seen.insert(area.clone()));
        self.store.set_json(&store::profile_key(&self.user_id), &profile)?;
        logging::log_storage(&format!(
            "Saved profile for {} ({} life areas)",
            self.user_id,
            profile.key_life_areas.len()
        ));
        Ok(profile)
    }

    /// Summary of a week's entries. `None` when there are no entries or the
    /// model judged them too thin. Regenerated only when the entries change.
    pub async fn weekly_summary(&self, week: &str) -> Result<Option<WeeklySummary>, AppError> {
        let entries = self.journal.entries(week)?;
        if entries.is_empty() {
            return Ok(None);
        }

        let key = store::summary_key(&self.user_id, week);
        let entry_ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
        let hash = content_hash(&entries);

        match self.store.get_json::<CachedSummary>(&key) {
            Ok(Some(cached)) if cached.entry_ids == entry_ids && cached.content_hash == hash => {
                return Ok(cached.summary);
            }
            Ok(_) => {}
            Err(e) => logging::log_storage(&format!("Ignoring unreadable summary cache {}: {}", key, e)),
        }

        let prompt = prompts::render(Template::WeeklySummary, SummaryPrompt { entries: &entries })?;
        let reply: SummaryReply =
            oracle::structured(self.oracle.as_ref(), &prompt, &schemas::weekly_summary()).await?;

        let summary = reply.is_sufficient.then(|| WeeklySummary {
            summary: reply.summary,
            themes: reply.themes,
        });
        logging::log_journal(None, &format!(
            "Weekly summary for {} over {} entries (sufficient={})",
            week,
            entries.len(),
            summary.is_some()
        ));

        let cached = CachedSummary {
            entry_ids,
            content_hash: hash,
            summary: summary.clone(),
        };
        if let Err(e) = self.store.set_json(&key, &cached) {
            logging::log_error(None, &format!("Could not cache weekly summary: {}", e));
        }

        Ok(summary)
    }
}
