//! Weekly journal: entries bucketed by ISO week, background analysis,
//! mood calendar and the plain-text weekly report.

use crate::error::{AppError, StoreError, JOURNAL_SAVE_WARNING};
use crate::logging;
use crate::oracle::{self, Oracle};
use crate::prompts::{self, Template};
use crate::schemas;
use crate::store::{self, Store};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

// ============ Types ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mood {
    pub label: String,
    /// 1 (very negative) to 5 (very positive)
    #[serde(deserialize_with = "clamped_positivity")]
    pub positivity: u8,
}

fn clamped_positivity<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(1.0, 5.0) as u8)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AIAnalysis {
    pub summary: String,
    pub observations: Vec<String>,
    pub follow_up_questions: Vec<String>,
    pub mood: Mood,
}

/// Analysis of an entry captured from chat, which has no title yet
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TitledAnalysis {
    pub title: String,
    #[serde(flatten)]
    pub analysis: AIAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub date: DateTime<Utc>,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AIAnalysis>,
    #[serde(default)]
    pub is_analyzing: bool,
}

impl JournalEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            date: Utc::now(),
            title: title.into(),
            content: content.into(),
            analysis: None,
            is_analyzing: false,
        }
    }
}

// ============ Week ids ============

/// ISO-8601 week id, e.g. `2024-W05`. Early-January days can belong to the previous ISO year.
pub fn week_id(date: NaiveDate) -> String {
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

pub fn current_week_id() -> String {
    week_id(Utc::now().date_naive())
}

// ============ Journal service ============

#[derive(Serialize)]
struct AnalysisPrompt<'a> {
    title: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CapturePrompt<'a> {
    content: &'a str,
}

/// Journal operations for one user. Clones share the store and oracle.
#[derive(Clone)]
pub struct Journal {
    store: Store,
    oracle: Arc<dyn Oracle>,
    user_id: String,
    max_entries: usize,
}

impl Journal {
    pub fn new(store: Store, oracle: Arc<dyn Oracle>, user_id: impl Into<String>, max_entries: usize) -> Self {
        Self {
            store,
            oracle,
            user_id: user_id.into(),
            max_entries,
        }
    }

    fn key(&self, week: &str) -> String {
        store::journal_key(&self.user_id, week)
    }

    /// Entries for a week, newest first. A week with nothing saved is empty.
    pub fn entries(&self, week: &str) -> Result<Vec<JournalEntry>, StoreError> {
        Ok(self.store.get_json(&self.key(week))?.unwrap_or_default())
    }

    /// Prepend `entry` and evict past the weekly cap
    fn insert(&self, week: &str, entry: &JournalEntry) -> Result<(), StoreError> {
        self.store.update_json(&self.key(week), |entries: &mut Vec<JournalEntry>| {
            entries.insert(0, entry.clone());
            entries.truncate(self.max_entries);
            Ok(())
        })
    }

    /// Save a new entry immediately, marked as analyzing.
    ///
    /// A failed write does not fail the call: the entry is still returned,
    /// together with a warning for the user.
    pub fn add_entry(
        &self,
        week: &str,
        title: &str,
        content: &str,
    ) -> Result<(JournalEntry, Option<&'static str>), AppError> {
        if title.trim().is_empty() || content.trim().is_empty() {
            return Err(AppError::EmptyInput);
        }

        let mut entry = JournalEntry::new(title, content);
        entry.is_analyzing = true;

        let warning = match self.insert(week, &entry) {
            Ok(()) => None,
            Err(e) => {
                logging::log_error(None, &format!("Saving entry {} failed: {}", entry.id, e));
                Some(JOURNAL_SAVE_WARNING)
            }
        };
        logging::log_journal(None, &format!(
            "Added entry {} to {} ({} chars)",
            entry.id,
            week,
            content.len()
        ));
        Ok((entry, warning))
    }

    /// Apply a change to one stored entry. Missing entries are `NotFound`.
    fn modify<F>(&self, week: &str, id: &str, f: F) -> Result<JournalEntry, AppError>
    where
        F: FnOnce(&mut JournalEntry),
    {
        self.store.update_json(&self.key(week), |entries: &mut Vec<JournalEntry>| {
            let entry = entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| AppError::NotFound(format!("journal entry {}", id)))?;
            f(entry);
            Ok(entry.clone())
        })
    }

    /// Run the analysis call for a stored entry and persist the result.
    ///
    /// The write-back is a single store transaction on the current entries,
    /// so edits and new entries made while the call was in flight survive.
    /// On failure `is_analyzing` is cleared and `AppError::Analysis` is returned.
    pub async fn analyze_entry(&self, week: &str, id: &str) -> Result<AIAnalysis, AppError> {
        let entry = self
            .entries(week)?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| AppError::NotFound(format!("journal entry {}", id)))?;

        let prompt = prompts::render(
            Template::JournalAnalysis,
            AnalysisPrompt {
                title: &entry.title,
                content: &entry.content,
            },
        )?;

        match oracle::structured::<AIAnalysis>(self.oracle.as_ref(), &prompt, &schemas::journal_analysis()).await {
            Ok(analysis) => {
                self.modify(week, id, |e| {
                    e.analysis = Some(analysis.clone());
                    e.is_analyzing = false;
                })?;
                logging::log_journal(None, &format!(
                    "Analysis stored for {}: mood={} positivity={}",
                    id, analysis.mood.label, analysis.mood.positivity
                ));
                Ok(analysis)
            }
            Err(cause) => {
                logging::log_error(None, &format!("Analysis of {} failed: {}", id, cause));
                // The entry may have been deleted meanwhile; that is fine
                if let Err(e) = self.modify(week, id, |e| e.is_analyzing = false) {
                    logging::log_journal(None, &format!("Could not clear analyzing flag on {}: {}", id, e));
                }
                Err(AppError::Analysis(cause))
            }
        }
    }

    /// `analyze_entry` on a background task
    pub fn spawn_analysis(&self, week: &str, id: &str) -> tokio::task::JoinHandle<Result<AIAnalysis, AppError>> {
        let journal = self.clone();
        let week = week.to_string();
        let id = id.to_string();
        tokio::spawn(async move { journal.analyze_entry(&week, &id).await })
    }

    /// Edit title and content. The stored analysis is kept as is.
    pub fn update_entry(&self, week: &str, id: &str, title: &str, content: &str) -> Result<JournalEntry, AppError> {
        let updated = self.modify(week, id, |e| {
            e.title = title.to_string();
            e.content = content.to_string();
        })?;
        logging::log_journal(None, &format!("Updated entry {}", id));
        Ok(updated)
    }

    pub fn delete_entry(&self, week: &str, id: &str) -> Result<(), AppError> {
        self.store.update_json(&self.key(week), |entries: &mut Vec<JournalEntry>| {
            let before = entries.len();
            entries.retain(|e| e.id != id);
            if entries.len() == before {
                return Err(AppError::NotFound(format!("journal entry {}", id)));
            }
            Ok(())
        })?;
        logging::log_journal(None, &format!("Deleted entry {}", id));
        Ok(())
    }

    /// Analyze free text, let the model title it, and save it to the current week.
    ///
    /// The analysis call must succeed; a failed write afterwards only yields a warning.
    pub async fn capture(&self, content: &str) -> Result<(JournalEntry, Option<&'static str>), AppError> {
        let prompt = prompts::render(Template::JournalCapture, CapturePrompt { content })?;
        let titled: TitledAnalysis =
            oracle::structured(self.oracle.as_ref(), &prompt, &schemas::titled_journal_analysis()).await?;

        let mut entry = JournalEntry::new(titled.title, content);
        entry.analysis = Some(titled.analysis);

        let week = week_id(entry.date.date_naive());
        let warning = match self.insert(&week, &entry) {
            Ok(()) => None,
            Err(e) => {
                logging::log_error(None, &format!("Saving captured entry {} failed: {}", entry.id, e));
                Some(JOURNAL_SAVE_WARNING)
            }
        };
        logging::log_journal(None, &format!("Captured entry {} into {}", entry.id, week));
        Ok((entry, warning))
    }
}

// ============ Mood calendar ============

#[derive(Debug, Clone, PartialEq)]
pub struct MoodDay {
    pub date: NaiveDate,
    /// Mean positivity of the analysed entries that day
    pub average: Option<f64>,
}

impl MoodDay {
    pub fn emoji(&self) -> Option<&'static str> {
        self.average.map(mood_emoji)
    }
}

pub fn mood_emoji(positivity: f64) -> &'static str {
    if positivity > 4.5 {
        "😄"
    } else if positivity > 3.5 {
        "🙂"
    } else if positivity > 2.5 {
        "😐"
    } else if positivity > 1.5 {
        "😕"
    } else {
        "😢"
    }
}

/// Average mood per day over the `days` days ending at `today`, oldest first
pub fn mood_by_day(entries: &[JournalEntry], today: NaiveDate, days: i64) -> Vec<MoodDay> {
    let mut totals: HashMap<NaiveDate, (u32, u32)> = HashMap::new();
    for entry in entries {
        if let Some(analysis) = &entry.analysis {
            let slot = totals.entry(entry.date.date_naive()).or_insert((0, 0));
            slot.0 += u32::from(analysis.mood.positivity);
            slot.1 += 1;
        }
    }

    (0..days)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            let average = totals
                .get(&date)
                .map(|(total, count)| f64::from(*total) / f64::from(*count));
            MoodDay { date, average }
        })
        .collect()
}

/// The journal's "week at a glance": the last 8 days
pub fn mood_calendar(entries: &[JournalEntry], today: NaiveDate) -> Vec<MoodDay> {
    mood_by_day(entries, today, 8)
}

// ============ Weekly report ============

#[derive(Serialize)]
struct ReportEntry<'a> {
    title: &'a str,
    date: String,
    content: &'a str,
    analysis: Option<&'a AIAnalysis>,
}

#[derive(Serialize)]
struct ReportContext<'a> {
    week_id: &'a str,
    entries: Vec<ReportEntry<'a>>,
}

/// Plain-text export of a week, oldest entry first
pub fn weekly_report(week: &str, entries: &[JournalEntry]) -> Result<String, minijinja::Error> {
    let ctx = ReportContext {
        week_id: week,
        entries: entries
            .iter()
            .rev()
            .map(|e| ReportEntry {
                title: &e.title,
                date: e.date.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
                content: &e.content,
                analysis: e.analysis.as_ref(),
            })
            .collect(),
    };
    prompts::render(Template::WeeklyReport, ctx)
}
