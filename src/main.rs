use anyhow::{Context, Result};
use chrono::Utc;
use mindful_lib::chat::{Conversation, Message, TurnOutcome};
use mindful_lib::config::AppConfig;
use mindful_lib::dashboard::{self, UserProfile};
use mindful_lib::error::{AppError, DRAFT_FAILED, JOURNAL_ANALYSIS_FAILED, SUMMARY_FAILED};
use mindful_lib::journal::{self, JournalEntry};
use mindful_lib::writer::{Goal, MessageBrief, Recipient, Relationship, Tone};
use mindful_lib::{open_store, validate_and_save_api_key, MindfulApp};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

fn prompt(label: &str) -> Result<()> {
    print!("{}", label);
    std::io::stdout().flush()?;
    Ok(())
}

fn print_help() {
    println!("Type to chat. Commands:");
    println!("  /journal                 Toggle journal mode (messages become journal entries)");
    println!("  /save                    Save the last journal-worthy exchange to your journal");
    println!("  /add <title> | <text>    Write a journal entry");
    println!("  /entries                 This week's entries and mood");
    println!("  /summary                 Weekly summary");
    println!("  /report                  Weekly report as text");
    println!("  /draft <key points>      Draft a message (recipient|goal|relationship|tone|points also accepted)");
    println!("  /name <name>             Set your name");
    println!("  /resources               Support organisations");
    println!("  /logout                  Forget the saved API key and exit");
    println!("  /quit                    Exit");
}

fn print_message(message: &Message) {
    if message.is_crisis {
        println!("\n{}", message.text);
        if let Some(resource) = &message.resource {
            println!("  {}: {}", resource.name, resource.contact);
            println!("  {}", resource.url);
        }
        if let Some(draft) = &message.friend_message_draft {
            println!("  Message a friend: \"{}\"", draft);
        }
        println!();
        return;
    }

    if let Some(analysis) = &message.analysis {
        println!("\nSaved to your journal: {}", message.journal_title.as_deref().unwrap_or("Untitled"));
        println!("  Mood: {} ({}/5)", analysis.mood.label, analysis.mood.positivity);
        println!("  {}", analysis.summary);
        for question in &analysis.follow_up_questions {
            println!("  ? {}", question);
        }
        println!();
        return;
    }

    println!("\n{}", message.text);
    for source in &message.sources {
        println!("  [{}] {}", source.title, source.uri);
    }
    if message.is_journal_worthy {
        println!("  (type /save to add this to your journal)");
    }
    println!();
}

fn print_outcome(outcome: &TurnOutcome) {
    print_message(&outcome.message);
    if let Some(warning) = outcome.warning {
        println!("  ! {}", warning);
    }
}

fn print_entries(entries: &[JournalEntry]) {
    if entries.is_empty() {
        println!("No entries this week yet.");
        return;
    }
    for entry in entries {
        let mood = match (&entry.analysis, entry.is_analyzing) {
            (Some(a), _) => format!("{} {}", journal::mood_emoji(f64::from(a.mood.positivity)), a.mood.label),
            (None, true) => "analyzing...".to_string(),
            (None, false) => "-".to_string(),
        };
        println!("  {}  {}  [{}]", entry.date.format("%a %b %-d"), entry.title, mood);
    }

    let calendar = journal::mood_calendar(entries, Utc::now().date_naive());
    let glance: Vec<&str> = calendar.iter().map(|d| d.emoji().unwrap_or("-")).collect();
    println!("  Week at a glance: {}", glance.join(" "));
}

fn parse_brief(args: &str) -> Option<MessageBrief> {
    let parts: Vec<&str> = args.split('|').map(str::trim).collect();
    if parts.len() < 5 {
        return Some(MessageBrief {
            key_points: args.trim().to_string(),
            ..Default::default()
        });
    }
    Some(MessageBrief {
        recipient: Recipient::from_label(parts[0])?,
        goal: Goal::from_label(parts[1])?,
        relationship: Relationship::from_label(parts[2])?,
        tone: Tone::from_label(parts[3])?,
        key_points: parts[4..].join(" | "),
    })
}

/// Ask for an API key until one validates
async fn setup_api_key(config: &AppConfig, input: &mut Input) -> Result<()> {
    let store = open_store(config)?;
    println!("Welcome to Mindful Youth. Please paste your Gemini API key to get started.");
    loop {
        prompt("API key> ")?;
        let Some(line) = input.next_line().await? else {
            anyhow::bail!("No API key provided");
        };
        let key = line.trim();
        if key.is_empty() {
            continue;
        }
        match validate_and_save_api_key(config, &store, key).await {
            Ok(true) => {
                println!("Key saved.");
                return Ok(());
            }
            Ok(false) => println!("That key was not accepted. Please check it and try again."),
            Err(e) => println!("{}", e.user_message()),
        }
    }
}

async fn run_command(app: &MindfulApp, conversation: &mut Conversation, journal_mode: &mut bool, line: &str) -> Result<bool> {
    let (command, args) = line.split_once(' ').unwrap_or((line, ""));
    let args = args.trim();
    let week = journal::current_week_id();

    match command {
        "/quit" | "/exit" => return Ok(false),
        "/logout" => {
            match app.forget_api_key() {
                Ok(()) => println!("Your saved API key was removed."),
                Err(e) => println!("{}", e.user_message()),
            }
            return Ok(false);
        }
        "/help" => print_help(),
        "/journal" => {
            *journal_mode = !*journal_mode;
            println!("Journal mode {}.", if *journal_mode { "on" } else { "off" });
        }
        "/save" => {
            let target = conversation
                .messages()
                .iter()
                .rev()
                .find(|m| m.is_journal_worthy)
                .map(|m| m.id.clone());
            match target {
                Some(id) => match conversation.save_journal_from_chat(&id).await {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(e) => println!("{}", e.user_message()),
                },
                None => println!("Nothing to save yet."),
            }
        }
        "/add" => {
            let Some((title, content)) = args.split_once('|') else {
                println!("Usage: /add <title> | <text>");
                return Ok(true);
            };
            match app.journal().add_entry(&week, title.trim(), content.trim()) {
                Ok((entry, warning)) => {
                    println!("Saved \"{}\". Analyzing...", entry.title);
                    if let Some(warning) = warning {
                        println!("  ! {}", warning);
                    }
                    match app.journal().spawn_analysis(&week, &entry.id).await {
                        Ok(Ok(analysis)) => println!("  Mood: {} ({}/5). {}", analysis.mood.label, analysis.mood.positivity, analysis.summary),
                        Ok(Err(e)) => println!("  {}", e.user_message()),
                        Err(_) => println!("  {}", JOURNAL_ANALYSIS_FAILED),
                    }
                }
                Err(e) => println!("{}", e.user_message()),
            }
        }
        "/entries" => match app.journal().entries(&week) {
            Ok(entries) => print_entries(&entries),
            Err(_) => println!("{}", mindful_lib::error::JOURNAL_LOAD_FAILED),
        },
        "/summary" => match app.dashboard().weekly_summary(&week).await {
            Ok(Some(summary)) => {
                println!("\n{}", summary.summary);
                for theme in summary.themes {
                    println!("  {}: {}", theme.theme, theme.reflection);
                }
                println!();
            }
            Ok(None) => println!("Write a few journal entries this week to see your summary."),
            Err(_) => println!("{}", SUMMARY_FAILED),
        },
        "/report" => match app.weekly_report(&week) {
            Ok(report) => println!("{}", report),
            Err(e) => println!("{}", e.user_message()),
        },
        "/draft" => match parse_brief(args) {
            Some(brief) => match app.draft_message(&brief).await {
                Ok(draft) => println!("\n{}\n", draft),
                Err(_) => println!("{}", DRAFT_FAILED),
            },
            None => println!("Unknown option. Usage: /draft recipient | goal | relationship | tone | key points"),
        },
        "/name" => {
            let profile = app.dashboard().load_profile().unwrap_or_default();
            let profile = UserProfile {
                name: args.to_string(),
                ..profile
            };
            match app.dashboard().save_profile(&profile) {
                Ok(saved) => println!("{}.", dashboard::greeting(&saved)),
                Err(e) => println!("{}", AppError::from(e).user_message()),
            }
        }
        "/resources" => {
            for resource in dashboard::RESOURCE_HUB.iter() {
                println!("  {} - {}", resource.name, resource.url);
            }
            let spotlight = dashboard::spotlight();
            println!("Spotlight: {}. {}", spotlight.name, spotlight.description);
        }
        _ => println!("Unknown command. Type /help for the list."),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let config = AppConfig::from_env().context("reading configuration")?;
    let mut input: Input = BufReader::new(tokio::io::stdin()).lines();

    let app = match MindfulApp::init(config.clone()) {
        Ok(app) => app,
        Err(AppError::MissingApiKey) => {
            setup_api_key(&config, &mut input).await?;
            MindfulApp::init(config)?
        }
        Err(e) => return Err(e.into()),
    };

    let profile = app.dashboard().load_profile().unwrap_or_default();
    println!("{}. How are you feeling today?", dashboard::greeting(&profile));
    print_help();

    let mut conversation = app.new_conversation()?;
    let mut journal_mode = false;

    loop {
        prompt(if journal_mode { "journal> " } else { "you> " })?;
        let Some(line) = input.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('/') {
            if !run_command(&app, &mut conversation, &mut journal_mode, line).await? {
                break;
            }
            continue;
        }

        match conversation.send_message(line, None, journal_mode).await {
            Ok(outcome) => print_outcome(&outcome),
            Err(e) => println!("{}", e.user_message()),
        }
    }

    println!("Take care of yourself.");
    Ok(())
}
