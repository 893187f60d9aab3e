//! Slot extraction for a classified request.

use std::sync::LazyLock;

use regex::Regex;

use super::{Token, word_matches};
use crate::capability::{Capability, Slots};
use crate::classifier::vocabulary::DOMAIN_PATTERN;

static DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DOMAIN_PATTERN).expect("domain pattern is valid"));

// Case-sensitive on purpose: a lowercase "a" is an article.
static RECORD_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(AAAA|A|CNAME|MX|TXT|NS)\b").expect("record pattern is valid"));

static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,3}(?:\.\d{1,3}){3})\b").expect("ipv4 pattern is valid")
});

static LAST_N_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:last|past)\s+(\d+)\s+days?\b").expect("window pattern is valid")
});

static WHEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(every\s+(?:day|morning|evening|night|week|month|monday|tuesday|wednesday|thursday|friday|saturday|sunday)|daily|weekly|monthly|hourly|tomorrow(?:\s+morning|\s+evening)?|tonight|at\s+\d{1,2}(?::\d{2})?\s*(?:am|pm)?)\b",
    )
    .expect("when pattern is valid")
});

const WINDOW_WORDS: &[&str] = &[
    "yesterday", "today", "last", "past", "this", "week", "month", "time", "days", "day",
    "recently", "recent",
];

/// Extract the slots a capability's handler understands.
pub fn extract(capability: Capability, raw_text: &str, tokens: &[Token]) -> Slots {
    let mut slots = match capability {
        Capability::DomainCheck => domain_slots(raw_text, tokens),
        Capability::MemoryQuery => memory_slots(raw_text, tokens),
        Capability::FileSearch => file_slots(tokens),
        Capability::Research => research_slots(raw_text),
        Capability::Automation => automation_slots(raw_text, tokens),
        Capability::PhoneSort => phone_slots(tokens),
    };
    slots.retain(|_, v| !v.trim().is_empty());
    slots
}

fn any_word(tokens: &[Token], words: &[&str]) -> bool {
    tokens
        .iter()
        .any(|t| words.iter().any(|w| word_matches(&t.lower, w)))
}

fn is_path(token: &Token) -> bool {
    token.raw.contains('/') || token.raw.starts_with('~')
}

fn set(slots: &mut Slots, key: &str, value: impl Into<String>) {
    slots.insert(key.to_string(), value.into());
}

fn domain_slots(raw_text: &str, tokens: &[Token]) -> Slots {
    let mut slots = Slots::new();
    if let Some(domain) = tokens.iter().find(|t| DOMAIN.is_match(&t.lower)) {
        set(&mut slots, "domain", domain.lower.clone());
    }

    let fix = any_word(tokens, &["fix", "update", "change", "repair", "point", "set"]);
    set(&mut slots, "action", if fix { "fix" } else { "check" });
    if fix {
        if let Some(m) = RECORD_TYPE.captures(raw_text).and_then(|c| c.get(1)) {
            set(&mut slots, "record_type", m.as_str());
        }
        if let Some(m) = IPV4.captures(raw_text).and_then(|c| c.get(1)) {
            set(&mut slots, "value", m.as_str());
        }
    }
    slots
}

fn memory_slots(raw_text: &str, tokens: &[Token]) -> Slots {
    let mut slots = Slots::new();
    let lower = format!(
        " {} ",
        tokens
            .iter()
            .map(|t| t.lower.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let window = if let Some(days) = LAST_N_DAYS.captures(raw_text).and_then(|c| c.get(1)) {
        format!("last {} days", days.as_str())
    } else if lower.contains(" yesterday ") {
        "yesterday".into()
    } else if lower.contains(" today ") {
        "today".into()
    } else if lower.contains(" this week ") {
        "this week".into()
    } else if lower.contains(" last week ") {
        "last week".into()
    } else if lower.contains(" last month ") {
        "last month".into()
    } else {
        "recent".into()
    };
    set(&mut slots, "window", window);

    if let Some(start) = tokens
        .iter()
        .position(|t| t.lower == "about" || t.lower == "regarding")
    {
        let topic = tokens[start + 1..]
            .iter()
            .filter(|t| {
                !t.is_stop_word()
                    && !WINDOW_WORDS.contains(&t.lower.as_str())
                    && !t.lower.chars().all(|c| c.is_ascii_digit())
            })
            .map(|t| t.lower.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        set(&mut slots, "topic", topic);
    }
    slots
}

const FILE_NOISE: &[&str] = &[
    "file", "folder", "directory", "document", "find", "locate", "scan", "index", "search",
    "look", "where", "all", "any", "named", "called", "show", "list", "computer", "drive",
];
const DUPLICATE_WORDS: &[&str] = &["duplicate", "dedupe", "copies", "copy"];
const ORGANIZE_WORDS: &[&str] = &["organize", "sort", "tidy", "arrange"];

fn file_slots(tokens: &[Token]) -> Slots {
    let mut slots = Slots::new();
    let action = if any_word(tokens, DUPLICATE_WORDS) {
        "duplicates"
    } else if any_word(tokens, ORGANIZE_WORDS) {
        "organize"
    } else {
        "find"
    };
    set(&mut slots, "action", action);

    if let Some(path) = tokens.iter().find(|t| is_path(t)) {
        set(&mut slots, "path", path.raw.clone());
    }

    let query = tokens
        .iter()
        .filter(|t| {
            !t.is_stop_word()
                && !is_path(t)
                && !FILE_NOISE.iter().any(|w| word_matches(&t.lower, w))
                && !DUPLICATE_WORDS.iter().any(|w| word_matches(&t.lower, w))
                && !ORGANIZE_WORDS.iter().any(|w| word_matches(&t.lower, w))
        })
        .map(|t| t.raw.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    set(&mut slots, "query", query);
    slots
}

const RESEARCH_PREFIXES: &[&str] = &[
    "please ",
    "can you ",
    "could you ",
    "research ",
    "look up ",
    "search for ",
    "search ",
    "find information about ",
    "find information on ",
    "find info about ",
    "information about ",
    "info on ",
    "tell me about ",
    "explain ",
    "learn about ",
    "about ",
    "the ",
];

fn research_slots(raw_text: &str) -> Slots {
    let mut query = raw_text.trim().trim_end_matches(['?', '.', '!']).trim();
    'strip: loop {
        let lower = query.to_ascii_lowercase();
        for prefix in RESEARCH_PREFIXES {
            if lower.starts_with(prefix) {
                query = query[prefix.len()..].trim_start();
                continue 'strip;
            }
        }
        break;
    }

    let mut slots = Slots::new();
    set(&mut slots, "query", query);
    slots
}

fn automation_slots(raw_text: &str, tokens: &[Token]) -> Slots {
    let mut slots = Slots::new();
    let lower = raw_text.to_lowercase();

    let when = WHEN.find(raw_text);
    if let Some(m) = &when {
        set(&mut slots, "when", m.as_str().to_lowercase());
    }

    // Anything with a time expression is a scheduled task unless it is a backup.
    let action = if any_word(tokens, &["backup"]) || lower.contains("back up") {
        "backup"
    } else if any_word(tokens, &["schedule", "remind"]) || when.is_some() {
        "schedule"
    } else if any_word(tokens, &["tool", "script"]) {
        "create_tool"
    } else {
        "organize_desktop"
    };
    set(&mut slots, "action", action);

    match action {
        "backup" => {
            let mut paths = tokens.iter().filter(|t| is_path(t));
            if let Some(source) = paths.next() {
                set(&mut slots, "source", source.raw.clone());
            }
            if let Some(dest) = paths.next() {
                set(&mut slots, "destination", dest.raw.clone());
            }
        }
        "schedule" | "create_tool" => {
            let anchors: &[&str] = if action == "schedule" {
                &["schedule", "remind"]
            } else {
                &["tool", "script"]
            };
            let start = match tokens
                .iter()
                .position(|t| anchors.iter().any(|w| word_matches(&t.lower, w)))
            {
                Some(anchor) => anchor + 1,
                None if action == "schedule" => 0,
                None => return slots,
            };
            let when_words: Vec<String> = when
                .map(|m| m.as_str().to_lowercase().split_whitespace().map(String::from).collect())
                .unwrap_or_default();
            let mut rest: Vec<&Token> = tokens[start..]
                .iter()
                .filter(|t| !when_words.contains(&t.lower))
                .collect();
            while rest
                .first()
                .is_some_and(|t| matches!(t.lower.as_str(), "me" | "to" | "a" | "that" | "which" | "for" | "task"))
            {
                rest.remove(0);
            }
            let task = rest
                .iter()
                .map(|t| t.raw.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            set(&mut slots, "task", task);
        }
        _ => {}
    }
    slots
}

fn phone_slots(tokens: &[Token]) -> Slots {
    let mut slots = Slots::new();
    let action = if any_word(tokens, &["contact"]) {
        "clean_contacts"
    } else {
        "sort_photos"
    };
    set(&mut slots, "action", action);
    slots
}
