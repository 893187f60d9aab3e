//! Intent classifier: keyword-density matching over each capability's triggers.
//!
//! Deterministic: the same registered capabilities and the same text always
//! produce the same intent. Confidence is the share of content words (stop
//! words removed) that hit a capability's triggers, clamped to 1.0. The best
//! score wins; ties go to the capability declared first. Anything below the
//! threshold comes back as an unresolved intent rather than an error.

pub mod slots;
pub mod vocabulary;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::capability::{Capability, CapabilityRegistry, Slots, Trigger};
use crate::error::ConfigError;

pub use vocabulary::{DOMAIN_PATTERN, EXAMPLE_REQUESTS, STOP_WORDS};

/// Default minimum confidence for a resolved intent.
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// The classifier's structured reading of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Intent {
    /// `None` for the unresolved intent.
    pub capability: Option<Capability>,
    pub slots: Slots,
    /// In `0.0..=1.0`.
    pub confidence: f32,
}

impl Intent {
    /// The special intent returned when nothing clears the threshold.
    pub fn unresolved(confidence: f32) -> Self {
        Self {
            capability: None,
            slots: Slots::new(),
            confidence,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.capability.is_some()
    }
}

/// One word of the input, trimmed of surrounding punctuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// As typed (paths and names keep their case).
    pub raw: String,
    /// Lowercased, used for matching.
    pub lower: String,
}

impl Token {
    pub fn is_stop_word(&self) -> bool {
        STOP_WORDS.contains(&self.lower.as_str())
    }
}

/// Split text into tokens, stripping punctuation at the edges of each word.
pub fn tokenize(text: &str) -> Vec<Token> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !(c.is_alphanumeric() || "/~_-".contains(c))))
        .filter(|w| !w.is_empty())
        .map(|w| Token {
            raw: w.to_string(),
            lower: w.to_lowercase(),
        })
        .collect()
}

/// True if `token` is `word` or a simple inflection of it.
fn word_matches(token: &str, word: &str) -> bool {
    if token == word {
        return true;
    }
    if let Some(rest) = token.strip_prefix(word)
        && matches!(rest, "s" | "es" | "ed" | "d" | "ing")
    {
        return true;
    }
    // organize → organizing
    word.strip_suffix('e')
        .and_then(|stem| token.strip_prefix(stem))
        .is_some_and(|rest| rest == "ing")
}

/// Compiled triggers for one capability.
#[derive(Debug, Clone)]
pub struct CapabilityRule {
    pub capability: Capability,
    words: Vec<&'static str>,
    phrases: Vec<&'static str>,
    patterns: Vec<Regex>,
}

impl CapabilityRule {
    /// Compile a capability's triggers.
    pub fn new(capability: Capability, triggers: Vec<Trigger>) -> Result<Self, ConfigError> {
        let mut rule = Self {
            capability,
            words: Vec::new(),
            phrases: Vec::new(),
            patterns: Vec::new(),
        };
        for trigger in triggers {
            match trigger {
                Trigger::Word(w) => rule.words.push(w),
                Trigger::Phrase(p) => rule.phrases.push(p),
                Trigger::Pattern(p) => {
                    let re = Regex::new(p).map_err(|e| ConfigError::InvalidValue {
                        key: format!("{capability} trigger pattern"),
                        message: e.to_string(),
                    })?;
                    rule.patterns.push(re);
                }
            }
        }
        Ok(rule)
    }

    /// Rule with the built-in vocabulary.
    pub fn with_defaults(capability: Capability) -> Result<Self, ConfigError> {
        Self::new(capability, vocabulary::default_triggers(capability))
    }

    /// Number of triggers hit by the tokens. Each token counts at most once;
    /// each phrase found in the text counts once more.
    fn matches(&self, tokens: &[Token], joined: &str) -> usize {
        let token_hits = tokens
            .iter()
            .filter(|t| {
                self.words.iter().any(|w| word_matches(&t.lower, w))
                    || self.patterns.iter().any(|re| re.is_match(&t.lower))
            })
            .count();
        let phrase_hits = self
            .phrases
            .iter()
            .filter(|p| joined.contains(&format!(" {p} ")))
            .count();
        token_hits + phrase_hits
    }
}

/// Keyword-density intent classifier.
pub struct IntentClassifier {
    rules: Vec<CapabilityRule>,
    threshold: f32,
}

impl IntentClassifier {
    /// Create a classifier from explicit rules, in declaration order.
    pub fn new(rules: Vec<CapabilityRule>, threshold: f32) -> Self {
        Self {
            rules,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    /// Build one rule per registered capability, using each handler's triggers.
    pub fn from_registry(
        registry: &CapabilityRegistry,
        threshold: f32,
    ) -> Result<Self, ConfigError> {
        let rules = registry
            .handlers()
            .map(|h| CapabilityRule::new(h.capability(), h.triggers()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules, threshold))
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Capabilities this classifier can produce, in declaration order.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.rules.iter().map(|r| r.capability).collect()
    }

    /// Confidence per capability, in declaration order.
    pub fn scores(&self, raw_text: &str) -> Vec<(Capability, f32)> {
        let tokens = tokenize(raw_text);
        let content = tokens.iter().filter(|t| !t.is_stop_word()).count();
        if content == 0 {
            return self.rules.iter().map(|r| (r.capability, 0.0)).collect();
        }
        let joined = format!(
            " {} ",
            tokens
                .iter()
                .map(|t| t.lower.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        );
        self.rules
            .iter()
            .map(|rule| {
                let hits = rule.matches(&tokens, &joined);
                (rule.capability, (hits as f32 / content as f32).min(1.0))
            })
            .collect()
    }

    /// Classify raw text into an intent.
    pub fn classify(&self, raw_text: &str) -> Intent {
        if raw_text.trim().is_empty() {
            return Intent::unresolved(0.0);
        }

        let mut best: Option<(Capability, f32)> = None;
        for (capability, score) in self.scores(raw_text) {
            // Strictly greater: the first-declared capability keeps a tie.
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((capability, score));
            }
        }

        match best {
            Some((capability, confidence)) if confidence >= self.threshold && confidence > 0.0 => {
                let tokens = tokenize(raw_text);
                let slots = slots::extract(capability, raw_text, &tokens);
                debug!(%capability, confidence, ?slots, "Request classified");
                Intent {
                    capability: Some(capability),
                    slots,
                    confidence,
                }
            }
            Some((capability, confidence)) => {
                debug!(%capability, confidence, "Best match below threshold");
                Intent::unresolved(confidence)
            }
            None => Intent::unresolved(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        let rules = Capability::ALL
            .into_iter()
            .map(|c| CapabilityRule::with_defaults(c).unwrap())
            .collect();
        IntentClassifier::new(rules, DEFAULT_THRESHOLD)
    }

    #[test]
    fn empty_text_is_unresolved() {
        let c = classifier();
        for text in ["", "   ", "\n\t"] {
            let intent = c.classify(text);
            assert!(!intent.is_resolved());
            assert_eq!(intent.confidence, 0.0);
            assert!(intent.slots.is_empty());
        }
    }

    #[test]
    fn domain_check_with_domain_slot() {
        let intent = classifier().classify("Check if example.com is online");
        assert_eq!(intent.capability, Some(Capability::DomainCheck));
        assert_eq!(intent.slots.get("domain").map(String::as_str), Some("example.com"));
        assert!(intent.confidence >= DEFAULT_THRESHOLD);
    }

    #[test]
    fn memory_query_with_window_slot() {
        let intent = classifier().classify("What did we talk about yesterday?");
        assert_eq!(intent.capability, Some(Capability::MemoryQuery));
        assert_eq!(intent.slots.get("window").map(String::as_str), Some("yesterday"));
    }

    #[test]
    fn gibberish_is_unresolved() {
        let intent = classifier().classify("banana trampoline quantum sandwich");
        assert!(!intent.is_resolved());
        assert_eq!(intent.confidence, 0.0);
    }

    #[test]
    fn below_threshold_keeps_best_confidence() {
        // One trigger ("file") among six content words.
        let intent = classifier().classify("bring lunch file paperwork before noon");
        assert!(!intent.is_resolved());
        assert!(intent.confidence > 0.0 && intent.confidence < DEFAULT_THRESHOLD);
    }

    #[test]
    fn only_stop_words_is_unresolved() {
        let intent = classifier().classify("what is it to you?");
        assert!(!intent.is_resolved());
    }

    #[test]
    fn routes_each_capability() {
        let c = classifier();
        let cases = [
            ("find duplicate files in ~/Downloads", Capability::FileSearch),
            ("research the origins of sourdough", Capability::Research),
            ("backup and schedule my notes tonight", Capability::Automation),
            ("sort the photos on my phone", Capability::PhoneSort),
            ("is the dns for example.org broken", Capability::DomainCheck),
            ("do you remember what I said last time", Capability::MemoryQuery),
        ];
        for (text, expected) in cases {
            assert_eq!(c.classify(text).capability, Some(expected), "{text}");
        }
    }

    #[test]
    fn help_examples_route_where_advertised() {
        let c = classifier();
        for (text, expected) in EXAMPLE_REQUESTS {
            let intent = c.classify(text);
            assert_eq!(intent.capability, Some(*expected), "{text}");
        }
    }

    #[test]
    fn time_expressions_route_to_automation() {
        let c = classifier();
        for text in [
            "remind me to water the plants every morning",
            "schedule a meeting with the team tomorrow",
            "run the report script daily",
        ] {
            let intent = c.classify(text);
            assert_eq!(intent.capability, Some(Capability::Automation), "{text}");
            assert_eq!(intent.slots.get("action").map(String::as_str), Some("schedule"), "{text}");
        }
    }

    #[test]
    fn tie_goes_to_first_declared() {
        // "folder" (file-search) and "organize" (automation) score equally.
        let intent = classifier().classify("organize folder");
        assert_eq!(intent.capability, Some(Capability::FileSearch));

        let reversed = IntentClassifier::new(
            vec![
                CapabilityRule::with_defaults(Capability::Automation).unwrap(),
                CapabilityRule::with_defaults(Capability::FileSearch).unwrap(),
            ],
            DEFAULT_THRESHOLD,
        );
        assert_eq!(
            reversed.classify("organize folder").capability,
            Some(Capability::Automation)
        );
    }

    #[test]
    fn classification_is_deterministic() {
        let c = classifier();
        let first = c.classify("find information about rust lifetimes");
        for _ in 0..10 {
            assert_eq!(c.classify("find information about rust lifetimes"), first);
        }
        assert_eq!(first.capability, Some(Capability::Research));
    }

    #[test]
    fn threshold_is_configurable() {
        let strict = IntentClassifier::new(
            Capability::ALL
                .into_iter()
                .map(|c| CapabilityRule::with_defaults(c).unwrap())
                .collect(),
            0.9,
        );
        // Two of three content words hit.
        assert!(!strict.classify("Check if example.com is online").is_resolved());
    }

    #[test]
    fn unregistered_capabilities_never_win() {
        let only_memory = IntentClassifier::new(
            vec![CapabilityRule::with_defaults(Capability::MemoryQuery).unwrap()],
            DEFAULT_THRESHOLD,
        );
        assert!(!only_memory.classify("Check if example.com is online").is_resolved());
        assert_eq!(only_memory.capabilities(), vec![Capability::MemoryQuery]);
    }

    #[test]
    fn inflections_match() {
        assert!(word_matches("files", "file"));
        assert!(word_matches("talked", "talk"));
        assert!(word_matches("duplicates", "duplicate"));
        assert!(word_matches("organizing", "organize"));
        assert!(!word_matches("downloads", "down"));
        assert!(!word_matches("profile", "file"));
    }

    #[test]
    fn tokenize_trims_punctuation() {
        let tokens = tokenize("Is example.com up? (~/Docs/a.txt)");
        let lower: Vec<_> = tokens.iter().map(|t| t.lower.as_str()).collect();
        assert_eq!(lower, vec!["is", "example.com", "up", "~/docs/a.txt"]);
        assert_eq!(tokens[3].raw, "~/Docs/a.txt");
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let err = CapabilityRule::new(Capability::Research, vec![Trigger::Pattern("(")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
