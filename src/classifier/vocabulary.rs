//! Default trigger vocabulary for each capability.

use crate::capability::{Capability, Trigger};

/// Domain names with a common TLD. Bare file names (`report.pdf`) do not match.
pub const DOMAIN_PATTERN: &str = r"^(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+(?:com|net|org|io|dev|app|co|ai|me|info|biz|tech|site|online|xyz|edu|gov|us|uk|de|fr|ca|au|nl|eu)$";

/// Words that never count towards keyword density.
pub const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "at", "be", "can", "could", "did", "do", "does", "for",
    "from", "i", "if", "in", "is", "it", "its", "me", "my", "of", "on", "or", "our", "please",
    "that", "the", "these", "this", "those", "to", "us", "was", "we", "were", "what", "which",
    "will", "with", "would", "you", "your",
];

/// Sample requests shown by the CLI `help` command, with where each one routes.
pub const EXAMPLE_REQUESTS: &[(&str, Capability)] = &[
    ("what did we talk about yesterday?", Capability::MemoryQuery),
    ("find duplicate files in ~/Downloads", Capability::FileSearch),
    ("research sourdough starters", Capability::Research),
    ("remind me to water the plants every morning", Capability::Automation),
    ("sort the photos on my phone", Capability::PhoneSort),
    ("check if example.com is online", Capability::DomainCheck),
];

/// Built-in triggers for a capability.
pub fn default_triggers(capability: Capability) -> Vec<Trigger> {
    use Trigger::{Pattern, Phrase, Word};

    match capability {
        Capability::MemoryQuery => vec![
            Word("remember"),
            Word("recall"),
            Word("yesterday"),
            Word("talk"),
            Word("discuss"),
            Word("said"),
            Word("previous"),
            Word("previously"),
            Word("earlier"),
            Word("history"),
            Word("conversation"),
            Word("mention"),
            Phrase("last time"),
            Phrase("what did we"),
            Phrase("did i ask"),
        ],
        Capability::FileSearch => vec![
            Word("file"),
            Word("folder"),
            Word("directory"),
            Word("document"),
            Word("duplicate"),
            Word("dedupe"),
            Word("find"),
            Word("locate"),
            Word("scan"),
            Word("index"),
            Word("downloads"),
        ],
        Capability::Research => vec![
            Word("research"),
            Word("search"),
            Word("information"),
            Word("info"),
            Word("learn"),
            Word("explain"),
            Word("article"),
            Word("news"),
            Phrase("look up"),
            Phrase("find information"),
            Phrase("tell me about"),
            Phrase("what is"),
            Phrase("how to"),
        ],
        Capability::Automation => vec![
            Word("automate"),
            Word("automation"),
            Word("backup"),
            Word("schedule"),
            Word("desktop"),
            Word("tool"),
            Word("script"),
            Word("clean"),
            Word("cleanup"),
            Word("organize"),
            Word("remind"),
            Word("routine"),
            Word("every"),
            Word("daily"),
            Word("weekly"),
            Word("monthly"),
            Word("hourly"),
            Word("tomorrow"),
            Word("tonight"),
            Word("morning"),
            Word("evening"),
            Phrase("back up"),
        ],
        Capability::PhoneSort => vec![
            Word("phone"),
            Word("photo"),
            Word("picture"),
            Word("contact"),
            Word("mobile"),
            Word("camera"),
            Word("gallery"),
            Word("album"),
            Word("iphone"),
            Word("android"),
        ],
        Capability::DomainCheck => vec![
            Word("domain"),
            Word("dns"),
            Word("website"),
            Word("site"),
            Word("server"),
            Word("online"),
            Word("offline"),
            Word("down"),
            Word("ping"),
            Word("reachable"),
            Word("status"),
            Word("nameserver"),
            Word("registrar"),
            Pattern(DOMAIN_PATTERN),
        ],
    }
}
