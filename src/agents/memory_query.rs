//! Recall of earlier conversations from the interaction log.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use futures::StreamExt;
use serde_json::json;

use crate::capability::{Capability, CapabilityHandler, Response, Slots, slot};
use crate::error::AgentError;
use crate::store::{Interaction, InteractionFilter, MemoryHandle, cursor::DEFAULT_PAGE_SIZE};

/// A relative time range named in a request ("yesterday", "last 3 days").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    Recent,
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    LastMonth,
    LastDays(u32),
}

impl TimeWindow {
    /// Parse a `window` slot. Unknown values mean `Recent`.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "today" => Self::Today,
            "yesterday" => Self::Yesterday,
            "this week" => Self::ThisWeek,
            "last week" => Self::LastWeek,
            "last month" => Self::LastMonth,
            other => other
                .strip_prefix("last ")
                .and_then(|r| r.strip_suffix(" days").or_else(|| r.strip_suffix(" day")))
                .and_then(|n| n.parse().ok())
                .map(Self::LastDays)
                .unwrap_or(Self::Recent),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Recent => "recently".into(),
            Self::Today => "today".into(),
            Self::Yesterday => "yesterday".into(),
            Self::ThisWeek => "this week".into(),
            Self::LastWeek => "last week".into(),
            Self::LastMonth => "last month".into(),
            Self::LastDays(1) => "in the last day".into(),
            Self::LastDays(n) => format!("in the last {n} days"),
        }
    }

    /// UTC range `[since, until)` relative to `now`. `Recent` is unbounded, and
    /// so is a `LastDays` span reaching past the representable date range.
    pub fn resolve(&self, now: DateTime<Utc>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let midnight = |d: chrono::NaiveDate| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN));
        let today = midnight(now.date_naive());
        let week_start = today - ChronoDuration::days(now.weekday().num_days_from_monday() as i64);
        let month_start = midnight(now.date_naive().with_day(1).unwrap_or(now.date_naive()));

        match self {
            Self::Recent => (None, None),
            Self::Today => (Some(today), None),
            Self::Yesterday => (Some(today - ChronoDuration::days(1)), Some(today)),
            Self::ThisWeek => (Some(week_start), None),
            Self::LastWeek => (Some(week_start - ChronoDuration::days(7)), Some(week_start)),
            Self::LastMonth => {
                let prev = (month_start - ChronoDuration::days(1)).date_naive();
                let prev_start = midnight(prev.with_day(1).unwrap_or(prev));
                (Some(prev_start), Some(month_start))
            }
            Self::LastDays(n) => (
                ChronoDuration::try_days(i64::from(*n)).and_then(|d| now.checked_sub_signed(d)),
                None,
            ),
        }
    }
}

/// Answers "what did we talk about ..." from the interaction log.
pub struct MemoryQueryHandler {
    recall_limit: usize,
    clock: fn() -> DateTime<Utc>,
}

impl MemoryQueryHandler {
    pub fn new(recall_limit: usize) -> Self {
        Self {
            recall_limit: recall_limit.max(1),
            clock: Utc::now,
        }
    }

    /// Use a fixed clock (tests).
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }
}

fn describe(interaction: &Interaction) -> String {
    let when = interaction.timestamp.format("%Y-%m-%d %H:%M");
    if interaction.response_summary.is_empty() {
        format!("[{when}] {}", interaction.raw_text)
    } else {
        let reply = interaction
            .response_summary
            .lines()
            .next()
            .unwrap_or_default();
        format!("[{when}] {} -> {reply}", interaction.raw_text)
    }
}

#[async_trait]
impl CapabilityHandler for MemoryQueryHandler {
    fn capability(&self) -> Capability {
        Capability::MemoryQuery
    }

    async fn handle(
        &self,
        slots: &Slots,
        memory: &MemoryHandle,
        _timeout: Duration,
    ) -> Result<Response, AgentError> {
        let window = TimeWindow::parse(slot(slots, "window").unwrap_or("recent"));
        let topic = slot(slots, "topic");
        let (since, until) = window.resolve((self.clock)());

        let mut filter = InteractionFilter::new();
        filter.since = since;
        filter.until = until;
        if let Some(topic) = topic {
            filter = filter.text(topic);
        }

        // Keep only the newest `recall_limit` matches while streaming in id order.
        let mut recent: VecDeque<Interaction> = VecDeque::with_capacity(self.recall_limit);
        let mut total = 0usize;
        let mut stream = Box::pin(
            memory
                .interaction_cursor(filter, DEFAULT_PAGE_SIZE)?
                .into_stream(),
        );
        while let Some(item) = stream.next().await {
            let interaction = item?;
            total += 1;
            if recent.len() == self.recall_limit {
                recent.pop_front();
            }
            recent.push_back(interaction);
        }

        tracing::debug!(window = ?window, ?topic, total, "Memory recalled");

        let about = topic.map(|t| format!(" about \"{t}\"")).unwrap_or_default();
        if recent.is_empty() {
            return Ok(Response::real(format!(
                "I don't have any conversations{about} from {}.",
                window.label()
            ))
            .with_payload(json!({ "window": window.label(), "matches": 0 })));
        }

        let mut summary = format!(
            "Here's what we talked about{about} {} ({total} found",
            window.label()
        );
        if total > recent.len() {
            summary.push_str(&format!(", showing the latest {}", recent.len()));
        }
        summary.push_str("):");
        for interaction in &recent {
            summary.push_str("\n- ");
            summary.push_str(&describe(interaction));
        }

        let payload = json!({
            "window": window.label(),
            "since": since,
            "until": until,
            "matches": total,
            "interactions": recent.iter().map(|i| json!({
                "id": i.id,
                "timestamp": i.timestamp,
                "request": i.raw_text,
                "response": i.response_summary,
                "capability": i.resolved_capability,
            })).collect::<Vec<_>>(),
        });

        Ok(Response::real(summary)
            .with_payload(payload)
            .with_actions([format!("Searched interaction history {}", window.label())]))
    }
}
