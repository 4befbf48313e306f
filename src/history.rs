use serde::{Deserialize, Serialize};

use crate::rewards::RewardState;
use crate::settings::Settings;

pub const HISTORY_CAP: usize = 1000;
pub const INACTIVITY_THRESHOLD_SECS: i64 = 14 * 24 * 60 * 60;

// what the log is replaced with after a long absence
const WHOLESOME_ENTRIES: &[(&str, &str)] = &[
    ("https://www.nationalgeographic.com/animals", "Animals | National Geographic"),
    ("https://www.gutenberg.org/", "Project Gutenberg"),
    ("https://www.khanacademy.org/", "Khan Academy"),
    ("https://www.nasa.gov/image-of-the-day/", "Image of the Day | NASA"),
    ("https://www.wikipedia.org/", "Wikipedia"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// Visited pages, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<HistoryEntry>);

pub fn is_internal_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    ["navi://", "local://", "about:", "data:"]
        .iter()
        .any(|p| lower.starts_with(p))
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Record a finished load. Returns false when nothing was added: internal pages,
    /// or a reload of the page already at the head (its title is refreshed).
    pub fn record(&mut self, url: &str, title: &str, now: i64) -> bool {
        if url.is_empty() || is_internal_url(url) {
            return false;
        }
        if let Some(head) = self.0.first_mut() {
            if head.url == url {
                if !title.is_empty() {
                    head.title = title.to_string();
                }
                return false;
            }
        }
        self.0.insert(0, HistoryEntry { url: url.to_string(), title: title.to_string(), timestamp: now });
        self.0.truncate(HISTORY_CAP);
        true
    }

    pub fn replace_with_wholesome(&mut self, now: i64) {
        self.0 = WHOLESOME_ENTRIES
            .iter()
            .map(|(url, title)| HistoryEntry { url: url.to_string(), title: title.to_string(), timestamp: now })
            .collect();
    }
}

/// Startup check: after more than 14 days away (with wholesome mode on) the whole
/// history is replaced. `last_active_timestamp` is bumped to `now` either way.
/// Returns true when the history was replaced.
pub fn apply_inactivity_switch(history: &mut History, rewards: &mut RewardState, settings: &Settings, now: i64) -> bool {
    let last = rewards.last_active_timestamp;
    let expired = last > 0 && now - last > INACTIVITY_THRESHOLD_SECS;
    let reset = expired && settings.wholesome_mode;
    if reset {
        history.replace_with_wholesome(now);
    }
    rewards.last_active_timestamp = now;
    reset
}
