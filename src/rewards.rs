use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::settings;

pub const SEARCH_COOLDOWN_SECS: i64 = 60;
pub const WATCH_TICK_SECS: u64 = 60;
pub const WATCH_TICKS_REQUIRED: u32 = 15;
pub const WATCH_REWARD: u64 = 5;

const WATCH_PATTERNS: &[&str] = &["youtube.com/watch", "youtu.be/", "vimeo.com/"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewardState {
    pub balance: u64,
    pub inventory: BTreeSet<String>,
    pub last_reward_timestamp: i64,
    pub last_active_timestamp: i64,
}

// ── catalogue ──

/// Calendar window as (month, day) bounds, inclusive. Wraps the year when start > end.
#[derive(Debug, Clone, Copy)]
pub struct Season {
    pub start: (u32, u32),
    pub end: (u32, u32),
}

impl Season {
    pub fn contains(&self, date: NaiveDate) -> bool {
        let md = (date.month(), date.day());
        if self.start <= self.end {
            self.start <= md && md <= self.end
        } else {
            md >= self.start || md <= self.end
        }
    }
}

pub struct StoreItem {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub price: u64,
    pub season: Option<Season>,
}

impl StoreItem {
    pub fn available_on(&self, date: NaiveDate) -> bool {
        self.season.map_or(true, |s| s.contains(date))
    }
}

pub const CATALOGUE: &[StoreItem] = &[
    StoreItem { id: "theme-ocean", name: "Ocean Theme", description: "Calm blues for every internal page.", price: 100, season: None },
    StoreItem { id: "theme-forest", name: "Forest Theme", description: "Greens and soft light.", price: 100, season: None },
    StoreItem { id: "theme-retro", name: "Retro Theme", description: "Straight out of 1998.", price: 150, season: None },
    StoreItem {
        id: "theme-holiday",
        name: "Holiday Theme",
        description: "Festive colours, only sold around the winter holidays.",
        price: 75,
        season: Some(Season { start: (12, 1), end: (1, 6) }),
    },
    StoreItem { id: "custom-suffix", name: "Custom Site Suffix", description: "Pick your own ending for personal sites.", price: 200, season: None },
    StoreItem { id: "custom-background", name: "Custom Background", description: "Set a background image or colour.", price: 120, season: None },
];

pub fn catalogue_item(id: &str) -> Option<&'static StoreItem> {
    CATALOGUE.iter().find(|i| i.id == id)
}

// ── purchases ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased { price: u64 },
    AlreadyOwned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    UnknownItem(String),
    OutOfSeason(&'static str),
    InsufficientBalance { price: u64, balance: u64 },
}

impl fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PurchaseError::UnknownItem(id) => write!(f, "The store has no item called '{}'.", id),
            PurchaseError::OutOfSeason(name) => write!(f, "{} is not available right now. Come back during the season.", name),
            PurchaseError::InsufficientBalance { price, balance } => {
                write!(f, "Not enough Navits: this costs {} and you have {}.", price, balance)
            }
        }
    }
}

impl RewardState {
    pub fn owns(&self, item: &str) -> bool {
        self.inventory.contains(item)
    }

    /// Buy `item_id` on `today`. Nothing changes unless the result is `Purchased`.
    pub fn purchase(&mut self, item_id: &str, today: NaiveDate) -> Result<PurchaseOutcome, PurchaseError> {
        let item = catalogue_item(item_id).ok_or_else(|| PurchaseError::UnknownItem(item_id.to_string()))?;
        if !item.available_on(today) {
            return Err(PurchaseError::OutOfSeason(item.name));
        }
        if self.owns(item.id) {
            return Ok(PurchaseOutcome::AlreadyOwned);
        }
        if self.balance < item.price {
            return Err(PurchaseError::InsufficientBalance { price: item.price, balance: self.balance });
        }
        self.balance -= item.price;
        self.inventory.insert(item.id.to_string());
        Ok(PurchaseOutcome::Purchased { price: item.price })
    }

    /// Award Navits for a finished load of a search results page.
    /// One cooldown is shared by every engine.
    pub fn award_search(&mut self, url: &str, now: i64) -> Option<u64> {
        let engine = settings::engine_for_results_page(url)?;
        if now.saturating_sub(self.last_reward_timestamp) < SEARCH_COOLDOWN_SECS {
            return None;
        }
        self.balance += engine.reward;
        self.last_reward_timestamp = now;
        Some(engine.reward)
    }
}

// ── sustained viewing ──

pub fn is_watch_url(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let rest = rest.strip_prefix("www.").or_else(|| rest.strip_prefix("m.")).unwrap_or(rest);
    WATCH_PATTERNS.iter().any(|p| rest.starts_with(p) && rest.len() > p.len())
}

/// Counts consecutive timer ticks spent on the same watch page. One per tab.
#[derive(Debug, Default, Clone)]
pub struct WatchTracker {
    url: Option<String>,
    ticks: u32,
}

impl WatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn reset(&mut self) {
        self.url = None;
        self.ticks = 0;
    }

    /// Advance by one interval with `current_url` showing. Returns the award once
    /// `WATCH_TICKS_REQUIRED` consecutive ticks land on the same watch page.
    pub fn tick(&mut self, current_url: &str) -> Option<u64> {
        if !is_watch_url(current_url) {
            self.reset();
            return None;
        }
        if self.url.as_deref() == Some(current_url) {
            self.ticks += 1;
        } else {
            self.url = Some(current_url.to_string());
            self.ticks = 1;
        }
        if self.ticks >= WATCH_TICKS_REQUIRED {
            self.ticks = 0;
            return Some(WATCH_REWARD);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const SEARCH: &str = "https://www.google.com/search?q=ferris";

    #[test]
    fn search_reward_respects_cooldown() {
        let mut r = RewardState::default();
        let t0 = 1_700_000_000;
        assert_eq!(r.award_search(SEARCH, t0), Some(1));
        assert_eq!(r.award_search(SEARCH, t0 + 10), None);
        assert_eq!(r.balance, 1);

        let mut r = RewardState::default();
        assert_eq!(r.award_search(SEARCH, t0), Some(1));
        assert_eq!(r.award_search(SEARCH, t0 + 70), Some(1));
        assert_eq!(r.balance, 2);
    }

    #[test]
    fn cooldown_is_global_across_engines() {
        let mut r = RewardState::default();
        let t0 = 1_700_000_000;
        assert_eq!(r.award_search("https://www.bing.com/search?q=x", t0), Some(2));
        assert_eq!(r.award_search(SEARCH, t0 + 30), None);
        assert_eq!(r.balance, 2);
    }

    #[test]
    fn extreme_stored_timestamp_does_not_overflow() {
        let mut r: RewardState = serde_json::from_str(&format!(r#"{{"lastRewardTimestamp":{}}}"#, i64::MIN)).unwrap();
        assert_eq!(r.award_search(SEARCH, 1_700_000_000), Some(1));
        assert_eq!(r.last_reward_timestamp, 1_700_000_000);
    }

    #[test]
    fn non_search_pages_award_nothing() {
        let mut r = RewardState::default();
        assert_eq!(r.award_search("https://example.com/?q=x", 1_700_000_000), None);
        assert_eq!(r.last_reward_timestamp, 0);
    }

    #[test]
    fn purchase_gating() {
        let today = date(2025, 6, 1);
        let mut r = RewardState { balance: 100, ..Default::default() };
        let err = r.purchase("theme-retro", today).unwrap_err();
        assert_eq!(err, PurchaseError::InsufficientBalance { price: 150, balance: 100 });
        assert_eq!(r.balance, 100);
        assert!(r.inventory.is_empty());

        r.balance = 150;
        assert_eq!(r.purchase("theme-retro", today), Ok(PurchaseOutcome::Purchased { price: 150 }));
        assert_eq!(r.balance, 0);
        assert_eq!(r.inventory.len(), 1);

        r.balance = 500;
        assert_eq!(r.purchase("theme-retro", today), Ok(PurchaseOutcome::AlreadyOwned));
        assert_eq!(r.balance, 500);
        assert_eq!(r.inventory.len(), 1);
    }

    #[test]
    fn seasonal_gating() {
        let mut r = RewardState { balance: 1_000, ..Default::default() };
        assert_eq!(
            r.purchase("theme-holiday", date(2025, 7, 4)),
            Err(PurchaseError::OutOfSeason("Holiday Theme"))
        );
        assert_eq!(r.balance, 1_000);

        assert!(matches!(r.purchase("theme-holiday", date(2025, 12, 24)), Ok(PurchaseOutcome::Purchased { .. })));
        assert_eq!(r.balance, 925);
    }

    #[test]
    fn season_wraps_new_year() {
        let s = Season { start: (12, 1), end: (1, 6) };
        assert!(s.contains(date(2025, 12, 1)));
        assert!(s.contains(date(2026, 1, 6)));
        assert!(!s.contains(date(2026, 1, 7)));
        assert!(!s.contains(date(2025, 11, 30)));

        let summer = Season { start: (6, 1), end: (8, 31) };
        assert!(summer.contains(date(2025, 7, 15)));
        assert!(!summer.contains(date(2025, 9, 1)));
    }

    #[test]
    fn unknown_item() {
        let mut r = RewardState { balance: 10, ..Default::default() };
        assert!(matches!(r.purchase("gold-star", date(2025, 1, 1)), Err(PurchaseError::UnknownItem(_))));
    }

    #[test]
    fn watch_tracker_awards_after_full_run() {
        let url = "https://www.youtube.com/watch?v=abc";
        let mut w = WatchTracker::new();
        for _ in 0..WATCH_TICKS_REQUIRED - 1 {
            assert_eq!(w.tick(url), None);
        }
        assert_eq!(w.tick(url), Some(WATCH_REWARD));
        assert_eq!(w.ticks(), 0);
    }

    #[test]
    fn navigating_away_resets_without_credit() {
        let url = "https://www.youtube.com/watch?v=abc";
        let mut w = WatchTracker::new();
        for _ in 0..10 {
            w.tick(url);
        }
        assert_eq!(w.tick("https://example.com"), None);
        assert_eq!(w.ticks(), 0);

        for _ in 0..10 {
            w.tick(url);
        }
        // a different video starts a fresh count
        assert_eq!(w.tick("https://www.youtube.com/watch?v=other"), None);
        assert_eq!(w.ticks(), 1);
    }

    #[test]
    fn watch_patterns() {
        assert!(is_watch_url("https://m.youtube.com/watch?v=1"));
        assert!(is_watch_url("https://youtu.be/xyz"));
        assert!(!is_watch_url("https://www.youtube.com/"));
        assert!(!is_watch_url("https://youtu.be/"));
    }
}
