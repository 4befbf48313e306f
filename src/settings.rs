use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

pub const DEFAULT_SUFFIX: &str = ".pw-navi";
pub const DEFAULT_HOME: &str = "navi://home";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Density {
    Comfortable,
    Compact,
}

impl Density {
    pub fn as_str(&self) -> &'static str {
        match self {
            Density::Comfortable => "comfortable",
            Density::Compact => "compact",
        }
    }
}

/// User configuration persisted under `settings`.
/// Unknown keys survive a load/save cycle through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub theme: String,
    pub search_engine: String,
    pub site_suffix: String,
    pub dark_mode: bool,
    pub wholesome_mode: bool,
    pub notes: String,
    pub background_url: String,
    pub background_color: String,
    pub density: Density,
    pub strict_site_html: bool,
    pub home_page: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            theme: "light".into(),
            search_engine: "google".into(),
            site_suffix: DEFAULT_SUFFIX.into(),
            dark_mode: false,
            wholesome_mode: true,
            notes: String::new(),
            background_url: String::new(),
            background_color: String::new(),
            density: Density::Comfortable,
            strict_site_html: false,
            home_page: DEFAULT_HOME.into(),
            extra: BTreeMap::new(),
        }
    }
}

// ── search engines ──

pub struct SearchEngine {
    pub id: &'static str,
    pub name: &'static str,
    query_url: &'static str,
    host: &'static str,
    results_path: &'static str,
    /// Navits awarded for a results page load
    pub reward: u64,
}

pub const SEARCH_ENGINES: &[SearchEngine] = &[
    SearchEngine {
        id: "google",
        name: "Google",
        query_url: "https://www.google.com/search?q=",
        host: "google.com",
        results_path: "/search",
        reward: 1,
    },
    SearchEngine {
        id: "bing",
        name: "Bing",
        query_url: "https://www.bing.com/search?q=",
        host: "bing.com",
        results_path: "/search",
        reward: 2,
    },
    SearchEngine {
        id: "duckduckgo",
        name: "DuckDuckGo",
        query_url: "https://duckduckgo.com/?q=",
        host: "duckduckgo.com",
        results_path: "/",
        reward: 1,
    },
    SearchEngine {
        id: "ecosia",
        name: "Ecosia",
        query_url: "https://www.ecosia.org/search?q=",
        host: "ecosia.org",
        results_path: "/search",
        reward: 2,
    },
];

impl SearchEngine {
    pub fn search_url(&self, query: &str) -> String {
        format!("{}{}", self.query_url, urlencoding::encode(query.trim()))
    }

    /// True when `url` is a results page of this engine (host match plus a `q` parameter).
    pub fn is_results_page(&self, url: &url::Url) -> bool {
        let host = match url.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return false,
        };
        let host = host.strip_prefix("www.").unwrap_or(&host);
        host == self.host
            && url.path().starts_with(self.results_path)
            && url.query_pairs().any(|(k, v)| k == "q" && !v.is_empty())
    }
}

pub fn search_engine(id: &str) -> &'static SearchEngine {
    SEARCH_ENGINES
        .iter()
        .find(|e| e.id.eq_ignore_ascii_case(id))
        .unwrap_or(&SEARCH_ENGINES[0])
}

/// The engine whose results page `url` is, if any.
pub fn engine_for_results_page(url: &str) -> Option<&'static SearchEngine> {
    let parsed = url::Url::parse(url).ok()?;
    SEARCH_ENGINES.iter().find(|e| e.is_results_page(&parsed))
}

// ── themes ──

pub struct Theme {
    pub id: &'static str,
    pub name: &'static str,
    pub background: &'static str,
    pub surface: &'static str,
    pub text: &'static str,
    pub accent: &'static str,
    /// Store item that unlocks this theme; None = free
    pub unlock: Option<&'static str>,
}

pub const THEMES: &[Theme] = &[
    Theme { id: "light", name: "Light", background: "#f7f7f7", surface: "#ffffff", text: "#333333", accent: "#007bff", unlock: None },
    Theme { id: "dark", name: "Dark", background: "#1e1f22", surface: "#2b2d31", text: "#e3e5e8", accent: "#5865f2", unlock: None },
    Theme { id: "ocean", name: "Ocean", background: "#e6f3ff", surface: "#ffffff", text: "#12355b", accent: "#1e90ff", unlock: Some("theme-ocean") },
    Theme { id: "forest", name: "Forest", background: "#eef5ea", surface: "#ffffff", text: "#213b1f", accent: "#2e8b57", unlock: Some("theme-forest") },
    Theme { id: "retro", name: "Retro", background: "#000080", surface: "#c0c0c0", text: "#000000", accent: "#ff00ff", unlock: Some("theme-retro") },
    Theme { id: "holiday", name: "Holiday", background: "#fdf2f2", surface: "#ffffff", text: "#14532d", accent: "#c0392b", unlock: Some("theme-holiday") },
];

pub fn theme(id: &str) -> &'static Theme {
    THEMES.iter().find(|t| t.id == id).unwrap_or(&THEMES[0])
}

// ── settings/set ──

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingError {
    UnknownTheme(String),
    UnknownSearchEngine(String),
    Locked { key: String, item: &'static str },
    InvalidValue { key: String, value: String },
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingError::UnknownTheme(t) => write!(f, "There is no theme called '{}'.", t),
            SettingError::UnknownSearchEngine(e) => write!(f, "There is no search engine called '{}'.", e),
            SettingError::Locked { key, item } => {
                write!(f, "'{}' is locked. Unlock '{}' in the Navits store first.", key, item)
            }
            SettingError::InvalidValue { key, value } => {
                write!(f, "'{}' is not a valid value for '{}'.", value, key)
            }
        }
    }
}

/// What a successful `apply` changed, for callers that must react (suffix renames).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingChange {
    Updated,
    SuffixChanged { old: String, new: String },
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SettingError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Ok(true),
        "false" | "off" | "0" | "no" => Ok(false),
        _ => Err(SettingError::InvalidValue { key: key.into(), value: value.into() }),
    }
}

fn require(inventory: &BTreeSet<String>, key: &str, item: &'static str) -> Result<(), SettingError> {
    if inventory.contains(item) {
        Ok(())
    } else {
        Err(SettingError::Locked { key: key.into(), item })
    }
}

pub fn is_valid_suffix(suffix: &str) -> bool {
    suffix.len() >= 2
        && suffix.len() <= 32
        && suffix.starts_with('.')
        && !suffix.ends_with('.')
        && suffix[1..].chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

impl Settings {
    /// Apply one `settings/set/<key>/<value>` command. Keys are matched case-insensitively;
    /// unrecognised keys are stored verbatim as strings.
    pub fn apply(&mut self, key: &str, value: &str, inventory: &BTreeSet<String>) -> Result<SettingChange, SettingError> {
        match key.to_ascii_lowercase().as_str() {
            "theme" => {
                let id = value.trim().to_ascii_lowercase();
                let t = THEMES
                    .iter()
                    .find(|t| t.id == id)
                    .ok_or_else(|| SettingError::UnknownTheme(value.into()))?;
                if let Some(item) = t.unlock {
                    require(inventory, "theme", item)?;
                }
                self.theme = t.id.into();
            }
            "searchengine" => {
                let e = SEARCH_ENGINES
                    .iter()
                    .find(|e| e.id.eq_ignore_ascii_case(value.trim()))
                    .ok_or_else(|| SettingError::UnknownSearchEngine(value.into()))?;
                self.search_engine = e.id.into();
            }
            "sitesuffix" => {
                require(inventory, "siteSuffix", "custom-suffix")?;
                let mut suffix = value.trim().to_ascii_lowercase();
                if !suffix.starts_with('.') {
                    suffix.insert(0, '.');
                }
                if !is_valid_suffix(&suffix) {
                    return Err(SettingError::InvalidValue { key: "siteSuffix".into(), value: value.into() });
                }
                if suffix != self.site_suffix {
                    let old = std::mem::replace(&mut self.site_suffix, suffix.clone());
                    return Ok(SettingChange::SuffixChanged { old, new: suffix });
                }
            }
            "darkmode" => self.dark_mode = parse_bool("darkMode", value)?,
            "wholesomemode" => self.wholesome_mode = parse_bool("wholesomeMode", value)?,
            "strictsitehtml" => self.strict_site_html = parse_bool("strictSiteHtml", value)?,
            "notes" => self.notes = value.to_string(),
            "backgroundurl" => {
                require(inventory, "backgroundUrl", "custom-background")?;
                self.background_url = value.trim().to_string();
            }
            "backgroundcolor" => {
                require(inventory, "backgroundColor", "custom-background")?;
                let color = value.trim();
                if !color.is_empty() && !color.chars().all(|c| c.is_ascii_alphanumeric() || c == '#') {
                    return Err(SettingError::InvalidValue { key: "backgroundColor".into(), value: value.into() });
                }
                self.background_color = color.to_string();
            }
            "density" => {
                self.density = match value.trim().to_ascii_lowercase().as_str() {
                    "comfortable" => Density::Comfortable,
                    "compact" => Density::Compact,
                    _ => return Err(SettingError::InvalidValue { key: "density".into(), value: value.into() }),
                }
            }
            "homepage" => {
                let v = value.trim();
                if v.is_empty() {
                    return Err(SettingError::InvalidValue { key: "homePage".into(), value: value.into() });
                }
                self.home_page = v.to_string();
            }
            _ => {
                self.extra.insert(key.to_string(), serde_json::Value::String(value.to_string()));
            }
        }
        Ok(SettingChange::Updated)
    }

    pub fn engine(&self) -> &'static SearchEngine {
        search_engine(&self.search_engine)
    }

    /// Theme in effect; dark mode overrides the light theme only.
    pub fn effective_theme(&self) -> &'static Theme {
        if self.dark_mode && self.theme == "light" {
            theme("dark")
        } else {
            theme(&self.theme)
        }
    }
}
