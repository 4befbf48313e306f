use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::crash_log;
use crate::downloads::Downloads;
use crate::history::History;
use crate::rewards::RewardState;
use crate::settings::Settings;
use crate::sites::{welcome_site, Extensions, Sites};

pub const DOCUMENT_FILE: &str = "navi_data.json";

/// Everything the browser persists, rewritten as one JSON object after each change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub sites: Sites,
    pub extensions: Extensions,
    pub history: History,
    pub downloads: Downloads,
    pub settings: Settings,
    pub reward_state: RewardState,
    // top-level keys this build does not know about; written back untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Document {
    fn default() -> Self {
        let settings = Settings::default();
        let mut sites = Sites::new();
        let welcome = welcome_site(&settings.site_suffix);
        sites.insert(welcome.domain.clone(), welcome);
        Document {
            sites,
            extensions: Extensions::new(),
            history: History::new(),
            downloads: Downloads::new(),
            settings,
            reward_state: RewardState::default(),
            extra: Map::new(),
        }
    }
}

fn take_section<T: DeserializeOwned>(obj: &mut Map<String, Value>, key: &str, target: &mut T) {
    if let Some(raw) = obj.remove(key) {
        match serde_json::from_value(raw) {
            Ok(v) => *target = v,
            Err(e) => crash_log::log_warn("store", &format!("ignoring malformed '{}': {}", key, e)),
        }
    }
}

/// Parse a persisted document, filling every missing or malformed section with its default.
pub fn parse_document(raw: &str) -> Document {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            crash_log::log_warn("store", &format!("document unreadable, using defaults: {}", e));
            return Document::default();
        }
    };
    let Value::Object(mut obj) = value else {
        crash_log::log_warn("store", "document is not an object, using defaults");
        return Document::default();
    };

    let mut doc = Document::default();
    take_section(&mut obj, "sites", &mut doc.sites);
    take_section(&mut obj, "extensions", &mut doc.extensions);
    take_section(&mut obj, "history", &mut doc.history);
    take_section(&mut obj, "downloads", &mut doc.downloads);
    take_section(&mut obj, "settings", &mut doc.settings);
    take_section(&mut obj, "rewardState", &mut doc.reward_state);
    doc.extra = obj;
    doc
}

/// Where the document lives between runs.
pub trait DocumentStore {
    /// Never fails: anything unreadable yields defaults.
    fn load(&self) -> Document;
    fn save(&self, doc: &Document) -> Result<(), String>;
}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl DocumentStore for JsonFileStore {
    fn load(&self) -> Document {
        if !self.path.exists() {
            crash_log::log_info("store", &format!("no document at {}, starting fresh", self.path.display()));
            return Document::default();
        }
        match fs::read_to_string(&self.path) {
            Ok(data) => parse_document(&data),
            Err(e) => {
                crash_log::log_warn("store", &format!("read {}: {}", self.path.display(), e));
                Document::default()
            }
        }
    }

    fn save(&self, doc: &Document) -> Result<(), String> {
        let json = serde_json::to_string_pretty(doc).map_err(|e| format!("serialize document: {}", e))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| format!("create {}: {}", parent.display(), e))?;
        }
        // write-then-rename so a crash mid-write leaves the previous file intact
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| format!("write {}: {}", tmp.display(), e))?;
        fs::rename(&tmp, &self.path).map_err(|e| format!("replace {}: {}", self.path.display(), e))
    }
}

#[derive(Default)]
struct MemoryInner {
    json: Option<String>,
    saves: usize,
    fail_writes: bool,
}

/// In-memory store; clones share the same slot.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(json: &str) -> Self {
        let store = Self::default();
        store.inner.lock().json = Some(json.to_string());
        store
    }

    pub fn saved_json(&self) -> Option<String> {
        self.inner.lock().json.clone()
    }

    pub fn save_count(&self) -> usize {
        self.inner.lock().saves
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self) -> Document {
        match self.inner.lock().json.as_deref() {
            Some(raw) => parse_document(raw),
            None => Document::default(),
        }
    }

    fn save(&self, doc: &Document) -> Result<(), String> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err("memory store is read-only".into());
        }
        inner.json = Some(serde_json::to_string(doc).map_err(|e| format!("serialize document: {}", e))?);
        inner.saves += 1;
        Ok(())
    }
}

/// The one mutable application state, owned by the browser shell.
pub struct AppState {
    pub doc: Document,
    store: Box<dyn DocumentStore>,
}

impl AppState {
    pub fn load(store: Box<dyn DocumentStore>) -> Self {
        let doc = store.load();
        Self { doc, store }
    }

    /// Rewrite the whole document. Failures are logged, never surfaced.
    pub fn persist(&self) -> bool {
        match self.store.save(&self.doc) {
            Ok(()) => true,
            Err(e) => {
                crash_log::log_error("store", &format!("save failed: {}", e));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let n = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut p = std::env::temp_dir();
        p.push(format!("navi_store_{}_{}", std::process::id(), n));
        let _ = fs::remove_dir_all(&p);
        let _ = fs::create_dir_all(&p);
        p
    }

    fn cleanup(dir: &PathBuf) {
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn absent_file_gives_defaults() {
        let dir = temp_dir();
        let store = JsonFileStore::new(dir.join(DOCUMENT_FILE));
        let doc = store.load();
        assert_eq!(doc, Document::default());
        assert!(doc.sites.find("welcome.pw-navi").is_some());
        cleanup(&dir);
    }

    #[test]
    fn garbage_gives_defaults() {
        assert_eq!(parse_document("{not json"), Document::default());
        assert_eq!(parse_document("[1,2,3]"), Document::default());
    }

    #[test]
    fn partial_document_fills_missing_sections() {
        let doc = parse_document(r#"{"rewardState":{"balance":42},"settings":{"theme":"dark"}}"#);
        assert_eq!(doc.reward_state.balance, 42);
        assert_eq!(doc.settings.theme, "dark");
        assert_eq!(doc.settings.site_suffix, ".pw-navi");
        assert_eq!(doc.sites.len(), 1);
        assert!(doc.history.is_empty());
    }

    #[test]
    fn malformed_section_only_resets_that_section() {
        let doc = parse_document(r#"{"history":"oops","rewardState":{"balance":7}}"#);
        assert!(doc.history.is_empty());
        assert_eq!(doc.reward_state.balance, 7);
    }

    #[test]
    fn unknown_keys_survive_save() {
        let store = MemoryStore::with_json(r#"{"proxy":{"enabled":false},"sites":{}}"#);
        let state = AppState::load(Box::new(store.clone()));
        assert!(state.doc.sites.is_empty());
        assert!(state.persist());

        let saved: Value = serde_json::from_str(&store.saved_json().unwrap()).unwrap();
        assert_eq!(saved["proxy"]["enabled"], false);
        assert!(saved["rewardState"].is_object());
    }

    #[test]
    fn file_round_trip() {
        let dir = temp_dir();
        let store = JsonFileStore::new(dir.join("nested").join(DOCUMENT_FILE));
        let mut doc = Document::default();
        doc.reward_state.balance = 9;
        doc.history.record("https://rust-lang.org", "Rust", 5);
        store.save(&doc).unwrap();

        let back = store.load();
        assert_eq!(back, doc);
        assert!(!store.path().with_extension("json.tmp").exists());
        cleanup(&dir);
    }

    #[test]
    fn failed_write_is_reported_not_raised() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        let state = AppState::load(Box::new(store.clone()));
        assert!(!state.persist());
        assert_eq!(store.save_count(), 0);
    }
}
