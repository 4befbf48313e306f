use serde::{Deserialize, Serialize};

pub const MAX_SNAPSHOTS: usize = 100;

/// Offline copy of a rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub timestamp: i64,
}

/// Saved snapshots, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Downloads(Vec<Snapshot>);

impl Downloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Snapshot] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Store a snapshot under a fresh id and return the id.
    pub fn add(&mut self, title: &str, url: &str, html: String, now: i64) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let title = if title.trim().is_empty() { url } else { title };
        self.0.insert(
            0,
            Snapshot { id: id.clone(), title: title.to_string(), url: url.to_string(), html, timestamp: now },
        );
        self.0.truncate(MAX_SNAPSHOTS);
        id
    }

    pub fn get(&self, id: &str) -> Option<&Snapshot> {
        self.0.iter().find(|s| s.id == id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Snapshot> {
        let idx = self.0.iter().position(|s| s.id == id)?;
        Some(self.0.remove(idx))
    }
}
