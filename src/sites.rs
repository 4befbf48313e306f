use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

pub const UNTITLED_SITE: &str = "Untitled Navi Page";
const DOCTYPE: &str = "<!doctype html>";

/// Named entries in insertion order, stored as a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for Registry<V> {
    fn default() -> Self {
        Registry { entries: Vec::new() }
    }
}

impl<V> Registry<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite. An overwritten entry keeps its position.
    pub fn insert(&mut self, key: String, value: V) -> Option<V> {
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn rename(&mut self, from: &str, to: String) -> bool {
        match self.entries.iter_mut().find(|(k, _)| k == from) {
            Some(entry) => {
                entry.0 = to;
                true
            }
            None => false,
        }
    }
}

impl<V: Serialize> Serialize for Registry<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Registry<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RegistryVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for RegistryVisitor<V> {
            type Value = Registry<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of named entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut registry = Registry::new();
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    registry.insert(key, value);
                }
                Ok(registry)
            }
        }

        deserializer.deserialize_map(RegistryVisitor(PhantomData))
    }
}

// ── personal sites ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub domain: String,
    #[serde(default)]
    pub title: String,
    // early builds wrote the snake_case key
    #[serde(default, alias = "html_content")]
    pub html_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteError {
    EmptyName,
    InvalidName(String),
    MissingDoctype,
    AlreadyExists(String),
    NotFound(String),
}

impl fmt::Display for SiteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteError::EmptyName => f.write_str("Domain prefix cannot be empty."),
            SiteError::InvalidName(d) => write!(
                f,
                "'{}' is not a valid domain. Use letters, digits, '-' and '.' only.",
                d
            ),
            SiteError::MissingDoctype => f.write_str("Site content must start with <!DOCTYPE html>."),
            SiteError::AlreadyExists(d) => write!(
                f,
                "Domain '{}' already exists. Please choose a different name or edit the existing site.",
                d
            ),
            SiteError::NotFound(d) => write!(f, "Could not find website '{}'.", d),
        }
    }
}

/// Form data for a site save. `original` is set when editing: the key never changes then.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteDraft {
    pub name: String,
    pub title: String,
    pub content: String,
    pub original: Option<String>,
}

pub fn site_key(name: &str, suffix: &str) -> String {
    let name = name.trim().to_lowercase();
    let suffix = suffix.to_lowercase();
    if name.ends_with(&suffix) {
        name
    } else {
        format!("{}{}", name, suffix)
    }
}

/// Domain-label characters only, with no empty labels and no leading or trailing '-'.
pub fn is_valid_site_key(key: &str) -> bool {
    key.len() <= 253
        && key.split('.').all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

pub type Sites = Registry<Site>;

impl Registry<Site> {
    /// Sites are keyed case-insensitively.
    pub fn find(&self, domain: &str) -> Option<&Site> {
        self.get(&domain.trim().to_lowercase())
    }

    /// Create or update a site. Returns the key it is stored under.
    pub fn save_site(&mut self, draft: &SiteDraft, suffix: &str, strict: bool) -> Result<String, SiteError> {
        let key = match &draft.original {
            Some(original) => {
                let original = original.trim().to_lowercase();
                if !self.contains_key(&original) {
                    return Err(SiteError::NotFound(original));
                }
                original
            }
            None => {
                if draft.name.trim().is_empty() {
                    return Err(SiteError::EmptyName);
                }
                let key = site_key(&draft.name, suffix);
                if !is_valid_site_key(&key) {
                    return Err(SiteError::InvalidName(key));
                }
                if self.contains_key(&key) {
                    return Err(SiteError::AlreadyExists(key));
                }
                key
            }
        };

        let content = draft.content.trim();
        if strict && !content.to_ascii_lowercase().starts_with(DOCTYPE) {
            return Err(SiteError::MissingDoctype);
        }
        let title = match draft.title.trim() {
            "" => UNTITLED_SITE.to_string(),
            t => t.to_string(),
        };

        self.insert(key.clone(), Site { domain: key.clone(), title, html_content: content.to_string() });
        Ok(key)
    }

    pub fn delete_site(&mut self, domain: &str) -> Result<Site, SiteError> {
        let key = domain.trim().to_lowercase();
        self.remove(&key).ok_or(SiteError::NotFound(key))
    }

    /// Move every site ending in `old` over to `new`. Sites whose new key is already
    /// taken keep the old one. Returns how many were renamed.
    pub fn rename_suffix(&mut self, old: &str, new: &str) -> usize {
        let candidates: Vec<String> = self
            .iter()
            .filter(|(k, _)| k.ends_with(old))
            .map(|(k, _)| k.to_string())
            .collect();
        let mut renamed = 0;
        for key in candidates {
            let stem = &key[..key.len() - old.len()];
            let target = format!("{}{}", stem, new);
            if self.contains_key(&target) {
                continue;
            }
            if self.rename(&key, target.clone()) {
                if let Some(site) = self.get_mut(&target) {
                    site.domain = target;
                }
                renamed += 1;
            }
        }
        renamed
    }
}

pub fn welcome_site(suffix: &str) -> Site {
    let domain = site_key("welcome", suffix);
    Site {
        domain: domain.clone(),
        title: "Welcome to your Navi Site!".into(),
        html_content: format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>Welcome to your Navi Site!</title>
<style>
body {{ font-family: 'Inter', sans-serif; background-color: #e6f3ff; color: #333; padding: 20px; text-align: center; }}
.container {{ max-width: 800px; margin: 50px auto; background: white; padding: 30px; border-radius: 12px; }}
h1 {{ color: #1e90ff; }}
</style>
</head>
<body>
<div class="container">
<h1>Navi Browser - Hello World!</h1>
<p>This is a custom, full-HTML site stored as <code>{}</code>. Try editing the source!</p>
<p>Visit <a href="navi://pw">navi://pw</a> to see your list of sites.</p>
<button onclick="document.getElementById('msg').textContent='JS executed: Welcome to the future!';">Run JavaScript</button>
<p id="msg"></p>
</div>
</body>
</html>"#,
            domain
        ),
    }
}

// ── extensions ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extension {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    EmptyName,
    AlreadyExists(String),
    NotFound(String),
}

impl fmt::Display for ExtensionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtensionError::EmptyName => f.write_str("Extension name cannot be empty."),
            ExtensionError::AlreadyExists(n) => write!(f, "An extension called '{}' already exists.", n),
            ExtensionError::NotFound(n) => write!(f, "Could not find extension '{}'.", n),
        }
    }
}

pub type Extensions = Registry<Extension>;

impl Registry<Extension> {
    /// Create (active) or update (keeps its flag) an extension.
    pub fn save_extension(&mut self, name: &str, code: &str, original: Option<&str>) -> Result<String, ExtensionError> {
        match original {
            Some(original) => {
                let ext = self
                    .get_mut(original)
                    .ok_or_else(|| ExtensionError::NotFound(original.to_string()))?;
                ext.code = code.to_string();
                Ok(original.to_string())
            }
            None => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(ExtensionError::EmptyName);
                }
                if self.contains_key(name) {
                    return Err(ExtensionError::AlreadyExists(name.to_string()));
                }
                self.insert(name.to_string(), Extension { code: code.to_string(), active: true });
                Ok(name.to_string())
            }
        }
    }

    /// Flip the active flag, returning the new value.
    pub fn toggle(&mut self, name: &str) -> Result<bool, ExtensionError> {
        let ext = self
            .get_mut(name)
            .ok_or_else(|| ExtensionError::NotFound(name.to_string()))?;
        ext.active = !ext.active;
        Ok(ext.active)
    }

    pub fn delete_extension(&mut self, name: &str) -> Result<Extension, ExtensionError> {
        self.remove(name).ok_or_else(|| ExtensionError::NotFound(name.to_string()))
    }

    /// Code of every active extension, in insertion order.
    pub fn active_scripts(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, e)| e.active).map(|(_, e)| e.code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUFFIX: &str = ".pw-navi";

    fn draft(name: &str, title: &str, content: &str) -> SiteDraft {
        SiteDraft { name: name.into(), title: title.into(), content: content.into(), original: None }
    }

    enum Op {
        Create(&'static str, &'static str),
        Edit(&'static str, &'static str),
        Delete(&'static str),
    }

    fn apply(sites: &mut Sites, op: &Op) {
        let _ = match op {
            Op::Create(name, content) => sites.save_site(&draft(name, "", content), SUFFIX, false).map(|_| ()),
            Op::Edit(key, content) => sites
                .save_site(&SiteDraft { content: content.to_string(), original: Some(key.to_string()), ..Default::default() }, SUFFIX, false)
                .map(|_| ()),
            Op::Delete(key) => sites.delete_site(key).map(|_| ()),
        };
    }

    #[test]
    fn replay_matches_fresh_application() {
        let ops = [
            Op::Create("alpha", "<p>a</p>"),
            Op::Create("beta", "<p>b</p>"),
            Op::Edit("alpha.pw-navi", "<p>a2</p>"),
            Op::Delete("beta.pw-navi"),
            Op::Create("gamma", "<p>g</p>"),
            Op::Delete("missing.pw-navi"),
        ];
        let mut first = Sites::new();
        for op in &ops {
            apply(&mut first, op);
        }
        let mut second = Sites::new();
        for op in &ops {
            apply(&mut second, op);
        }
        assert_eq!(first, second);

        let mut expected = Sites::new();
        for (domain, content) in [("alpha.pw-navi", "<p>a2</p>"), ("gamma.pw-navi", "<p>g</p>")] {
            expected.insert(
                domain.to_string(),
                Site { domain: domain.to_string(), title: UNTITLED_SITE.to_string(), html_content: content.to_string() },
            );
        }
        assert_eq!(first, expected);
    }

    #[test]
    fn names_outside_the_domain_charset_are_rejected() {
        let mut sites = Sites::new();
        for bad in ["my site", "a/b", "dots..twice", "-dash", "émoji"] {
            let err = sites.save_site(&draft(bad, "", "<p>x</p>"), SUFFIX, false).unwrap_err();
            assert!(matches!(err, SiteError::InvalidName(_)), "{} gave {:?}", bad, err);
        }
        assert!(sites.is_empty());
        assert_eq!(sites.save_site(&draft("my-site2", "", ""), SUFFIX, false).unwrap(), "my-site2.pw-navi");
        assert!(is_valid_site_key("blog.me.pw-navi"));
        assert!(!is_valid_site_key("trailing-.pw-navi"));
    }

    #[test]
    fn key_gets_suffix_once_and_lowercase() {
        let mut sites = Sites::new();
        assert_eq!(sites.save_site(&draft("Demo", "Demo", "<h1>hi</h1>"), SUFFIX, false).unwrap(), "demo.pw-navi");
        assert_eq!(sites.save_site(&draft("other.PW-NAVI", "", ""), SUFFIX, false).unwrap(), "other.pw-navi");
        assert_eq!(sites.find("DEMO.pw-navi").unwrap().title, "Demo");
        assert_eq!(sites.find("other.pw-navi").unwrap().title, UNTITLED_SITE);
    }

    #[test]
    fn validation_errors() {
        let mut sites = Sites::new();
        assert_eq!(sites.save_site(&draft("  ", "t", "c"), SUFFIX, false), Err(SiteError::EmptyName));
        assert_eq!(sites.save_site(&draft("x", "t", "<p>no doctype</p>"), SUFFIX, true), Err(SiteError::MissingDoctype));
        assert!(sites.save_site(&draft("x", "t", "<!DOCTYPE html><p>ok</p>"), SUFFIX, true).is_ok());
        assert_eq!(
            sites.save_site(&draft("x", "t", "again"), SUFFIX, false),
            Err(SiteError::AlreadyExists("x.pw-navi".into()))
        );
        assert_eq!(sites.delete_site("nope.pw-navi"), Err(SiteError::NotFound("nope.pw-navi".into())));
        assert!(!sites.is_empty());
    }

    #[test]
    fn edit_is_idempotent_and_keeps_key() {
        let mut sites = Sites::new();
        sites.save_site(&draft("demo", "Demo", "<h1>hi</h1>"), SUFFIX, false).unwrap();
        let edit = SiteDraft {
            name: "renamed".into(),
            title: "Demo".into(),
            content: "<h1>hi</h1>".into(),
            original: Some("demo.pw-navi".into()),
        };
        sites.save_site(&edit, SUFFIX, false).unwrap();
        let once = sites.clone();
        sites.save_site(&edit, SUFFIX, false).unwrap();
        assert_eq!(sites, once);
        assert_eq!(sites.len(), 1);
        assert!(sites.find("demo.pw-navi").is_some());
    }

    #[test]
    fn suffix_rename_skips_collisions() {
        let mut sites = Sites::new();
        sites.save_site(&draft("a", "", ""), SUFFIX, false).unwrap();
        sites.save_site(&draft("b", "", ""), SUFFIX, false).unwrap();
        sites.save_site(&draft("b", "", ""), ".mine", false).unwrap();

        assert_eq!(sites.rename_suffix(SUFFIX, ".mine"), 1);
        assert_eq!(sites.find("a.mine").unwrap().domain, "a.mine");
        assert!(sites.find("b.pw-navi").is_some());
        assert!(sites.find("a.pw-navi").is_none());
    }

    #[test]
    fn registry_json_keeps_insertion_order() {
        let mut sites = Sites::new();
        sites.save_site(&draft("zeta", "", ""), SUFFIX, false).unwrap();
        sites.save_site(&draft("alpha", "", ""), SUFFIX, false).unwrap();
        let json = serde_json::to_string(&sites).unwrap();
        assert!(json.find("zeta").unwrap() < json.find("alpha").unwrap());
        let back: Sites = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sites);
    }

    #[test]
    fn legacy_snake_case_content_loads() {
        let site: Site = serde_json::from_str(r#"{"domain":"x.pw-navi","title":"X","html_content":"<p>old</p>"}"#).unwrap();
        assert_eq!(site.html_content, "<p>old</p>");
    }

    #[test]
    fn extension_lifecycle() {
        let mut exts = Extensions::new();
        exts.save_extension("dark-reader", "document.body.style.filter='invert(1)'", None).unwrap();
        exts.save_extension("banner", "console.log('hi')", None).unwrap();
        exts.save_extension("clock", "tick()", None).unwrap();
        assert_eq!(exts.toggle("banner"), Ok(false));

        let scripts: Vec<&str> = exts.active_scripts().collect();
        assert_eq!(scripts, ["document.body.style.filter='invert(1)'", "tick()"]);

        exts.save_extension("ignored", "changed()", Some("banner")).unwrap();
        assert_eq!(exts.get("banner").unwrap(), &Extension { code: "changed()".into(), active: false });

        assert_eq!(exts.toggle("nope"), Err(ExtensionError::NotFound("nope".into())));
        assert_eq!(exts.save_extension(" ", "x", None), Err(ExtensionError::EmptyName));
        assert!(exts.delete_extension("clock").is_ok());
        assert_eq!(exts.len(), 2);
    }
}
