use crate::crash_log;
use crate::pages::{self, PageStyle, RenderedPage};
use crate::rewards::{PurchaseOutcome, CATALOGUE};
use crate::settings::SettingChange;
use crate::sites::SiteDraft;
use crate::store::{AppState, Document};
use crate::Clock;

pub const SCHEME: &str = "navi://";
/// Base address for generated pages. Never resolves on the network.
pub const INTERNAL_BASE: &str = "navi://internal/";

/// One `navi://` command. Keywords are case-insensitive; arguments keep their case.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Home,
    Sites,
    SiteEditor(Option<String>),
    SaveSite(SiteDraft),
    DeleteSite(String),
    Extensions,
    ExtensionEditor(Option<String>),
    SaveExtension { name: String, code: String, original: Option<String> },
    ToggleExtension(String),
    DeleteExtension(String),
    History,
    ClearHistory,
    Settings,
    SetSetting { key: String, value: String },
    Store,
    Buy(String),
    Downloads,
    OpenDownload(String),
    DeleteDownload(String),
    Search(String),
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Show generated or stored HTML in place of a page load.
    Html { html: String, base: String, title: String },
    /// Let the view perform a real load.
    Navigate(String),
    Ignore,
}

impl Response {
    fn page(page: RenderedPage) -> Self {
        Response::Html { html: page.html, base: INTERNAL_BASE.to_string(), title: page.title }
    }
}

pub fn is_internal(url: &str) -> bool {
    url.trim_start()
        .get(..SCHEME.len())
        .map_or(false, |p| p.eq_ignore_ascii_case(SCHEME))
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

/// Parse a `navi://` address. Returns None for any other scheme.
pub fn parse(url: &str) -> Option<Command> {
    let url = url.trim();
    if !is_internal(url) {
        return None;
    }
    let rest = &url[SCHEME.len()..];
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    let path = path.trim_matches('/');

    let params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();
    let param = |key: &str| params.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone());

    let segments: Vec<&str> = if path.is_empty() { Vec::new() } else { path.split('/').collect() };
    let head: Vec<String> = segments.iter().take(3).map(|s| s.to_ascii_lowercase()).collect();
    let head: Vec<&str> = head.iter().map(String::as_str).collect();
    let tail = |from: usize| decode(&segments[from..].join("/"));
    let has_arg = segments.len() > 2;

    let command = match head.as_slice() {
        [] | ["home"] => Command::Home,
        ["pw"] => Command::Sites,
        ["pw", "new"] => Command::SiteEditor(None),
        ["pw", "save"] => Command::SaveSite(SiteDraft {
            name: param("name").unwrap_or_default(),
            title: param("title").unwrap_or_default(),
            content: param("content").unwrap_or_default(),
            original: non_empty(param("original")),
        }),
        ["pw", "edit", ..] if has_arg => Command::SiteEditor(Some(tail(2))),
        ["pw", "delete", ..] if has_arg => Command::DeleteSite(tail(2)),
        ["cws"] => Command::Extensions,
        ["cws", "new"] => Command::ExtensionEditor(None),
        ["cws", "save"] => Command::SaveExtension {
            name: param("name").unwrap_or_default(),
            code: param("code").unwrap_or_default(),
            original: non_empty(param("original")),
        },
        ["cws", "edit", ..] if has_arg => Command::ExtensionEditor(Some(tail(2))),
        ["cws", "toggle", ..] if has_arg => Command::ToggleExtension(tail(2)),
        ["cws", "delete", ..] if has_arg => Command::DeleteExtension(tail(2)),
        ["history"] => Command::History,
        ["history", "clear"] => Command::ClearHistory,
        ["settings"] => Command::Settings,
        ["settings", "set", ..] if has_arg => {
            let value = if segments.len() > 3 { tail(3) } else { param("value").unwrap_or_default() };
            Command::SetSetting { key: decode(segments[2]), value }
        }
        ["store"] => Command::Store,
        ["store", "buy", ..] if has_arg => Command::Buy(tail(2)),
        ["downloads"] => Command::Downloads,
        ["downloads", "open", ..] if has_arg => Command::OpenDownload(tail(2)),
        ["downloads", "delete", ..] if has_arg => Command::DeleteDownload(tail(2)),
        ["search"] => Command::Search(param("q").unwrap_or_default()),
        ["search", ..] => Command::Search(tail(1)),
        _ => Command::Unknown(path.to_string()),
    };
    Some(command)
}

// ── address classification ──

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Internal(Command),
    Site(String),
    Web(String),
}

/// The stored-site domain `address` names, if any. Accepts a bare domain and
/// the `http(s)://` / `local://` forms a view produces for it.
pub fn virtual_domain(address: &str, doc: &Document) -> Option<String> {
    let trimmed = address.trim();
    let lower = trimmed.to_lowercase();
    let host = ["https://", "http://", "local://"]
        .iter()
        .find_map(|p| lower.strip_prefix(p))
        .unwrap_or(&lower)
        .trim_end_matches('/');
    if host.is_empty() || host.contains('/') || host.contains(char::is_whitespace) {
        return None;
    }
    let suffix = doc.settings.site_suffix.to_lowercase();
    if host.ends_with(&suffix) || doc.sites.contains_key(host) {
        Some(host.to_string())
    } else {
        None
    }
}

/// Classify a navigation the view is about to perform.
pub fn classify(url: &str, doc: &Document) -> Target {
    if let Some(cmd) = parse(url) {
        // relative links on generated pages resolve against the placeholder base
        if let Command::Unknown(path) = &cmd {
            let rest = path.get(..9).filter(|p| p.eq_ignore_ascii_case("internal/")).map(|_| &path[9..]);
            if let Some(domain) = rest.and_then(|r| virtual_domain(r, doc)) {
                return Target::Site(domain);
            }
        }
        return Target::Internal(cmd);
    }
    if let Some(domain) = virtual_domain(url, doc) {
        return Target::Site(domain);
    }
    Target::Web(url.to_string())
}

/// Classify text typed into the address bar: internal command, stored site,
/// explicit URL, bare domain, or a search.
pub fn resolve_typed(text: &str, doc: &Document) -> Target {
    let text = text.trim();
    if text.is_empty() {
        return Target::Internal(Command::Home);
    }
    match classify(text, doc) {
        Target::Web(_) => {}
        other => return other,
    }
    let lower = text.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("about:") {
        Target::Web(text.to_string())
    } else if text.contains('.') && !text.contains(' ') {
        Target::Web(format!("https://{}", text))
    } else {
        Target::Web(doc.settings.engine().search_url(text))
    }
}

// ── dispatch ──

fn style(doc: &Document) -> PageStyle {
    PageStyle::from_settings(&doc.settings)
}

/// Show a stored site in place of a network load.
pub fn site_response(doc: &Document, domain: &str) -> Response {
    match doc.sites.find(domain) {
        Some(site) => Response::Html {
            html: site.html_content.clone(),
            base: pages::site_link(&site.domain),
            title: site.title.clone(),
        },
        None => Response::page(pages::notice(
            &style(doc),
            "Site not found",
            &format!("There is no personal site called '{}'. Create it at navi://pw/new.", domain),
        )),
    }
}

fn home_page(doc: &Document) -> RenderedPage {
    let view = pages::HomeView {
        balance: doc.reward_state.balance,
        engine_name: doc.settings.engine().name,
        notes: &doc.settings.notes,
        site_count: doc.sites.len(),
    };
    pages::home(&style(doc), &view)
}

fn sites_page(doc: &Document, notice: Option<&str>) -> RenderedPage {
    let rows: Vec<pages::SiteRow> = doc
        .sites
        .iter()
        .map(|(domain, site)| pages::SiteRow { domain, title: &site.title })
        .collect();
    pages::sites(&style(doc), &rows, &doc.settings.site_suffix, notice)
}

fn extensions_page(doc: &Document, notice: Option<&str>) -> RenderedPage {
    let rows: Vec<pages::ExtensionRow> = doc
        .extensions
        .iter()
        .map(|(name, ext)| pages::ExtensionRow { name, active: ext.active, code_len: ext.code.chars().count() })
        .collect();
    pages::extensions(&style(doc), &rows, notice)
}

fn settings_page(doc: &Document, notice: Option<&str>) -> RenderedPage {
    let owned = |item: &str| doc.reward_state.owns(item);
    pages::settings(&style(doc), &doc.settings, &owned, notice)
}

fn store_page(doc: &Document, clock: &Clock, notice: Option<&str>) -> RenderedPage {
    let rows: Vec<pages::StoreRow> = CATALOGUE
        .iter()
        .map(|item| pages::StoreRow {
            item,
            owned: doc.reward_state.owns(item.id),
            available: item.available_on(clock.today),
        })
        .collect();
    pages::store(&style(doc), doc.reward_state.balance, &rows, notice)
}

fn site_editor_page(doc: &Document, draft: &SiteDraft, notice: Option<&str>) -> RenderedPage {
    let view = pages::SiteEditorView {
        name: &draft.name,
        title: &draft.title,
        content: &draft.content,
        original: draft.original.as_deref(),
        suffix: &doc.settings.site_suffix,
    };
    pages::site_editor(&style(doc), &view, notice)
}

/// Run one command against the state. Every mutation is persisted before returning.
pub fn dispatch(state: &mut AppState, command: Command, clock: &Clock) -> Response {
    let page = match command {
        Command::Home => home_page(&state.doc),
        Command::Sites => sites_page(&state.doc, None),
        Command::SiteEditor(None) => site_editor_page(&state.doc, &SiteDraft::default(), None),
        Command::SiteEditor(Some(domain)) => match state.doc.sites.find(&domain) {
            Some(site) => {
                let draft = SiteDraft {
                    name: String::new(),
                    title: site.title.clone(),
                    content: site.html_content.clone(),
                    original: Some(site.domain.clone()),
                };
                site_editor_page(&state.doc, &draft, None)
            }
            None => sites_page(&state.doc, Some(&format!("Could not find website '{}' to edit.", domain))),
        },
        Command::SaveSite(draft) => {
            let doc = &mut state.doc;
            match doc.sites.save_site(&draft, &doc.settings.site_suffix, doc.settings.strict_site_html) {
                Ok(key) => {
                    crash_log::log_info("router", &format!("personal website saved: {}", key));
                    state.persist();
                    return site_response(&state.doc, &key);
                }
                Err(e) => site_editor_page(&state.doc, &draft, Some(&e.to_string())),
            }
        }
        Command::DeleteSite(domain) => match state.doc.sites.delete_site(&domain) {
            Ok(site) => {
                crash_log::log_info("router", &format!("personal website deleted: {}", site.domain));
                state.persist();
                let msg = format!("The website '{}' has been successfully deleted.", site.domain);
                sites_page(&state.doc, Some(&msg))
            }
            Err(e) => sites_page(&state.doc, Some(&e.to_string())),
        },
        Command::Extensions => extensions_page(&state.doc, None),
        Command::ExtensionEditor(None) => pages::extension_editor(&style(&state.doc), "", "", None, None),
        Command::ExtensionEditor(Some(name)) => match state.doc.extensions.get(&name) {
            Some(ext) => pages::extension_editor(&style(&state.doc), &name, &ext.code, Some(&name), None),
            None => extensions_page(&state.doc, Some(&format!("Could not find extension '{}'.", name))),
        },
        Command::SaveExtension { name, code, original } => {
            match state.doc.extensions.save_extension(&name, &code, original.as_deref()) {
                Ok(saved) => {
                    crash_log::log_info("router", &format!("extension saved: {}", saved));
                    state.persist();
                    extensions_page(&state.doc, Some(&format!("Saved '{}'.", saved)))
                }
                Err(e) => pages::extension_editor(&style(&state.doc), &name, &code, original.as_deref(), Some(&e.to_string())),
            }
        }
        Command::ToggleExtension(name) => match state.doc.extensions.toggle(&name) {
            Ok(active) => {
                crash_log::log_info("router", &format!("extension {} active={}", name, active));
                state.persist();
                extensions_page(&state.doc, None)
            }
            Err(e) => extensions_page(&state.doc, Some(&e.to_string())),
        },
        Command::DeleteExtension(name) => match state.doc.extensions.delete_extension(&name) {
            Ok(_) => {
                crash_log::log_info("router", &format!("extension deleted: {}", name));
                state.persist();
                extensions_page(&state.doc, Some(&format!("Deleted '{}'.", name)))
            }
            Err(e) => extensions_page(&state.doc, Some(&e.to_string())),
        },
        Command::History => pages::history(&style(&state.doc), state.doc.history.entries()),
        Command::ClearHistory => {
            state.doc.history.clear();
            state.persist();
            pages::history(&style(&state.doc), state.doc.history.entries())
        }
        Command::Settings => settings_page(&state.doc, None),
        Command::SetSetting { key, value } => {
            let doc = &mut state.doc;
            match doc.settings.apply(&key, &value, &doc.reward_state.inventory) {
                Ok(change) => {
                    if let SettingChange::SuffixChanged { old, new } = &change {
                        let renamed = doc.sites.rename_suffix(old, new);
                        crash_log::log_info("router", &format!("site suffix {} -> {}, {} sites renamed", old, new, renamed));
                    }
                    state.persist();
                    if key.eq_ignore_ascii_case("notes") {
                        home_page(&state.doc)
                    } else {
                        settings_page(&state.doc, Some("Settings saved."))
                    }
                }
                Err(e) => settings_page(&state.doc, Some(&e.to_string())),
            }
        }
        Command::Store => store_page(&state.doc, clock, None),
        Command::Buy(item) => match state.doc.reward_state.purchase(&item, clock.today) {
            Ok(PurchaseOutcome::Purchased { price }) => {
                crash_log::log_info("rewards", &format!("purchased {} for {} navits", item, price));
                state.persist();
                store_page(&state.doc, clock, Some(&format!("Unlocked '{}'.", item)))
            }
            Ok(PurchaseOutcome::AlreadyOwned) => store_page(&state.doc, clock, Some("You already own this item.")),
            Err(e) => store_page(&state.doc, clock, Some(&e.to_string())),
        },
        Command::Downloads => pages::downloads(&style(&state.doc), state.doc.downloads.entries()),
        Command::OpenDownload(id) => match state.doc.downloads.get(&id) {
            Some(snap) => {
                return Response::Html { html: snap.html.clone(), base: INTERNAL_BASE.to_string(), title: snap.title.clone() };
            }
            None => pages::notice(&style(&state.doc), "Offline page not found", "That saved page no longer exists."),
        },
        Command::DeleteDownload(id) => {
            if state.doc.downloads.remove(&id).is_some() {
                state.persist();
            }
            pages::downloads(&style(&state.doc), state.doc.downloads.entries())
        }
        Command::Search(query) => {
            if query.trim().is_empty() {
                home_page(&state.doc)
            } else {
                return Response::Navigate(state.doc.settings.engine().search_url(&query));
            }
        }
        Command::Unknown(path) => {
            tracing::debug!(path = %path, "ignoring unknown navi command");
            return Response::Ignore;
        }
    };
    Response::page(page)
}
