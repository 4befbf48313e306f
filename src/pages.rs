//! HTML for the `navi://` pages. Every value interpolated into markup goes
//! through [`escape`]; every identifier put into a link goes through
//! [`navi_link`].

use crate::downloads::Snapshot;
use crate::history::HistoryEntry;
use crate::rewards::StoreItem;
use crate::settings::{Density, Settings, Theme, SEARCH_ENGINES, THEMES};

pub struct RenderedPage {
    pub title: String,
    pub html: String,
}

pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `navi://<command>/<arg>` with the argument percent-encoded.
pub fn navi_link(command: &str, arg: &str) -> String {
    format!("navi://{}/{}", command, urlencoding::encode(arg))
}

fn format_time(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|d| d.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

// ── shared layout ──

pub struct PageStyle {
    theme: &'static Theme,
    compact: bool,
    background: String,
}

fn css_url_safe(url: &str) -> bool {
    !url.chars().any(|c| matches!(c, '\'' | '"' | '(' | ')' | '\\' | '<' | '>') || c.is_whitespace())
}

impl PageStyle {
    pub fn from_settings(settings: &Settings) -> Self {
        let theme = settings.effective_theme();
        let background = if !settings.background_url.is_empty() && css_url_safe(&settings.background_url) {
            format!("{} url('{}') center / cover fixed", theme.background, settings.background_url)
        } else if !settings.background_color.is_empty() {
            settings.background_color.clone()
        } else {
            theme.background.to_string()
        };
        PageStyle { theme, compact: settings.density == Density::Compact, background }
    }
}

fn layout(style: &PageStyle, title: &str, notice: Option<&str>, body: &str) -> RenderedPage {
    let t = style.theme;
    let (pad, gap) = if style.compact { ("12px", "6px") } else { ("30px", "15px") };
    let notice = notice
        .map(|n| format!(r#"<div class="notice">{}</div>"#, escape(n)))
        .unwrap_or_default();
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>
body {{ font-family: 'Inter', sans-serif; background: {bg}; color: {text}; padding: {pad}; margin: 0; }}
.container {{ max-width: 900px; margin: 0 auto; background: {surface}; padding: {pad}; border-radius: 12px; }}
h1 {{ color: {accent}; border-bottom: 3px solid {accent}; padding-bottom: 10px; }}
nav a {{ margin-right: 12px; color: {accent}; }}
ul {{ list-style: none; padding: 0; }}
li {{ margin-bottom: {gap}; padding: 10px; border-bottom: 1px solid rgba(0,0,0,0.1); }}
.btn {{ background: {accent}; color: white; padding: 5px 10px; border-radius: 4px; text-decoration: none; margin-right: 8px; }}
.danger {{ background: #dc143c; }}
.muted {{ opacity: 0.7; font-size: 0.9em; }}
.notice {{ background: #fff3cd; color: #664d03; padding: 10px; border-radius: 6px; margin-bottom: {gap}; }}
textarea, input {{ width: 100%; box-sizing: border-box; margin-bottom: {gap}; }}
</style>
</head>
<body>
<div class="container">
<nav><a href="navi://home">Home</a><a href="navi://pw">Sites</a><a href="navi://cws">Extensions</a><a href="navi://history">History</a><a href="navi://downloads">Offline</a><a href="navi://store">Store</a><a href="navi://settings">Settings</a></nav>
{notice}{body}
</div>
</body>
</html>"#,
        title = escape(title),
        bg = style.background,
        text = t.text,
        surface = t.surface,
        accent = t.accent,
    );
    RenderedPage { title: title.to_string(), html }
}

// ── home ──

pub struct HomeView<'a> {
    pub balance: u64,
    pub engine_name: &'a str,
    pub notes: &'a str,
    pub site_count: usize,
}

pub fn home(style: &PageStyle, view: &HomeView) -> RenderedPage {
    let body = format!(
        r#"<h1>Navi Browser</h1>
<form action="navi://search" method="get"><input name="q" placeholder="Search with {engine}"></form>
<p>Balance: <strong>{balance} Navits</strong> &middot; {sites} personal sites</p>
<h2>Notes</h2>
<form action="navi://settings/set/notes" method="get"><textarea name="value" rows="6">{notes}</textarea><button type="submit">Save notes</button></form>"#,
        engine = escape(view.engine_name),
        balance = view.balance,
        sites = view.site_count,
        notes = escape(view.notes),
    );
    layout(style, "Navi Home", None, &body)
}

// ── personal sites ──

/// Absolute address of a stored site, so the link works from any page base.
pub fn site_link(domain: &str) -> String {
    format!("local://{}/", domain)
}

pub struct SiteRow<'a> {
    pub domain: &'a str,
    pub title: &'a str,
}

pub fn sites(style: &PageStyle, rows: &[SiteRow], suffix: &str, notice: Option<&str>) -> RenderedPage {
    let mut list = String::new();
    for row in rows {
        list.push_str(&format!(
            r#"<li><a href="{href}"><strong>{title}</strong></a> <span class="muted">({domain})</span>
<a class="btn" href="{edit}">Edit</a><a class="btn danger" href="{delete}">Delete</a></li>
"#,
            href = escape(&site_link(row.domain)),
            domain = escape(row.domain),
            title = escape(row.title),
            edit = escape(&navi_link("pw/edit", row.domain)),
            delete = escape(&navi_link("pw/delete", row.domain)),
        ));
    }
    let body = format!(
        r#"<h1>Personal Website Manager</h1>
<p>Manage your local <code>{suffix}</code> sites. Click a domain to view it.</p>
<a class="btn" href="navi://pw/new">Create New Site</a>
<h2>Your Sites ({count})</h2>
<ul>{list}</ul>"#,
        suffix = escape(suffix),
        count = rows.len(),
    );
    layout(style, "Personal Website Manager", notice, &body)
}

pub struct SiteEditorView<'a> {
    pub name: &'a str,
    pub title: &'a str,
    pub content: &'a str,
    /// Domain being edited; None for a new site
    pub original: Option<&'a str>,
    pub suffix: &'a str,
}

pub fn site_editor(style: &PageStyle, view: &SiteEditorView, notice: Option<&str>) -> RenderedPage {
    let (heading, name_field) = match view.original {
        Some(domain) => (
            format!("Edit {}", escape(domain)),
            format!(
                r#"<input type="hidden" name="original" value="{d}"><p>Domain (locked): <code>{d}</code></p>"#,
                d = escape(domain)
            ),
        ),
        None => (
            "New Site".to_string(),
            format!(
                r#"<label>Domain</label><input name="name" value="{}" placeholder="your-site-name"><span class="muted">{} is added for you</span>"#,
                escape(view.name),
                escape(view.suffix)
            ),
        ),
    };
    let body = format!(
        r#"<h1>Personal Website Builder - {heading}</h1>
<form action="navi://pw/save" method="get">
{name_field}
<label>Page Title</label><input name="title" value="{title}" placeholder="My Awesome Personal Page">
<label>Page Content (full HTML document)</label>
<textarea name="content" rows="20" placeholder="&lt;!DOCTYPE html&gt;">{content}</textarea>
<button type="submit">Save &amp; Preview Site</button>
</form>"#,
        title = escape(view.title),
        content = escape(view.content),
    );
    layout(style, "Personal Website Builder", notice, &body)
}

// ── extensions ──

pub struct ExtensionRow<'a> {
    pub name: &'a str,
    pub active: bool,
    pub code_len: usize,
}

pub fn extensions(style: &PageStyle, rows: &[ExtensionRow], notice: Option<&str>) -> RenderedPage {
    let mut list = String::new();
    for row in rows {
        let state = if row.active { "Active" } else { "Inactive" };
        let toggle = if row.active { "Disable" } else { "Enable" };
        list.push_str(&format!(
            r#"<li><strong>{name}</strong> <span class="muted">{state} &middot; {len} chars</span>
<a class="btn" href="{toggle_link}">{toggle}</a><a class="btn" href="{edit}">Edit</a><a class="btn danger" href="{delete}">Delete</a></li>
"#,
            name = escape(row.name),
            len = row.code_len,
            toggle_link = escape(&navi_link("cws/toggle", row.name)),
            edit = escape(&navi_link("cws/edit", row.name)),
            delete = escape(&navi_link("cws/delete", row.name)),
        ));
    }
    let body = format!(
        r#"<h1>Navi Web Store</h1>
<p>Active extensions run in every page you open.</p>
<a class="btn" href="navi://cws/new">New Extension</a>
<ul>{list}</ul>"#
    );
    layout(style, "Navi Web Store", notice, &body)
}

pub fn extension_editor(style: &PageStyle, name: &str, code: &str, original: Option<&str>, notice: Option<&str>) -> RenderedPage {
    let name_field = match original {
        Some(n) => format!(
            r#"<input type="hidden" name="original" value="{n}"><p>Name (locked): <code>{n}</code></p>"#,
            n = escape(n)
        ),
        None => format!(r#"<label>Name</label><input name="name" value="{}">"#, escape(name)),
    };
    let body = format!(
        r#"<h1>Extension Editor</h1>
<form action="navi://cws/save" method="get">
{name_field}
<label>Script</label><textarea name="code" rows="16">{code}</textarea>
<button type="submit">Save Extension</button>
</form>"#,
        code = escape(code),
    );
    layout(style, "Extension Editor", notice, &body)
}

// ── history ──

pub fn history(style: &PageStyle, entries: &[HistoryEntry]) -> RenderedPage {
    let mut list = String::new();
    for e in entries {
        let title = if e.title.is_empty() { &e.url } else { &e.title };
        list.push_str(&format!(
            r#"<li><a href="{url}">{title}</a> <span class="muted">{when} &middot; {url}</span></li>
"#,
            url = escape(&e.url),
            title = escape(title),
            when = format_time(e.timestamp),
        ));
    }
    let body = format!(
        r#"<h1>History</h1>
<p>{count} pages. <a class="btn danger" href="navi://history/clear">Clear history</a></p>
<ul>{list}</ul>"#,
        count = entries.len(),
    );
    layout(style, "History", None, &body)
}

// ── offline snapshots ──

pub fn downloads(style: &PageStyle, snapshots: &[Snapshot]) -> RenderedPage {
    let mut list = String::new();
    for s in snapshots {
        list.push_str(&format!(
            r#"<li><a href="{open}">{title}</a> <span class="muted">{when} &middot; {url}</span>
<a class="btn danger" href="{delete}">Delete</a></li>
"#,
            open = escape(&navi_link("downloads/open", &s.id)),
            delete = escape(&navi_link("downloads/delete", &s.id)),
            title = escape(&s.title),
            url = escape(&s.url),
            when = format_time(s.timestamp),
        ));
    }
    let body = format!(
        r#"<h1>Offline Pages</h1>
<p>{count} saved pages.</p>
<ul>{list}</ul>"#,
        count = snapshots.len(),
    );
    layout(style, "Offline Pages", None, &body)
}

// ── store ──

pub struct StoreRow {
    pub item: &'static StoreItem,
    pub owned: bool,
    pub available: bool,
}

pub fn store(style: &PageStyle, balance: u64, rows: &[StoreRow], notice: Option<&str>) -> RenderedPage {
    let mut list = String::new();
    for row in rows {
        let action = if row.owned {
            r#"<span class="muted">Owned</span>"#.to_string()
        } else if !row.available {
            r#"<span class="muted">Out of season</span>"#.to_string()
        } else {
            format!(
                r#"<a class="btn" href="{}">Buy for {} Navits</a>"#,
                escape(&navi_link("store/buy", row.item.id)),
                row.item.price
            )
        };
        list.push_str(&format!(
            r#"<li><strong>{name}</strong> <span class="muted">{desc}</span> {action}</li>
"#,
            name = escape(row.item.name),
            desc = escape(row.item.description),
        ));
    }
    let body = format!(
        r#"<h1>Navits Store</h1>
<p>Balance: <strong>{balance} Navits</strong>. Earn more by searching and by watching videos.</p>
<ul>{list}</ul>"#
    );
    layout(style, "Navits Store", notice, &body)
}

// ── settings ──

pub fn settings(style: &PageStyle, settings: &Settings, owned: &dyn Fn(&str) -> bool, notice: Option<&str>) -> RenderedPage {
    let mut themes = String::new();
    for t in THEMES {
        let unlocked = t.unlock.map_or(true, |item| owned(item));
        let marker = if t.id == settings.theme { " (current)" } else { "" };
        if unlocked {
            themes.push_str(&format!(
                r#"<a class="btn" href="{}">{}{}</a>"#,
                escape(&navi_link("settings/set/theme", t.id)),
                escape(t.name),
                marker
            ));
        } else {
            themes.push_str(&format!(r#"<span class="muted">{} (locked)</span> "#, escape(t.name)));
        }
    }
    let mut engines = String::new();
    for e in SEARCH_ENGINES {
        let marker = if e.id == settings.search_engine { " (current)" } else { "" };
        engines.push_str(&format!(
            r#"<a class="btn" href="{}">{}{}</a>"#,
            escape(&navi_link("settings/set/searchEngine", e.id)),
            escape(e.name),
            marker
        ));
    }
    let toggle = |key: &str, on: bool| {
        format!(
            r#"<a class="btn" href="{}">{}: {}</a>"#,
            escape(&navi_link(&format!("settings/set/{}", key), if on { "off" } else { "on" })),
            key,
            if on { "on" } else { "off" }
        )
    };
    let body = format!(
        r##"<h1>Settings</h1>
<h2>Theme</h2><p>{themes}</p>
<h2>Search engine</h2><p>{engines}</p>
<h2>Behaviour</h2><p>{dark}{wholesome}{strict}</p>
<h2>Layout</h2><p><a class="btn" href="navi://settings/set/density/comfortable">Comfortable</a><a class="btn" href="navi://settings/set/density/compact">Compact</a> <span class="muted">current: {density}</span></p>
<h2>Personal site suffix</h2><p><code>{suffix}</code></p>
<form action="navi://settings/set/siteSuffix" method="get"><input name="value" value="{suffix}"><button type="submit">Change suffix</button></form>
<h2>Background</h2>
<form action="navi://settings/set/backgroundUrl" method="get"><input name="value" value="{bg_url}" placeholder="https://..."><button type="submit">Set image</button></form>
<form action="navi://settings/set/backgroundColor" method="get"><input name="value" value="{bg_color}" placeholder="#223344"><button type="submit">Set colour</button></form>
<h2>Proxy</h2><p class="muted">Proxy support is not available.</p>"##,
        dark = toggle("darkMode", settings.dark_mode),
        wholesome = toggle("wholesomeMode", settings.wholesome_mode),
        strict = toggle("strictSiteHtml", settings.strict_site_html),
        density = settings.density.as_str(),
        suffix = escape(&settings.site_suffix),
        bg_url = escape(&settings.background_url),
        bg_color = escape(&settings.background_color),
    );
    layout(style, "Settings", notice, &body)
}

// ── notices ──

pub fn notice(style: &PageStyle, heading: &str, message: &str) -> RenderedPage {
    let body = format!(
        r#"<h1>{}</h1><p>{}</p><p><a class="btn" href="navi://home">Back home</a></p>"#,
        escape(heading),
        escape(message)
    );
    layout(style, heading, None, &body)
}
