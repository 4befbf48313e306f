use std::collections::BTreeMap;

use crate::crash_log;
use crate::history;
use crate::rewards::WatchTracker;
use crate::router::{self, Response, Target};
use crate::store::AppState;
use crate::Clock;

pub type TabId = u64;

/// Ticket for an asynchronous render. Results for an older generation are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderRequest {
    pub tab: TabId,
    pub generation: u64,
}

/// The embedded engine that actually fetches and paints pages. One per tab.
pub trait WebView {
    fn load_url(&mut self, url: &str);
    fn load_html(&mut self, html: &str, base_url: &str);
    fn execute_script(&mut self, script: &str);
    /// Answer later through `Browser::rendered_html` with the same request.
    fn request_rendered_html(&mut self, request: RenderRequest);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Deny,
}

fn is_blocked_scheme(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    ["javascript:", "vbscript:", "file:", "blob:", "ms-msdt:", "search-ms:"]
        .iter()
        .any(|s| lower.starts_with(s))
}

pub struct Tab<V> {
    view: V,
    url: String,
    title: String,
    generation: u64,
    watch: WatchTracker,
}

impl<V> Tab<V> {
    fn new(view: V) -> Self {
        Self { view, url: String::new(), title: String::new(), generation: 0, watch: WatchTracker::new() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn watch_ticks(&self) -> u32 {
        self.watch.ticks()
    }

    fn enter(&mut self, url: &str) {
        if self.url != url {
            self.url = url.to_string();
            self.generation += 1;
            self.watch.reset();
        }
    }
}

/// Browser shell: owns the application state and routes every tab's view events.
pub struct Browser<V: WebView> {
    state: AppState,
    tabs: BTreeMap<TabId, Tab<V>>,
    next_tab: TabId,
}

impl<V: WebView> Browser<V> {
    pub fn new(state: AppState) -> Self {
        Self { state, tabs: BTreeMap::new(), next_tab: 1 }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    pub fn tab(&self, id: TabId) -> Option<&Tab<V>> {
        self.tabs.get(&id)
    }

    pub fn view_mut(&mut self, id: TabId) -> Option<&mut V> {
        self.tabs.get_mut(&id).map(|t| &mut t.view)
    }

    pub fn tab_ids(&self) -> Vec<TabId> {
        self.tabs.keys().copied().collect()
    }

    /// Open a tab on the configured home page.
    pub fn open_tab(&mut self, view: V, clock: &Clock) -> TabId {
        let id = self.next_tab;
        self.next_tab += 1;
        self.tabs.insert(id, Tab::new(view));
        let home = self.state.doc.settings.home_page.clone();
        self.navigate(id, &home, clock);
        tracing::debug!(tab = id, "tab opened");
        id
    }

    pub fn close_tab(&mut self, id: TabId) -> Option<V> {
        self.tabs.remove(&id).map(|t| t.view)
    }

    fn show(&mut self, id: TabId, address: &str, response: Response) {
        let Some(tab) = self.tabs.get_mut(&id) else { return };
        match response {
            Response::Html { html, base, title } => {
                // stored sites are addressed by their domain, whatever command showed them
                let address = base.strip_prefix("local://").map_or(address, |d| d.trim_end_matches('/'));
                tab.enter(address);
                tab.title = title;
                tab.view.load_html(&html, &base);
            }
            Response::Navigate(url) => tab.view.load_url(&url),
            Response::Ignore => {}
        }
    }

    fn handle(&mut self, id: TabId, address: &str, target: Target, clock: &Clock) -> NavigationDecision {
        match target {
            Target::Internal(command) => {
                let response = router::dispatch(&mut self.state, command, clock);
                self.show(id, address, response);
                NavigationDecision::Deny
            }
            Target::Site(domain) => {
                let response = router::site_response(&self.state.doc, &domain);
                self.show(id, &domain, response);
                NavigationDecision::Deny
            }
            Target::Web(_) => NavigationDecision::Allow,
        }
    }

    /// Address-bar input.
    pub fn navigate(&mut self, id: TabId, text: &str, clock: &Clock) {
        if !self.tabs.contains_key(&id) {
            return;
        }
        match router::resolve_typed(text, &self.state.doc) {
            Target::Web(url) => {
                if let Some(tab) = self.tabs.get_mut(&id) {
                    tab.view.load_url(&url);
                }
            }
            target => {
                self.handle(id, text.trim(), target, clock);
            }
        }
    }

    /// The view is about to load `url`. Internal addresses and stored sites are
    /// answered here and the real load is cancelled.
    pub fn navigation_requested(&mut self, id: TabId, url: &str, clock: &Clock) -> NavigationDecision {
        if is_blocked_scheme(url) {
            crash_log::log_warn("navigation", &format!("blocked scheme: {}", url));
            return NavigationDecision::Deny;
        }
        if !self.tabs.contains_key(&id) {
            return NavigationDecision::Deny;
        }
        let target = router::classify(url, &self.state.doc);
        self.handle(id, url, target, clock)
    }

    pub fn load_finished(&mut self, id: TabId, url: &str, title: &str, now: i64) {
        let Some(tab) = self.tabs.get_mut(&id) else { return };
        let title = clean_title(title);
        if !history::is_internal_url(url) {
            tab.enter(url);
        }
        if !title.is_empty() {
            tab.title = title.clone();
        }

        let doc = &mut self.state.doc;
        doc.history.record(url, &title, now);
        if let Some(amount) = doc.reward_state.award_search(url, now) {
            crash_log::log_info("rewards", &format!("+{} navits for search", amount));
        }
        doc.reward_state.last_active_timestamp = now;

        for script in doc.extensions.active_scripts() {
            tab.view.execute_script(script);
        }
        self.state.persist();
    }

    pub fn title_changed(&mut self, id: TabId, title: &str) {
        if let Some(tab) = self.tabs.get_mut(&id) {
            tab.title = clean_title(title);
        }
    }

    pub fn url_changed(&mut self, id: TabId, url: &str) {
        if let Some(tab) = self.tabs.get_mut(&id) {
            tab.enter(url);
        }
    }

    /// Watch-timer tick. Returns the Navits awarded, if any.
    pub fn tick(&mut self, id: TabId, now: i64) -> Option<u64> {
        let tab = self.tabs.get_mut(&id)?;
        let amount = tab.watch.tick(&tab.url)?;
        let rewards = &mut self.state.doc.reward_state;
        rewards.balance += amount;
        rewards.last_active_timestamp = now;
        crash_log::log_info("rewards", &format!("+{} navits for watching {}", amount, tab.url));
        self.state.persist();
        Some(amount)
    }

    /// Ask the tab's view for its rendered HTML; completes in `rendered_html`.
    pub fn save_offline(&mut self, id: TabId) -> Option<RenderRequest> {
        let tab = self.tabs.get_mut(&id)?;
        let request = RenderRequest { tab: id, generation: tab.generation };
        tab.view.request_rendered_html(request);
        Some(request)
    }

    /// Store a snapshot for `request`, unless the tab is gone or has moved on.
    pub fn rendered_html(&mut self, request: RenderRequest, html: String, now: i64) -> Option<String> {
        let Some(tab) = self.tabs.get(&request.tab) else {
            tracing::debug!(tab = request.tab, "render result for closed tab dropped");
            return None;
        };
        if tab.generation != request.generation {
            tracing::debug!(tab = request.tab, "stale render result dropped");
            return None;
        }
        let id = self.state.doc.downloads.add(&tab.title, &tab.url, html, now);
        crash_log::log_info("downloads", &format!("saved {} as {}", tab.url, id));
        self.state.persist();
        Some(id)
    }
}

fn clean_title(title: &str) -> String {
    title.replace(|c: char| c == '<' || c == '>', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryEntry;
    use crate::rewards::{WATCH_REWARD, WATCH_TICKS_REQUIRED};
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    #[derive(Debug, Clone, PartialEq)]
    enum ViewCall {
        LoadUrl(String),
        LoadHtml { html: String, base: String },
        Script(String),
        Render(RenderRequest),
    }

    #[derive(Debug, Default)]
    struct RecordingView {
        calls: Vec<ViewCall>,
    }

    impl RecordingView {
        fn last_html(&self) -> Option<(&str, &str)> {
            self.calls.iter().rev().find_map(|c| match c {
                ViewCall::LoadHtml { html, base } => Some((html.as_str(), base.as_str())),
                _ => None,
            })
        }

        fn scripts(&self) -> Vec<&str> {
            self.calls
                .iter()
                .filter_map(|c| match c {
                    ViewCall::Script(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect()
        }
    }

    impl WebView for RecordingView {
        fn load_url(&mut self, url: &str) {
            self.calls.push(ViewCall::LoadUrl(url.to_string()));
        }
        fn load_html(&mut self, html: &str, base_url: &str) {
            self.calls.push(ViewCall::LoadHtml { html: html.to_string(), base: base_url.to_string() });
        }
        fn execute_script(&mut self, script: &str) {
            self.calls.push(ViewCall::Script(script.to_string()));
        }
        fn request_rendered_html(&mut self, request: RenderRequest) {
            self.calls.push(ViewCall::Render(request));
        }
    }

    fn clock() -> Clock {
        Clock { unix: 1_760_000_000, today: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap() }
    }

    fn browser() -> (Browser<RecordingView>, TabId, MemoryStore) {
        let store = MemoryStore::new();
        let mut browser = Browser::new(AppState::load(Box::new(store.clone())));
        let tab = browser.open_tab(RecordingView::default(), &clock());
        (browser, tab, store)
    }

    fn view(b: &Browser<RecordingView>, tab: TabId) -> &RecordingView {
        b.tab(tab).unwrap().view()
    }

    #[test]
    fn new_tab_shows_home() {
        let (b, tab, _) = browser();
        let (html, base) = view(&b, tab).last_html().unwrap();
        assert!(html.contains("Navi Browser"));
        assert_eq!(base, router::INTERNAL_BASE);
        assert_eq!(b.tab(tab).unwrap().url(), "navi://home");
        assert_eq!(b.tab(tab).unwrap().title(), "Navi Home");
    }

    #[test]
    fn internal_navigation_is_intercepted() {
        let (mut b, tab, _) = browser();
        assert_eq!(b.navigation_requested(tab, "navi://pw", &clock()), NavigationDecision::Deny);
        assert!(view(&b, tab).last_html().unwrap().0.contains("welcome.pw-navi"));
        assert_eq!(b.navigation_requested(tab, "https://rust-lang.org/", &clock()), NavigationDecision::Allow);
        assert_eq!(b.navigation_requested(tab, "javascript:alert(1)", &clock()), NavigationDecision::Deny);
    }

    #[test]
    fn site_builder_end_to_end() {
        let (mut b, tab, store) = browser();
        b.navigation_requested(tab, "navi://pw/new", &clock());
        assert!(view(&b, tab).last_html().unwrap().0.contains("navi://pw/save"));

        let save = "navi://pw/save?name=demo&title=Demo&content=%3Ch1%3Ehi%3C%2Fh1%3E";
        assert_eq!(b.navigation_requested(tab, save, &clock()), NavigationDecision::Deny);
        assert_eq!(view(&b, tab).last_html(), Some(("<h1>hi</h1>", "local://demo.pw-navi/")));
        assert_eq!(b.tab(tab).unwrap().title(), "Demo");
        assert_eq!(b.tab(tab).unwrap().url(), "demo.pw-navi");

        b.navigate(tab, "navi://pw", &clock());
        b.navigate(tab, "demo.pw-navi", &clock());
        assert_eq!(view(&b, tab).last_html(), Some(("<h1>hi</h1>", "local://demo.pw-navi/")));
        assert_eq!(b.tab(tab).unwrap().url(), "demo.pw-navi");
        assert!(store.saved_json().unwrap().contains("demo.pw-navi"));
    }

    #[test]
    fn clicking_a_site_in_the_manager_opens_it() {
        let (mut b, tab, _) = browser();
        b.navigation_requested(tab, "navi://pw", &clock());
        let (html, base) = view(&b, tab).last_html().unwrap();
        let start = html.find(r#"<li><a href=""#).unwrap() + r#"<li><a href=""#.len();
        let href = &html[start..start + html[start..].find('"').unwrap()];
        let clicked = url::Url::parse(base).unwrap().join(href).unwrap().to_string();

        assert_eq!(b.navigation_requested(tab, &clicked, &clock()), NavigationDecision::Deny);
        let (html, base) = view(&b, tab).last_html().unwrap();
        assert!(html.contains("Welcome"));
        assert_eq!(base, "local://welcome.pw-navi/");
        assert_eq!(b.tab(tab).unwrap().url(), "welcome.pw-navi");

        // a relative link resolved against the placeholder base still lands on the site
        b.navigation_requested(tab, "navi://pw", &clock());
        assert_eq!(b.navigation_requested(tab, "navi://internal/welcome.pw-navi", &clock()), NavigationDecision::Deny);
        assert_eq!(view(&b, tab).last_html().unwrap().1, "local://welcome.pw-navi/");
    }

    #[test]
    fn typed_text_becomes_search_or_url() {
        let (mut b, tab, _) = browser();
        b.navigate(tab, "rust ownership", &clock());
        b.navigate(tab, "crates.io", &clock());
        let calls = &view(&b, tab).calls;
        assert!(calls.contains(&ViewCall::LoadUrl("https://www.google.com/search?q=rust%20ownership".into())));
        assert_eq!(calls.last(), Some(&ViewCall::LoadUrl("https://crates.io".into())));
    }

    #[test]
    fn search_form_navigates_to_engine() {
        let (mut b, tab, _) = browser();
        b.navigation_requested(tab, "navi://search?q=ferris", &clock());
        assert_eq!(
            view(&b, tab).calls.last(),
            Some(&ViewCall::LoadUrl("https://www.google.com/search?q=ferris".into()))
        );
    }

    #[test]
    fn load_finished_records_rewards_and_injects() {
        let (mut b, tab, store) = browser();
        b.state_mut().doc.extensions.save_extension("A", "console.log('a')", None).unwrap();
        b.state_mut().doc.extensions.save_extension("B", "console.log('b')", None).unwrap();
        b.state_mut().doc.extensions.toggle("B").unwrap();

        let before = store.save_count();
        b.load_finished(tab, "https://www.google.com/search?q=rust", "rust - Google <b>Search</b>", 1_000);
        let s = &b.state().doc;
        assert_eq!(s.reward_state.balance, 1);
        assert_eq!(
            s.history.entries()[0],
            HistoryEntry {
                url: "https://www.google.com/search?q=rust".into(),
                title: "rust - Google bSearch/b".into(),
                timestamp: 1_000
            }
        );
        assert_eq!(view(&b, tab).scripts(), vec!["console.log('a')"]);
        assert_eq!(store.save_count(), before + 1);

        // inside the cooldown
        b.load_finished(tab, "https://www.google.com/search?q=rust+book", "", 1_010);
        assert_eq!(b.state().doc.reward_state.balance, 1);
        b.load_finished(tab, "https://www.google.com/search?q=rust+async", "", 1_070);
        assert_eq!(b.state().doc.reward_state.balance, 2);
    }

    #[test]
    fn internal_pages_stay_out_of_history() {
        let (mut b, tab, _) = browser();
        b.load_finished(tab, "navi://internal/", "Navi Home", 5);
        assert!(b.state().doc.history.is_empty());
        assert_eq!(b.tab(tab).unwrap().url(), "navi://home");
    }

    #[test]
    fn watching_pays_after_sustained_ticks() {
        let (mut b, tab, _) = browser();
        b.url_changed(tab, "https://www.youtube.com/watch?v=abc");
        for i in 1..WATCH_TICKS_REQUIRED {
            assert_eq!(b.tick(tab, i as i64), None);
        }
        assert_eq!(b.tick(tab, 99), Some(WATCH_REWARD));
        assert_eq!(b.state().doc.reward_state.balance, WATCH_REWARD);
        assert_eq!(b.tab(tab).unwrap().watch_ticks(), 0);
    }

    #[test]
    fn navigating_away_resets_watch_progress() {
        let (mut b, tab, _) = browser();
        b.url_changed(tab, "https://www.youtube.com/watch?v=abc");
        b.tick(tab, 1);
        b.tick(tab, 2);
        b.url_changed(tab, "https://www.youtube.com/watch?v=xyz");
        assert_eq!(b.tab(tab).unwrap().watch_ticks(), 0);
        b.url_changed(tab, "https://example.com");
        assert_eq!(b.tick(tab, 3), None);
        assert_eq!(b.tab(tab).unwrap().watch_ticks(), 0);
    }

    #[test]
    fn offline_snapshot_round_trip() {
        let (mut b, tab, _) = browser();
        b.url_changed(tab, "https://example.com");
        b.load_finished(tab, "https://example.com", "Example", 10);
        let req = b.save_offline(tab).unwrap();
        assert_eq!(view(&b, tab).calls.last(), Some(&ViewCall::Render(req)));

        let id = b.rendered_html(req, "<p>saved</p>".into(), 11).unwrap();
        let snap = b.state().doc.downloads.get(&id).unwrap();
        assert_eq!(snap.title, "Example");
        assert_eq!(snap.url, "https://example.com");

        b.navigation_requested(tab, &format!("navi://downloads/open/{}", id), &clock());
        assert_eq!(view(&b, tab).last_html(), Some(("<p>saved</p>", router::INTERNAL_BASE)));
    }

    #[test]
    fn stale_render_results_are_discarded() {
        let (mut b, tab, _) = browser();
        b.url_changed(tab, "https://example.com/a");
        let req = b.save_offline(tab).unwrap();
        b.url_changed(tab, "https://example.com/b");
        assert_eq!(b.rendered_html(req, "<p>a</p>".into(), 5), None);
        assert!(b.state().doc.downloads.is_empty());

        let closed = b.save_offline(tab).unwrap();
        b.close_tab(tab);
        assert_eq!(b.rendered_html(closed, "<p>b</p>".into(), 6), None);
    }

    #[test]
    fn tabs_are_independent() {
        let (mut b, first, _) = browser();
        let second = b.open_tab(RecordingView::default(), &clock());
        assert_ne!(first, second);
        b.navigation_requested(second, "navi://store", &clock());
        assert_eq!(b.tab(first).unwrap().url(), "navi://home");
        assert_eq!(b.tab(second).unwrap().url(), "navi://store");
        assert_eq!(b.tab_ids(), vec![first, second]);
        assert!(b.close_tab(first).is_some());
        assert!(b.tab(first).is_none());
    }
}
