pub mod crash_log;
pub mod downloads;
pub mod history;
pub mod pages;
pub mod rewards;
pub mod router;
pub mod settings;
pub mod sites;
pub mod store;
pub mod view;

use chrono::{DateTime, Local, NaiveDate};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use store::{AppState, JsonFileStore};
use view::{Browser, NavigationDecision, RenderRequest, TabId, WebView};

/// Wall-clock reading passed into every time-dependent operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    pub unix: i64,
    pub today: NaiveDate,
}

impl Clock {
    pub fn now() -> Self {
        let now = Local::now();
        Clock { unix: now.timestamp(), today: now.date_naive() }
    }

    /// A fixed reading; the calendar date is taken in UTC.
    pub fn at(unix: i64) -> Self {
        let today = DateTime::from_timestamp(unix, 0).map(|d| d.date_naive()).unwrap_or(NaiveDate::MIN);
        Clock { unix, today }
    }
}

pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("NAVI_DATA_DIR").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("com.navi.browser")
}

/// Stand-in web view for the terminal: prints what it is asked to load and
/// completes loads on the next pump.
#[derive(Default)]
struct TerminalView {
    pending_url: Option<String>,
    loaded_html: Option<String>,
    content: Option<String>,
    render: Option<RenderRequest>,
}

impl WebView for TerminalView {
    fn load_url(&mut self, url: &str) {
        println!("-> {}", url);
        self.pending_url = Some(url.to_string());
        self.content = None;
    }

    fn load_html(&mut self, html: &str, base_url: &str) {
        println!("-> [{} bytes, base {}]", html.len(), base_url);
        self.loaded_html = Some(base_url.to_string());
        self.content = Some(html.to_string());
    }

    fn execute_script(&mut self, script: &str) {
        tracing::debug!(bytes = script.len(), "extension script executed");
    }

    fn request_rendered_html(&mut self, request: RenderRequest) {
        self.render = Some(request);
    }
}

/// Complete whatever the terminal view was asked to do.
fn pump(browser: &mut Browser<TerminalView>, tab: TabId) {
    loop {
        let clock = Clock::now();
        let Some(view) = browser.view_mut(tab) else { return };
        if let Some(url) = view.pending_url.take() {
            if browser.navigation_requested(tab, &url, &clock) == NavigationDecision::Allow {
                browser.url_changed(tab, &url);
                browser.load_finished(tab, &url, "", clock.unix);
            }
            continue;
        }
        if let Some(base) = view.loaded_html.take() {
            browser.load_finished(tab, &base, "", clock.unix);
            continue;
        }
        if let Some(request) = view.render.take() {
            match view.content.clone() {
                Some(html) => {
                    if let Some(id) = browser.rendered_html(request, html, clock.unix) {
                        println!("saved offline as {}", id);
                    }
                }
                None => println!("nothing rendered to save"),
            }
            continue;
        }
        return;
    }
}

/// Returns false when the host should stop.
fn handle_line(browser: &mut Browser<TerminalView>, tab: TabId, line: &str) -> bool {
    match line {
        "" => {}
        ":q" => return false,
        ":save" => {
            browser.save_offline(tab);
        }
        ":source" => match browser.tab(tab).and_then(|t| t.view().content.as_deref()) {
            Some(html) => println!("{}", html),
            None => println!("no source for the current page"),
        },
        ":log" => match crash_log::read_log() {
            Ok(log) => println!("{}", log),
            Err(e) => println!("log unavailable: {}", e),
        },
        address => browser.navigate(tab, address, &Clock::now()),
    }
    pump(browser, tab);
    if let Some(t) = browser.tab(tab) {
        println!("[{}] {} | {} Navits", t.url(), t.title(), browser.state().doc.reward_state.balance);
    }
    true
}

async fn host(state: AppState) {
    let mut browser = Browser::new(state);
    let tab = browser.open_tab(TerminalView::default(), &Clock::now());
    pump(&mut browser, tab);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_secs(rewards::WATCH_TICK_SECS));
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_line(&mut browser, tab, line.trim()) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    crash_log::log_error("stdin", &format!("read failed: {}", e));
                    break;
                }
            },
            _ = ticker.tick() => {
                if let Some(amount) = browser.tick(tab, Clock::now().unix) {
                    println!("+{} Navits for watching", amount);
                }
            }
        }
    }
    crash_log::log_info("shutdown", "host loop finished");
}

pub fn run() {
    // init data dir and logging FIRST
    let data_dir = data_dir();
    let _ = std::fs::create_dir_all(&data_dir);
    crash_log::init(&data_dir);
    crash_log::log_info(
        "startup",
        &format!("Navi Browser v{} starting, pid={}", env!("CARGO_PKG_VERSION"), std::process::id()),
    );

    let store = JsonFileStore::new(data_dir.join(store::DOCUMENT_FILE));
    let mut state = AppState::load(Box::new(store));

    let now = Clock::now();
    let doc = &mut state.doc;
    if history::apply_inactivity_switch(&mut doc.history, &mut doc.reward_state, &doc.settings, now.unix) {
        crash_log::log_info("history", "inactive for over 14 days, history replaced with wholesome entries");
    }
    state.persist();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            crash_log::log_error("startup", &format!("tokio runtime: {}", e));
            eprintln!("FATAL: Navi failed to start: {}", e);
            return;
        }
    };
    runtime.block_on(host(state));
}
