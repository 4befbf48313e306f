use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

static LOG_DIR: OnceLock<PathBuf> = OnceLock::new();

const LOG_FILE: &str = "navi.log";
const MAX_LOG_BYTES: u64 = 2 * 1024 * 1024;
const KEEP_LOGS: usize = 5;

/// Initialize the log directory, the stderr subscriber and the panic hook.
/// Must be called once at startup, before the document is loaded.
pub fn init(data_dir: &Path) {
    let log_dir = data_dir.join("logs");
    let _ = fs::create_dir_all(&log_dir);
    LOG_DIR.set(log_dir.clone()).ok();

    rotate_logs(&log_dir);

    // try_init: a second call (tests, embedding hosts) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = format_panic(info);
        append(&msg);
        eprintln!("{}", msg);
        prev_hook(info);
    }));
}

fn append(line: &str) {
    if let Some(dir) = LOG_DIR.get() {
        let path = dir.join(LOG_FILE);
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&path) {
            let _ = f.write_all(line.as_bytes());
            if !line.ends_with('\n') {
                let _ = f.write_all(b"\n");
            }
        }
    }
}

fn format_line(level: &str, context: &str, message: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    format!("[{}] {:<5} [{}] {}\n", timestamp, level, context, message)
}

/// Log a non-fatal error with context
pub fn log_error(context: &str, error: &str) {
    append(&format_line("ERROR", context, error));
    tracing::error!(target: "navi", context, "{}", error);
}

pub fn log_warn(context: &str, message: &str) {
    append(&format_line("WARN", context, message));
    tracing::warn!(target: "navi", context, "{}", message);
}

/// Log an info message (startup, purchases, site edits, etc.)
pub fn log_info(context: &str, message: &str) {
    append(&format_line("INFO", context, message));
    tracing::info!(target: "navi", context, "{}", message);
}

fn format_panic(info: &std::panic::PanicHookInfo) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "unknown".into());
    let payload = if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".into()
    };

    let bt = std::backtrace::Backtrace::force_capture();

    format!(
        "=== NAVI CRASH ===\n\
         Timestamp: {}\n\
         Location:  {}\n\
         Message:   {}\n\
         Thread:    {:?}\n\
         PID:       {}\n\
         \n\
         Backtrace:\n{}\n\
         === END CRASH ===\n",
        timestamp,
        location,
        payload,
        std::thread::current().name().unwrap_or("unnamed"),
        std::process::id(),
        bt
    )
}

fn rotate_logs(log_dir: &Path) {
    let current = log_dir.join(LOG_FILE);
    if let Ok(meta) = fs::metadata(&current) {
        if meta.len() > MAX_LOG_BYTES {
            for i in (1..KEEP_LOGS).rev() {
                let from = log_dir.join(format!("navi.{}.log", i));
                let to = log_dir.join(format!("navi.{}.log", i + 1));
                let _ = fs::rename(&from, &to);
            }
            let _ = fs::rename(&current, log_dir.join("navi.1.log"));
        }
    }
}

/// Contents of the current log file.
pub fn read_log() -> Result<String, String> {
    let dir = LOG_DIR.get().ok_or("Log dir not initialized")?;
    fs::read_to_string(dir.join(LOG_FILE)).map_err(|e| e.to_string())
}
