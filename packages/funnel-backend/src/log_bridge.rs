/// Process logger: env_logger filtering, plus a ring buffer of recent
/// entries, a log file and a broadcast feed for the API.
use env_logger::{Logger, Target};
use log::{Log, Metadata, Record, SetLoggerError};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex};
use tokio::sync::broadcast;

const MAX_LOG_ENTRIES: usize = 2000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp_ms: i64,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogEntry {
    fn now(level: &str, target: &str, message: String) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            level: level.to_string(),
            target: target.to_string(),
            message,
        }
    }

    fn line(&self) -> String {
        format!(
            "{} [{}] [{}] {}",
            self.timestamp_ms,
            self.level.to_uppercase(),
            self.target,
            self.message.replace('\n', "\\n")
        )
    }
}

struct LogHub {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
    tx: broadcast::Sender<LogEntry>,
}

impl LogHub {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(512);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            tx,
        }
    }

    fn push(&self, entry: LogEntry) {
        {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.push_back(entry.clone());
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }
        let _ = self.tx.send(entry);
    }

    fn recent(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

static LOG_HUB: LazyLock<LogHub> = LazyLock::new(|| LogHub::new(MAX_LOG_ENTRIES));

struct LogFile {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl LogFile {
    fn new(path: PathBuf) -> Self {
        let file = Self::open(&path).ok();
        Self {
            path,
            file: Mutex::new(file),
        }
    }

    fn open(path: &Path) -> io::Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn append(&self, entry: &LogEntry) {
        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            match Self::open(&self.path) {
                Ok(file) => *guard = Some(file),
                Err(_) => return,
            }
        }
        if let Some(file) = guard.as_mut() {
            let _ = writeln!(file, "{}", entry.line());
            let _ = file.flush();
        }
    }
}

static LOG_FILE: LazyLock<LogFile> = LazyLock::new(|| {
    LogFile::new(crate::config::config_dir().join("logs").join("backend.log"))
});

struct BroadcastLogger {
    inner: Logger,
}

impl Log for BroadcastLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::now(
            &record.level().to_string().to_lowercase(),
            record.target(),
            record.args().to_string(),
        );
        // stderr keeps working when nobody reads the API
        self.inner.log(record);
        LOG_FILE.append(&entry);
        LOG_HUB.push(entry);
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the logger. Filter defaults to `info`, overridable via `RUST_LOG`.
pub fn init() -> Result<(), SetLoggerError> {
    let _ = &*LOG_FILE;
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.target(Target::Stderr);
    let inner = builder.build();
    let max_level = inner.filter();
    let logger = Box::leak(Box::new(BroadcastLogger { inner }));
    log::set_logger(logger)?;
    log::set_max_level(max_level);
    Ok(())
}

pub fn recent_entries() -> Vec<LogEntry> {
    LOG_HUB.recent()
}

pub fn subscribe() -> broadcast::Receiver<LogEntry> {
    LOG_HUB.tx.subscribe()
}

pub fn log_file_path() -> String {
    LOG_FILE.path.display().to_string()
}

/// Record a line when the logger itself could not be installed.
pub fn write_fallback_line(message: &str) {
    let entry = LogEntry::now("error", "funnel.log_bridge", message.to_string());
    eprintln!("{}", entry.line());
    LOG_FILE.append(&entry);
    LOG_HUB.push(entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_keeps_most_recent_entries() {
        let hub = LogHub::new(3);
        let mut rx = hub.tx.subscribe();
        for i in 0..5 {
            hub.push(LogEntry::now("info", "funnel.test", format!("entry {}", i)));
        }
        let recent: Vec<String> = hub.recent().into_iter().map(|e| e.message).collect();
        assert_eq!(recent, vec!["entry 2", "entry 3", "entry 4"]);
        assert_eq!(rx.try_recv().unwrap().message, "entry 0");
    }

    #[test]
    fn test_log_file_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("backend.log");
        let file = LogFile::new(path.clone());
        file.append(&LogEntry::now("warn", "funnel.sync", "first\nsecond".into()));
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("[WARN] [funnel.sync] first\\nsecond"));
    }
}
