use std::cell::Cell;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
}

impl LogLevel {
    fn glyph(self) -> char {
        match self {
            LogLevel::Debug => '.',
            LogLevel::Verbose => '-',
            LogLevel::Notice => '*',
            LogLevel::Warning => '#',
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.glyph())
    }
}

thread_local! {
    static TIME_OVERRIDE: Cell<Option<u64>> = Cell::new(None);
}

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Tests may freeze this value with [`set_time_override`] to make TTL
/// arithmetic deterministic.
pub fn now_ms() -> u64 {
    TIME_OVERRIDE.with(|t| t.get()).unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64
    })
}

pub fn set_time_override(ms: Option<u64>) {
    TIME_OVERRIDE.with(|t| t.set(ms));
}

pub fn add_ms_to_now(ms: i64) -> u64 {
    (now_ms() as i64 + ms).max(0) as u64
}

pub fn yes_no_to_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// Writes a line in the form `[pid] ts glyph: message` to stdout or a
/// configured log file, matching `redis-server`'s logging format.
pub fn log(level: LogLevel, verbosity: LogLevel, logfile: &Option<String>, body: &str) {
    if level < verbosity {
        return;
    }
    let pid = std::process::id();
    let line = format!("[{}] {} {}: {}\n", pid, now_ms(), level, body);
    match logfile {
        Some(path) => {
            if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = f.write_all(line.as_bytes());
            }
        }
        None => {
            let _ = std::io::stdout().write_all(line.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_freezes_time() {
        set_time_override(Some(1000));
        assert_eq!(now_ms(), 1000);
        assert_eq!(add_ms_to_now(500), 1500);
        set_time_override(None);
    }

    #[test]
    fn yes_no_parses() {
        assert_eq!(yes_no_to_bool("yes"), Some(true));
        assert_eq!(yes_no_to_bool("NO"), Some(false));
        assert_eq!(yes_no_to_bool("maybe"), None);
    }

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Warning);
    }
}
