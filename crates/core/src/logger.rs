//! IndexLogger — append-only, per-run JSONL event log kept outside the
//! indexed project (spec.md §2, §6.5).
//!
//! The ISO-8601 timestamp formatting is a manual epoch-to-calendar
//! conversion, same approach (and the same algorithm, Howard Hinnant's
//! days-from-civil) as the teacher's `server/src/git.rs::days_to_ymd` —
//! written there specifically "without pulling in chrono".

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

const RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Serialize)]
struct LogLine<'a> {
    timestamp: String,
    level: LogLevel,
    project: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

pub struct IndexLogger {
    path: PathBuf,
    project_basename: String,
}

impl IndexLogger {
    /// Open (creating if needed) `<home>/.context/logs/index-<projectBasename>-<ISO8601>.log`.
    pub fn open(home_dir: &Path, project_basename: &str) -> std::io::Result<Self> {
        let logs_dir = home_dir.join(".context").join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        let ts = iso8601_now();
        let path = logs_dir.join(format!("index-{project_basename}-{ts}.log"));
        Ok(Self { path, project_basename: project_basename.to_string() })
    }

    pub fn log(&self, level: LogLevel, message: &str, data: Option<Value>) {
        let line =
            LogLine { timestamp: iso8601_now(), level, project: &self.project_basename, message, data };
        let Ok(serialized) = serde_json::to_string(&line) else { return };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(file, "{serialized}");
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message, None);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prune log files older than `RETENTION_DAYS` under `<home>/.context/logs/`
    /// (spec.md §6.5: "SHOULD prune files older than 7 days on demand").
    pub fn prune_old_logs(home_dir: &Path) -> std::io::Result<usize> {
        let logs_dir = home_dir.join(".context").join("logs");
        let Ok(entries) = std::fs::read_dir(&logs_dir) else { return Ok(0) };

        let cutoff = SystemTime::now()
            .checked_sub(std::time::Duration::from_secs(RETENTION_DAYS as u64 * 86_400))
            .unwrap_or(UNIX_EPOCH);

        let mut pruned = 0;
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            if modified < cutoff {
                if std::fs::remove_file(entry.path()).is_ok() {
                    pruned += 1;
                }
            }
        }
        Ok(pruned)
    }
}

fn iso8601_now() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    epoch_to_iso8601(now.as_secs() as i64, now.subsec_millis())
}

fn epoch_to_iso8601(epoch_secs: i64, millis: u32) -> String {
    let days = epoch_secs.div_euclid(86400);
    let secs_of_day = epoch_secs.rem_euclid(86400);
    let hours = secs_of_day / 3600;
    let mins = (secs_of_day % 3600) / 60;
    let secs = secs_of_day % 60;
    let (year, month, day) = days_to_ymd(days);
    format!("{year:04}-{month:02}-{day:02}T{hours:02}-{mins:02}-{secs:02}-{millis:03}Z")
}

/// Days-since-epoch to (year, month, day), Howard Hinnant's algorithm.
fn days_to_ymd(mut days: i64) -> (i64, i64, i64) {
    days += 719468;
    let era = if days >= 0 { days } else { days - 146096 } / 146097;
    let doe = days - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_to_iso8601_matches_known_date() {
        // 2024-01-15T03:04:05Z
        let s = epoch_to_iso8601(1705287845, 0);
        assert_eq!(&s[..10], "2024-01-15");
    }

    #[test]
    fn logger_writes_jsonl_lines() {
        let dir = tempfile::tempdir().unwrap();
        let logger = IndexLogger::open(dir.path(), "myproj").unwrap();
        logger.info("starting run");
        logger.warn("verification below threshold");

        let content = std::fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["project"], "myproj");
    }

    #[test]
    fn prune_old_logs_removes_stale_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let logs_dir = dir.path().join(".context").join("logs");
        std::fs::create_dir_all(&logs_dir).unwrap();
        let fresh = logs_dir.join("index-fresh.log");
        std::fs::write(&fresh, "x").unwrap();

        let pruned = IndexLogger::prune_old_logs(dir.path()).unwrap();
        assert_eq!(pruned, 0);
        assert!(fresh.exists());
    }
}
