//! A rotating, self-purging file sink.
//!
//! Every write goes through a single current file. When an advance rule
//! trips (size, age, or the periodic test interval catching a clock change)
//! the sink closes the current file, optionally compresses it, opens the
//! next one, and runs an incremental purge pass bounded by
//! `max_deletes_per_cleanup` so a large backlog of old files is cleaned up
//! gradually rather than in one large stall.

use crate::compression::{compress_in_place, CompressionKind};
use crate::error::{LogCoreError, Result};
use crate::gate::LogGate;
use crate::record::Record;
use crate::sink::Sink;
use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Process-wide epoch the monotonic-delta line field is measured against.
static PROCESS_START: Lazy<Instant> = Lazy::new(Instant::now);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    /// `<name>_<yyyymmdd_HHMMSS>.log`
    ByDate,
    /// `<name>_NNNN.log`, zero-padded to four digits, continuing from
    /// whatever the highest index on disk is at startup.
    Numeric4,
}

#[derive(Debug, Clone)]
pub struct AdvanceRules {
    pub size_limit: Option<u64>,
    pub age_limit: Option<Duration>,
    /// How often the sink rechecks age/size even absent new writes.
    pub test_period: Duration,
}

impl Default for AdvanceRules {
    fn default() -> Self {
        AdvanceRules {
            size_limit: Some(10 * 1024 * 1024),
            age_limit: None,
            test_period: Duration::from_secs(10),
        }
    }
}

impl AdvanceRules {
    /// `test_period == 0` means "derive it": `min(10s, age_limit/3)`, or a
    /// flat 10s when there's no age limit to divide.
    fn normalized(mut self) -> AdvanceRules {
        if self.test_period.is_zero() {
            self.test_period = match self.age_limit {
                Some(age) => Duration::from_secs(10).min(age / 3),
                None => Duration::from_secs(10),
            };
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct PurgeRules {
    pub max_files: Option<usize>,
    pub max_total_bytes: Option<u64>,
    pub max_age: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RotatingFileSinkConfig {
    pub dir: PathBuf,
    pub name: String,
    pub gate: LogGate,
    pub name_style: NameStyle,
    /// Regexes matched against a candidate file's name; a match exempts it
    /// from purging (e.g. a manually-marked-for-keeping backup).
    pub purge_exclude_patterns: Vec<String>,
    pub advance: AdvanceRules,
    pub purge: PurgeRules,
    pub create_dir_if_needed: bool,
    pub max_deletes_per_cleanup: usize,
    pub compress_rotated: CompressionKind,
}

impl RotatingFileSinkConfig {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>) -> RotatingFileSinkConfig {
        RotatingFileSinkConfig {
            dir: dir.into(),
            name: name.into(),
            gate: LogGate::ALL,
            name_style: NameStyle::ByDate,
            purge_exclude_patterns: Vec::new(),
            advance: AdvanceRules::default(),
            purge: PurgeRules::default(),
            create_dir_if_needed: true,
            max_deletes_per_cleanup: 200,
            compress_rotated: CompressionKind::None,
        }
    }
}

const DIR_RETRY_HOLDOFF: Duration = Duration::from_secs(30);

struct OpenFile {
    path: PathBuf,
    file: File,
    opened_at: Instant,
    current_size: u64,
    writes_since_recheck: u32,
}

struct FileState {
    current: Option<OpenFile>,
    dir_ready: bool,
    last_dir_attempt: Option<Instant>,
    last_periodic_check: Option<Instant>,
    next_numeric_index: u32,
    dropped_since_last_success: u64,
}

/// Force a real filesystem stat of the open file (rather than trusting the
/// incrementally-tracked counter) after this many successful writes.
const SIZE_RECHECK_WRITE_COUNT: u32 = 100;

pub struct RotatingFileSink {
    config: RotatingFileSinkConfig,
    state: Mutex<FileState>,
}

impl RotatingFileSink {
    pub fn new(mut config: RotatingFileSinkConfig) -> RotatingFileSink {
        config.advance = config.advance.normalized();
        RotatingFileSink {
            config,
            state: Mutex::new(FileState {
                current: None,
                dir_ready: false,
                last_dir_attempt: None,
                last_periodic_check: None,
                next_numeric_index: 0,
                dropped_since_last_success: 0,
            }),
        }
    }

    fn ensure_dir_ready(&self, state: &mut FileState) -> bool {
        if state.dir_ready {
            return true;
        }
        if let Some(last) = state.last_dir_attempt {
            if last.elapsed() < DIR_RETRY_HOLDOFF {
                return false;
            }
        }
        state.last_dir_attempt = Some(Instant::now());
        let result = if self.config.create_dir_if_needed {
            fs::create_dir_all(&self.config.dir)
        } else {
            fs::metadata(&self.config.dir).map(|_| ())
        };
        match result {
            Ok(()) => {
                state.dir_ready = true;
                if self.config.name_style == NameStyle::Numeric4 {
                    state.next_numeric_index = scan_next_numeric_index(&self.config.dir, &self.config.name);
                }
                true
            }
            Err(err) => {
                tracing::error!(
                    target: "logcore::internal",
                    dir = %self.config.dir.display(),
                    error = %err,
                    "rotating file sink could not prepare its directory; retrying after holdoff"
                );
                false
            }
        }
    }

    fn next_path(&self, state: &mut FileState) -> PathBuf {
        match self.config.name_style {
            NameStyle::ByDate => {
                let stamp = Utc::now().format("%Y%m%d_%H%M%S");
                let mut candidate = self.config.dir.join(format!("{}_{}.log", self.config.name, stamp));
                let mut suffix = 1u32;
                while candidate.exists() && non_empty(&candidate) {
                    candidate = self
                        .config
                        .dir
                        .join(format!("{}_{}-{}.log", self.config.name, stamp, suffix));
                    suffix += 1;
                }
                candidate
            }
            NameStyle::Numeric4 => {
                let index = state.next_numeric_index;
                state.next_numeric_index += 1;
                self.config.dir.join(format!("{}_{:04}.log", self.config.name, index))
            }
        }
    }

    fn open_next(&self, state: &mut FileState) -> io::Result<()> {
        let path = self.next_path(state);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        state.current = Some(OpenFile {
            path,
            file,
            opened_at: Instant::now(),
            current_size,
            writes_since_recheck: 0,
        });
        state.last_periodic_check = Some(Instant::now());
        Ok(())
    }

    fn should_advance(&self, open: &OpenFile) -> bool {
        if let Some(limit) = self.config.advance.size_limit {
            if open.current_size >= limit {
                return true;
            }
        }
        if let Some(limit) = self.config.advance.age_limit {
            if open.opened_at.elapsed() >= limit {
                return true;
            }
        }
        false
    }

    /// Forces a real stat of the current file, correcting any drift between
    /// the incrementally-tracked `current_size` and what's actually on
    /// disk, whenever `SIZE_RECHECK_WRITE_COUNT` writes have landed or
    /// `advance.test_period` has elapsed since the last recheck — whichever
    /// comes first. Covers periodic re-testing independent of whether a
    /// size/age threshold has actually tripped yet.
    fn periodic_recheck(&self, state: &mut FileState) {
        let period_due = state
            .last_periodic_check
            .map(|t| t.elapsed() >= self.config.advance.test_period)
            .unwrap_or(true);
        let Some(open) = state.current.as_mut() else {
            return;
        };
        let count_due = open.writes_since_recheck >= SIZE_RECHECK_WRITE_COUNT;
        if !period_due && !count_due {
            return;
        }
        if let Ok(meta) = open.file.metadata() {
            open.current_size = meta.len();
        }
        open.writes_since_recheck = 0;
        state.last_periodic_check = Some(Instant::now());
    }

    fn advance(&self, state: &mut FileState) {
        if let Some(open) = state.current.take() {
            drop(open.file);
            if self.config.compress_rotated != CompressionKind::None {
                if let Err(err) = compress_in_place(&open.path, self.config.compress_rotated) {
                    tracing::warn!(target: "logcore::internal", error = %err, "failed to compress rotated log file");
                }
            }
        }
        if self.ensure_dir_ready(state) {
            if let Err(err) = self.open_next(state) {
                tracing::error!(target: "logcore::internal", error = %err, "failed to open next rotating log file");
                state.dir_ready = false;
            } else {
                self.purge(state);
            }
        }
    }

    fn purge(&self, state: &FileState) {
        let rules = &self.config.purge;
        if rules.max_files.is_none() && rules.max_total_bytes.is_none() && rules.max_age.is_none() {
            return;
        }
        let current_path = state.current.as_ref().map(|f| f.path.clone());
        let exclude_patterns: Vec<regex::Regex> = self
            .config
            .purge_exclude_patterns
            .iter()
            .filter_map(|p| regex::Regex::new(p).ok())
            .collect();
        let mut entries: Vec<(PathBuf, std::time::SystemTime, u64)> = match fs::read_dir(&self.config.dir) {
            Ok(rd) => rd
                .par_bridge()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path() != *current_path.as_ref().unwrap_or(&PathBuf::new()))
                .filter(|entry| belongs_to_sink(&entry.path(), &self.config.name))
                .filter(|entry| {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    !exclude_patterns.iter().any(|re| re.is_match(&name))
                })
                .filter_map(|entry| {
                    let meta = entry.metadata().ok()?;
                    let modified = meta.modified().ok()?;
                    Some((entry.path(), modified, meta.len()))
                })
                .collect(),
            Err(_) => return,
        };
        entries.sort_by_key(|(_, modified, _)| *modified);

        let mut to_delete: Vec<PathBuf> = Vec::new();
        if let Some(max_age) = rules.max_age {
            let cutoff = std::time::SystemTime::now()
                .checked_sub(max_age)
                .unwrap_or(std::time::UNIX_EPOCH);
            for (path, modified, _) in &entries {
                if *modified < cutoff {
                    to_delete.push(path.clone());
                }
            }
        }
        if let Some(max_files) = rules.max_files {
            let remaining: Vec<_> = entries.iter().filter(|(p, _, _)| !to_delete.contains(p)).collect();
            if remaining.len() > max_files {
                for (path, _, _) in remaining.iter().take(remaining.len() - max_files) {
                    to_delete.push((*path).clone());
                }
            }
        }
        if let Some(max_bytes) = rules.max_total_bytes {
            let remaining: Vec<_> = entries.iter().filter(|(p, _, _)| !to_delete.contains(p)).collect();
            let mut total: u64 = remaining.iter().map(|(_, _, size)| size).sum();
            for (path, _, size) in remaining.iter() {
                if total <= max_bytes {
                    break;
                }
                to_delete.push((*path).clone());
                total = total.saturating_sub(*size);
            }
        }

        to_delete.sort();
        to_delete.dedup();
        to_delete.truncate(self.config.max_deletes_per_cleanup);
        to_delete.par_iter().for_each(|path| {
            if let Err(err) = fs::remove_file(path) {
                tracing::warn!(target: "logcore::internal", path = %path.display(), error = %err, "failed to purge rotated log file");
            }
        });
    }

    fn format_line(record: &Record) -> String {
        record.with_message(|m| {
            let wall = m
                .emitted_at_wall
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            let monotonic_delta = m
                .emitted_at_monotonic
                .map(|t| t.saturating_duration_since(*PROCESS_START).as_millis().to_string())
                .unwrap_or_default();
            let thread = m
                .thread
                .as_ref()
                .map(|t| t.name.clone().unwrap_or_else(|| t.os_id.to_string()))
                .unwrap_or_default();
            let keywords = m.keywords.join(",");
            let call_site = m
                .call_site
                .map(|c| format!("{}:{}", c.file, c.line))
                .unwrap_or_default();
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\r\n",
                wall,
                monotonic_delta,
                m.severity.code3(),
                thread,
                m.logger_name,
                keywords,
                m.body.replace('\t', " ").replace('\n', " / "),
                call_site,
            )
        })
    }

    fn write_line(&self, state: &mut FileState, line: &str) {
        if state.current.is_none() {
            if !self.ensure_dir_ready(state) {
                state.dropped_since_last_success += 1;
                return;
            }
            if let Err(err) = self.open_next(state) {
                tracing::error!(target: "logcore::internal", error = %err, "failed to open initial rotating log file");
                state.dir_ready = false;
                state.dropped_since_last_success += 1;
                return;
            }
        }
        self.periodic_recheck(state);
        if let Some(open) = state.current.as_ref() {
            if self.should_advance(open) {
                self.advance(state);
            }
        }
        let Some(open) = state.current.as_mut() else {
            state.dropped_since_last_success += 1;
            return;
        };
        match open.file.write_all(line.as_bytes()).and_then(|_| open.file.flush()) {
            Ok(()) => {
                open.current_size += line.len() as u64;
                open.writes_since_recheck += 1;
                if state.dropped_since_last_success > 0 {
                    tracing::warn!(
                        target: "logcore::internal",
                        dropped = state.dropped_since_last_success,
                        "rotating file sink resumed writes after prior failures"
                    );
                    state.dropped_since_last_success = 0;
                }
            }
            Err(err) => {
                tracing::error!(target: "logcore::internal", error = %err, "write to rotating log file failed");
                state.current = None;
                state.dropped_since_last_success += 1;
            }
        }
    }
}

impl Sink for RotatingFileSink {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn handle(&self, record: Record) {
        if !record.with_message(|m| self.config.gate.allows(m.severity)) {
            return;
        }
        let line = Self::format_line(&record);
        let mut state = self.state.lock();
        self.write_line(&mut state, &line);
    }

    fn handle_many(&self, records: Vec<Record>) {
        let lines: Vec<String> = records
            .iter()
            .filter(|r| r.with_message(|m| self.config.gate.allows(m.severity)))
            .map(Self::format_line)
            .collect();
        let mut state = self.state.lock();
        for line in lines {
            self.write_line(&mut state, &line);
        }
    }

    fn flush(&self) {
        let mut state = self.state.lock();
        if let Some(open) = state.current.as_mut() {
            let _ = open.file.flush();
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if let Some(open) = state.current.take() {
            drop(open.file);
        }
    }
}

impl RotatingFileSink {
    /// Records dropped since the last successful write, due to a directory
    /// that wouldn't prepare or an I/O failure on the open file.
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().dropped_since_last_success
    }
}

fn non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn belongs_to_sink(path: &Path, name: &str) -> bool {
    path.file_name()
        .and_then(|f| f.to_str())
        .map(|f| f.starts_with(&format!("{name}_")))
        .unwrap_or(false)
}

fn scan_next_numeric_index(dir: &Path, name: &str) -> u32 {
    let prefix = format!("{name}_");
    let Ok(read) = fs::read_dir(dir) else {
        return 0;
    };
    read.filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter_map(|fname| {
            let rest = fname.strip_prefix(&prefix)?;
            let digits = rest.split('.').next()?;
            digits.parse::<u32>().ok()
        })
        .max()
        .map(|max| max + 1)
        .unwrap_or(0)
}
